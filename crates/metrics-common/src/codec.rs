// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Payload transforms applied on the way out of the agent and undone on the
//! way into the server: content compression and HMAC-SHA256 signing.
//!
//! The signature is always computed over the uncompressed JSON body, so the
//! server verifies after decompressing.

use std::fmt;
use std::io::{self, Read, Write};
use std::str::FromStr;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use hmac::{Hmac, Mac};
use sha2::Sha256;

/// Header carrying the hex-encoded HMAC-SHA256 of the uncompressed body.
pub const SIGNATURE_HEADER: &str = "HashSHA256";

const ZSTD_LEVEL: i32 = 3;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Gzip,
    Zstd,
}

impl Compression {
    /// Value of the `Content-Encoding` header for this compression.
    pub const fn content_encoding(&self) -> &'static str {
        match self {
            Compression::Gzip => "gzip",
            Compression::Zstd => "zstd",
        }
    }

    /// Maps a `Content-Encoding` header value to a supported compression.
    /// `None` means the body is not compressed (or uses an encoding we do not
    /// know, which the caller should reject).
    pub fn from_content_encoding(header: &str) -> Option<Self> {
        let header = header.to_ascii_lowercase();
        if header.contains("gzip") {
            Some(Compression::Gzip)
        } else if header.contains("zstd") {
            Some(Compression::Zstd)
        } else {
            None
        }
    }

    pub fn compress(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        match self {
            Compression::Gzip => {
                let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
                encoder.write_all(data)?;
                encoder.finish()
            }
            Compression::Zstd => zstd::encode_all(data, ZSTD_LEVEL),
        }
    }

    pub fn decompress(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        match self {
            Compression::Gzip => {
                let mut decoder = GzDecoder::new(data);
                let mut decompressed = Vec::new();
                decoder.read_to_end(&mut decompressed)?;
                Ok(decompressed)
            }
            Compression::Zstd => zstd::decode_all(data),
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.content_encoding())
    }
}

impl FromStr for Compression {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gzip" => Ok(Compression::Gzip),
            "zstd" => Ok(Compression::Zstd),
            other => Err(format!("unsupported compression: {other}")),
        }
    }
}

/// Hex-encoded HMAC-SHA256 of `payload` under `key`, `None` when the key is
/// rejected by the MAC.
pub fn sign(key: &str, payload: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(key.as_bytes()).ok()?;
    mac.update(payload);
    Some(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time check of a hex signature produced by [`sign`].
pub fn verify(key: &str, payload: &[u8], signature_hex: &str) -> bool {
    let Ok(signature) = hex::decode(signature_hex.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(key.as_bytes()) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&signature).is_ok()
}
