// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::io;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::header::{self, HeaderName, HeaderValue};
use hyper::http::request::Parts;
use hyper::service::service_fn;
use hyper::{http, Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use metrics_common::codec::{self, Compression, SIGNATURE_HEADER};
use metrics_store::Store;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::errors::ServerError;
use crate::handlers;
use crate::http_utils::{
    accepts_gzip, header_str, log_and_create_http_response, verify_request_content_length, Body,
    HttpResponse,
};

pub const UPDATE_PATH: &str = "/update/";
pub const UPDATES_PATH: &str = "/updates/";
pub const VALUE_PATH: &str = "/value/";
pub const PING_PATH: &str = "/ping";

/// Largest request body accepted, before and after decompression.
pub const MAX_CONTENT_LENGTH: usize = 10 * 1024 * 1024;

/// How long open connections get to finish once shutdown starts.
const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Request body after decompression and signature verification.
struct DecodedRequest {
    body: Bytes,
    signature: Option<String>,
}

/// HTTP front of the metric store.
#[derive(Clone)]
pub struct MetricsServer {
    store: Arc<dyn Store>,
    key: Option<String>,
}

impl MetricsServer {
    /// `key` enables signature checks on requests carrying the signature
    /// header. Requests without the header are accepted either way.
    pub fn new(store: Arc<dyn Store>, key: Option<String>) -> Self {
        Self {
            store,
            key: key.filter(|key| !key.is_empty()),
        }
    }

    pub async fn bind(address: &str) -> Result<TcpListener, ServerError> {
        TcpListener::bind(address)
            .await
            .map_err(|source| ServerError::Bind {
                address: address.to_string(),
                source,
            })
    }

    /// Accepts connections until `cancel` fires, then gives in-flight
    /// requests a grace period before dropping them.
    pub async fn serve(
        self,
        listener: TcpListener,
        cancel: CancellationToken,
    ) -> Result<(), ServerError> {
        if let Ok(address) = listener.local_addr() {
            info!("Metrics server listening on {address}");
        }

        let server = Arc::new(self);
        let service = service_fn(move |req: Request<Incoming>| {
            let server = Arc::clone(&server);
            async move { server.handle(req).await }
        });

        let http = hyper::server::conn::http1::Builder::new();
        let mut joinset = JoinSet::new();

        loop {
            let conn = tokio::select! {
                () = cancel.cancelled() => break,
                con_res = listener.accept() => match con_res {
                    Err(e)
                        if matches!(
                            e.kind(),
                            io::ErrorKind::ConnectionAborted
                                | io::ErrorKind::ConnectionReset
                                | io::ErrorKind::ConnectionRefused
                        ) =>
                    {
                        continue;
                    }
                    Err(e) => {
                        error!("Server error: {e}");
                        return Err(ServerError::Accept(e));
                    }
                    Ok((conn, _)) => conn,
                },
                finished = async {
                    match joinset.join_next().await {
                        Some(finished) => finished,
                        None => std::future::pending().await,
                    }
                } => match finished {
                    Err(e) if e.is_panic() => {
                        error!("Connection handler panicked: {e}");
                        continue;
                    }
                    Ok(()) | Err(_) => continue,
                },
            };
            let conn = TokioIo::new(conn);
            let server = http.clone();
            let service = service.clone();
            joinset.spawn(async move {
                if let Err(e) = server.serve_connection(conn, service).await {
                    debug!("Connection error: {e}");
                }
            });
        }

        info!(
            "Metrics server shutting down, {} connection(s) still open",
            joinset.len()
        );
        let drained = tokio::time::timeout(SHUTDOWN_GRACE_PERIOD, async {
            while joinset.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!("Dropping connections still open after {SHUTDOWN_GRACE_PERIOD:?}");
            joinset.shutdown().await;
        }
        Ok(())
    }

    /// Runs one request through body decoding, routing and response
    /// encoding.
    pub async fn handle<B>(&self, req: Request<B>) -> http::Result<HttpResponse>
    where
        B: hyper::body::Body,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let (parts, body) = req.into_parts();
        let gzip_response = accepts_gzip(&parts.headers);

        let (response, signature) = match self.decode(&parts, body).await {
            Ok(decoded) => (
                self.route(&parts.method, parts.uri.path(), &decoded.body)
                    .await?,
                decoded.signature,
            ),
            Err(rejection) => (rejection?, None),
        };
        encode_response(response, signature, gzip_response).await
    }

    async fn decode<B>(
        &self,
        parts: &Parts,
        body: B,
    ) -> Result<DecodedRequest, http::Result<HttpResponse>>
    where
        B: hyper::body::Body,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        if parts.method != Method::POST {
            return Ok(DecodedRequest {
                body: Bytes::new(),
                signature: None,
            });
        }

        if let Some(response) = verify_request_content_length(
            &parts.headers,
            MAX_CONTENT_LENGTH,
            "Error processing metrics",
        ) {
            return Err(response);
        }

        let raw = match Limited::new(body, MAX_CONTENT_LENGTH).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
                return Err(log_and_create_http_response(
                    "Error processing metrics: Payload too large",
                    StatusCode::PAYLOAD_TOO_LARGE,
                ))
            }
            Err(e) => {
                return Err(log_and_create_http_response(
                    &format!("Error processing metrics: Unable to read request body: {e}"),
                    StatusCode::BAD_REQUEST,
                ))
            }
        };

        let body = match header_str(&parts.headers, header::CONTENT_ENCODING.as_str()) {
            None => raw,
            Some(encoding) if encoding.eq_ignore_ascii_case("identity") => raw,
            Some(encoding) => match Compression::from_content_encoding(encoding) {
                Some(compression) => match compression.decompress(&raw) {
                    Ok(decompressed) if decompressed.len() > MAX_CONTENT_LENGTH => {
                        return Err(log_and_create_http_response(
                            "Error processing metrics: Decompressed payload too large",
                            StatusCode::PAYLOAD_TOO_LARGE,
                        ))
                    }
                    Ok(decompressed) => Bytes::from(decompressed),
                    Err(e) => {
                        return Err(log_and_create_http_response(
                            &format!("Error processing metrics: Unable to decompress {encoding} body: {e}"),
                            StatusCode::BAD_REQUEST,
                        ))
                    }
                },
                None => {
                    return Err(log_and_create_http_response(
                        &format!("Error processing metrics: Unsupported content encoding {encoding:?}"),
                        StatusCode::UNSUPPORTED_MEDIA_TYPE,
                    ))
                }
            },
        };

        let signature = match (&self.key, header_str(&parts.headers, SIGNATURE_HEADER)) {
            (Some(key), Some(signature)) => {
                if !codec::verify(key, &body, signature) {
                    return Err(log_and_create_http_response(
                        "Error processing metrics: Signature mismatch",
                        StatusCode::BAD_REQUEST,
                    ));
                }
                Some(signature.to_string())
            }
            _ => None,
        };

        Ok(DecodedRequest { body, signature })
    }

    async fn route(&self, method: &Method, path: &str, body: &[u8]) -> http::Result<HttpResponse> {
        let store = self.store.as_ref();
        match (method, path) {
            (&Method::POST, UPDATE_PATH | "/update") => return handlers::update_json(store, body).await,
            (&Method::POST, UPDATES_PATH | "/updates") => {
                return handlers::update_batch(store, body).await
            }
            (&Method::POST, VALUE_PATH | "/value") => return handlers::value_json(store, body).await,
            (&Method::GET, PING_PATH) => return handlers::ping(store).await,
            (&Method::GET, "/") => return handlers::index(store).await,
            _ => {}
        }
        if *method == Method::POST {
            if let Some(segments) = path.strip_prefix(UPDATE_PATH) {
                return handlers::update_path(store, segments).await;
            }
        }
        if *method == Method::GET {
            if let Some(segments) = path.strip_prefix(VALUE_PATH) {
                return handlers::value_path(store, segments).await;
            }
        }
        log_and_create_http_response(
            &format!("No route for {method} {path}"),
            StatusCode::NOT_FOUND,
        )
    }
}

/// Echoes a verified signature and gzips non-empty bodies for clients that
/// accept it.
async fn encode_response(
    response: HttpResponse,
    signature: Option<String>,
    gzip: bool,
) -> http::Result<HttpResponse> {
    let (mut parts, body) = response.into_parts();

    if let Some(signature) = signature {
        match (
            HeaderName::from_bytes(SIGNATURE_HEADER.as_bytes()),
            HeaderValue::from_str(&signature),
        ) {
            (Ok(name), Ok(value)) => {
                parts.headers.insert(name, value);
            }
            _ => debug!("Not echoing an unrepresentable signature header"),
        }
    }

    if !gzip {
        return Ok(Response::from_parts(parts, body));
    }
    let bytes = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(never) => match never {},
    };
    if bytes.is_empty() {
        return Ok(Response::from_parts(parts, Body::from(bytes)));
    }
    match Compression::Gzip.compress(&bytes) {
        Ok(compressed) => {
            parts
                .headers
                .insert(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));
            parts.headers.remove(header::CONTENT_LENGTH);
            Ok(Response::from_parts(parts, Body::from(compressed)))
        }
        Err(e) => {
            warn!("Unable to gzip response, sending it uncompressed: {e}");
            Ok(Response::from_parts(parts, Body::from(bytes)))
        }
    }
}
