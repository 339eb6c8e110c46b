// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::str::FromStr;

/// What a background loop does once an operation has exhausted its retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Stop the loop and hand the error to the caller, which terminates the
    /// process.
    #[default]
    FailFast,
    /// Log the error and wait for the next tick.
    LogAndContinue,
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailurePolicy::FailFast => f.write_str("fail-fast"),
            FailurePolicy::LogAndContinue => f.write_str("log-and-continue"),
        }
    }
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fail-fast" | "fatal" => Ok(FailurePolicy::FailFast),
            "log-and-continue" | "continue" => Ok(FailurePolicy::LogAndContinue),
            other => Err(format!("unknown failure policy: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_policy() {
        assert_eq!("fail-fast".parse(), Ok(FailurePolicy::FailFast));
        assert_eq!("Log-And-Continue".parse(), Ok(FailurePolicy::LogAndContinue));
        assert!("retry-forever".parse::<FailurePolicy>().is_err());
        assert_eq!(FailurePolicy::default(), FailurePolicy::FailFast);
    }
}
