// Copyright 2025 Fernando Borretti
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::error::Error;
use std::fmt::Display;
use std::fmt::Formatter;

use serde::Deserialize;
use serde::Serialize;

#[derive(Debug, PartialEq)]
pub struct ErrorReport {
    message: String,
}

impl ErrorReport {
    pub fn new(msg: impl Into<String>) -> Self {
        ErrorReport {
            message: msg.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<std::io::Error> for ErrorReport {
    fn from(value: std::io::Error) -> Self {
        ErrorReport {
            message: format!("I/O error: {value:#?}"),
        }
    }
}

impl From<serde_json::Error> for ErrorReport {
    fn from(value: serde_json::Error) -> Self {
        ErrorReport {
            message: format!("JSON error: {value:#?}"),
        }
    }
}

impl From<toml::de::Error> for ErrorReport {
    fn from(value: toml::de::Error) -> Self {
        ErrorReport {
            message: format!("TOML error: {value}"),
        }
    }
}

impl From<StoreError> for ErrorReport {
    fn from(value: StoreError) -> Self {
        ErrorReport {
            message: value.to_string(),
        }
    }
}

impl Display for ErrorReport {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "error: {}", self.message)
    }
}

impl Error for ErrorReport {
    fn description(&self) -> &str {
        &self.message
    }
}

pub type Fallible<T> = Result<T, ErrorReport>;

pub fn fail<T>(msg: impl Into<String>) -> Fallible<T> {
    Err(ErrorReport {
        message: msg.into(),
    })
}

/// The category of a failed remote operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Network,
    Validation,
    Authentication,
    Unknown,
}

impl ErrorKind {
    /// Classifies a free-text error message. Only used for failures that
    /// reach the core without a kind attached.
    pub fn classify(message: &str) -> Self {
        let message = message.to_lowercase();
        let any = |needles: &[&str]| needles.iter().any(|n| message.contains(n));
        if any(&["network", "fetch", "timeout", "timed out"]) {
            ErrorKind::Network
        } else if any(&["validation", "invalid"]) {
            ErrorKind::Validation
        } else if any(&["unauthorized", "forbidden"]) {
            ErrorKind::Authentication
        } else {
            ErrorKind::Unknown
        }
    }

    /// Validation and authentication failures need the user to act, so
    /// they are never retried automatically.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Network | ErrorKind::Unknown)
    }

    pub fn as_str(&self) -> &str {
        match self {
            ErrorKind::Network => "network",
            ErrorKind::Validation => "validation",
            ErrorKind::Authentication => "authentication",
            ErrorKind::Unknown => "unknown",
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A failure reported by a Card Store or Analytics Store, tagged with its
/// kind where the failure happened.
#[derive(Clone, Debug, PartialEq)]
pub struct StoreError {
    pub kind: ErrorKind,
    pub message: String,
}

impl StoreError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Authentication, message)
    }

    /// Wraps an untagged message, inferring the kind from its text.
    pub fn untagged(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(ErrorKind::classify(&message), message)
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} error: {}", self.kind, self.message)
    }
}

impl Error for StoreError {}

impl From<ErrorReport> for StoreError {
    fn from(value: ErrorReport) -> Self {
        StoreError::untagged(value.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(ErrorKind::classify("Network unreachable"), ErrorKind::Network);
        assert_eq!(ErrorKind::classify("Failed to fetch"), ErrorKind::Network);
        assert_eq!(ErrorKind::classify("request timed out"), ErrorKind::Network);
        assert_eq!(ErrorKind::classify("Invalid level"), ErrorKind::Validation);
        assert_eq!(ErrorKind::classify("validation failed"), ErrorKind::Validation);
        assert_eq!(ErrorKind::classify("401 Unauthorized"), ErrorKind::Authentication);
        assert_eq!(ErrorKind::classify("Forbidden"), ErrorKind::Authentication);
        assert_eq!(ErrorKind::classify("disk on fire"), ErrorKind::Unknown);
    }

    #[test]
    fn test_retryable_kinds() {
        assert!(ErrorKind::Network.is_retryable());
        assert!(ErrorKind::Unknown.is_retryable());
        assert!(!ErrorKind::Validation.is_retryable());
        assert!(!ErrorKind::Authentication.is_retryable());
    }

    #[test]
    fn test_untagged_report_is_classified() {
        let err: StoreError = ErrorReport::new("fetch failed").into();
        assert_eq!(err.kind, ErrorKind::Network);
        assert_eq!(err.to_string(), "network error: fetch failed");
    }

    #[test]
    fn test_serialize_kind() {
        let json = serde_json::to_string(&ErrorKind::Authentication).unwrap();
        assert_eq!(json, "\"authentication\"");
    }
}
