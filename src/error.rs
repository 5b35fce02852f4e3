//! Unified error types for relaycast.
//!
//! [`RelaycastError`] covers startup, configuration and CLI failures.
//! [`ValidationError`] describes one config problem. [`BufferError`] and
//! [`DeliveryError`] live on the request path: the first is fatal to a
//! whole broadcast, the second only to the delivery that hit it.

use std::path::PathBuf;
use std::time::Duration;

use hyper::StatusCode;

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub target: String,
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "  {}: {} - {}", self.target, self.field, self.message)?;
        if let Some(ref suggestion) = self.suggestion {
            write!(f, " ({suggestion})")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

fn format_errors(errors: &[ValidationError]) -> String {
    use std::fmt::Write;
    let mut buf = String::new();
    for (i, e) in errors.iter().enumerate() {
        if i > 0 {
            buf.push('\n');
        }
        // write! to String is infallible (only fails on OOM which is unrecoverable)
        let _ = write!(buf, "{e}");
    }
    buf
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum RelaycastError {
    #[error("No targets configured.\n\n  {hint}")]
    NoConfigSource { hint: String },

    #[error("Config file not found: {}", path.display())]
    ConfigFileNotFound { path: PathBuf },

    #[error("Config parse error in {path}:\n  {source}")]
    ConfigParse {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Config validation failed:\n{}", format_errors(.errors))]
    ConfigValidation { errors: Vec<ValidationError> },

    #[error("Unsupported config format: '{0}'")]
    UnsupportedFormat(String),

    #[error("Invalid address: {0}")]
    AddressParse(#[from] std::net::AddrParseError),

    #[error("Invalid target URL '{url}': {source}")]
    TargetParse {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Scratch directory {} is unusable: {source}", path.display())]
    ScratchDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Io(#[from] std::io::Error),
}

/// Failure to persist, reopen or delete a buffered request body.
#[derive(Debug, thiserror::Error)]
pub enum BufferError {
    #[error("cannot create buffer file {}: {source}", path.display())]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot write buffer file {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("inbound body stream failed: {0}")]
    Receive(#[source] axum::Error),

    #[error("cannot reopen buffer file {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot remove buffer file {}: {source}", path.display())]
    Release {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Why a single delivery to one target failed.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("cannot replay buffered body: {0}")]
    Open(#[source] BufferError),

    #[error("malformed outbound request: {0}")]
    Build(#[from] http::Error),

    #[error("transport failure: {0}")]
    Transport(#[from] hyper_util::client::legacy::Error),

    #[error("no response within {0:?}")]
    Timeout(Duration),
}

impl DeliveryError {
    /// Status relayed to the caller when this error hits the primary target.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Build(_) => StatusCode::BAD_REQUEST,
            Self::Open(_) | Self::Transport(_) | Self::Timeout(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Body text relayed to the caller alongside [`status`](Self::status).
    #[must_use]
    pub const fn public_message(&self) -> &'static str {
        match self {
            Self::Build(_) => "Bad request",
            Self::Open(_) | Self::Transport(_) | Self::Timeout(_) => "Bad gateway",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_errors_map_to_bad_request() {
        let err = DeliveryError::Build(http::Error::from(
            http::Method::from_bytes(b"BAD METHOD").unwrap_err(),
        ));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.public_message(), "Bad request");
    }

    #[test]
    fn open_and_timeout_errors_map_to_bad_gateway() {
        let open = DeliveryError::Open(BufferError::Open {
            path: PathBuf::from("/nonexistent"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        });
        assert_eq!(open.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            DeliveryError::Timeout(Duration::from_secs(1)).status(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn validation_error_display_includes_suggestion() {
        let err = ValidationError {
            target: "targets[1]".into(),
            field: "url".into(),
            message: "unsupported scheme 'ftp'".into(),
            suggestion: Some("use http:// or https://".into()),
        };
        assert_eq!(
            err.to_string(),
            "  targets[1]: url - unsupported scheme 'ftp' (use http:// or https://)"
        );
    }
}
