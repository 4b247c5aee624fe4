use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure classes surfaced to the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Network,
    Auth,
    Validation,
    Server,
    RateLimited,
    NotFound,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Network => "network_error",
            ErrorKind::Auth => "auth_error",
            ErrorKind::Validation => "validation_error",
            ErrorKind::Server => "server_error",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Unknown => "unknown",
        }
    }

    /// Message shown in the error banner.
    pub fn user_message(&self) -> &'static str {
        match self {
            ErrorKind::Network => {
                "Unable to reach Betty. Check your connection and try again."
            }
            ErrorKind::Auth => "Your session has expired. Please sign in again.",
            ErrorKind::Validation => "That message couldn't be processed. Try rephrasing it.",
            ErrorKind::Server => "Betty is having trouble right now. Please try again shortly.",
            ErrorKind::RateLimited => "You're sending messages too quickly. Please wait a moment.",
            ErrorKind::NotFound => "This conversation no longer exists.",
            ErrorKind::Unknown => "Something went wrong. Please try again.",
        }
    }

    /// Stored credentials are stale and the user must log in again.
    pub fn requires_reauth(&self) -> bool {
        matches!(self, ErrorKind::Auth)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("No access token available")]
    MissingToken,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Too many requests: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<u64>,
    },

    #[error("Server error: {status} - {message}")]
    Server { status: u16, message: String },

    #[error("Unexpected response: {status} - {message}")]
    Unexpected { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Request cancelled")]
    Cancelled,
}

/// Error body shapes returned by the backend.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    detail: Option<serde_json::Value>,
    error: Option<String>,
    message: Option<String>,
}

impl GatewayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::Network(_) | GatewayError::Timeout => ErrorKind::Network,
            GatewayError::MissingToken | GatewayError::Unauthorized(_) => ErrorKind::Auth,
            GatewayError::Validation(_) => ErrorKind::Validation,
            GatewayError::NotFound(_) => ErrorKind::NotFound,
            GatewayError::RateLimited { .. } => ErrorKind::RateLimited,
            GatewayError::Server { .. } => ErrorKind::Server,
            GatewayError::Unexpected { .. }
            | GatewayError::InvalidResponse(_)
            | GatewayError::Cancelled => ErrorKind::Unknown,
        }
    }

    /// Whether repeating the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::Network(_) | GatewayError::Timeout => true,
            GatewayError::RateLimited { .. } => true,
            GatewayError::Server { status, .. } => matches!(status, 502..=504),
            _ => false,
        }
    }

    /// Classify a non-2xx response.
    pub fn from_status(status: StatusCode, body: &str, retry_after: Option<u64>) -> Self {
        let message = extract_message(body).unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("unknown status")
                .to_string()
        });

        match status.as_u16() {
            401 | 403 => GatewayError::Unauthorized(message),
            404 => GatewayError::NotFound(message),
            400 | 422 => GatewayError::Validation(message),
            429 => GatewayError::RateLimited {
                message,
                retry_after,
            },
            code @ 500..=599 => GatewayError::Server {
                status: code,
                message,
            },
            code => GatewayError::Unexpected {
                status: code,
                message,
            },
        }
    }
}

fn extract_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    let parsed: ErrorBody = match serde_json::from_str(trimmed) {
        Ok(parsed) => parsed,
        Err(_) => return Some(trimmed.chars().take(200).collect()),
    };

    match parsed.detail {
        Some(serde_json::Value::String(detail)) => return Some(detail),
        Some(other @ serde_json::Value::Array(_)) | Some(other @ serde_json::Value::Object(_)) => {
            return Some(other.to_string());
        }
        _ => {}
    }

    parsed.error.or(parsed.message)
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::Timeout
        } else if err.is_decode() {
            GatewayError::InvalidResponse(err.to_string())
        } else {
            GatewayError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::InvalidResponse(err.to_string())
    }
}

impl From<validator::ValidationErrors> for GatewayError {
    fn from(err: validator::ValidationErrors) -> Self {
        GatewayError::Validation(err.to_string())
    }
}
