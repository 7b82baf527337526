//! Error taxonomy for a single `start` call.

use thiserror::Error;

pub type AssemblerResult<T> = Result<T, AssemblerError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssemblerError {
    /// Connect/read failure, idle timeout, or a 502/503/504 response.
    #[error("transient network failure: {0}")]
    TransientNetwork(String),

    #[error("rate limited: {}", .message.as_deref().unwrap_or("too many requests"))]
    RateLimited { message: Option<String> },

    /// The endpoint answered but did not hand back a usable body.
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("http status {status}: {message}")]
    Http { status: u16, message: String },

    /// An `error` object delivered inside the stream itself.
    #[error("upstream error: {0}")]
    Upstream(String),

    /// A complete frame that will never parse.
    #[error("malformed payload: {reason}")]
    PayloadInvalid { reason: String, payload: String },

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("stream cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

impl AssemblerError {
    /// Classify a non-success HTTP status.
    pub fn from_status(status: u16, message: Option<String>) -> Self {
        match status {
            429 => AssemblerError::RateLimited { message },
            502..=504 => AssemblerError::TransientNetwork(
                message.unwrap_or_else(|| format!("server unavailable (status {})", status)),
            ),
            _ => AssemblerError::Http {
                status,
                message: message.unwrap_or_else(|| "request failed".to_string()),
            },
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, AssemblerError::Cancelled)
    }
}

impl From<reqwest::Error> for AssemblerError {
    fn from(error: reqwest::Error) -> Self {
        if let Some(status) = error.status() {
            return AssemblerError::from_status(status.as_u16(), Some(error.to_string()));
        }
        AssemblerError::TransientNetwork(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::AssemblerError;

    #[test]
    fn status_429_maps_to_rate_limited() {
        assert_eq!(
            AssemblerError::from_status(429, None),
            AssemblerError::RateLimited { message: None }
        );
    }

    #[test]
    fn gateway_statuses_are_transient() {
        for status in [502, 503, 504] {
            assert!(matches!(
                AssemblerError::from_status(status, None),
                AssemblerError::TransientNetwork(_)
            ));
        }
    }

    #[test]
    fn other_statuses_keep_the_body_message() {
        assert_eq!(
            AssemblerError::from_status(400, Some("bad input".to_string())),
            AssemblerError::Http {
                status: 400,
                message: "bad input".to_string()
            }
        );
    }

    #[test]
    fn rate_limited_display_falls_back_to_default_text() {
        let error = AssemblerError::RateLimited { message: None };
        assert_eq!(error.to_string(), "rate limited: too many requests");
    }
}
