use thiserror::Error;

/// Error from a model call.
#[derive(Debug, Clone, Error)]
pub enum ModelError {
    /// Non-success HTTP status returned by the provider.
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },
    /// Connection, timeout or other failure before a status was received.
    #[error("transport error: {0}")]
    Transport(String),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("model returned no text")]
    Empty,
}

impl ModelError {
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    /// HTTP status carried by the error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_code_only_for_http_errors() {
        assert_eq!(ModelError::status(429, "slow down").status_code(), Some(429));
        assert_eq!(ModelError::Transport("reset".into()).status_code(), None);
        assert_eq!(ModelError::Empty.status_code(), None);
        assert_eq!(
            ModelError::status(503, "unavailable").to_string(),
            "HTTP 503: unavailable"
        );
    }
}
