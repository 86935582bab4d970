use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl SourceError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            return body.to_string();
        }
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        match status.as_u16() {
            404 | 410 => SourceError::NotFound(truncated),
            429 => SourceError::RateLimited,
            500..=599 => SourceError::ServerError(truncated),
            _ => SourceError::InvalidResponse(format!("Status {}: {}", status, truncated)),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, SourceError::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_status_mapping() {
        assert!(SourceError::from_status(StatusCode::NOT_FOUND, "").is_not_found());
        assert!(SourceError::from_status(StatusCode::GONE, "").is_not_found());
        assert!(matches!(
            SourceError::from_status(StatusCode::TOO_MANY_REQUESTS, ""),
            SourceError::RateLimited
        ));
        assert!(matches!(
            SourceError::from_status(StatusCode::BAD_GATEWAY, "upstream"),
            SourceError::ServerError(body) if body == "upstream"
        ));
        assert!(matches!(
            SourceError::from_status(StatusCode::BAD_REQUEST, "nope"),
            SourceError::InvalidResponse(msg) if msg.contains("400") && msg.contains("nope")
        ));
    }

    #[test]
    fn test_long_body_truncated_on_char_boundary() {
        let body = "é".repeat(400);
        let err = SourceError::from_status(StatusCode::INTERNAL_SERVER_ERROR, &body);
        let SourceError::ServerError(msg) = err else {
            panic!("expected server error");
        };
        assert!(msg.contains("truncated, 800 total bytes"));
    }
}
