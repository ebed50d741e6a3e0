use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Too many requests")]
    TooManyRequests,

    #[error("Unsupported media type: {0}")]
    UnsupportedMedia(String),

    #[error("Upstream failed: {0}")]
    BadGateway(String),

    #[error("Fetch failed: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error("Feed parse failed: {0}")]
    Parse(String),

    #[error("Database error: {0}")]
    Db(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("AI backend failure: {0}")]
    AiFailure(String),
}

impl AppError {
    /// Stable machine-readable code used in `{error, code, status}` bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::TooManyRequests => "too_many_requests",
            Self::UnsupportedMedia(_) => "unsupported_media",
            Self::BadGateway(_) | Self::Fetch(_) => "bad_gateway",
            Self::Parse(_) => "ingest_feed_error",
            Self::Db(_) | Self::Config(_) | Self::Serde(_) => "internal",
            Self::AiFailure(_) => "ai_failure",
        }
    }

    pub fn status(&self) -> u16 {
        match self {
            Self::BadRequest(_) => 400,
            Self::Unauthorized => 401,
            Self::Forbidden(_) => 403,
            Self::NotFound(_) => 404,
            Self::TooManyRequests => 429,
            Self::UnsupportedMedia(_) => 415,
            Self::BadGateway(_) | Self::Fetch(_) => 502,
            _ => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(AppError::BadRequest("x".into()).code(), "bad_request");
        assert_eq!(AppError::TooManyRequests.code(), "too_many_requests");
        assert_eq!(AppError::BadGateway("x".into()).code(), "bad_gateway");
        assert_eq!(AppError::AiFailure("x".into()).code(), "ai_failure");
    }

    #[test]
    fn statuses_match_codes() {
        assert_eq!(AppError::NotFound("item".into()).status(), 404);
        assert_eq!(AppError::TooManyRequests.status(), 429);
        assert_eq!(AppError::UnsupportedMedia("text/plain".into()).status(), 415);
        assert_eq!(AppError::Db("locked".into()).status(), 500);
    }
}
