use thiserror::Error;

/// Error taxonomy shared by the pipeline, the task scheduler and the HTTP
/// surface. Retryability drives the scheduler's failure handling; the status
/// code drives the API response.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("translation API rejected the credential: {0}")]
    Auth(String),

    #[error("translation API rate limit: {0}")]
    RateLimit(String),

    #[error("translation API server error: {0}")]
    Server(String),

    #[error("translation API returned a malformed response: {0}")]
    ResponseFormat(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("owner token does not match")]
    Ownership,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    /// Whether a task that failed with this error may re-enter the pending
    /// queue. Auth failures are terminal: retrying with the same credential
    /// cannot succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ServiceError::RateLimit(_)
            | ServiceError::Server(_)
            | ServiceError::ResponseFormat(_)
            | ServiceError::Io(_) => true,
            ServiceError::Auth(_)
            | ServiceError::Validation(_)
            | ServiceError::UnsupportedFormat(_)
            | ServiceError::NotFound(_)
            | ServiceError::Ownership => false,
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            ServiceError::Validation(_) | ServiceError::UnsupportedFormat(_) => 400,
            ServiceError::Auth(_) => 502,
            ServiceError::RateLimit(_) => 429,
            ServiceError::Server(_) | ServiceError::ResponseFormat(_) => 502,
            ServiceError::NotFound(_) => 404,
            ServiceError::Ownership => 403,
            ServiceError::Io(_) => 500,
        }
    }
}
