use thiserror::Error;

pub type Result<T> = std::result::Result<T, LearningOsError>;

#[derive(Debug, Error)]
pub enum LearningOsError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("http error: {0}")]
    Http(String),
    #[error("api quota exceeded: {0}")]
    Quota(String),
    #[error("invalid api key: {0}")]
    InvalidApiKey(String),
    #[error("model returned no usable text: {0}")]
    EmptyResponse(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("runtime error: {0}")]
    Runtime(String),
}

impl From<diesel::result::Error> for LearningOsError {
    fn from(err: diesel::result::Error) -> Self {
        Self::Runtime(err.to_string())
    }
}

impl LearningOsError {
    /// True when retrying the same request later could succeed without the
    /// user changing anything (quota windows, transient empty responses).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Quota(_) | Self::EmptyResponse(_))
    }
}
