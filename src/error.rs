use thiserror::Error;

#[derive(Error, Debug)]
pub enum JayeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Conversion failed: {0}")]
    ConvertFailed(String),

    #[error("Merge failed: {0}")]
    MergeFailed(String),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Listing aborted: {0}")]
    PartialListFailure(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Coarse classification used at the request boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The caller sent something unusable
    Client,
    /// The requested resource does not exist upstream
    NotFound,
    /// A remote collaborator failed
    Upstream,
    /// Local failure (disk, encoder, cancellation)
    Server,
}

impl JayeError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidRequest(_) => ErrorClass::Client,
            Self::NotFound(_) => ErrorClass::NotFound,
            Self::UpstreamUnavailable(_) => ErrorClass::Upstream,
            _ => ErrorClass::Server,
        }
    }

    /// Message safe to hand to a client. Upstream and subprocess output never
    /// leaks through here; it only goes to the log.
    pub fn public_message(&self) -> String {
        match self {
            Self::InvalidRequest(msg) => msg.clone(),
            Self::NotFound(_) => "resource not found".to_string(),
            Self::UpstreamUnavailable(_) => "upstream service unavailable".to_string(),
            Self::DownloadFailed(_) => "failed to download media".to_string(),
            Self::ConvertFailed(_) => "failed to convert media".to_string(),
            Self::MergeFailed(_) => "failed to merge media".to_string(),
            Self::PartialListFailure(_) => "failed to list videos".to_string(),
            Self::Cancelled => "request cancelled".to_string(),
            _ => "internal server error".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, JayeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert_eq!(JayeError::InvalidRequest("no id supplied".into()).class(), ErrorClass::Client);
        assert_eq!(JayeError::NotFound("abc".into()).class(), ErrorClass::NotFound);
        assert_eq!(JayeError::UpstreamUnavailable("dns".into()).class(), ErrorClass::Upstream);
        assert_eq!(JayeError::MergeFailed("exit 1".into()).class(), ErrorClass::Server);
        assert_eq!(JayeError::Cancelled.class(), ErrorClass::Server);
    }

    #[test]
    fn test_public_message_hides_detail() {
        let err = JayeError::UpstreamUnavailable("key=SECRET connection refused".into());
        assert!(!err.public_message().contains("SECRET"));

        let err = JayeError::ConvertFailed("ffmpeg: Invalid data found".into());
        assert_eq!(err.public_message(), "failed to convert media");

        let err = JayeError::InvalidRequest("no id supplied".into());
        assert_eq!(err.public_message(), "no id supplied");
    }
}
