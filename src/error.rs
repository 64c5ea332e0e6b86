use thiserror::Error;

/// Broad classification of [`CloudEventsError`], for callers that only care
/// about the category of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum ErrorKind {
    NotCloudEvent,
    UnsupportedFormat,
    FormatSyntax,
    SpecVersion,
    Attribute,
    BatchNotSupported,
    InvalidArgument,
    Config,
}

#[derive(Error, Debug)]
pub enum CloudEventsError {
    /// The input does not look like a CloudEvent at all.
    #[error("Not a CloudEvent: {0}")]
    NotCloudEvent(String),

    /// The input claims a structured format that no registered codec handles.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// A codec recognized the format but the content was malformed.
    #[error("Format syntax error: {message}")]
    FormatSyntax {
        message: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Spec version error: {0}")]
    SpecVersion(String),

    #[error("Attribute error: {0}")]
    Attribute(String),

    /// Batch content mode presented to a transport that forbids it.
    #[error("Batch not supported: {0}")]
    BatchNotSupported(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Config error: {0}")]
    Config(String),
}

pub type CloudEventsResult<T> = Result<T, CloudEventsError>;

impl CloudEventsError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotCloudEvent(_) => ErrorKind::NotCloudEvent,
            Self::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            Self::FormatSyntax { .. } => ErrorKind::FormatSyntax,
            Self::SpecVersion(_) => ErrorKind::SpecVersion,
            Self::Attribute(_) => ErrorKind::Attribute,
            Self::BatchNotSupported(_) => ErrorKind::BatchNotSupported,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::Config(_) => ErrorKind::Config,
        }
    }

    pub fn format_syntax<S, E>(message: S, source: E) -> Self
    where
        S: Into<String>,
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::FormatSyntax {
            message: message.into(),
            source: Box::new(source),
        }
    }

    pub fn attribute<S: Into<String>>(message: S) -> Self {
        Self::Attribute(message.into())
    }

    pub fn spec_version<S: Into<String>>(message: S) -> Self {
        Self::SpecVersion(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_kind_matches_variant() {
        let error = CloudEventsError::attribute("The id field is required");
        assert_eq!(error.kind(), ErrorKind::Attribute);
        assert_eq!(error.kind().to_string(), "Attribute");
        assert_eq!(
            error.to_string(),
            "Attribute error: The id field is required"
        );
    }

    #[test]
    fn test_format_syntax_keeps_cause() {
        let cause = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let error = CloudEventsError::format_syntax("Failed to parse JSON", cause);
        assert_eq!(error.kind(), ErrorKind::FormatSyntax);
        assert!(error.source().is_some());
    }
}
