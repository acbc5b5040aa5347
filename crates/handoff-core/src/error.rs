//! Error types for Handoff

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("malformed event at record {position}: {reason}")]
    MalformedEvent { position: usize, reason: String },

    #[error("unknown field: {0}")]
    UnknownField(String),

    #[error("protocol error: {id} - {message}")]
    ProtocolError { id: String, message: String },

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("json error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("yaml error: {0}")]
    YamlError(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn malformed(position: usize, reason: impl Into<String>) -> Self {
        Self::MalformedEvent {
            position,
            reason: reason.into(),
        }
    }

    pub fn protocol_error(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ProtocolError {
            id: id.into(),
            message: message.into(),
        }
    }

    /// Ordinal position of the offending record, if this is an ingestion error.
    pub fn position(&self) -> Option<usize> {
        match self {
            Self::MalformedEvent { position, .. } => Some(*position),
            _ => None,
        }
    }
}
