use std::fmt;

/// Connection parameter that must be set before anything can be transmitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingParameter {
    Port,
    Baudrate,
    ByteSize,
    Parity,
}

impl fmt::Display for MissingParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MissingParameter::Port => "port",
            MissingParameter::Baudrate => "baudrate",
            MissingParameter::ByteSize => "bytesize",
            MissingParameter::Parity => "parity",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error("missing setting: {0} is not set")]
    MissingValue(MissingParameter),

    #[error("type mismatch on {field}: {reason}")]
    TypeMismatch { field: String, reason: String },

    #[error("unknown axis: {0}")]
    UnknownAxis(String),

    #[error("unknown command protocol: {0}")]
    UnknownProtocol(String),

    #[error("unknown {table} option: {key}")]
    UnknownOption { table: &'static str, key: String },

    #[error("command is not ASCII: {0:?}")]
    NonAscii(String),

    #[error("command queue is closed")]
    QueueClosed,

    #[error("link error: {0}")]
    Link(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid CSV: {0}")]
    Csv(#[from] csv::Error),
}

impl StageError {
    pub fn type_mismatch(field: impl Into<String>, reason: impl Into<String>) -> Self {
        StageError::TypeMismatch {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn is_missing_value(&self) -> bool {
        matches!(self, StageError::MissingValue(_))
    }
}

pub type Result<T, E = StageError> = std::result::Result<T, E>;
