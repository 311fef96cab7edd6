use serde::{Deserialize, Serialize};

use crate::error::StageError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ServerResponse {
    Success {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        data: serde_json::Value,
    },
    Error {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
}

impl ServerResponse {
    pub fn success(id: Option<String>, data: serde_json::Value) -> Self {
        Self::Success { id, data }
    }

    pub fn error(id: Option<String>, message: String) -> Self {
        Self::Error {
            id,
            message,
            code: None,
        }
    }

    pub fn error_with_code(id: Option<String>, message: String, code: String) -> Self {
        Self::Error {
            id,
            message,
            code: Some(code),
        }
    }

    /// Error answer whose code lets a client tell configuration problems
    /// from bad requests.
    pub fn stage_error(id: Option<String>, err: &StageError) -> Self {
        Self::error_with_code(id, err.to_string(), error_code(err).to_string())
    }
}

pub fn error_code(err: &StageError) -> &'static str {
    match err {
        StageError::MissingValue(_) => "missing_value",
        StageError::TypeMismatch { .. } => "type_mismatch",
        StageError::UnknownAxis(_) => "unknown_axis",
        StageError::UnknownProtocol(_) => "unknown_protocol",
        StageError::UnknownOption { .. } => "unknown_option",
        StageError::NonAscii(_) => "non_ascii",
        StageError::QueueClosed => "queue_closed",
        StageError::Link(_) | StageError::Io(_) => "link",
        StageError::Json(_) | StageError::Csv(_) => "storage",
    }
}
