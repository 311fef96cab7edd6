use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::axis::AxisMap;

/// One request line from a control client.
///
/// Motion requests answer as soon as the task is submitted unless `wait` is
/// set, in which case the answer carries the task outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    IncrementalMove {
        values: AxisMap<f64>,
        #[serde(default)]
        speeds: AxisMap<f64>,
        #[serde(default)]
        wait: bool,
        #[serde(default)]
        id: Option<String>,
    },
    AbsoluteMove {
        values: AxisMap<f64>,
        #[serde(default)]
        speeds: AxisMap<f64>,
        #[serde(default)]
        wait: bool,
        #[serde(default)]
        id: Option<String>,
    },
    GoToZero {
        #[serde(default)]
        wait: bool,
        #[serde(default)]
        id: Option<String>,
    },
    Raw {
        commands: Vec<String>,
        #[serde(default)]
        wait: bool,
        #[serde(default)]
        id: Option<String>,
    },
    Stop {
        #[serde(default)]
        id: Option<String>,
    },
    ZeroHere {
        #[serde(default)]
        id: Option<String>,
    },
    GoHome {
        #[serde(default)]
        id: Option<String>,
    },
    SetHome {
        #[serde(default)]
        id: Option<String>,
    },
    GetPosition {
        #[serde(default)]
        id: Option<String>,
    },
    GetSettings {
        #[serde(default)]
        id: Option<String>,
    },
    /// Transient change; `settings` is checked field by field.
    ApplySettings {
        settings: Value,
        #[serde(default)]
        id: Option<String>,
    },
    SaveSettings {
        #[serde(default)]
        port: Option<String>,
        #[serde(default)]
        calibrations: Option<AxisMap<Option<String>>>,
        #[serde(default)]
        controller: Option<String>,
        #[serde(default)]
        id: Option<String>,
    },
    ApplyPreset {
        name: String,
        #[serde(default)]
        id: Option<String>,
    },
    QueueStatus {
        #[serde(default)]
        id: Option<String>,
    },
    Ping {
        #[serde(default)]
        id: Option<String>,
    },
}

impl ClientCommand {
    pub const TYPES: [&'static str; 15] = [
        "incremental_move",
        "absolute_move",
        "go_to_zero",
        "raw",
        "stop",
        "zero_here",
        "go_home",
        "set_home",
        "get_position",
        "get_settings",
        "apply_settings",
        "save_settings",
        "apply_preset",
        "queue_status",
        "ping",
    ];

    pub fn id(&self) -> Option<&String> {
        match self {
            ClientCommand::IncrementalMove { id, .. }
            | ClientCommand::AbsoluteMove { id, .. }
            | ClientCommand::GoToZero { id, .. }
            | ClientCommand::Raw { id, .. }
            | ClientCommand::Stop { id }
            | ClientCommand::ZeroHere { id }
            | ClientCommand::GoHome { id }
            | ClientCommand::SetHome { id }
            | ClientCommand::GetPosition { id }
            | ClientCommand::GetSettings { id }
            | ClientCommand::ApplySettings { id, .. }
            | ClientCommand::SaveSettings { id, .. }
            | ClientCommand::ApplyPreset { id, .. }
            | ClientCommand::QueueStatus { id }
            | ClientCommand::Ping { id } => id.as_ref(),
        }
    }
}
