use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::axis::{speed_limit::SpeedLimit, AxisName};

pub const PORT_KEY: &str = "port";
pub const CONTROLLER_KEY: &str = "controller";
pub const CALIBRATION_PREFIX: &str = "calibration";
pub const SPEED_PREFIX: &str = "speed";

/// Selection record key holding the calibration choice of `axis`.
pub fn calibration_key(axis: AxisName) -> String {
    format!("{}{}", CALIBRATION_PREFIX, axis)
}

pub fn default_speed_key(axis: AxisName) -> String {
    format!("{}{}", SPEED_PREFIX, axis)
}

/// Calibration of one mechanical stage model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationOption {
    #[serde(rename = "stepscale")]
    pub step_scale: f64,
    #[serde(rename = "vmax", default, skip_serializing_if = "Option::is_none")]
    pub max_speed: Option<f64>,
    #[serde(rename = "vmin", default, skip_serializing_if = "Option::is_none")]
    pub min_speed: Option<f64>,
}

impl CalibrationOption {
    pub fn speed_limit(&self) -> SpeedLimit {
        SpeedLimit::new(self.max_speed, self.min_speed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerOption {
    pub baudrate: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
}

/// The persisted "current choice" record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    #[serde(default)]
    pub port: Option<String>,
    #[serde(default)]
    pub controller: Option<String>,
    /// Calibration choices keyed by [`calibration_key`], plus whatever
    /// other keys the record carries.
    #[serde(flatten)]
    pub entries: BTreeMap<String, Value>,
}

impl Selection {
    /// Calibration option chosen for `axis`; an empty name counts as none.
    pub fn calibration(&self, axis: AxisName) -> Option<&str> {
        self.entries
            .get(&calibration_key(axis))
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
    }

    pub fn set_calibration(&mut self, axis: AxisName, name: Option<&str>) {
        let value = name.map_or(Value::Null, |name| Value::String(name.to_string()));
        self.entries.insert(calibration_key(axis), value);
    }
}

/// Everything the configuration source provides.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsDocument {
    pub calibrations: BTreeMap<String, CalibrationOption>,
    pub controllers: BTreeMap<String, ControllerOption>,
    pub presets: BTreeMap<String, Map<String, Value>>,
    pub selection: Selection,
    /// Keyed by [`default_speed_key`].
    pub default_speeds: BTreeMap<String, f64>,
    pub ports: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selection_reads_flattened_calibrations() {
        let selection: Selection = serde_json::from_str(
            r#"{"port": "COM1", "controller": "C9600", "calibrationX": "Stage 100", "calibrationY": ""}"#,
        )
        .unwrap();

        assert_eq!(selection.port.as_deref(), Some("COM1"));
        assert_eq!(selection.calibration(AxisName::X), Some("Stage 100"));
        assert_eq!(selection.calibration(AxisName::Y), None);
        assert_eq!(selection.calibration(AxisName::Z), None);
    }

    #[test]
    fn test_selection_tolerates_foreign_keys() {
        let selection: Selection = serde_json::from_str(
            r#"{"port": "COM1", "calibrationX": "Stage 100", "channel": 3, "mute": true}"#,
        )
        .unwrap();

        assert_eq!(selection.calibration(AxisName::X), Some("Stage 100"));
        assert_eq!(selection.entries["channel"], 3);
    }

    #[test]
    fn test_calibration_option_uses_table_names() {
        let option: CalibrationOption =
            serde_json::from_str(r#"{"stepscale": 400, "vmax": 20.5}"#).unwrap();
        assert_eq!(option.step_scale, 400.0);
        assert_eq!(option.speed_limit(), SpeedLimit::new(Some(20.5), None));
    }
}
