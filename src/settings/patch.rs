use serde::Deserialize;
use serde_json::Value;

use crate::{
    axis::{speed_limit::SpeedLimit, AxisMap, AxisName},
    error::StageError,
};

/// Values to write into [`super::AxisSettings`].
///
/// A field left at `None` is not touched by `apply`. A field set to
/// `Some(0.0)` or `Some(String::new())` is applied as given.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SettingsPatch {
    pub port: Option<String>,
    pub step_scales: Option<AxisMap<f64>>,
    pub speed_limits: Option<AxisMap<SpeedLimit>>,
    pub baudrate: Option<u32>,
    pub protocol: Option<String>,
}

impl SettingsPatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a patch from loosely typed JSON, reporting any wrong type.
    pub fn from_json(value: Value) -> Result<Self, StageError> {
        serde_json::from_value(value).map_err(|e| StageError::type_mismatch("settings", e.to_string()))
    }

    pub fn with_port(mut self, port: impl Into<String>) -> Self {
        self.port = Some(port.into());
        self
    }

    pub fn with_step_scale(mut self, axis: AxisName, scale: f64) -> Self {
        self.step_scales.get_or_insert_with(AxisMap::new).insert(axis, scale);
        self
    }

    pub fn with_speed_limit(mut self, axis: AxisName, limit: SpeedLimit) -> Self {
        self.speed_limits.get_or_insert_with(AxisMap::new).insert(axis, limit);
        self
    }

    pub fn with_baudrate(mut self, baudrate: u32) -> Self {
        self.baudrate = Some(baudrate);
        self
    }

    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = Some(protocol.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Rejects numbers no stage can use. Runs before anything is applied.
    pub fn validate(&self) -> Result<(), StageError> {
        if let Some(scales) = &self.step_scales {
            for (axis, scale) in scales {
                if !scale.is_finite() || *scale < 0.0 {
                    return Err(StageError::type_mismatch(
                        format!("step_scales.{}", axis),
                        format!("expected a finite non-negative number, got {}", scale),
                    ));
                }
            }
        }

        if let Some(limits) = &self.speed_limits {
            for (axis, limit) in limits {
                for (bound, value) in [("max", limit.max), ("min", limit.min)] {
                    if let Some(value) = value {
                        if !value.is_finite() {
                            return Err(StageError::type_mismatch(
                                format!("speed_limits.{}.{}", axis, bound),
                                format!("expected a finite number, got {}", value),
                            ));
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_omitted_and_zero_are_distinct() {
        let patch = SettingsPatch::from_json(json!({"baudrate": 0, "port": ""})).unwrap();
        assert_eq!(patch.baudrate, Some(0));
        assert_eq!(patch.port.as_deref(), Some(""));
        assert!(patch.step_scales.is_none());
        assert!(patch.protocol.is_none());
    }

    #[test]
    fn test_wrong_json_type_is_type_mismatch() {
        let err = SettingsPatch::from_json(json!({"speed_limits": {"X": {"max": "fast"}}}))
            .unwrap_err();
        assert!(matches!(err, StageError::TypeMismatch { .. }));

        let err = SettingsPatch::from_json(json!({"baudrate": "9600"})).unwrap_err();
        assert!(matches!(err, StageError::TypeMismatch { .. }));
    }

    #[test]
    fn test_validate_rejects_non_finite_numbers() {
        let patch = SettingsPatch::new().with_step_scale(AxisName::X, f64::NAN);
        assert!(matches!(patch.validate(), Err(StageError::TypeMismatch { .. })));

        let patch = SettingsPatch::new()
            .with_speed_limit(AxisName::Y, SpeedLimit::new(Some(f64::INFINITY), None));
        assert!(matches!(patch.validate(), Err(StageError::TypeMismatch { .. })));

        assert!(SettingsPatch::new()
            .with_step_scale(AxisName::X, 0.0)
            .validate()
            .is_ok());
    }
}
