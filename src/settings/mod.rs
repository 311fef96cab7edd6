//! Per-axis calibration, speed limits, link parameters and default speeds.
//!
//! [`AxisSettings`] is built once from a [`SettingsStore`] and afterwards only
//! changes through [`AxisSettings::apply`] (transient) or
//! [`AxisSettings::save`] (persisted, then re-applied).

pub mod describe;
pub mod document;
#[cfg(test)]
pub(crate) mod fixture;
pub mod patch;
pub mod store;

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::{
    axis::{speed_limit::SpeedLimit, AxisMap, AxisName},
    dialect::DEFAULT_PROTOCOL,
    error::StageError,
    link::ConnectionParams,
};
use describe::SettingsDescription;
use document::{
    calibration_key, default_speed_key, SettingsDocument, CALIBRATION_PREFIX, CONTROLLER_KEY,
    PORT_KEY,
};
pub use patch::SettingsPatch;
pub use store::{JsonSettingsStore, MemorySettingsStore, SettingsStore};

pub struct AxisSettings {
    axes: Vec<AxisName>,
    store: Arc<dyn SettingsStore>,
    document: SettingsDocument,
    connection: ConnectionParams,
    step_scales: AxisMap<f64>,
    speed_limits: AxisMap<SpeedLimit>,
    protocol: Option<String>,
    default_speeds: AxisMap<f64>,
}

impl AxisSettings {
    /// Reads the store and applies the persisted selection.
    pub fn load(store: Arc<dyn SettingsStore>, axes: &[AxisName]) -> Result<Self, StageError> {
        let document = store.load()?;
        let mut settings = Self {
            axes: axes.to_vec(),
            store,
            document,
            connection: ConnectionParams::default(),
            step_scales: axes.iter().map(|axis| (*axis, 0.0)).collect(),
            speed_limits: axes.iter().map(|axis| (*axis, SpeedLimit::unbounded())).collect(),
            protocol: None,
            default_speeds: AxisMap::new(),
        };

        let patch = settings.patch_from_selection(
            true,
            Some(settings.axes.clone()),
            true,
        )?;
        settings.apply(patch)?;
        settings.apply_default_speeds();
        Ok(settings)
    }

    /// Writes every field present in `patch`; absent fields keep their value.
    ///
    /// Entries for axes this instance does not drive are ignored.
    pub fn apply(&mut self, patch: SettingsPatch) -> Result<(), StageError> {
        patch.validate()?;

        if let Some(port) = patch.port {
            info!("Setting port to {:?}", port);
            self.connection.port = Some(port);
        }

        if let Some(scales) = patch.step_scales {
            for (axis, scale) in scales {
                match self.step_scales.get_mut(&axis) {
                    Some(slot) => {
                        info!("Setting step scale of axis {} to {}", axis, scale);
                        *slot = scale;
                    }
                    None => debug!("Ignoring step scale for undriven axis {}", axis),
                }
            }
        }

        if let Some(limits) = patch.speed_limits {
            for (axis, limit) in limits {
                match self.speed_limits.get_mut(&axis) {
                    Some(slot) => {
                        info!(
                            "Setting speed limits of axis {} to max={:?} min={:?}",
                            axis, limit.max, limit.min
                        );
                        *slot = limit;
                    }
                    None => debug!("Ignoring speed limits for undriven axis {}", axis),
                }
            }
        }

        if let Some(baudrate) = patch.baudrate {
            info!("Setting baudrate to {}", baudrate);
            self.connection.baudrate = Some(baudrate);
        }

        if let Some(protocol) = patch.protocol {
            info!("Setting command protocol to {:?}", protocol);
            self.protocol = Some(protocol);
        }

        Ok(())
    }

    /// Persists the given selection fields, reloads the store and applies the
    /// concrete values of what changed.
    ///
    /// `calibrations` maps an axis to an option name; `None` or an empty name
    /// detaches the axis (step scale 0, no limits). Axes absent from the map
    /// keep their persisted choice.
    pub fn save(
        &mut self,
        port: Option<String>,
        calibrations: Option<AxisMap<Option<String>>>,
        controller: Option<String>,
    ) -> Result<(), StageError> {
        let mut changes = Map::new();

        if let Some(port) = &port {
            changes.insert(PORT_KEY.to_string(), Value::String(port.clone()));
        }
        if let Some(calibrations) = &calibrations {
            for (axis, option) in calibrations {
                let option = option.as_deref().filter(|name| !name.is_empty());
                if let Some(name) = option {
                    if !self.document.calibrations.contains_key(name) {
                        return Err(StageError::UnknownOption {
                            table: "calibration",
                            key: name.to_string(),
                        });
                    }
                }
                changes.insert(
                    calibration_key(*axis),
                    option.map_or(Value::Null, |name| Value::String(name.to_string())),
                );
            }
        }
        if let Some(controller) = &controller {
            if !controller.is_empty() && !self.document.controllers.contains_key(controller) {
                return Err(StageError::UnknownOption {
                    table: "controller",
                    key: controller.clone(),
                });
            }
            changes.insert(CONTROLLER_KEY.to_string(), Value::String(controller.clone()));
        }

        if changes.is_empty() {
            return Ok(());
        }

        self.store.update_selection(&changes)?;
        self.document = self.store.load()?;

        let axes = calibrations.map(|map| map.keys().copied().collect());
        let patch = self.patch_from_selection(port.is_some(), axes, controller.is_some())?;
        self.apply(patch)
    }

    /// Saves the recognized keys of a named preset as the current selection.
    pub fn apply_preset(&mut self, name: &str) -> Result<(), StageError> {
        let preset = self
            .document
            .presets
            .get(name)
            .cloned()
            .ok_or_else(|| StageError::UnknownOption {
                table: "preset",
                key: name.to_string(),
            })?;

        let text = |key: &str, value: &Value| -> Result<Option<String>, StageError> {
            match value {
                Value::Null => Ok(None),
                Value::String(s) => Ok(Some(s.clone())),
                other => Err(StageError::type_mismatch(
                    format!("preset {}.{}", name, key),
                    format!("expected a string, got {}", other),
                )),
            }
        };

        let mut port = None;
        let mut controller = None;
        let mut calibrations = AxisMap::new();
        for (key, value) in &preset {
            if key == PORT_KEY {
                port = text(key, value)?;
            } else if key == CONTROLLER_KEY {
                controller = text(key, value)?;
            } else if let Some(axis) = key.strip_prefix(CALIBRATION_PREFIX) {
                if let Ok(axis) = axis.parse::<AxisName>() {
                    if self.axes.contains(&axis) {
                        calibrations.insert(axis, text(key, value)?);
                    }
                }
            }
        }

        info!("Applying preset {:?}", name);
        let calibrations = (!calibrations.is_empty()).then_some(calibrations);
        self.save(port, calibrations, controller)
    }

    /// Re-reads the store and re-applies the whole persisted selection.
    pub fn reload(&mut self) -> Result<(), StageError> {
        self.document = self.store.load()?;
        let patch = self.patch_from_selection(true, Some(self.axes.clone()), true)?;
        self.apply(patch)?;
        self.apply_default_speeds();
        Ok(())
    }

    pub fn describe(&self) -> SettingsDescription {
        describe::describe(self)
    }

    pub fn axes(&self) -> &[AxisName] {
        &self.axes
    }

    /// Steps per millimeter; 0 for an axis without calibration.
    pub fn step_scale(&self, axis: AxisName) -> f64 {
        self.step_scales.get(&axis).copied().unwrap_or(0.0)
    }

    pub fn speed_limit(&self, axis: AxisName) -> SpeedLimit {
        self.speed_limits.get(&axis).copied().unwrap_or_default()
    }

    pub fn default_speed(&self, axis: AxisName) -> Option<f64> {
        self.default_speeds.get(&axis).copied()
    }

    pub fn selected_protocol(&self) -> &str {
        self.protocol
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_PROTOCOL)
    }

    pub fn connection(&self) -> &ConnectionParams {
        &self.connection
    }

    pub fn document(&self) -> &SettingsDocument {
        &self.document
    }

    fn apply_default_speeds(&mut self) {
        let defaults: AxisMap<f64> = self
            .axes
            .iter()
            .filter_map(|axis| {
                self.document
                    .default_speeds
                    .get(&default_speed_key(*axis))
                    .map(|speed| (*axis, *speed))
            })
            .collect();
        debug!("Default speeds: {:?}", defaults);
        self.default_speeds = defaults;
    }

    /// Turns the selected option names into concrete values.
    fn patch_from_selection(
        &self,
        with_port: bool,
        axes: Option<Vec<AxisName>>,
        with_controller: bool,
    ) -> Result<SettingsPatch, StageError> {
        let selection = &self.document.selection;
        let mut patch = SettingsPatch::new();

        if with_port {
            patch.port = selection.port.clone();
        }

        if let Some(axes) = axes {
            let mut scales = AxisMap::new();
            let mut limits = AxisMap::new();
            for axis in axes {
                match selection.calibration(axis) {
                    Some(name) => {
                        let option = self.document.calibrations.get(name).ok_or_else(|| {
                            StageError::UnknownOption {
                                table: "calibration",
                                key: name.to_string(),
                            }
                        })?;
                        scales.insert(axis, option.step_scale);
                        limits.insert(axis, option.speed_limit());
                    }
                    None => {
                        scales.insert(axis, 0.0);
                        limits.insert(axis, SpeedLimit::unbounded());
                    }
                }
            }
            patch.step_scales = Some(scales);
            patch.speed_limits = Some(limits);
        }

        if with_controller {
            match selection.controller.as_deref().filter(|name| !name.is_empty()) {
                Some(name) => {
                    let option = self.document.controllers.get(name).ok_or_else(|| {
                        StageError::UnknownOption {
                            table: "controller",
                            key: name.to_string(),
                        }
                    })?;
                    patch.baudrate = Some(option.baudrate);
                    patch.protocol = Some(
                        option
                            .protocol
                            .clone()
                            .unwrap_or_else(|| DEFAULT_PROTOCOL.to_string()),
                    );
                }
                None => {
                    patch.baudrate = Some(0);
                    patch.protocol = Some(DEFAULT_PROTOCOL.to_string());
                }
            }
        }

        Ok(patch)
    }
}
