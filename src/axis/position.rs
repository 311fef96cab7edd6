use serde::Serialize;

use super::{AxisMap, AxisName};

/// Believed position of the stage in millimeters.
///
/// There is no feedback from the controller: the map only changes when a
/// motion task reports that it sent a move, or when the caller declares the
/// current place to be zero.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AxisPosition {
    values: AxisMap<f64>,
}

impl AxisPosition {
    pub fn new(axes: &[AxisName]) -> Self {
        Self {
            values: axes.iter().map(|axis| (*axis, 0.0)).collect(),
        }
    }

    pub fn get(&self, axis: AxisName) -> Option<f64> {
        self.values.get(&axis).copied()
    }

    pub fn axes(&self) -> impl Iterator<Item = AxisName> + '_ {
        self.values.keys().copied()
    }

    pub fn contains(&self, axis: AxisName) -> bool {
        self.values.contains_key(&axis)
    }

    pub fn set(&mut self, axis: AxisName, value: f64) {
        if let Some(slot) = self.values.get_mut(&axis) {
            *slot = value;
        }
    }

    pub fn shift(&mut self, axis: AxisName, delta: f64) {
        if let Some(slot) = self.values.get_mut(&axis) {
            *slot += delta;
        }
    }

    pub fn reset(&mut self) {
        self.values.values_mut().for_each(|value| *value = 0.0);
    }

    pub fn as_map(&self) -> &AxisMap<f64> {
        &self.values
    }
}
