use std::fmt;

use serde::Serialize;

use crate::{
    axis::{AxisMap, AxisName},
    queue::{Submission, TaskCallbacks},
};

/// Per-axis values of a move: deltas for an incremental move, targets for an
/// absolute one. Both in mm, speeds in mm/s.
#[derive(Default)]
pub struct MoveRequest {
    pub(super) values: AxisMap<f64>,
    pub(super) speeds: AxisMap<f64>,
    pub(super) callbacks: TaskCallbacks,
}

impl MoveRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_maps(values: AxisMap<f64>, speeds: AxisMap<f64>) -> Self {
        Self {
            values,
            speeds,
            callbacks: TaskCallbacks::new(),
        }
    }

    pub fn axis(mut self, axis: AxisName, value: f64) -> Self {
        self.values.insert(axis, value);
        self
    }

    /// An axis without a speed moves at its default speed, or not at all.
    pub fn speed(mut self, axis: AxisName, speed: f64) -> Self {
        self.speeds.insert(axis, speed);
        self
    }

    pub fn with_callbacks(mut self, callbacks: TaskCallbacks) -> Self {
        self.callbacks = callbacks;
        self
    }
}

impl fmt::Debug for MoveRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MoveRequest")
            .field("values", &self.values)
            .field("speeds", &self.speeds)
            .finish_non_exhaustive()
    }
}

/// What was asked of the controller.
///
/// The text describes the frames of the request, not a completed move: the
/// task may still be waiting, may fail later, or may have been rejected.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MoveReceipt {
    pub text: String,
    pub submission: Submission,
}

impl MoveReceipt {
    pub fn is_accepted(&self) -> bool {
        self.submission.is_accepted()
    }
}

impl fmt::Display for MoveReceipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
