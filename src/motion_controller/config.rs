use std::time::Duration;

use crate::{axis::AxisName, queue::config::QueueConfig};

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Driven axes, in no particular order.
    pub axes: Vec<AxisName>,
    pub queue: QueueConfig,
    /// Added to the computed travel time before the frames go out.
    pub settle_bonus: Duration,
    /// mm/s used by `go_to_zero` for an axis without speed limits.
    pub zero_fallback_speed: f64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            axes: vec![AxisName::X, AxisName::Y],
            queue: QueueConfig::default(),
            settle_bonus: Duration::from_secs(1),
            zero_fallback_speed: 5.0,
        }
    }
}
