pub mod c_series;
pub mod frame;

use std::sync::Arc;

use crate::{axis::AxisMap, error::StageError};

pub use c_series::CSeries;
pub use frame::CommandFrame;

/// Name of the dialect used when no controller selects one.
pub const DEFAULT_PROTOCOL: &str = c_series::NAME;

/// A controller command language.
///
/// Implementations only build frames; they never talk to the link and never
/// validate that numbers fit the controller's range.
pub trait CommandProtocol: Send + Sync {
    fn name(&self) -> &str;

    fn stop(&self) -> Vec<CommandFrame>;

    /// Relative move. Deltas are in steps, speeds in steps/s. Axes listed in
    /// `step_deltas` without a speed are sent with speed 0.
    fn move_axes(&self, step_deltas: &AxisMap<f64>, step_speeds: &AxisMap<f64>)
        -> Vec<CommandFrame>;

    fn go_home(&self, axis_count: usize) -> Vec<CommandFrame>;

    fn set_home(&self, axis_count: usize) -> Vec<CommandFrame>;

    /// One line per frame, terminators stripped.
    fn to_text(&self, frames: &[CommandFrame]) -> String;
}

/// Looks a dialect up by the name stored in the controller table.
pub fn protocol_by_name(name: &str) -> Result<Arc<dyn CommandProtocol>, StageError> {
    let normalized = name.trim().to_ascii_lowercase().replace(['_', ' '], "-");
    match normalized.as_str() {
        "c-series" | "cseries" | "" => Ok(Arc::new(CSeries::new())),
        _ => Err(StageError::UnknownProtocol(name.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_name() {
        assert_eq!(protocol_by_name("C-Series").unwrap().name(), "c-series");
        assert_eq!(protocol_by_name("c_series").unwrap().name(), "c-series");
        assert!(matches!(
            protocol_by_name("gcode"),
            Err(StageError::UnknownProtocol(_))
        ));
    }
}
