//! ASCII dialect of the C-series stepper controllers.
//!
//! Every frame starts with `@0` (device address 0) and ends with `"\n\r"`.
//! A move is always preceded by an axis selection frame whose code is a bit
//! mask of the driven axes.

use crate::axis::AxisMap;

use super::{CommandFrame, CommandProtocol};

pub const NAME: &str = "c-series";
pub const TERMINATOR: &[u8] = b"\n\r";
const TERMINATOR_STR: &str = "\n\r";

#[derive(Debug, Default, Clone, Copy)]
pub struct CSeries;

impl CSeries {
    pub fn new() -> Self {
        Self
    }

    /// Axis mask for the first `axis_count` axes; 0 for unsupported counts.
    pub fn axis_code(axis_count: usize) -> u8 {
        match axis_count {
            1 => 1,
            2 => 3,
            3 => 7,
            _ => 0,
        }
    }

    fn frame(body: &str) -> CommandFrame {
        CommandFrame::new(format!("{}{}", body, TERMINATOR_STR))
    }
}

/// Half-way values round away from zero.
fn to_steps(value: f64) -> i64 {
    value.round() as i64
}

impl CommandProtocol for CSeries {
    fn name(&self) -> &str {
        NAME
    }

    fn stop(&self) -> Vec<CommandFrame> {
        vec![Self::frame("@0d")]
    }

    fn move_axes(
        &self,
        step_deltas: &AxisMap<f64>,
        step_speeds: &AxisMap<f64>,
    ) -> Vec<CommandFrame> {
        let select = Self::frame(&format!("@0{}", Self::axis_code(step_deltas.len())));

        let fields: Vec<String> = step_deltas
            .iter()
            .map(|(axis, delta)| {
                let speed = step_speeds.get(axis).copied().unwrap_or(0.0);
                format!("{},{}", to_steps(*delta), to_steps(speed))
            })
            .collect();
        let motion = Self::frame(&format!("@0A {}", fields.join(",")));

        vec![select, motion]
    }

    fn go_home(&self, axis_count: usize) -> Vec<CommandFrame> {
        vec![Self::frame(&format!("@0R{}", Self::axis_code(axis_count)))]
    }

    fn set_home(&self, axis_count: usize) -> Vec<CommandFrame> {
        vec![Self::frame(&format!("@0n{}", Self::axis_code(axis_count)))]
    }

    fn to_text(&self, frames: &[CommandFrame]) -> String {
        frames
            .iter()
            .map(|frame| frame.text_without(TERMINATOR))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axis::AxisName;

    fn map(values: &[(AxisName, f64)]) -> AxisMap<f64> {
        values.iter().copied().collect()
    }

    #[test]
    fn test_axis_codes() {
        assert_eq!(CSeries::axis_code(1), 1);
        assert_eq!(CSeries::axis_code(2), 3);
        assert_eq!(CSeries::axis_code(3), 7);
        assert_eq!(CSeries::axis_code(0), 0);
        assert_eq!(CSeries::axis_code(4), 0);
    }

    #[test]
    fn test_single_axis_move() {
        let frames = CSeries::new().move_axes(
            &map(&[(AxisName::X, 300.0)]),
            &map(&[(AxisName::X, 500.0)]),
        );
        assert_eq!(
            frames,
            vec![
                CommandFrame::new("@01\n\r"),
                CommandFrame::new("@0A 300,500\n\r")
            ]
        );
    }

    #[test]
    fn test_three_axis_move_in_axis_order_and_rounded() {
        let frames = CSeries::new().move_axes(
            &map(&[(AxisName::Z, 1.5), (AxisName::X, -2.5), (AxisName::Y, 0.4)]),
            &map(&[(AxisName::X, 99.6), (AxisName::Y, 10.0)]),
        );
        assert_eq!(frames[0].as_bytes(), b"@07\n\r");
        assert_eq!(frames[1].as_bytes(), b"@0A -3,100,0,10,2,0\n\r");
    }

    #[test]
    fn test_to_text_strips_terminators() {
        let cs = CSeries::new();
        let frames = cs.move_axes(
            &map(&[(AxisName::X, 10.0), (AxisName::Y, -20.0)]),
            &map(&[(AxisName::X, 5.0), (AxisName::Y, 6.0)]),
        );
        let text = cs.to_text(&frames);
        assert_eq!(text, "@03\n@0A 10,5,-20,6");
        assert!(!text.ends_with('\n'));
        assert_eq!(cs.to_text(&cs.stop()), "@0d");
    }

    #[test]
    fn test_home_frames() {
        let cs = CSeries::new();
        assert_eq!(cs.go_home(2), vec![CommandFrame::new("@0R3\n\r")]);
        assert_eq!(cs.set_home(3), vec![CommandFrame::new("@0n7\n\r")]);
    }
}
