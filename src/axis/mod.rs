pub mod position;
pub mod speed_limit;

use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::StageError;

/// One independently driven linear axis of the stage.
///
/// The derived ordering is the wire order: every per-axis list the controller
/// sends is written X, then Y, then Z.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AxisName {
    X,
    Y,
    Z,
}

impl AxisName {
    pub const ALL: [AxisName; 3] = [AxisName::X, AxisName::Y, AxisName::Z];

    pub fn as_str(&self) -> &'static str {
        match self {
            AxisName::X => "X",
            AxisName::Y => "Y",
            AxisName::Z => "Z",
        }
    }
}

impl fmt::Display for AxisName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AxisName {
    type Err = StageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "X" | "x" => Ok(AxisName::X),
            "Y" | "y" => Ok(AxisName::Y),
            "Z" | "z" => Ok(AxisName::Z),
            other => Err(StageError::UnknownAxis(other.to_string())),
        }
    }
}

/// Per-axis values, iterated in wire order.
pub type AxisMap<T> = BTreeMap<AxisName, T>;

/// Parses a comma separated axis list such as `"X,Y"`.
pub fn parse_axis_list(list: &str) -> Result<Vec<AxisName>, StageError> {
    let mut axes: Vec<AxisName> = list
        .split(',')
        .filter(|part| !part.trim().is_empty())
        .map(str::parse)
        .collect::<Result<_, _>>()?;
    axes.sort();
    axes.dedup();
    Ok(axes)
}
