//! Move sets: a list of absolute targets visited one after the other, with a
//! caller hook run at every point.
//!
//! The CSV layout is a header naming the axes, one row naming the calibration
//! option of each axis (`default` or an empty cell keeps the current one),
//! then one row of target positions in mm per point.

use std::{future::Future, io, path::Path};

use anyhow::{anyhow, bail, Context};
use tracing::{debug, info};

use crate::{
    axis::{AxisMap, AxisName},
    error::StageError,
    motion_controller::{MotionController, MoveRequest},
    queue::{TaskCallbacks, TaskOutcome},
};

const KEEP_CALIBRATION: &str = "default";

#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    axes: Vec<AxisName>,
    /// Calibration to select per axis before moving; absent axes keep theirs.
    calibrations: AxisMap<String>,
    points: Vec<AxisMap<f64>>,
}

impl Route {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, StageError> {
        let file = std::fs::File::open(path.as_ref())?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: io::Read>(reader: R) -> Result<Self, StageError> {
        let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

        let axes = reader
            .headers()?
            .iter()
            .map(str::parse::<AxisName>)
            .collect::<Result<Vec<_>, _>>()?;

        let mut records = reader.records();
        let calibrations = match records.next() {
            Some(record) => axes
                .iter()
                .zip(record?.iter())
                .filter(|(_, name)| !name.is_empty() && !name.contains(KEEP_CALIBRATION))
                .map(|(axis, name)| (*axis, name.to_string()))
                .collect(),
            None => AxisMap::new(),
        };

        let mut points = Vec::new();
        for (row, record) in records.enumerate() {
            let record = record?;
            let point = axes
                .iter()
                .zip(record.iter())
                .map(|(axis, cell)| {
                    cell.parse::<f64>()
                        .map(|value| (*axis, value))
                        .map_err(|e| {
                            StageError::type_mismatch(
                                format!("point {} axis {}", row + 1, axis),
                                format!("{:?}: {}", cell, e),
                            )
                        })
                })
                .collect::<Result<AxisMap<f64>, _>>()?;
            points.push(point);
        }

        debug!(
            "Loaded route over {:?}: {} point(s), calibrations {:?}",
            axes,
            points.len(),
            calibrations
        );
        Ok(Self {
            axes,
            calibrations,
            points,
        })
    }

    pub fn axes(&self) -> &[AxisName] {
        &self.axes
    }

    pub fn calibrations(&self) -> &AxisMap<String> {
        &self.calibrations
    }

    pub fn points(&self) -> &[AxisMap<f64>] {
        &self.points
    }

    /// Persists the calibration row as the current selection.
    pub async fn apply_calibrations(&self, controller: &MotionController) -> Result<(), StageError> {
        if self.calibrations.is_empty() {
            return Ok(());
        }
        let calibrations = self
            .calibrations
            .iter()
            .map(|(axis, name)| (*axis, Some(name.clone())))
            .collect();
        controller
            .settings()
            .write()
            .await
            .save(None, Some(calibrations), None)
    }

    /// Selects the calibrations, then moves to every point in turn and awaits
    /// `hook` once the move to that point has completed.
    ///
    /// Returns the number of points visited. Any failed or rejected move ends
    /// the run.
    pub async fn run<F, Fut>(
        &self,
        controller: &MotionController,
        speeds: &AxisMap<f64>,
        mut hook: F,
    ) -> anyhow::Result<usize>
    where
        F: FnMut(usize, &AxisMap<f64>) -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        self.apply_calibrations(controller)
            .await
            .context("Failed to select route calibrations")?;

        for (index, point) in self.points.iter().enumerate() {
            let (callbacks, finished) = TaskCallbacks::reporting();
            let request =
                MoveRequest::from_maps(point.clone(), speeds.clone()).with_callbacks(callbacks);

            let receipt = controller.absolute_move(request).await?;
            if !receipt.is_accepted() {
                bail!("Move to point {} was rejected by the command queue", index + 1);
            }
            debug!("Moving to point {}: {}", index + 1, receipt);

            match finished.await {
                Ok(TaskOutcome::Completed) => {}
                Ok(TaskOutcome::MissingValue(message) | TaskOutcome::Failed(message)) => {
                    bail!("Move to point {} failed: {}", index + 1, message)
                }
                Err(_) => return Err(anyhow!("Command queue stopped before point {}", index + 1)),
            }

            hook(index, point)
                .await
                .with_context(|| format!("Hook failed at point {}", index + 1))?;
        }

        info!("Route finished after {} point(s)", self.points.len());
        Ok(self.points.len())
    }
}
