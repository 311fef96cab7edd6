//! mm-level motion commands on top of a [`CommandQueue`].
//!
//! Moves are converted to steps, framed, and submitted to the queue; the
//! calls return as soon as the task is submitted. A queued move first waits
//! for the travel time its own frames imply, then transmits, then updates the
//! tracked position. `stop`, `go_home` and `set_home` go straight to the link
//! and race with whatever the worker is doing.

pub mod config;
pub mod request;

use std::{sync::Arc, time::Duration};

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::{
    axis::{position::AxisPosition, AxisMap, AxisName},
    dialect::{protocol_by_name, CommandFrame, CommandProtocol},
    error::StageError,
    link::{Ack, LinkTransport},
    queue::{CommandQueue, QueueStatus, QueuedTask, TaskCallbacks},
    settings::AxisSettings,
};
pub use config::ControllerConfig;
pub use request::{MoveReceipt, MoveRequest};

/// Position update run after a move was transmitted.
#[derive(Debug, Clone)]
enum Completion {
    /// Adds mm deltas.
    Accumulate(AxisMap<f64>),
    /// Sets the requested targets as they were given.
    Assign(AxisMap<f64>),
    Reset(Vec<AxisName>),
}

impl Completion {
    fn apply(self, position: &mut AxisPosition) {
        match self {
            Completion::Accumulate(deltas) => {
                for (axis, delta) in deltas {
                    position.shift(axis, delta);
                }
            }
            Completion::Assign(targets) => {
                for (axis, target) in targets {
                    position.set(axis, target);
                }
            }
            Completion::Reset(axes) => {
                for axis in axes {
                    position.set(axis, 0.0);
                }
            }
        }
    }
}

struct PlannedMove {
    frames: Vec<CommandFrame>,
    text: String,
    duration: Duration,
    /// Axes whose step speed is above zero.
    moving: Vec<AxisName>,
}

impl PlannedMove {
    fn only_moving(&self, values: &AxisMap<f64>) -> AxisMap<f64> {
        values
            .iter()
            .filter(|(axis, _)| self.moving.contains(axis))
            .map(|(axis, value)| (*axis, *value))
            .collect()
    }
}

pub struct MotionController {
    config: ControllerConfig,
    settings: Arc<RwLock<AxisSettings>>,
    link: Arc<dyn LinkTransport>,
    position: Arc<RwLock<AxisPosition>>,
    queue: CommandQueue,
}

impl MotionController {
    /// `settings` should have been loaded for `config.axes`. Starts the queue
    /// worker, so this must run inside a tokio runtime.
    pub fn new(
        config: ControllerConfig,
        settings: AxisSettings,
        link: Arc<dyn LinkTransport>,
    ) -> Self {
        let position = AxisPosition::new(&config.axes);
        let queue = CommandQueue::new(config.queue.clone());
        info!("Motion controller driving axes {:?}", config.axes);

        Self {
            config,
            settings: Arc::new(RwLock::new(settings)),
            link,
            position: Arc::new(RwLock::new(position)),
            queue,
        }
    }

    /// Moves each axis of `request` by its value in mm.
    ///
    /// Speeds are clamped into the axis limits. Only axes moving at a step
    /// speed above zero have their tracked position changed once the task
    /// completes.
    pub async fn incremental_move(&self, request: MoveRequest) -> Result<MoveReceipt, StageError> {
        self.check_request(&request)?;
        let MoveRequest {
            values: deltas,
            speeds,
            callbacks,
        } = request;

        let settings = self.settings.read().await;
        let speeds = Self::requested_speeds(&settings, &deltas, &speeds);
        let plan = self.plan_move(&settings, &deltas, &speeds, true)?;
        drop(settings);

        let completion = Completion::Accumulate(plan.only_moving(&deltas));
        Ok(self.submit_move("incremental move", plan, completion, callbacks))
    }

    /// Moves each axis of `request` to its value in mm.
    ///
    /// On completion the tracked position holds the requested targets, not
    /// the previous position plus the rounded delta.
    pub async fn absolute_move(&self, request: MoveRequest) -> Result<MoveReceipt, StageError> {
        self.check_request(&request)?;
        let MoveRequest {
            values: targets,
            speeds,
            callbacks,
        } = request;

        let settings = self.settings.read().await;
        let deltas: AxisMap<f64> = {
            let position = self.position.read().await;
            targets
                .iter()
                .map(|(axis, target)| (*axis, target - position.get(*axis).unwrap_or(0.0)))
                .collect()
        };
        let speeds = Self::requested_speeds(&settings, &deltas, &speeds);
        let plan = self.plan_move(&settings, &deltas, &speeds, true)?;
        drop(settings);

        let completion = Completion::Assign(plan.only_moving(&targets));
        Ok(self.submit_move("absolute move", plan, completion, callbacks))
    }

    /// Drives every axis back to tracked zero.
    ///
    /// The speed of an axis is derived from its limits, not clamped, and the
    /// position is reset only when the task completes.
    pub async fn go_to_zero(&self, callbacks: TaskCallbacks) -> Result<MoveReceipt, StageError> {
        let settings = self.settings.read().await;
        let deltas: AxisMap<f64> = self
            .position
            .read()
            .await
            .as_map()
            .iter()
            .map(|(axis, value)| (*axis, -value))
            .collect();
        let speeds: AxisMap<f64> = deltas
            .keys()
            .map(|axis| {
                let speed = settings
                    .speed_limit(*axis)
                    .symmetric_speed(self.config.zero_fallback_speed);
                (*axis, speed)
            })
            .collect();
        let plan = self.plan_move(&settings, &deltas, &speeds, false)?;
        drop(settings);

        let completion = Completion::Reset(plan.moving.clone());
        Ok(self.submit_move("go to zero", plan, completion, callbacks))
    }

    /// Sends the stop frame right away.
    ///
    /// Tasks already queued are left alone and will still run.
    pub async fn stop(&self) -> Result<String, StageError> {
        info!("Stop requested");
        self.transmit_direct(|protocol, _| protocol.stop()).await
    }

    pub async fn go_home(&self) -> Result<String, StageError> {
        info!("Go home requested");
        self.transmit_direct(|protocol, axes| protocol.go_home(axes)).await
    }

    pub async fn set_home(&self) -> Result<String, StageError> {
        info!("Set home requested");
        self.transmit_direct(|protocol, axes| protocol.set_home(axes)).await
    }

    /// Declares the current place to be zero on every axis. Nothing is sent.
    ///
    /// This writes the tracked position immediately; a move task that is
    /// already running will still apply its own update afterwards.
    pub async fn zero_here(&self) {
        self.position.write().await.reset();
        info!("Tracked position set to zero");
    }

    /// Queues literal commands. Each string is sent as is, so it must carry
    /// its own terminator.
    pub fn raw_action(
        &self,
        commands: &[String],
        callbacks: TaskCallbacks,
    ) -> Result<MoveReceipt, StageError> {
        let frames = commands
            .iter()
            .map(|command| CommandFrame::ascii(command.as_str()))
            .collect::<Result<Vec<_>, _>>()?;
        let text = commands.join("\n");

        let link = self.link.clone();
        let settings = self.settings.clone();
        let task = QueuedTask::new("raw action")
            .step(move || transmit(link, settings, frames))
            .with_callbacks(callbacks);

        Ok(MoveReceipt {
            text,
            submission: self.queue.submit(task),
        })
    }

    pub async fn position(&self) -> AxisPosition {
        self.position.read().await.clone()
    }

    pub fn settings(&self) -> &Arc<RwLock<AxisSettings>> {
        &self.settings
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn queue_status(&self) -> QueueStatus {
        self.queue.status()
    }

    /// Stops the worker after its current task.
    pub async fn shutdown(&self) {
        self.queue.shutdown().await;
    }

    fn check_request(&self, request: &MoveRequest) -> Result<(), StageError> {
        for (axis, value) in request.values.iter().chain(request.speeds.iter()) {
            if !self.config.axes.contains(axis) {
                return Err(StageError::UnknownAxis(axis.to_string()));
            }
            if !value.is_finite() {
                return Err(StageError::type_mismatch(
                    axis.as_str(),
                    format!("expected a finite number, got {}", value),
                ));
            }
        }
        Ok(())
    }

    /// Speed for every axis in `values`: requested, else the axis default,
    /// else 0.
    fn requested_speeds(
        settings: &AxisSettings,
        values: &AxisMap<f64>,
        speeds: &AxisMap<f64>,
    ) -> AxisMap<f64> {
        values
            .keys()
            .map(|axis| {
                let speed = speeds
                    .get(axis)
                    .copied()
                    .or_else(|| settings.default_speed(*axis))
                    .unwrap_or(0.0);
                (*axis, speed)
            })
            .collect()
    }

    fn plan_move(
        &self,
        settings: &AxisSettings,
        mm_deltas: &AxisMap<f64>,
        mm_speeds: &AxisMap<f64>,
        clamp: bool,
    ) -> Result<PlannedMove, StageError> {
        let protocol = protocol_by_name(settings.selected_protocol())?;

        let mut step_deltas = AxisMap::new();
        let mut step_speeds = AxisMap::new();
        for (axis, delta) in mm_deltas {
            let scale = settings.step_scale(*axis);
            let speed = mm_speeds.get(axis).copied().unwrap_or(0.0);
            let speed = if clamp {
                settings.speed_limit(*axis).clamp(speed)
            } else {
                speed.max(0.0)
            };
            step_deltas.insert(*axis, delta * scale);
            step_speeds.insert(*axis, speed * scale);
        }

        let moving: Vec<AxisName> = step_speeds
            .iter()
            .filter(|(_, speed)| **speed > 0.0)
            .map(|(axis, _)| *axis)
            .collect();
        let travel = moving
            .iter()
            .map(|axis| step_deltas[axis].abs() / step_speeds[axis])
            .fold(0.0_f64, f64::max);
        let travel = Duration::try_from_secs_f64(travel).unwrap_or_else(|e| {
            warn!("Travel time of {} s is not representable ({}), not waiting for it", travel, e);
            Duration::ZERO
        });

        let frames = protocol.move_axes(&step_deltas, &step_speeds);
        let text = protocol.to_text(&frames);
        debug!(
            "Planned move: steps {:?} at {:?} steps/s, {:?} travel",
            step_deltas, step_speeds, travel
        );

        Ok(PlannedMove {
            frames,
            text,
            duration: travel + self.config.settle_bonus,
            moving,
        })
    }

    fn submit_move(
        &self,
        label: &str,
        plan: PlannedMove,
        completion: Completion,
        callbacks: TaskCallbacks,
    ) -> MoveReceipt {
        let PlannedMove {
            frames,
            text,
            duration,
            ..
        } = plan;

        let link = self.link.clone();
        let settings = self.settings.clone();
        let position = self.position.clone();
        let task = QueuedTask::new(label)
            .step(move || async move {
                debug!("Waiting {:?} for the previous motion to settle", duration);
                tokio::time::sleep(duration).await;
                Ok(())
            })
            .step(move || transmit(link, settings, frames))
            .step(move || async move {
                completion.apply(&mut *position.write().await);
                Ok(())
            })
            .with_callbacks(callbacks);

        MoveReceipt {
            text,
            submission: self.queue.submit(task),
        }
    }

    async fn transmit_direct<F>(&self, build: F) -> Result<String, StageError>
    where
        F: FnOnce(&dyn CommandProtocol, usize) -> Vec<CommandFrame>,
    {
        let protocol = {
            let settings = self.settings.read().await;
            protocol_by_name(settings.selected_protocol())?
        };
        let frames = build(protocol.as_ref(), self.config.axes.len());
        let text = protocol.to_text(&frames);
        transmit(self.link.clone(), self.settings.clone(), frames).await?;
        Ok(text)
    }
}

/// Sends `frames` with the connection parameters current at call time.
async fn transmit(
    link: Arc<dyn LinkTransport>,
    settings: Arc<RwLock<AxisSettings>>,
    frames: Vec<CommandFrame>,
) -> Result<(), StageError> {
    let params = settings.read().await.connection().clone();
    match link.execute(&frames, &params, None).await? {
        Ack::Received => debug!("{} frame(s) acknowledged", frames.len()),
        Ack::Missing => warn!(
            "No acknowledgment for {} frame(s), carrying on as if received",
            frames.len()
        ),
    }
    Ok(())
}
