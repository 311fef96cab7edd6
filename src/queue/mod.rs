//! Single-worker FIFO that serializes every queued transmission.

pub mod config;
pub mod task;

use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tokio::{
    sync::mpsc::{self, error::TryRecvError},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use config::QueueConfig;
pub use task::{QueuedTask, TaskCallbacks, TaskId, TaskOutcome};

/// Answer to [`CommandQueue::submit`].
///
/// A rejected task is dropped on the spot and will never run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "task_id", rename_all = "snake_case")]
pub enum Submission {
    Accepted(TaskId),
    Rejected(TaskId),
}

impl Submission {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Submission::Accepted(_))
    }

    pub fn task_id(&self) -> TaskId {
        match self {
            Submission::Accepted(id) | Submission::Rejected(id) => *id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "pending", rename_all = "snake_case")]
pub enum QueueStatus {
    Idle,
    Running,
    RunningWithPending(usize),
    Pending(usize),
    Stopped,
}

#[derive(Debug, Default)]
struct QueueState {
    pending: usize,
    running: bool,
    closed: bool,
}

impl QueueState {
    fn lock(state: &Mutex<QueueState>) -> std::sync::MutexGuard<'_, QueueState> {
        state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct CommandQueue {
    config: QueueConfig,
    state: Arc<Mutex<QueueState>>,
    sender: mpsc::UnboundedSender<QueuedTask>,
    shutdown: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl CommandQueue {
    /// Starts the worker on the current tokio runtime.
    pub fn new(config: QueueConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel::<QueuedTask>();
        let state = Arc::new(Mutex::new(QueueState::default()));
        let shutdown = CancellationToken::new();

        let worker = tokio::spawn(Self::worker_loop(
            rx,
            state.clone(),
            shutdown.clone(),
            config.clone(),
        ));

        Self {
            config,
            state,
            sender: tx,
            shutdown,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Enqueues `task` if there is room; never waits.
    ///
    /// There is room when fewer than `capacity` tasks are pending, or when
    /// nothing is pending and the worker is idle.
    pub fn submit(&self, task: QueuedTask) -> Submission {
        let id = task.id();
        let mut state = QueueState::lock(&self.state);

        let has_room = state.pending < self.config.capacity
            || (state.pending == 0 && !state.running);
        if state.closed || !has_room {
            warn!(
                "Command queue full ({} pending, running: {}), task {} ({}) dropped",
                state.pending,
                state.running,
                id,
                task.label()
            );
            return Submission::Rejected(id);
        }

        let label = task.label().to_string();
        if self.sender.send(task).is_err() {
            state.closed = true;
            warn!("Command queue worker is gone, task {} ({}) dropped", id, label);
            return Submission::Rejected(id);
        }
        state.pending += 1;
        debug!("Task {} ({}) queued, {} pending", id, label, state.pending);
        Submission::Accepted(id)
    }

    pub fn status(&self) -> QueueStatus {
        let state = QueueState::lock(&self.state);
        match (state.closed, state.running, state.pending) {
            (true, false, _) => QueueStatus::Stopped,
            (_, false, 0) => QueueStatus::Idle,
            (_, true, 0) => QueueStatus::Running,
            (_, true, n) => QueueStatus::RunningWithPending(n),
            (_, false, n) => QueueStatus::Pending(n),
        }
    }

    /// Asks the worker to exit once the task it is running, if any, is done.
    pub fn stop(&self) {
        QueueState::lock(&self.state).closed = true;
        self.shutdown.cancel();
    }

    /// Like [`CommandQueue::stop`], then waits for the worker to exit.
    pub async fn shutdown(&self) {
        self.stop();
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("Command queue worker ended abnormally: {}", e);
            }
        }
    }

    async fn worker_loop(
        mut rx: mpsc::UnboundedReceiver<QueuedTask>,
        state: Arc<Mutex<QueueState>>,
        shutdown: CancellationToken,
        config: QueueConfig,
    ) {
        info!("Command queue worker started");

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(config.poll_interval) => {}
            }

            // Tasks are only picked up on a poll tick.
            let task = match rx.try_recv() {
                Ok(task) => task,
                Err(TryRecvError::Empty) => continue,
                Err(TryRecvError::Disconnected) => break,
            };

            {
                let mut state = QueueState::lock(&state);
                state.pending = state.pending.saturating_sub(1);
                state.running = true;
            }

            let id = task.id();
            let waited = chrono::Utc::now() - task.submitted_at();
            debug!(
                "Starting task {} ({}) after {} ms in queue",
                id,
                task.label(),
                waited.num_milliseconds()
            );
            let outcome = task.run().await;
            debug!("Task {} finished: {:?}", id, outcome);

            QueueState::lock(&state).running = false;
        }

        rx.close();
        let mut discarded = 0;
        while rx.try_recv().is_ok() {
            discarded += 1;
        }
        {
            let mut state = QueueState::lock(&state);
            state.closed = true;
            state.pending = 0;
        }
        if discarded > 0 {
            warn!("Command queue stopped, {} pending task(s) discarded", discarded);
        }
        info!("Command queue worker stopped");
    }
}

impl Drop for CommandQueue {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
