use std::{
    future::Future,
    sync::{Arc, Mutex, PoisonError},
};

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt};
use serde::Serialize;
use tokio::sync::oneshot;
use tracing::{debug, error};
use uuid::Uuid;

use crate::error::StageError;

pub type TaskId = Uuid;

pub type Step = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), StageError>> + Send>;
pub type Callback = Box<dyn FnOnce() + Send>;
pub type ErrorCallback = Box<dyn FnOnce(&StageError) + Send>;

/// Hooks run by the worker once a task's steps are over.
///
/// `finally` callbacks run after every outcome, so they are the place to
/// re-enable whatever the caller disabled while the move was pending.
#[derive(Default)]
pub struct TaskCallbacks {
    success: Vec<Callback>,
    missing_value: Vec<ErrorCallback>,
    failure: Vec<ErrorCallback>,
    finally: Vec<Callback>,
}

impl TaskCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_success(mut self, callback: impl FnOnce() + Send + 'static) -> Self {
        self.success.push(Box::new(callback));
        self
    }

    pub fn on_missing_value(mut self, callback: impl FnOnce(&StageError) + Send + 'static) -> Self {
        self.missing_value.push(Box::new(callback));
        self
    }

    /// Runs for any error other than a missing value.
    pub fn on_failure(mut self, callback: impl FnOnce(&StageError) + Send + 'static) -> Self {
        self.failure.push(Box::new(callback));
        self
    }

    pub fn on_finally(mut self, callback: impl FnOnce() + Send + 'static) -> Self {
        self.finally.push(Box::new(callback));
        self
    }

    /// Callbacks that report how the task ended. The receiver errors when the
    /// task is dropped without running.
    pub fn reporting() -> (Self, oneshot::Receiver<TaskOutcome>) {
        let (tx, rx) = oneshot::channel();
        let tx = Arc::new(Mutex::new(Some(tx)));
        let send = |tx: &Arc<Mutex<Option<oneshot::Sender<TaskOutcome>>>>, outcome| {
            if let Some(tx) = tx.lock().unwrap_or_else(PoisonError::into_inner).take() {
                let _ = tx.send(outcome);
            }
        };

        let (on_success, on_missing, on_failure) = (tx.clone(), tx.clone(), tx);
        let callbacks = Self::new()
            .on_success(move || send(&on_success, TaskOutcome::Completed))
            .on_missing_value(move |err| {
                send(&on_missing, TaskOutcome::MissingValue(err.to_string()))
            })
            .on_failure(move |err| send(&on_failure, TaskOutcome::Failed(err.to_string())));
        (callbacks, rx)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "message", rename_all = "snake_case")]
pub enum TaskOutcome {
    Completed,
    /// A connection parameter was unset when the frames were due.
    MissingValue(String),
    Failed(String),
}

/// Unit of work executed by the queue worker.
pub struct QueuedTask {
    id: TaskId,
    label: String,
    submitted_at: DateTime<Utc>,
    steps: Vec<Step>,
    callbacks: TaskCallbacks,
}

impl QueuedTask {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            label: label.into(),
            submitted_at: Utc::now(),
            steps: Vec::new(),
            callbacks: TaskCallbacks::new(),
        }
    }

    pub fn step<F, Fut>(mut self, step: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), StageError>> + Send + 'static,
    {
        self.steps.push(Box::new(move || step().boxed()));
        self
    }

    pub fn with_callbacks(mut self, callbacks: TaskCallbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }

    /// Runs the steps in order and stops at the first error.
    pub async fn run(self) -> TaskOutcome {
        let QueuedTask {
            id,
            label,
            steps,
            callbacks,
            ..
        } = self;
        let TaskCallbacks {
            success,
            missing_value,
            failure,
            finally,
        } = callbacks;

        debug!("Running task {} ({}) with {} step(s)", id, label, steps.len());

        let mut first_error = None;
        for step in steps {
            if let Err(e) = step().await {
                first_error = Some(e);
                break;
            }
        }

        let outcome = match first_error {
            None => {
                success.into_iter().for_each(|callback| callback());
                TaskOutcome::Completed
            }
            Some(err) if err.is_missing_value() => {
                error!("Task {} ({}) stopped: {}", id, label, err);
                missing_value.into_iter().for_each(|callback| callback(&err));
                TaskOutcome::MissingValue(err.to_string())
            }
            Some(err) => {
                error!("Task {} ({}) failed: {}", id, label, err);
                failure.into_iter().for_each(|callback| callback(&err));
                TaskOutcome::Failed(err.to_string())
            }
        };

        finally.into_iter().for_each(|callback| callback());
        outcome
    }
}
