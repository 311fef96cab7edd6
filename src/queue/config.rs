use std::time::Duration;

#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Tasks allowed to wait while another one runs.
    pub capacity: usize,
    /// Pause the worker takes before picking up the next task.
    pub poll_interval: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 1,
            poll_interval: Duration::from_millis(500),
        }
    }
}
