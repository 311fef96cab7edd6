use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SerialLinkConfig {
    pub read_timeout: Duration,
    pub wait_ack: bool,
}

impl Default for SerialLinkConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(10),
            wait_ack: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimulatedLinkConfig {
    pub acknowledge: bool,
    pub frame_delay: Duration,
    /// Most recent batches kept for inspection; older ones are dropped.
    pub history: usize,
}

impl Default for SimulatedLinkConfig {
    fn default() -> Self {
        Self {
            acknowledge: true,
            frame_delay: Duration::ZERO,
            history: 256,
        }
    }
}
