use std::collections::VecDeque;

use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{config::SimulatedLinkConfig, Ack, ConnectionParams, LinkTransport};
use crate::{dialect::CommandFrame, error::StageError};

/// Transport that never opens a port.
///
/// It applies the same parameter checks as a real link and keeps the last
/// `history` batches it was asked to send, for dry runs and tests.
pub struct SimulatedLink {
    config: SimulatedLinkConfig,
    sent: Mutex<VecDeque<Vec<CommandFrame>>>,
}

impl SimulatedLink {
    pub fn new(config: SimulatedLinkConfig) -> Self {
        Self {
            config,
            sent: Mutex::new(VecDeque::new()),
        }
    }

    /// Batches transmitted so far, oldest first.
    pub async fn transmissions(&self) -> Vec<Vec<CommandFrame>> {
        self.sent.lock().await.iter().cloned().collect()
    }

    pub async fn sent_frames(&self) -> Vec<CommandFrame> {
        self.sent.lock().await.iter().flatten().cloned().collect()
    }
}

impl Default for SimulatedLink {
    fn default() -> Self {
        Self::new(SimulatedLinkConfig::default())
    }
}

#[async_trait::async_trait]
impl LinkTransport for SimulatedLink {
    async fn execute(
        &self,
        frames: &[CommandFrame],
        params: &ConnectionParams,
        port: Option<&str>,
    ) -> Result<Ack, StageError> {
        let connection = params.resolve(port)?;
        info!(
            "Simulated link on {} at {} baud: {} frame(s)",
            connection.port,
            connection.baudrate,
            frames.len()
        );

        for frame in frames {
            debug!("Simulated TX: {:?}", frame);
            if !self.config.frame_delay.is_zero() {
                tokio::time::sleep(self.config.frame_delay).await;
            }
        }
        if self.config.history > 0 {
            let mut sent = self.sent.lock().await;
            if sent.len() == self.config.history {
                sent.pop_front();
            }
            sent.push_back(frames.to_vec());
        }

        if self.config.acknowledge {
            Ok(Ack::Received)
        } else {
            Ok(Ack::Missing)
        }
    }
}
