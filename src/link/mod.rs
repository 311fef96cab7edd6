pub mod config;
#[cfg(feature = "serial")]
pub mod serial;
pub mod simulated;

use serde::{Deserialize, Serialize};

use crate::{
    dialect::CommandFrame,
    error::{MissingParameter, StageError},
};

#[cfg(feature = "serial")]
pub use serial::SerialLink;
pub use simulated::SimulatedLink;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    None,
    Odd,
    Even,
}

/// Serial line parameters. Every field stays optional so that an unset value
/// is reported when a transmission is attempted, not when it is configured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionParams {
    pub port: Option<String>,
    pub baudrate: Option<u32>,
    pub byte_size: Option<u8>,
    pub parity: Option<Parity>,
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            port: None,
            baudrate: None,
            byte_size: Some(8),
            parity: Some(Parity::None),
        }
    }
}

/// Parameters that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConnection {
    pub port: String,
    pub baudrate: u32,
    pub byte_size: u8,
    pub parity: Parity,
}

impl ConnectionParams {
    /// `port` overrides the configured port when given and non-empty.
    pub fn resolve(&self, port: Option<&str>) -> Result<ResolvedConnection, StageError> {
        let port = port
            .filter(|p| !p.is_empty())
            .or(self.port.as_deref())
            .filter(|p| !p.is_empty())
            .ok_or(StageError::MissingValue(MissingParameter::Port))?;
        let baudrate = self
            .baudrate
            .filter(|b| *b > 0)
            .ok_or(StageError::MissingValue(MissingParameter::Baudrate))?;
        let byte_size = self
            .byte_size
            .filter(|b| *b > 0)
            .ok_or(StageError::MissingValue(MissingParameter::ByteSize))?;
        let parity = self
            .parity
            .ok_or(StageError::MissingValue(MissingParameter::Parity))?;

        Ok(ResolvedConnection {
            port: port.to_string(),
            baudrate,
            byte_size,
            parity,
        })
    }
}

/// Result of a completed transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Ack {
    /// Every frame was acknowledged by the controller.
    Received,
    /// A read timed out; later frames of the batch were not sent.
    Missing,
}

/// Raw byte transmission to the controller.
#[async_trait::async_trait]
pub trait LinkTransport: Send + Sync {
    /// Sends `frames` in order over a connection built from `params`.
    ///
    /// Fails with [`StageError::MissingValue`] before touching the wire when
    /// a required parameter is unset.
    async fn execute(
        &self,
        frames: &[CommandFrame],
        params: &ConnectionParams,
        port: Option<&str>,
    ) -> Result<Ack, StageError>;
}
