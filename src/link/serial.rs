use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, warn};

use super::{config::SerialLinkConfig, Ack, ConnectionParams, LinkTransport, Parity};
use crate::{dialect::CommandFrame, error::StageError};

/// Transport over a real serial port.
///
/// The port is opened for each batch and closed when the batch is done, so
/// parameter changes take effect on the next transmission.
pub struct SerialLink {
    config: SerialLinkConfig,
}

impl SerialLink {
    pub fn new(config: SerialLinkConfig) -> Self {
        Self { config }
    }

    fn data_bits(byte_size: u8) -> Result<tokio_serial::DataBits, StageError> {
        match byte_size {
            5 => Ok(tokio_serial::DataBits::Five),
            6 => Ok(tokio_serial::DataBits::Six),
            7 => Ok(tokio_serial::DataBits::Seven),
            8 => Ok(tokio_serial::DataBits::Eight),
            other => Err(StageError::Link(format!("unsupported byte size {}", other))),
        }
    }

    fn parity(parity: Parity) -> tokio_serial::Parity {
        match parity {
            Parity::None => tokio_serial::Parity::None,
            Parity::Odd => tokio_serial::Parity::Odd,
            Parity::Even => tokio_serial::Parity::Even,
        }
    }
}

#[async_trait::async_trait]
impl LinkTransport for SerialLink {
    async fn execute(
        &self,
        frames: &[CommandFrame],
        params: &ConnectionParams,
        port: Option<&str>,
    ) -> Result<Ack, StageError> {
        let connection = params.resolve(port)?;

        let mut stream = tokio_serial::new(&connection.port, connection.baudrate)
            .data_bits(Self::data_bits(connection.byte_size)?)
            .parity(Self::parity(connection.parity))
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .timeout(self.config.read_timeout)
            .open_native_async()
            .map_err(|e| StageError::Link(format!("failed to open {}: {}", connection.port, e)))?;
        info!("Serial port {} opened at {} baud", connection.port, connection.baudrate);

        let mut ack = [0u8; 1];
        for frame in frames {
            debug!("Serial TX: {:?}", frame);
            stream.write_all(frame.as_bytes()).await?;

            if !self.config.wait_ack {
                continue;
            }

            let read = tokio::time::timeout(self.config.read_timeout, stream.read(&mut ack)).await;
            match read {
                Ok(Ok(n)) if n > 0 => {
                    debug!("Serial RX: {:?}", String::from_utf8_lossy(&ack[..n]));
                }
                Ok(Ok(_)) | Err(_) => {
                    warn!(
                        "No acknowledge received from {} within {:?} after {:?}",
                        connection.port, self.config.read_timeout, frame
                    );
                    return Ok(Ack::Missing);
                }
                Ok(Err(e)) if e.kind() == std::io::ErrorKind::TimedOut => {
                    warn!("Read timed out on {} after {:?}", connection.port, frame);
                    return Ok(Ack::Missing);
                }
                Ok(Err(e)) => return Err(StageError::Io(e)),
            }
        }

        // Give the controller a moment before the port is dropped.
        tokio::time::sleep(Duration::from_millis(10)).await;
        debug!("Serial port {} closed", connection.port);
        Ok(Ack::Received)
    }
}
