//! Host side of the sensor wire protocol.
//!
//! Outbound, the host sends single tag bytes (plus one payload byte for blink).
//! Inbound, the sensor answers a poll with a fixed 16-byte frame:
//!
//! | Offset | Meaning |
//! |---|---|
//! | 0 | temperature |
//! | 1 | pressure |
//! | 2 | humidity |
//! | 3 | rain: 0 no observation, 1 no rain, 2 rain |
//! | 4..=15 | `YYYYMMDDHHmm` as ASCII digits |

use anyhow::{Context as _, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::debug;

use crate::command::Command;
use crate::reading::{FRAME_LEN, Frame, Reading};

/// Version of the tag encoding below. Bump when a tag changes meaning.
pub const WIRE_VERSION: u8 = 1;

pub const TAG_RESUME: u8 = b'r';

pub const TAG_PAUSE: u8 = b'p';

pub const TAG_BLINK: u8 = b'b';

pub const TAG_REQUEST: u8 = b'e';

pub const TAG_POLL: u8 = b'2';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCommand {
    Resume,
    Pause,
    Blink(u8),
    Request,
    Poll,
}

impl DeviceCommand {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            DeviceCommand::Resume => vec![TAG_RESUME],
            DeviceCommand::Pause => vec![TAG_PAUSE],
            DeviceCommand::Blink(frequency) => vec![TAG_BLINK, *frequency],
            DeviceCommand::Request => vec![TAG_REQUEST],
            DeviceCommand::Poll => vec![TAG_POLL],
        }
    }

    /// The device-side form of an operator command. `Exit` never reaches the sensor.
    pub fn relay(command: &Command) -> Option<Self> {
        match command {
            Command::Resume => Some(DeviceCommand::Resume),
            Command::Pause => Some(DeviceCommand::Pause),
            Command::Blink(frequency) => Some(DeviceCommand::Blink(*frequency)),
            Command::Request => Some(DeviceCommand::Request),
            Command::Exit => None,
        }
    }
}

#[derive(Debug)]
pub struct DeviceLink<T> {
    io: T,
}

impl DeviceLink<SerialStream> {
    /// Opens the sensor's serial port. Line settings beyond the baud rate are left to the
    /// port's defaults (8N1, no flow control).
    pub fn open_serial(path: &str, baud_rate: u32) -> Result<Self> {
        let port = tokio_serial::new(path, baud_rate)
            .open_native_async()
            .with_context(|| format!("failed to open serial port: {path}"))?;
        Ok(Self::new(port))
    }
}

impl<T: AsyncRead + AsyncWrite + Unpin> DeviceLink<T> {
    pub fn new(io: T) -> Self {
        Self { io }
    }

    pub async fn send_command(&mut self, command: DeviceCommand) -> Result<()> {
        debug!(?command, "sending device command");
        self.io
            .write_all(&command.encode())
            .await
            .with_context(|| format!("failed to send {command:?} to device"))?;
        self.io.flush().await.context("failed to flush serial link")
    }

    /// Reads one whole frame, accumulating short reads until 16 bytes have arrived.
    pub async fn read_frame(&mut self) -> Result<Frame> {
        let mut frame = [0u8; FRAME_LEN];
        self.io
            .read_exact(&mut frame)
            .await
            .context("failed to read frame from device")?;
        Ok(frame)
    }

    /// Sends a poll and decodes the reply. The raw frame is returned alongside so it can
    /// be forwarded verbatim.
    pub async fn poll_reading(&mut self) -> Result<(Reading, Frame)> {
        self.send_command(DeviceCommand::Poll).await?;
        let frame = self.read_frame().await?;
        let reading = Reading::from_frame(&frame).context("failed to decode device frame")?;
        Ok((reading, frame))
    }
}
