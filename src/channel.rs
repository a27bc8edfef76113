//! One-directional byte channels between the operator shell and the acquisition loop.
//!
//! Each channel is an in-memory pipe; the two ends are wrapped so that the writer can
//! only write and the reader can only read.

use std::time::Duration;

use anyhow::{Context as _, Result, bail};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::time::timeout;

use crate::command::Command;
use crate::reading::{FRAME_LEN, Frame};

/// Bytes buffered in a channel before the writer has to wait for the reader.
pub const CHANNEL_CAPACITY: usize = 1024;

/// A data-channel reply: the raw frame followed by a zero terminator.
pub const REPLY_LEN: usize = FRAME_LEN + 1;

/// Operator to acquisition: newline-terminated command text.
pub fn signal_channel() -> (SignalSender, SignalReceiver) {
    let (tx, rx) = tokio::io::duplex(CHANNEL_CAPACITY);
    (SignalSender { io: tx }, SignalReceiver { io: rx })
}

/// Acquisition to operator: frame replies to `env`.
pub fn data_channel() -> (DataSender, DataReceiver) {
    let (tx, rx) = tokio::io::duplex(CHANNEL_CAPACITY);
    (DataSender { io: tx }, DataReceiver { io: rx })
}

#[derive(Debug)]
pub struct SignalSender {
    io: DuplexStream,
}

impl SignalSender {
    pub async fn send(&mut self, command: &Command) -> Result<()> {
        self.send_raw(command.to_line().as_bytes()).await
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.io
            .write_all(bytes)
            .await
            .context("failed to write to signal channel")
    }
}

#[derive(Debug)]
pub struct SignalReceiver {
    io: DuplexStream,
}

impl SignalReceiver {
    /// Waits up to `wait` for bytes.
    ///
    /// Returns `Ok(None)` on timeout and `Ok(Some(0))` once the sender is gone.
    pub async fn recv(&mut self, buf: &mut [u8], wait: Duration) -> Result<Option<usize>> {
        match timeout(wait, self.io.read(buf)).await {
            Ok(read) => Ok(Some(read.context("failed to read from signal channel")?)),
            Err(_) => Ok(None),
        }
    }
}

#[derive(Debug)]
pub struct DataSender {
    io: DuplexStream,
}

impl DataSender {
    pub async fn send_reply(&mut self, frame: &Frame) -> Result<()> {
        let mut reply = [0u8; REPLY_LEN];
        reply[..FRAME_LEN].copy_from_slice(frame);
        self.io
            .write_all(&reply)
            .await
            .context("failed to write to data channel")
    }
}

#[derive(Debug)]
pub struct DataReceiver {
    io: DuplexStream,
}

impl DataReceiver {
    /// Blocks until a whole reply has arrived and returns its frame.
    pub async fn recv_reply(&mut self) -> Result<Frame> {
        let mut reply = [0u8; REPLY_LEN];
        self.io
            .read_exact(&mut reply)
            .await
            .context("failed to read reply from data channel")?;

        if reply[FRAME_LEN] != 0 {
            bail!(
                "reply not terminated: expected 0x00, got 0x{:02x}",
                reply[FRAME_LEN]
            );
        }

        let mut frame = [0u8; FRAME_LEN];
        frame.copy_from_slice(&reply[..FRAME_LEN]);
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn signal_carries_command_lines() {
        let (mut tx, mut rx) = signal_channel();
        tx.send(&Command::Blink(5)).await.unwrap();

        let mut buf = [0u8; 64];
        let n = rx
            .recv(&mut buf, Duration::from_secs(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&buf[..n], b"blink 5\n");
    }

    #[tokio::test(start_paused = true)]
    async fn signal_recv_times_out() {
        let (_tx, mut rx) = signal_channel();

        let mut buf = [0u8; 64];
        let got = rx.recv(&mut buf, Duration::from_secs(1)).await.unwrap();
        assert_eq!(got, None);
    }

    #[tokio::test]
    async fn signal_reports_hang_up() {
        let (tx, mut rx) = signal_channel();
        drop(tx);

        let mut buf = [0u8; 64];
        let got = rx.recv(&mut buf, Duration::from_secs(1)).await.unwrap();
        assert_eq!(got, Some(0));
    }

    #[tokio::test]
    async fn reply_is_frame_plus_terminator() {
        let (mut tx, mut rx) = data_channel();
        let frame = *b"\x80\x40\xc8\x02202001010600";

        tx.send_reply(&frame).await.unwrap();

        assert_eq!(rx.recv_reply().await.unwrap(), frame);
    }
}
