use std::time::Duration;

use anyhow::{Context as _, Result};
use memmap2::MmapMut;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use crate::channel::{DataSender, SignalReceiver};
use crate::command::{Command, CommandParser};
use crate::device::{DeviceCommand, DeviceLink};
use crate::store::{HistogramSet, RecordLog};

/// One run is three days of hourly readings. The count is not persisted: a restarted
/// controller starts a new run.
pub const READING_LIMIT: usize = 3 * 24;

pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

pub const SIGNAL_WAIT: Duration = Duration::from_secs(1);

const SIGNAL_READ_LEN: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Running,
    Paused,
}

#[derive(Debug, Clone)]
pub struct AcquisitionSettings {
    pub poll_interval: Duration,

    pub signal_wait: Duration,

    pub reading_limit: usize,
}

impl Default for AcquisitionSettings {
    fn default() -> Self {
        Self {
            poll_interval: POLL_INTERVAL,
            signal_wait: SIGNAL_WAIT,
            reading_limit: READING_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed { readings: usize },
    Exited { readings: usize },
}

/// Owns the serial link and the writable stores, and interleaves operator commands with
/// the once-per-second sensor poll.
///
/// Each pass waits at most `signal_wait` for operator bytes, applies every complete command
/// that arrived, then polls the sensor if running and the poll interval has elapsed.
/// Paused time does not count toward `reading_limit`; only completed polls do.
pub struct AcquisitionLoop<T> {
    device: DeviceLink<T>,
    signals: SignalReceiver,
    replies: DataSender,
    histograms: HistogramSet<MmapMut>,
    records: RecordLog,
    parser: CommandParser,
    settings: AcquisitionSettings,
    state: LinkState,
    readings: usize,
    reply_pending: bool,
    operator_connected: bool,
}

impl<T: AsyncRead + AsyncWrite + Unpin> AcquisitionLoop<T> {
    pub fn new(
        device: DeviceLink<T>,
        signals: SignalReceiver,
        replies: DataSender,
        histograms: HistogramSet<MmapMut>,
        records: RecordLog,
    ) -> Self {
        Self {
            device,
            signals,
            replies,
            histograms,
            records,
            parser: CommandParser::new(),
            settings: AcquisitionSettings::default(),
            state: LinkState::Running,
            readings: 0,
            reply_pending: false,
            operator_connected: true,
        }
    }

    pub fn with_settings(mut self, settings: AcquisitionSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub async fn run(mut self) -> Result<Outcome> {
        info!(limit = self.settings.reading_limit, "beginning sensor reading");

        let mut next_poll = Instant::now();
        while self.readings < self.settings.reading_limit {
            let wait = match self.state {
                LinkState::Running => next_poll
                    .saturating_duration_since(Instant::now())
                    .min(self.settings.signal_wait),
                LinkState::Paused => self.settings.signal_wait,
            };

            if let Some(outcome) = self.service_signals(wait).await? {
                return Ok(outcome);
            }

            let now = Instant::now();
            if self.state == LinkState::Running && next_poll <= now {
                next_poll = now + self.settings.poll_interval;
                self.poll().await?;
            }
        }

        self.histograms.flush()?;
        self.records.flush()?;

        info!(readings = self.readings, "sensor reading complete");
        Ok(Outcome::Completed {
            readings: self.readings,
        })
    }

    /// Applies one operator command. Returns an outcome only for `Exit`.
    pub async fn apply(&mut self, command: Command) -> Result<Option<Outcome>> {
        match command {
            Command::Exit => {
                info!(readings = self.readings, "exit requested");
                return Ok(Some(Outcome::Exited {
                    readings: self.readings,
                }));
            }
            Command::Resume => self.set_state(LinkState::Running),
            Command::Pause => self.set_state(LinkState::Paused),
            Command::Request => self.reply_pending = true,
            Command::Blink(_) => {}
        }

        if let Some(relayed) = DeviceCommand::relay(&command) {
            self.device
                .send_command(relayed)
                .await
                .with_context(|| format!("failed to relay {command}"))?;
        }

        Ok(None)
    }

    async fn service_signals(&mut self, wait: Duration) -> Result<Option<Outcome>> {
        if !self.operator_connected {
            sleep(wait).await;
            return Ok(None);
        }

        let mut buf = [0u8; SIGNAL_READ_LEN];
        match self.signals.recv(&mut buf, wait).await? {
            None => return Ok(None),
            Some(0) => {
                warn!("operator hung up; continuing without commands");
                self.operator_connected = false;
            }
            Some(n) => self.parser.feed(&buf[..n]),
        }

        while let Some(command) = self.parser.next_command() {
            if let Some(outcome) = self.apply(command).await? {
                return Ok(Some(outcome));
            }
        }

        // Nobody is left to send `resume`, so a paused run would never reach its bound.
        if !self.operator_connected && self.state == LinkState::Paused {
            info!("resuming paused acquisition with no operator attached");
            self.apply(Command::Resume).await?;
        }

        Ok(None)
    }

    async fn poll(&mut self) -> Result<()> {
        let (reading, frame) = self
            .device
            .poll_reading()
            .await
            .context("failed to poll sensor")?;
        self.readings += 1;
        debug!(readings = self.readings, %reading, "reading");

        self.histograms
            .update(&reading)
            .context("failed to update histograms")?;

        if let Err(err) = self.records.append(&reading) {
            warn!(%err, %reading, "reading not recorded");
        }

        if self.reply_pending {
            self.replies
                .send_reply(&frame)
                .await
                .context("failed to forward reading to operator")?;
            self.reply_pending = false;
        }

        Ok(())
    }

    fn set_state(&mut self, state: LinkState) {
        if self.state != state {
            info!(?state, readings = self.readings, "acquisition state changed");
        }
        self.state = state;
    }
}
