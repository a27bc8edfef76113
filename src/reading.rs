use std::fmt;

use anyhow::{Context as _, Result};
use chrono::NaiveDateTime;
use thiserror::Error;

pub const FRAME_LEN: usize = 16;

pub const TIMESTAMP_LEN: usize = 12;

const TIMESTAMP_OFFSET: usize = 4;

const HOUR_OFFSET: usize = 12;

pub type Frame = [u8; FRAME_LEN];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("timestamp byte at offset {offset} is not an ASCII digit: 0x{byte:02x}")]
    NonDigitTimestamp { offset: usize, byte: u8 },

    #[error("hour out of range: expected 0-23, got {0}")]
    HourOutOfRange(u8),

    #[error("unknown rain flag: expected 0-2, got {0}")]
    UnknownRain(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rain {
    NoObservation,
    Dry,
    Rained,
}

impl Rain {
    pub fn as_u8(&self) -> u8 {
        match self {
            Rain::NoObservation => 0,
            Rain::Dry => 1,
            Rain::Rained => 2,
        }
    }
}

impl TryFrom<u8> for Rain {
    type Error = FrameError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(Rain::NoObservation),
            1 => Ok(Rain::Dry),
            2 => Ok(Rain::Rained),
            _ => Err(FrameError::UnknownRain(v)),
        }
    }
}

/// One decoded sensor frame.
///
/// The timestamp is kept as the 12 ASCII digits the sensor sent (`YYYYMMDDHHmm`);
/// `hour` is extracted once at decode time because histogram bucketing needs it on
/// every reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reading {
    pub temperature: u8,

    pub pressure: u8,

    pub humidity: u8,

    pub rain: Rain,

    timestamp: [u8; TIMESTAMP_LEN],

    hour: u8,
}

impl Reading {
    /// Only the hour digits feed the histograms, but the whole timestamp must be ASCII
    /// digits: a frame with anything else in it means the link has lost framing.
    pub fn from_frame(frame: &Frame) -> Result<Self, FrameError> {
        let mut timestamp = [0u8; TIMESTAMP_LEN];
        timestamp.copy_from_slice(&frame[TIMESTAMP_OFFSET..]);

        if let Some((i, &byte)) = timestamp
            .iter()
            .enumerate()
            .find(|(_, b)| !b.is_ascii_digit())
        {
            return Err(FrameError::NonDigitTimestamp {
                offset: TIMESTAMP_OFFSET + i,
                byte,
            });
        }

        let hour = (frame[HOUR_OFFSET] - b'0') * 10 + (frame[HOUR_OFFSET + 1] - b'0');
        if hour > 23 {
            return Err(FrameError::HourOutOfRange(hour));
        }

        Ok(Self {
            temperature: frame[0],
            pressure: frame[1],
            humidity: frame[2],
            rain: Rain::try_from(frame[3])?,
            timestamp,
            hour,
        })
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn timestamp(&self) -> &str {
        // Validated as ASCII digits in from_frame.
        std::str::from_utf8(&self.timestamp).unwrap_or_default()
    }

    pub fn measured_at(&self) -> Result<NaiveDateTime> {
        NaiveDateTime::parse_from_str(self.timestamp(), "%Y%m%d%H%M")
            .with_context(|| format!("failed to parse timestamp: {}", self.timestamp()))
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:03}, {:03}, {:03}, {:03}, {}",
            self.temperature,
            self.pressure,
            self.humidity,
            self.rain.as_u8(),
            self.timestamp()
        )
    }
}

#[cfg(test)]
pub(crate) fn frame(temperature: u8, pressure: u8, humidity: u8, rain: u8, ts: &str) -> Frame {
    let mut f = [0u8; FRAME_LEN];
    f[0] = temperature;
    f[1] = pressure;
    f[2] = humidity;
    f[3] = rain;
    f[TIMESTAMP_OFFSET..].copy_from_slice(ts.as_bytes());
    f
}
