use std::path::Path;

use anyhow::{Context as _, Result};
use memmap2::{Mmap, MmapMut};
use thiserror::Error;

use super::mapping::{map_readonly, map_writable};
use crate::reading::Reading;

pub const RECORD_LEN: usize = 36;

pub const RECORD_CAPACITY: usize = 24 * 3;

pub const RECORD_FILE_SIZE: usize = RECORD_CAPACITY * RECORD_LEN;

pub const RECORD_FILE_NAME: &str = "record.bin";

#[derive(Debug, Error, PartialEq, Eq)]
#[error("record log full: {capacity} records already written")]
pub struct RecordLogFull {
    pub capacity: usize,
}

/// Append-only log of fixed 36-byte text slots.
///
/// Creating a log always starts from an empty file: a restarted controller begins a
/// fresh three-day log instead of resuming a half-filled one.
#[derive(Debug)]
pub struct RecordLog {
    slots: MmapMut,
    count: usize,
}

impl RecordLog {
    pub fn create(path: &Path) -> Result<Self> {
        let slots =
            map_writable(path, RECORD_FILE_SIZE, true).context("failed to create record log")?;
        Ok(Self { slots, count: 0 })
    }

    pub fn append(&mut self, reading: &Reading) -> Result<(), RecordLogFull> {
        if self.count >= RECORD_CAPACITY {
            return Err(RecordLogFull {
                capacity: RECORD_CAPACITY,
            });
        }

        let line = format_record(reading);
        let start = self.count * RECORD_LEN;
        self.slots[start..start + RECORD_LEN].copy_from_slice(&line);
        self.count += 1;

        Ok(())
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn is_full(&self) -> bool {
        self.count >= RECORD_CAPACITY
    }

    /// The whole mapped buffer, unfilled slots included.
    pub fn render(&self) -> &[u8] {
        &self.slots
    }

    pub fn flush(&self) -> Result<()> {
        self.slots.flush().context("failed to flush record log")
    }
}

#[derive(Debug)]
pub struct RecordLogView {
    slots: Mmap,
}

impl RecordLogView {
    pub fn open(path: &Path) -> Result<Self> {
        let slots =
            map_readonly(path, RECORD_FILE_SIZE).context("failed to open record log view")?;
        Ok(Self { slots })
    }

    pub fn render(&self) -> &[u8] {
        &self.slots
    }

    /// Slots written so far. A slot whose first byte is still zero has never been written.
    pub fn records(&self) -> impl Iterator<Item = &str> {
        self.slots
            .chunks_exact(RECORD_LEN)
            .take_while(|slot| slot[0] != 0)
            .map(|slot| std::str::from_utf8(slot).unwrap_or_default())
    }
}

fn format_record(reading: &Reading) -> [u8; RECORD_LEN] {
    // Three-digit fields and a 12-digit timestamp always fill the slot exactly.
    let text = format!(
        "  {:03}, {:03}, {:03}, {:03}, {},\n",
        reading.temperature,
        reading.pressure,
        reading.humidity,
        reading.rain.as_u8(),
        reading.timestamp()
    );
    let mut line = [0u8; RECORD_LEN];
    let len = text.len().min(RECORD_LEN);
    line[..len].copy_from_slice(&text.as_bytes()[..len]);
    line
}
