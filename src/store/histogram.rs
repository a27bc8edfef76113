use std::path::Path;

use anyhow::{Context as _, Result};
use memmap2::{Mmap, MmapMut};
use thiserror::Error;

use super::mapping::{map_readonly, map_writable};
use crate::reading::Reading;

pub const HOURS: usize = 24;

pub const BUCKET_WIDTH: usize = 16;

pub const BUCKETS: usize = 256 / BUCKET_WIDTH;

pub const HISTOGRAM_FILE_SIZE: usize = HOURS * BUCKETS;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("hour out of range: expected 0-23, got {0}")]
pub struct HourOutOfRange(pub u8);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantity {
    Temperature,
    Pressure,
    Humidity,
}

impl Quantity {
    pub const ALL: [Quantity; 3] = [Quantity::Temperature, Quantity::Pressure, Quantity::Humidity];

    pub fn label(&self) -> &'static str {
        match self {
            Quantity::Temperature => "Temperature",
            Quantity::Pressure => "Pressure",
            Quantity::Humidity => "Humidity",
        }
    }

    pub fn file_name(&self) -> &'static str {
        match self {
            Quantity::Temperature => "tmp_hist.bin",
            Quantity::Pressure => "prs_hist.bin",
            Quantity::Humidity => "hmd_hist.bin",
        }
    }

    pub fn value(&self, reading: &Reading) -> u8 {
        match self {
            Quantity::Temperature => reading.temperature,
            Quantity::Pressure => reading.pressure,
            Quantity::Humidity => reading.humidity,
        }
    }

    fn index(&self) -> usize {
        match self {
            Quantity::Temperature => 0,
            Quantity::Pressure => 1,
            Quantity::Humidity => 2,
        }
    }
}

impl std::str::FromStr for Quantity {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "t" | "tmp" | "temperature" => Ok(Quantity::Temperature),
            "p" | "prs" | "pressure" => Ok(Quantity::Pressure),
            "h" | "hmd" | "humidity" => Ok(Quantity::Humidity),
            _ => anyhow::bail!("unknown quantity: {}", s),
        }
    }
}

/// Hour-of-day by value-bucket matrix of 8-bit counters over a mapped file.
///
/// Row `h` holds the counts for readings taken during hour `h`; column `b` counts values
/// in `b * 16 ..= b * 16 + 15`. Counters wrap from 255 to 0.
#[derive(Debug)]
pub struct Histogram<M> {
    cells: M,
}

pub type HistogramStore = Histogram<MmapMut>;

pub type HistogramView = Histogram<Mmap>;

impl HistogramStore {
    /// Opens or creates the backing file, keeping existing counts.
    pub fn open(path: &Path) -> Result<Self> {
        let cells = map_writable(path, HISTOGRAM_FILE_SIZE, false)
            .context("failed to open histogram store")?;
        Ok(Self { cells })
    }

    pub fn update(&mut self, value: u8, hour: u8) -> Result<(), HourOutOfRange> {
        if hour as usize >= HOURS {
            return Err(HourOutOfRange(hour));
        }

        let cell = &mut self.cells[cell_index(hour as usize, bucket(value))];
        *cell = cell.wrapping_add(1);
        Ok(())
    }

    pub fn flush(&self) -> Result<()> {
        self.cells.flush().context("failed to flush histogram store")
    }
}

impl HistogramView {
    pub fn open(path: &Path) -> Result<Self> {
        let cells =
            map_readonly(path, HISTOGRAM_FILE_SIZE).context("failed to open histogram view")?;
        Ok(Self { cells })
    }
}

impl<M: AsRef<[u8]>> Histogram<M> {
    pub fn count(&self, hour: usize, bucket: usize) -> u8 {
        self.cells.as_ref()[cell_index(hour, bucket)]
    }

    pub fn render(&self) -> String {
        let mut out = String::new();

        out.push_str("Hour|");
        for b in 1..=BUCKETS {
            out.push_str(&format!("  {:>3}", b * BUCKET_WIDTH));
        }
        out.push('\n');
        out.push_str(&"-".repeat(5 + BUCKETS * 5));
        out.push('\n');

        for hour in 0..HOURS {
            out.push_str(&format!("{hour:>3} |"));
            for b in 0..BUCKETS {
                out.push_str(&format!("  {:>3}", self.count(hour, b)));
            }
            out.push('\n');
        }

        out.push_str("    ");
        out.push_str(&"-".repeat(1 + BUCKETS * 5));
        out.push('\n');

        out
    }
}

pub fn bucket(value: u8) -> usize {
    value as usize / BUCKET_WIDTH
}

fn cell_index(hour: usize, bucket: usize) -> usize {
    hour * BUCKETS + bucket
}

/// The three per-quantity histograms kept side by side in one directory.
#[derive(Debug)]
pub struct HistogramSet<M> {
    stores: [Histogram<M>; 3],
}

impl HistogramSet<MmapMut> {
    pub fn open(dir: &Path) -> Result<Self> {
        let [t, p, h] = Quantity::ALL.map(|q| {
            HistogramStore::open(&dir.join(q.file_name()))
                .with_context(|| format!("failed to open {} histogram", q.label()))
        });
        Ok(Self {
            stores: [t?, p?, h?],
        })
    }

    pub fn update(&mut self, reading: &Reading) -> Result<(), HourOutOfRange> {
        for q in Quantity::ALL {
            self.stores[q.index()].update(q.value(reading), reading.hour())?;
        }
        Ok(())
    }

    pub fn flush(&self) -> Result<()> {
        for store in &self.stores {
            store.flush()?;
        }
        Ok(())
    }
}

impl HistogramSet<Mmap> {
    pub fn open_view(dir: &Path) -> Result<Self> {
        let [t, p, h] = Quantity::ALL.map(|q| {
            HistogramView::open(&dir.join(q.file_name()))
                .with_context(|| format!("failed to open {} histogram", q.label()))
        });
        Ok(Self {
            stores: [t?, p?, h?],
        })
    }
}

impl<M> HistogramSet<M> {
    pub fn get(&self, quantity: Quantity) -> &Histogram<M> {
        &self.stores[quantity.index()]
    }
}
