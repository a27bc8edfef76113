//! Memory-mapped persistent stores.
//!
//! The acquisition loop is the only writer: it opens each file read-write through
//! [`HistogramSet::open`] and [`RecordLog::create`]. Anything else (the operator shell,
//! the inspector) opens a separate read-only mapping of the same file through
//! [`HistogramSet::open_view`] and [`RecordLogView::open`].
//!
//! Both mappings are `MAP_SHARED`, so a reader sees the writer's bytes as soon as they
//! are stored, with no lock between them. A reader may observe a store mid-update:
//! a histogram cell is a single byte and a record slot is written once, front to back,
//! so the worst case is a table that lags the writer by one reading or a record line
//! that is cut short. Readers must tolerate that; nothing here promises more.

mod histogram;
mod mapping;
mod record_log;

pub use histogram::*;
pub use record_log::*;
