//! Pulls together what every other section says about an anomalous window.

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::error::Result;
use crate::processors::{ForegroundEventProcessor, SqlProcessor, TablespaceIoProcessor, WaitClassProcessor};
use crate::table::{RecordTable, TimeRange};

/// Diagnostic context of one instance over one time range.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CriticalBundle {
    pub instance: u32,
    pub range: TimeRange,
    pub top_cpu: RecordTable,
    pub top_elapsed: RecordTable,
    pub top_io: RecordTable,
    pub wait_class_pct: RecordTable,
    pub foreground_events: RecordTable,
    pub tablespace_io: RecordTable,
}

/// Borrowed view of the section processors the bundles draw from.
pub struct Correlator<'a> {
    pub sql: &'a SqlProcessor,
    pub wait_classes: &'a WaitClassProcessor,
    pub foreground_events: &'a ForegroundEventProcessor,
    pub tablespace_io: &'a TablespaceIoProcessor,
}

impl<'a> Correlator<'a> {
    /// Every table restricted to `instance` and the inclusive `range`; SQL
    /// tables are cut to the `n` heaviest statements.
    pub fn bundle(&self, instance: u32, range: &TimeRange, n: usize) -> Result<CriticalBundle> {
        let top = self.sql.top_n(instance, n, Some(range))?;
        Ok(CriticalBundle {
            instance,
            range: *range,
            top_cpu: top.cpu,
            top_elapsed: top.elapsed,
            top_io: top.user_io,
            wait_class_pct: self.wait_classes.dbtime_percentages(instance, range)?,
            foreground_events: self.foreground_events.events(instance, range),
            tablespace_io: self.tablespace_io.io_rows(instance, range),
        })
    }

    /// One bundle per timestamp, a single timestamp included.
    pub fn bundles_for(&self, instance: u32, timestamps: &[NaiveDateTime], n: usize) -> Result<Vec<CriticalBundle>> {
        timestamps.iter().map(|ts| self.bundle(instance, &TimeRange::point(*ts), n)).collect()
    }
}
