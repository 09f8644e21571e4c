//! One processor per parsed AWR section.
//!
//! Every processor owns the full table read from its flat file and answers
//! per-instance questions about it. Processors that feed the anomaly detector
//! also keep one aggregated (wide) table per instance; an instance whose table
//! can't be aggregated is reported and left out, the others stay usable.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::NaiveDateTime;
use colored::Colorize;
use serde::Serialize;

use crate::aggregate::{add_wait_class_placeholders, aggregate, group_series, MetricTable, Series};
use crate::anomalies::OutlierMethod;
use crate::error::Result;
use crate::registry::*;
use crate::staticdata::*;
use crate::table::{RecordTable, TimeRange};

/// What every section processor can do with its table.
pub trait TableProcessor {
    fn table(&self) -> &RecordTable;

    fn name(&self) -> &str {
        &self.table().name
    }

    /// Instance numbers run from 1 to this value.
    fn instances(&self) -> u32 {
        self.table().instance_count().unwrap_or(0)
    }

    /// Rows of one instance inside `range` (all of them without a range),
    /// identity stripped.
    fn rows_for(&self, instance: u32, range: Option<&TimeRange>) -> RecordTable {
        let rows = self.table().filter_by_instance(instance);
        let rows = match range {
            Some(range) => rows.filter_by_date(range),
            None => rows,
        };
        rows.drop_system_info().1
    }
}

/// Processors with a wide table per instance to look for peaks in.
pub trait MetricProcessor: TableProcessor {
    fn aggregated(&self, instance: u32) -> Option<&MetricTable>;

    /// Flagged rows of `metric` for one instance. Problems are reported on the
    /// console and give `None`.
    fn find_peaks_instance(&self, instance: u32, metric: Option<&str>, method: &OutlierMethod) -> Option<MetricTable> {
        let metric = match metric {
            Some(m) => m,
            None => {
                eprintln!("{} missing metric name", "Error!".bright_red());
                return None;
            }
        };
        let table = match self.aggregated(instance) {
            Some(t) => t,
            None => {
                eprintln!("{} {}: no aggregated table for instance {}", "Error!".bright_red(), self.name(), instance);
                return None;
            }
        };
        let peaks = method.find_anomalies(table, metric);
        if peaks.is_none() {
            eprintln!("{} {}: unknown metric '{}'", "Error!".bright_red(), self.name(), metric.bright_magenta());
        }
        debug_note!("{} instance {} metric {}: {:?} peaks", self.name(), instance, metric, peaks.as_ref().map(MetricTable::nrows));
        peaks
    }

    fn find_peaks(&self, metric: Option<&str>, method: &OutlierMethod) -> BTreeMap<u32, Option<MetricTable>> {
        (1..=self.instances()).map(|i| (i, self.find_peaks_instance(i, metric, method))).collect()
    }
}

/// Splits by instance and runs `build` on each part; failures are reported
/// and the instance is skipped.
fn per_instance<T>(table: &RecordTable, mut build: impl FnMut(&RecordTable) -> Result<T>) -> Result<BTreeMap<u32, T>> {
    let mut out = BTreeMap::new();
    for (instance, part) in table.split_by_instance()? {
        match build(&part) {
            Ok(value) => {
                out.insert(instance, value);
            }
            Err(e) => {
                eprintln!("{} {} instance {}: {}", "Error!".bright_red(), table.name, instance, e);
                debug_note!("skipping instance {} of {}: {}", instance, table.name, e);
            }
        }
    }
    Ok(out)
}

// ─────────────────────────────────────────────────────────────────────────────
// Load profile
// ─────────────────────────────────────────────────────────────────────────────
pub struct LoadProfileProcessor {
    table: RecordTable,
    aggregated: BTreeMap<u32, MetricTable>,
}

impl LoadProfileProcessor {
    pub fn load(dir: &Path) -> Result<Self> {
        Self::from_table(LOAD_PROFILE_SCHEMA.load(dir)?)
    }

    pub fn from_table(table: RecordTable) -> Result<Self> {
        LOAD_PROFILE_SCHEMA.validate(&table)?;
        let aggregated = per_instance(&table, |part| aggregate(part, LP_NAME, LP_PER_SECOND))?;
        Ok(LoadProfileProcessor { table, aggregated })
    }
}

impl TableProcessor for LoadProfileProcessor {
    fn table(&self) -> &RecordTable {
        &self.table
    }
}

impl MetricProcessor for LoadProfileProcessor {
    fn aggregated(&self, instance: u32) -> Option<&MetricTable> {
        self.aggregated.get(&instance)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Foreground wait classes
// ─────────────────────────────────────────────────────────────────────────────
pub struct WaitClassProcessor {
    table: RecordTable,
    aggregated: BTreeMap<u32, MetricTable>,
}

impl WaitClassProcessor {
    pub fn load(dir: &Path) -> Result<Self> {
        Self::from_table(WAIT_CLASSES_SCHEMA.load(dir)?)
    }

    pub fn from_table(table: RecordTable) -> Result<Self> {
        WAIT_CLASSES_SCHEMA.validate(&table)?;
        let aggregated = per_instance(&table, |part| {
            // not every class shows up in every snapshot
            let filled = add_wait_class_placeholders(part, WC_CLASS, WC_TOTAL_WAIT)?;
            aggregate(&filled, WC_CLASS, WC_TOTAL_WAIT)
        })?;
        Ok(WaitClassProcessor { table, aggregated })
    }

    /// `Wait Class` and `% DB time` of one instance inside `range`.
    pub fn dbtime_percentages(&self, instance: u32, range: &TimeRange) -> Result<RecordTable> {
        self.rows_for(instance, Some(range)).project(&[WC_CLASS, WC_PCT_DBTIME])
    }
}

impl TableProcessor for WaitClassProcessor {
    fn table(&self) -> &RecordTable {
        &self.table
    }
}

impl MetricProcessor for WaitClassProcessor {
    fn aggregated(&self, instance: u32) -> Option<&MetricTable> {
        self.aggregated.get(&instance)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Top foreground events
// ─────────────────────────────────────────────────────────────────────────────
pub struct ForegroundEventProcessor {
    table: RecordTable,
    timestamps: BTreeMap<u32, Vec<NaiveDateTime>>,
}

impl ForegroundEventProcessor {
    pub fn load(dir: &Path) -> Result<Self> {
        Self::from_table(FOREGROUND_EVENTS_SCHEMA.load(dir)?)
    }

    pub fn from_table(table: RecordTable) -> Result<Self> {
        FOREGROUND_EVENTS_SCHEMA.validate(&table)?;
        let timestamps = table.split_by_instance()?.into_iter().map(|(i, part)| (i, part.timestamps())).collect();
        Ok(ForegroundEventProcessor { table, timestamps })
    }

    /// Sorted snapshot times of one instance.
    pub fn timestamps(&self, instance: u32) -> &[NaiveDateTime] {
        self.timestamps.get(&instance).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn events(&self, instance: u32, range: &TimeRange) -> RecordTable {
        self.rows_for(instance, Some(range))
    }
}

impl TableProcessor for ForegroundEventProcessor {
    fn table(&self) -> &RecordTable {
        &self.table
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Top SQL
// ─────────────────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SqlMetric {
    Cpu,
    Elapsed,
    UserIo,
}

impl SqlMetric {
    pub const ALL: [SqlMetric; 3] = [SqlMetric::Cpu, SqlMetric::Elapsed, SqlMetric::UserIo];

    pub fn column(&self) -> &'static str {
        match self {
            SqlMetric::Cpu => SQL_CPU_TIME,
            SqlMetric::Elapsed => SQL_ELAPSED_TIME,
            SqlMetric::UserIo => SQL_IO_TIME,
        }
    }
}

/// One table per SQL ranking.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SqlTables {
    pub cpu: RecordTable,
    pub elapsed: RecordTable,
    pub user_io: RecordTable,
}

/// In how many snapshots a statement made each top list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SqlAppearance {
    pub sql_id: String,
    pub cpu: Option<usize>,
    pub elapsed: Option<usize>,
    pub user_io: Option<usize>,
}

impl SqlAppearance {
    fn total(&self) -> usize {
        self.cpu.unwrap_or(0) + self.elapsed.unwrap_or(0) + self.user_io.unwrap_or(0)
    }
}

pub struct SqlProcessor {
    cpu: RecordTable,
    elapsed: RecordTable,
    user_io: RecordTable,
}

impl SqlProcessor {
    pub fn load(dir: &Path) -> Result<Self> {
        Self::from_tables(SQL_CPU_SCHEMA.load(dir)?, SQL_ELAPSED_SCHEMA.load(dir)?, SQL_USER_IO_SCHEMA.load(dir)?)
    }

    pub fn from_tables(cpu: RecordTable, elapsed: RecordTable, user_io: RecordTable) -> Result<Self> {
        SQL_CPU_SCHEMA.validate(&cpu)?;
        SQL_ELAPSED_SCHEMA.validate(&elapsed)?;
        SQL_USER_IO_SCHEMA.validate(&user_io)?;
        Ok(SqlProcessor { cpu, elapsed, user_io })
    }

    pub fn metric_table(&self, metric: SqlMetric) -> &RecordTable {
        match metric {
            SqlMetric::Cpu => &self.cpu,
            SqlMetric::Elapsed => &self.elapsed,
            SqlMetric::UserIo => &self.user_io,
        }
    }

    fn instance_rows(&self, metric: SqlMetric, instance: u32, range: Option<&TimeRange>) -> RecordTable {
        let rows = self.metric_table(metric).filter_by_instance(instance);
        match range {
            Some(range) => rows.filter_by_date(range),
            None => rows,
        }
    }

    /// The `n` heaviest statements of each ranking for one instance.
    pub fn top_n(&self, instance: u32, n: usize, range: Option<&TimeRange>) -> Result<SqlTables> {
        let top = |metric: SqlMetric| -> Result<RecordTable> {
            let rows = self.instance_rows(metric, instance, range).top_n(metric.column(), n)?;
            Ok(rows.drop_system_info().1)
        };
        Ok(SqlTables { cpu: top(SqlMetric::Cpu)?, elapsed: top(SqlMetric::Elapsed)?, user_io: top(SqlMetric::UserIo)? })
    }

    /// Everything the three rankings say about one statement.
    pub fn query_info(&self, sql_id: &str, instance: u32, range: Option<&TimeRange>) -> Result<SqlTables> {
        let rows = |metric: SqlMetric| -> Result<RecordTable> {
            let table = self.instance_rows(metric, instance, range);
            let idx = table.column_index(SQL_ID)?;
            Ok(table.filter_rows(|r| table.cell(r, idx) == sql_id).drop_system_info().1)
        };
        Ok(SqlTables { cpu: rows(SqlMetric::Cpu)?, elapsed: rows(SqlMetric::Elapsed)?, user_io: rows(SqlMetric::UserIo)? })
    }

    /// `(snapshot, value)` of one statement in one ranking, in time order.
    pub fn query_series(
        &self,
        sql_id: &str,
        instance: u32,
        metric: SqlMetric,
        range: Option<&TimeRange>,
    ) -> Result<Vec<(NaiveDateTime, f64)>> {
        let table = self.instance_rows(metric, instance, range);
        let ids = table.text_column(SQL_ID)?;
        let values = table.numeric_column(metric.column())?;
        let mut series: Vec<(NaiveDateTime, f64)> = table
            .rows
            .iter()
            .zip(ids.iter().zip(values))
            .filter(|(_, (id, _))| **id == sql_id)
            .map(|(row, (_, v))| (row.timestamp(), v))
            .collect();
        series.sort_by_key(|(ts, _)| *ts);
        Ok(series)
    }

    /// Appearance counts of every statement in the three rankings, outer
    /// joined on SQL Id, most frequent first.
    pub fn appearance_counts(&self, instance: u32) -> Result<Vec<SqlAppearance>> {
        let mut counts: BTreeMap<String, SqlAppearance> = BTreeMap::new();
        for metric in SqlMetric::ALL {
            let table = self.instance_rows(metric, instance, None);
            for id in table.text_column(SQL_ID)? {
                let entry = counts.entry(id.to_string()).or_insert_with(|| SqlAppearance {
                    sql_id: id.to_string(),
                    cpu: None,
                    elapsed: None,
                    user_io: None,
                });
                let slot = match metric {
                    SqlMetric::Cpu => &mut entry.cpu,
                    SqlMetric::Elapsed => &mut entry.elapsed,
                    SqlMetric::UserIo => &mut entry.user_io,
                };
                *slot = Some(slot.unwrap_or(0) + 1);
            }
        }
        let mut counts: Vec<SqlAppearance> = counts.into_values().collect();
        counts.sort_by(|a, b| b.total().cmp(&a.total()).then_with(|| a.sql_id.cmp(&b.sql_id)));
        Ok(counts)
    }
}

impl TableProcessor for SqlProcessor {
    fn table(&self) -> &RecordTable {
        &self.cpu
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tablespace IO
// ─────────────────────────────────────────────────────────────────────────────
pub struct TablespaceIoProcessor {
    table: RecordTable,
    series: BTreeMap<u32, BTreeMap<String, Series>>,
}

impl TablespaceIoProcessor {
    pub fn load(dir: &Path) -> Result<Self> {
        Self::from_table(TABLESPACE_IO_SCHEMA.load(dir)?)
    }

    pub fn from_table(table: RecordTable) -> Result<Self> {
        TABLESPACE_IO_SCHEMA.validate(&table)?;
        let series = per_instance(&table, |part| group_series(part, TBS_NAME, &[TBS_READS_PER_SEC, TBS_WRITES_PER_SEC]))?;
        Ok(TablespaceIoProcessor { table, series })
    }

    /// Reads/s and writes/s of one tablespace over time.
    pub fn metric_series(&self, instance: u32, tablespace: &str) -> Option<&Series> {
        self.series.get(&instance)?.get(tablespace)
    }

    /// Tablespaces ordered by `Reads + Writes` of their busiest snapshot,
    /// cut to `top` when given.
    pub fn most_used(&self, instance: u32, top: Option<usize>) -> Result<Vec<String>> {
        let rows = self.table.filter_by_instance(instance);
        let names = rows.text_column(TBS_NAME)?;
        let reads = rows.numeric_column(TBS_READS)?;
        let writes = rows.numeric_column(TBS_WRITES)?;

        let mut order: Vec<usize> = (0..rows.len()).collect();
        order.sort_by(|&a, &b| (reads[b] + writes[b]).total_cmp(&(reads[a] + writes[a])));

        let mut used: Vec<String> = Vec::new();
        for i in order {
            if !used.iter().any(|n| n == names[i]) {
                used.push(names[i].to_string());
            }
        }
        if let Some(top) = top {
            used.truncate(top);
        }
        Ok(used)
    }

    pub fn io_rows(&self, instance: u32, range: &TimeRange) -> RecordTable {
        self.rows_for(instance, Some(range))
    }
}

impl TableProcessor for TablespaceIoProcessor {
    fn table(&self) -> &RecordTable {
        &self.table
    }
}
