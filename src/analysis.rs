//! Everything an external renderer needs, computed from one parsed directory.

use std::fs;
use std::path::{Path, PathBuf};

use colored::Colorize;
use prettytable::{Cell, Row, Table};
use serde::Serialize;

use crate::aggregate::MetricTable;
use crate::anomalies::OutlierMethod;
use crate::correlate::{CriticalBundle, Correlator};
use crate::error::{AwrError, Result};
use crate::processors::*;
use crate::registry::*;
use crate::staticdata::{HOST_INFO_FILE, SQL_ID};
use crate::table::{DbIdentity, RecordTable, TimeRange};

/// Most used tablespaces listed per instance.
const TOP_TABLESPACES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AnalysisSettings {
    pub method: OutlierMethod,
    pub top_n: usize,
    /// Only snapshots starting inside this range are analysed.
    pub range: Option<TimeRange>,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        AnalysisSettings { method: OutlierMethod::default(), top_n: 10, range: None }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostInfo {
    pub host_name: String,
    pub platform: String,
    pub cpus: String,
    pub cores: String,
    pub sockets: String,
    pub memory: String,
}

/// Reads `host_info.csv`; a missing file means no host information.
/// Appended runs repeat their hosts, so only the first line per host name is kept.
pub fn read_hosts(dir: &Path) -> Result<Vec<HostInfo>> {
    let path = dir.join(HOST_INFO_FILE);
    if !path.is_file() {
        return Ok(Vec::new());
    }
    let data = fs::read_to_string(&path).map_err(|e| AwrError::io(&path, e))?;
    let mut hosts: Vec<HostInfo> = Vec::new();
    for line in data.lines().skip(1).filter(|l| !l.trim().is_empty()) {
        let mut f = line.split(',').map(str::to_string);
        let mut next = || f.next().unwrap_or_default();
        let host = HostInfo {
            host_name: next(),
            platform: next(),
            cpus: next(),
            cores: next(),
            sockets: next(),
            memory: next(),
        };
        if !hosts.iter().any(|h| h.host_name == host.host_name) {
            hosts.push(host);
        }
    }
    Ok(hosts)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricReport {
    pub metric: String,
    pub peaks: MetricTable,
    pub bundles: Vec<CriticalBundle>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstanceReport {
    pub instance: u32,
    pub load_profile: Option<MetricTable>,
    pub wait_classes: Option<MetricTable>,
    pub metrics: Vec<MetricReport>,
    pub most_used_tablespaces: Vec<String>,
    pub sql_appearances: Vec<SqlAppearance>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub generated: String,
    pub settings: AnalysisSettings,
    pub databases: Vec<DbIdentity>,
    pub hosts: Vec<HostInfo>,
    pub instances: Vec<InstanceReport>,
}

impl AnalysisReport {
    pub fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| AwrError::io(parent, e))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|e| AwrError::io(path, e))?;
        debug_note!("analysis written to {}", path.display());
        Ok(())
    }

    /// Console summary of all flagged snapshots, mirrored to `logfile`.
    pub fn print_summary(&self, logfile: &Path, quiet: bool) {
        let mut table = Table::new();
        table.set_titles(Row::new(vec![
            Cell::new("Instance"),
            Cell::new("Metric"),
            Cell::new("Snapshot begin"),
            Cell::new("Value"),
            Cell::new("Top SQL (CPU)"),
        ]));

        let mut flagged = 0;
        for inst in &self.instances {
            for metric in &inst.metrics {
                let values = metric.peaks.column(&metric.metric);
                for (row, ts) in metric.peaks.index.iter().enumerate() {
                    let value = values.as_ref().map(|v| format!("{:.2}", v[row])).unwrap_or_default();
                    let top_sql = metric
                        .bundles
                        .iter()
                        .find(|b| b.range.start == *ts)
                        .and_then(|b| b.top_cpu.text_column(SQL_ID).ok())
                        .and_then(|ids| ids.first().map(|id| id.to_string()))
                        .unwrap_or_default();
                    table.add_row(Row::new(vec![
                        Cell::new(&inst.instance.to_string()),
                        Cell::new(&metric.metric),
                        Cell::new(&ts.to_string()),
                        Cell::new(&value),
                        Cell::new(&top_sql),
                    ]));
                    flagged += 1;
                }
            }
        }

        make_notes!(logfile, quiet, 0, "\n{}\n", "==== ANOMALIES ===".bright_cyan());
        make_notes!(logfile, quiet, 0, "Method: {}\n", self.settings.method);
        if flagged == 0 {
            make_notes!(logfile, quiet, 0, "{}\n", "No anomalies found".green());
            return;
        }
        for table_line in table.to_string().lines() {
            make_notes!(logfile, quiet, 0, "{}\n", table_line);
        }
    }
}

/// Loaded processors of one parsed directory.
pub struct Analysis {
    dir: PathBuf,
    settings: AnalysisSettings,
    load_profile: LoadProfileProcessor,
    wait_classes: Option<WaitClassProcessor>,
    foreground_events: Option<ForegroundEventProcessor>,
    sql: Option<SqlProcessor>,
    tablespace_io: Option<TablespaceIoProcessor>,
    hosts: Vec<HostInfo>,
}

fn restrict(table: RecordTable, range: Option<&TimeRange>) -> RecordTable {
    match range {
        Some(range) => table.filter_by_date(range),
        None => table,
    }
}

/// Loads a section that an analysis can do without.
fn optional<P>(
    dir: &Path,
    schema: &TableSchema,
    range: Option<&TimeRange>,
    build: impl FnOnce(&Path, Option<&TimeRange>) -> Result<P>,
) -> Result<Option<P>> {
    if !dir.join(schema.file).is_file() {
        eprintln!("{} {} not found in {}", "Warning!".bright_yellow(), schema.file, dir.display());
        return Ok(None);
    }
    build(dir, range).map(Some)
}

impl Analysis {
    pub fn load(dir: &Path, settings: AnalysisSettings) -> Result<Self> {
        println!("{}", "\n==== ANALYSING PARSED TABLES ===".bright_cyan());
        let range = settings.range.as_ref();

        let load_profile = LOAD_PROFILE_SCHEMA.load(dir)?;
        let load_profile = LoadProfileProcessor::from_table(restrict(load_profile, range))?;

        let wait_classes = optional(dir, &WAIT_CLASSES_SCHEMA, range, |d, r| {
            WaitClassProcessor::from_table(restrict(WAIT_CLASSES_SCHEMA.load(d)?, r))
        })?;
        let foreground_events = optional(dir, &FOREGROUND_EVENTS_SCHEMA, range, |d, r| {
            ForegroundEventProcessor::from_table(restrict(FOREGROUND_EVENTS_SCHEMA.load(d)?, r))
        })?;
        let sql = optional(dir, &SQL_CPU_SCHEMA, range, |d, r| {
            let (cpu, elapsed, user_io) = (
                SQL_CPU_SCHEMA.load(d)?,
                SQL_ELAPSED_SCHEMA.load(d)?,
                SQL_USER_IO_SCHEMA.load(d)?,
            );
            SqlProcessor::from_tables(restrict(cpu, r), restrict(elapsed, r), restrict(user_io, r))
        })?;
        let tablespace_io = optional(dir, &TABLESPACE_IO_SCHEMA, range, |d, r| {
            TablespaceIoProcessor::from_table(restrict(TABLESPACE_IO_SCHEMA.load(d)?, r))
        })?;
        let hosts = read_hosts(dir)?;

        debug_note!("analysis of {} with {} instances", dir.display(), load_profile.instances());
        Ok(Analysis {
            dir: dir.to_path_buf(),
            settings,
            load_profile,
            wait_classes,
            foreground_events,
            sql,
            tablespace_io,
            hosts,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn instances(&self) -> u32 {
        self.load_profile.instances()
    }

    pub fn load_profile(&self) -> &LoadProfileProcessor {
        &self.load_profile
    }

    pub fn wait_classes(&self) -> Option<&WaitClassProcessor> {
        self.wait_classes.as_ref()
    }

    pub fn sql(&self) -> Option<&SqlProcessor> {
        self.sql.as_ref()
    }

    pub fn tablespace_io(&self) -> Option<&TablespaceIoProcessor> {
        self.tablespace_io.as_ref()
    }

    pub fn hosts(&self) -> &[HostInfo] {
        &self.hosts
    }

    /// Aggregated load profile of one instance.
    pub fn aggregated(&self, instance: u32) -> Option<&MetricTable> {
        self.load_profile.aggregated(instance)
    }

    pub fn anomalies(&self, instance: u32, metric: &str) -> Option<MetricTable> {
        self.load_profile.find_peaks_instance(instance, Some(metric), &self.settings.method)
    }

    pub fn correlator(&self) -> Result<Correlator<'_>> {
        let missing = |schema: &TableSchema| AwrError::MissingTable(schema.file.to_string());
        Ok(Correlator {
            sql: self.sql.as_ref().ok_or_else(|| missing(&SQL_CPU_SCHEMA))?,
            wait_classes: self.wait_classes.as_ref().ok_or_else(|| missing(&WAIT_CLASSES_SCHEMA))?,
            foreground_events: self.foreground_events.as_ref().ok_or_else(|| missing(&FOREGROUND_EVENTS_SCHEMA))?,
            tablespace_io: self.tablespace_io.as_ref().ok_or_else(|| missing(&TABLESPACE_IO_SCHEMA))?,
        })
    }

    pub fn bundle(&self, instance: u32, range: &TimeRange) -> Result<CriticalBundle> {
        self.correlator()?.bundle(instance, range, self.settings.top_n)
    }

    fn bundles(&self, instance: u32, peaks: &MetricTable) -> Vec<CriticalBundle> {
        let bundles = self.correlator().and_then(|c| c.bundles_for(instance, &peaks.index, self.settings.top_n));
        match bundles {
            Ok(bundles) => bundles,
            Err(e) => {
                eprintln!("{} instance {}: {}", "Error!".bright_red(), instance, e);
                Vec::new()
            }
        }
    }

    /// Full analysis of the given load profile metrics. Metrics that can't be
    /// analysed for an instance are reported and left out.
    pub fn report(&self, metrics: &[&str]) -> AnalysisReport {
        let mut instances = Vec::new();
        for instance in 1..=self.instances() {
            println!("  Instance {}", instance.to_string().bright_magenta());
            let mut metric_reports = Vec::new();
            for metric in metrics {
                let peaks = match self.anomalies(instance, metric) {
                    Some(peaks) => peaks,
                    None => continue,
                };
                let bundles = self.bundles(instance, &peaks);
                metric_reports.push(MetricReport { metric: metric.to_string(), peaks, bundles });
            }

            let most_used_tablespaces = self
                .tablespace_io
                .as_ref()
                .and_then(|t| t.most_used(instance, Some(TOP_TABLESPACES)).ok())
                .unwrap_or_default();
            let sql_appearances =
                self.sql.as_ref().and_then(|s| s.appearance_counts(instance).ok()).unwrap_or_default();

            instances.push(InstanceReport {
                instance,
                load_profile: self.aggregated(instance).cloned(),
                wait_classes: self.wait_classes.as_ref().and_then(|w| w.aggregated(instance)).cloned(),
                metrics: metric_reports,
                most_used_tablespaces,
                sql_appearances,
            });
        }

        AnalysisReport {
            generated: crate::tools::get_timestamp(),
            settings: self.settings,
            databases: self.load_profile.table().identities(),
            hosts: self.hosts.clone(),
            instances,
        }
    }
}
