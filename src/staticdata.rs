// Captions, canonical category lists and default column names.
//
// AWR sections are recognized by the `summary` attribute of their <table>.
// Everything here is compared after whitespace normalization (see
// `registry::normalize_caption`).

// ─────────────────────────────────────────────────────────────────────────────
// Sections folded into the per-report base prefix (never emitted as tables)
// ─────────────────────────────────────────────────────────────────────────────
pub const INSTANCE_INFO_CAPTION: &str = "This table displays database instance information";
pub const SNAPSHOT_INFO_CAPTION: &str = "This table displays snapshot information";
pub const HOST_INFO_CAPTION: &str = "This table displays host information";

// ─────────────────────────────────────────────────────────────────────────────
// Output files
// ─────────────────────────────────────────────────────────────────────────────
pub const HOST_INFO_FILE: &str = "host_info.csv";
pub const HOST_INFO_HEADER: &str = "Host Name,Platform,CPUs,Cores,Sockets,Memory";

pub const LOAD_PROFILE_FILE: &str = "load_profile.csv";
pub const WAIT_CLASSES_FILE: &str = "wait_classes.csv";
pub const FOREGROUND_EVENTS_FILE: &str = "foreground_events_wait.csv";
pub const SQL_CPU_FILE: &str = "sql_cpu.csv";
pub const SQL_ELAPSED_FILE: &str = "sql_elapsed.csv";
pub const SQL_USER_IO_FILE: &str = "sql_user_io.csv";
pub const TABLESPACE_IO_FILE: &str = "tablespace_io.csv";

/// Default registry: (caption, destination, header override).
pub const DEFAULT_TABLES: [(&str, &str, Option<&str>); 7] = [
    (
        "This table displays load profile",
        LOAD_PROFILE_FILE,
        Some("Name,Per Second,Per Transaction,Per Exec,Per Call"),
    ),
    ("This table displays foreground wait class statistics", WAIT_CLASSES_FILE, None),
    ("This table displays top 10 wait events by total wait time", FOREGROUND_EVENTS_FILE, None),
    ("This table displays top SQL by CPU time", SQL_CPU_FILE, None),
    ("This table displays top SQL by elapsed time", SQL_ELAPSED_FILE, None),
    ("This table displays top SQL by user I/O time", SQL_USER_IO_FILE, None),
    ("This table displays tablespace IO statistics", TABLESPACE_IO_FILE, None),
];

// ─────────────────────────────────────────────────────────────────────────────
// System info columns prefixed to every extracted row
// ─────────────────────────────────────────────────────────────────────────────
pub const IDENTITY_COLUMNS: [&str; 6] = ["DB_NAME", "DB_ID", "UNIQUE_NAME", "ROLE", "INSTANCE_NAME", "INST_NUM"];
pub const BEGIN_COLUMNS: [&str; 6] = ["B_Y", "B_MO", "B_D", "B_H", "B_MI", "B_S"];
pub const END_COLUMNS: [&str; 6] = ["E_Y", "E_MO", "E_D", "E_H", "E_MI", "E_S"];
pub const SYSTEM_INFO_FIELDS: usize = 18;

pub fn system_info_header() -> String {
    let mut header = IDENTITY_COLUMNS
        .iter()
        .chain(BEGIN_COLUMNS.iter())
        .chain(END_COLUMNS.iter())
        .copied()
        .collect::<Vec<_>>()
        .join(",");
    header.push(',');
    header
}

// ─────────────────────────────────────────────────────────────────────────────
// Wait classes - not every class shows up in every snapshot
// ─────────────────────────────────────────────────────────────────────────────
pub const WAIT_CLASSES: [&str; 13] = [
    "Administrative",
    "Application",
    "Cluster",
    "Commit",
    "Concurrency",
    "Configuration",
    "DB CPU",
    "Idle",
    "Network",
    "Other",
    "Scheduler",
    "System I/O",
    "User I/O",
];

// ─────────────────────────────────────────────────────────────────────────────
// Columns read by the processors
// ─────────────────────────────────────────────────────────────────────────────
pub const LP_NAME: &str = "Name";
pub const LP_PER_SECOND: &str = "Per Second";

pub const WC_CLASS: &str = "Wait Class";
pub const WC_TOTAL_WAIT: &str = "Total Wait Time (sec)";
pub const WC_PCT_DBTIME: &str = "% DB time";

pub const FG_EVENT: &str = "Event";

pub const SQL_ID: &str = "SQL Id";
pub const SQL_CPU_TIME: &str = "CPU Time (s)";
pub const SQL_ELAPSED_TIME: &str = "Elapsed Time (s)";
pub const SQL_IO_TIME: &str = "User I/O Time (s)";

pub const TBS_NAME: &str = "Tablespace";
pub const TBS_READS: &str = "Reads";
pub const TBS_WRITES: &str = "Writes";
pub const TBS_READS_PER_SEC: &str = "Av Rds/s";
pub const TBS_WRITES_PER_SEC: &str = "Writes avg/s";

/// Load profile metrics analysed when the user doesn't pick any.
pub const DEFAULT_METRICS: [&str; 4] = ["DB Time(s)", "Hard parses (SQL)", "Read IO (MB)", "Write IO (MB)"];
