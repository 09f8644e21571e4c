use std::fs;
use std::path::Path;

use linked_hash_map::LinkedHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{AwrError, Result};
use crate::staticdata::*;
use crate::table::RecordTable;

/// Where rows of a recognized section end up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableTarget {
    pub destination: String,
    pub header: Option<String>,
}

/// Caption text -> destination file (+ optional header override).
#[derive(Debug, Clone, Default)]
pub struct TableRegistry {
    tables: LinkedHashMap<String, TableTarget>,
}

/// AWR puts line breaks and runs of spaces inside some `summary` attributes.
pub fn normalize_caption(caption: &str) -> String {
    caption.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl TableRegistry {
    pub fn new() -> Self {
        TableRegistry::default()
    }

    /// The registry shipped with the binary, used when no tables file is given.
    pub fn builtin() -> Self {
        let mut registry = TableRegistry::new();
        for (caption, destination, header) in DEFAULT_TABLES {
            registry.insert(caption, destination, header);
        }
        registry
    }

    pub fn insert(&mut self, caption: &str, destination: &str, header: Option<&str>) {
        self.tables.insert(
            normalize_caption(caption),
            TableTarget { destination: destination.to_string(), header: header.map(str::to_string) },
        );
    }

    /// Reads the JSON tables file: `{"<caption>": ["<file>.csv", "<header>" | null], ...}`
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path).map_err(|e| AwrError::io(path, e))?;
        Self::from_json_str(&data).map_err(|e| match e {
            AwrError::Json(e) => AwrError::Config { path: path.to_path_buf(), message: e.to_string() },
            other => other,
        })
    }

    pub fn from_json_str(data: &str) -> Result<Self> {
        let raw: LinkedHashMap<String, (String, Option<String>)> = serde_json::from_str(data)?;
        let mut registry = TableRegistry::new();
        for (caption, (destination, header)) in raw {
            let header = header.filter(|h| !h.trim().is_empty());
            registry.insert(&caption, &destination, header.as_deref());
        }
        Ok(registry)
    }

    pub fn lookup(&self, caption: &str) -> Option<&TableTarget> {
        self.tables.get(caption)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn destinations(&self) -> impl Iterator<Item = &str> {
        self.tables.values().map(|t| t.destination.as_str())
    }
}

/// Columns a processor reads from one parsed file.
#[derive(Debug, Clone, Copy)]
pub struct TableSchema {
    pub file: &'static str,
    pub columns: &'static [&'static str],
}

pub const LOAD_PROFILE_SCHEMA: TableSchema = TableSchema {
    file: LOAD_PROFILE_FILE,
    columns: &[LP_NAME, LP_PER_SECOND],
};

pub const WAIT_CLASSES_SCHEMA: TableSchema = TableSchema {
    file: WAIT_CLASSES_FILE,
    columns: &[WC_CLASS, WC_TOTAL_WAIT, WC_PCT_DBTIME],
};

pub const FOREGROUND_EVENTS_SCHEMA: TableSchema = TableSchema {
    file: FOREGROUND_EVENTS_FILE,
    columns: &[FG_EVENT],
};

pub const SQL_CPU_SCHEMA: TableSchema = TableSchema {
    file: SQL_CPU_FILE,
    columns: &[SQL_ID, SQL_CPU_TIME],
};

pub const SQL_ELAPSED_SCHEMA: TableSchema = TableSchema {
    file: SQL_ELAPSED_FILE,
    columns: &[SQL_ID, SQL_ELAPSED_TIME],
};

pub const SQL_USER_IO_SCHEMA: TableSchema = TableSchema {
    file: SQL_USER_IO_FILE,
    columns: &[SQL_ID, SQL_IO_TIME],
};

pub const TABLESPACE_IO_SCHEMA: TableSchema = TableSchema {
    file: TABLESPACE_IO_FILE,
    columns: &[TBS_NAME, TBS_READS, TBS_WRITES, TBS_READS_PER_SEC, TBS_WRITES_PER_SEC],
};

impl TableSchema {
    /// Fails on the first declared column the table doesn't have.
    pub fn validate(&self, table: &RecordTable) -> Result<()> {
        for column in self.columns {
            table.column_index(column)?;
        }
        Ok(())
    }

    pub fn load(&self, dir: &Path) -> Result<RecordTable> {
        let table = RecordTable::read_table(&dir.join(self.file))?;
        self.validate(&table)?;
        Ok(table)
    }
}
