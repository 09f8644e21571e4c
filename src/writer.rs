//! Writes extracted tables to one flat file per destination.
//!
//! Files are written one after another; each is flushed and closed before the
//! next is opened. There is no transaction across files: a failure partway
//! leaves the files already written updated and the rest untouched.
//! Two processes must not write to the same output directory at once.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use colored::Colorize;

use crate::awr::ParsedOutput;
use crate::error::{AwrError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// Add rows to existing files, header only for new ones.
    #[default]
    Append,
    /// Recreate every file.
    New,
}

impl FromStr for WriteMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "append" => Ok(WriteMode::Append),
            "new" => Ok(WriteMode::New),
            other => Err(format!("unknown mode '{}'", other)),
        }
    }
}

impl fmt::Display for WriteMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            WriteMode::Append => write!(f, "append"),
            WriteMode::New => write!(f, "new"),
        }
    }
}

impl WriteMode {
    /// Unknown modes fall back to `append` with a warning.
    pub fn from_str_lossy(s: &str) -> WriteMode {
        s.parse().unwrap_or_else(|e| {
            eprintln!("{} {}, using default ({})", "Warning!".bright_yellow(), e, WriteMode::default());
            WriteMode::default()
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteAction {
    Created,
    Updated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOutcome {
    pub path: PathBuf,
    pub action: WriteAction,
    pub lines: usize,
}

pub fn write_tables(output: &ParsedOutput, mode: WriteMode, output_dir: &Path) -> Result<Vec<WriteOutcome>> {
    fs::create_dir_all(output_dir).map_err(|e| AwrError::io(output_dir, e))?;

    let mut outcomes = Vec::with_capacity(output.len());
    for (name, lines) in output.iter() {
        let path = output_dir.join(name);
        let outcome = write_table(&path, lines, mode)?;
        match outcome.action {
            WriteAction::Created => println!("  Created: {}", name),
            WriteAction::Updated => println!("  Updated: {}", name),
        }
        debug_note!("{} {} lines to {}", mode, outcome.lines, path.display());
        outcomes.push(outcome);
    }
    Ok(outcomes)
}

fn write_table(path: &Path, lines: &[String], mode: WriteMode) -> Result<WriteOutcome> {
    // an empty file (host info of a run without hosts) has no header yet
    let has_header = fs::metadata(path).map(|m| m.is_file() && m.len() > 0).unwrap_or(false);
    let (file, action, skip) = if mode == WriteMode::Append && has_header {
        let file = OpenOptions::new().append(true).open(path).map_err(|e| AwrError::io(path, e))?;
        (file, WriteAction::Updated, 1)
    } else {
        let file = File::create(path).map_err(|e| AwrError::io(path, e))?;
        (file, WriteAction::Created, 0)
    };

    let mut writer = BufWriter::new(file);
    let mut written = 0;
    for line in lines.iter().skip(skip) {
        writeln!(writer, "{}", line).map_err(|e| AwrError::io(path, e))?;
        written += 1;
    }
    writer.flush().map_err(|e| AwrError::io(path, e))?;

    Ok(WriteOutcome { path: path.to_path_buf(), action, lines: written })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::staticdata::system_info_header;
    use crate::table::RecordTable;

    fn output() -> ParsedOutput {
        let mut out = ParsedOutput::new();
        out.insert(
            "load_profile.csv".to_string(),
            vec![
                format!("{}Name,Per Second", system_info_header()),
                "ORCL,1,ORCL,PRIMARY,orcl1,1,2024,3,15,10,0,0,2024,3,15,10,10,0,DB Time(s),10".to_string(),
                "ORCL,1,ORCL,PRIMARY,orcl1,1,2024,3,15,10,10,0,2024,3,15,10,20,0,DB Time(s),12.5".to_string(),
            ],
        );
        out
    }

    #[test]
    fn mode_parsing_falls_back_to_append() {
        assert_eq!("new".parse::<WriteMode>(), Ok(WriteMode::New));
        assert_eq!(WriteMode::from_str_lossy(" Append "), WriteMode::Append);
        assert_eq!(WriteMode::from_str_lossy("overwrite"), WriteMode::Append);
    }

    #[test]
    fn new_mode_creates_missing_directory_and_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let out_dir = dir.path().join("parsed").join("awr");
        write_tables(&output(), WriteMode::New, &out_dir).unwrap();
        let outcomes = write_tables(&output(), WriteMode::New, &out_dir).unwrap();
        assert_eq!(outcomes[0].action, WriteAction::Created);

        let content = fs::read_to_string(out_dir.join("load_profile.csv")).unwrap();
        assert_eq!(content.lines().count(), 3);
    }

    #[test]
    fn append_mode_does_not_repeat_the_header() {
        let dir = tempfile::tempdir().unwrap();
        let first = write_tables(&output(), WriteMode::Append, dir.path()).unwrap();
        assert_eq!(first[0].action, WriteAction::Created);
        let second = write_tables(&output(), WriteMode::Append, dir.path()).unwrap();
        assert_eq!(second[0].action, WriteAction::Updated);
        assert_eq!(second[0].lines, 2);

        let content = fs::read_to_string(dir.path().join("load_profile.csv")).unwrap();
        let headers = content.lines().filter(|l| l.starts_with("DB_NAME,")).count();
        assert_eq!(headers, 1);
        assert_eq!(content.lines().count(), 5);

        let table = RecordTable::read_table(&dir.path().join("load_profile.csv")).unwrap();
        assert_eq!(table.len(), 4);
    }

    #[test]
    fn append_to_an_empty_file_writes_the_header() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("load_profile.csv"), "").unwrap();
        write_tables(&output(), WriteMode::Append, dir.path()).unwrap();
        let table = RecordTable::read_table(&dir.path().join("load_profile.csv")).unwrap();
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn written_table_reads_back_with_the_same_values() {
        let dir = tempfile::tempdir().unwrap();
        let out = output();
        write_tables(&out, WriteMode::New, dir.path()).unwrap();

        let table = RecordTable::read_table(&dir.path().join("load_profile.csv")).unwrap();
        assert_eq!(table.columns, vec!["Name", "Per Second"]);
        for (row, line) in table.rows.iter().zip(out["load_profile.csv"].iter().skip(1)) {
            let fields: Vec<&str> = line.split(',').collect();
            let id = row.identity.as_ref().unwrap();
            assert_eq!(
                vec![id.db_name.as_str(), id.db_id.as_str(), id.unique_name.as_str(), id.role.as_str(), id.instance_name.as_str()],
                fields[..5].to_vec()
            );
            assert_eq!(id.instance_number.to_string(), fields[5]);
            assert_eq!(row.cells, fields[18..].to_vec());
            assert_eq!(row.window.begin.format("%Y,%-m,%-d,%-H,%-M,%-S").to_string(), fields[6..12].join(","));
            assert_eq!(row.window.end.format("%Y,%-m,%-d,%-H,%-M,%-S").to_string(), fields[12..18].join(","));
        }
    }
}
