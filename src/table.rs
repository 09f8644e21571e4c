//! Parsed AWR tables as read back from the flat files.
//!
//! Every row carries the database identity and snapshot window that were
//! prefixed to it by the extractor. The identity is optional only because
//! `drop_system_info` strips it; a stripped table can no longer be
//! partitioned by instance.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::error::{AwrError, Result};
use crate::staticdata::{BEGIN_COLUMNS, END_COLUMNS, IDENTITY_COLUMNS, SYSTEM_INFO_FIELDS};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DbIdentity {
    pub db_name: String,
    pub db_id: String,
    pub unique_name: String,
    pub role: String,
    pub instance_name: String,
    pub instance_number: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SnapWindow {
    pub begin: NaiveDateTime,
    pub end: NaiveDateTime,
}

/// What `drop_system_info` hands back instead of keeping it on the table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemInfo {
    pub db_name: String,
    pub db_id: String,
    pub unique_name: String,
    pub role: String,
    pub instance_name: String,
    pub total_instances: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<DbIdentity>,
    pub window: SnapWindow,
    pub cells: Vec<String>,
}

impl Row {
    pub fn timestamp(&self) -> NaiveDateTime {
        self.window.begin
    }

    pub fn instance(&self) -> Option<u32> {
        self.identity.as_ref().map(|i| i.instance_number)
    }
}

/// Inclusive timestamp range. `start == end` selects a single snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeRange {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

const TIMESTAMP_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

impl TimeRange {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Result<Self> {
        if end < start {
            return Err(AwrError::BadTimestamp(format!("range ends at {end} before it starts at {start}")));
        }
        Ok(TimeRange { start, end })
    }

    pub fn point(ts: NaiveDateTime) -> Self {
        TimeRange { start: ts, end: ts }
    }

    pub fn parse(start: &str, end: &str) -> Result<Self> {
        TimeRange::new(parse_timestamp(start)?, parse_timestamp(end)?)
    }

    pub fn contains(&self, ts: NaiveDateTime) -> bool {
        self.start <= ts && ts <= self.end
    }
}

pub fn parse_timestamp(value: &str) -> Result<NaiveDateTime> {
    let value = value.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .ok_or_else(|| AwrError::BadTimestamp(value.to_string()))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordTable {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl RecordTable {
    pub fn empty(name: &str, columns: Vec<String>) -> Self {
        RecordTable { name: name.to_string(), columns, rows: Vec::new() }
    }

    /// Reads one flat file written by the record writer.
    pub fn read_table(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path).map_err(|e| AwrError::io(path, e))?;
        let name = path
            .file_name()
            .map(|f| f.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        Self::from_lines(&name, data.lines())
    }

    pub fn from_lines<'a>(name: &str, mut lines: impl Iterator<Item = &'a str>) -> Result<Self> {
        let header = lines.next().unwrap_or_default();
        let header: Vec<&str> = header.split(',').collect();

        // system info columns always come first, in this order
        let expected = IDENTITY_COLUMNS.iter().chain(BEGIN_COLUMNS.iter()).chain(END_COLUMNS.iter());
        for (idx, column) in expected.enumerate() {
            if header.get(idx) != Some(column) {
                return Err(AwrError::MissingSystemColumns { table: name.to_string(), column: column.to_string() });
            }
        }

        let columns: Vec<String> = header[SYSTEM_INFO_FIELDS..].iter().map(|c| c.to_string()).collect();
        let mut table = RecordTable::empty(name, columns);

        for (line_no, line) in lines.enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split(',').collect();
            if fields.len() > header.len() || fields.len() < SYSTEM_INFO_FIELDS {
                return Err(AwrError::BadRow {
                    table: name.to_string(),
                    line: line_no + 2,
                    expected: header.len(),
                    found: fields.len(),
                });
            }
            // instance numbers start at 1; a 0 would fall outside every partition
            let instance_number: u32 = parse_field(name, "INST_NUM", fields[5])?;
            if instance_number == 0 {
                return Err(AwrError::BadNumber {
                    table: name.to_string(),
                    column: "INST_NUM".to_string(),
                    value: fields[5].to_string(),
                });
            }
            let identity = DbIdentity {
                db_name: fields[0].to_string(),
                db_id: fields[1].to_string(),
                unique_name: fields[2].to_string(),
                role: fields[3].to_string(),
                instance_name: fields[4].to_string(),
                instance_number,
            };
            let begin = timestamp_from_fields(name, &BEGIN_COLUMNS, &fields[6..12])?;
            let end = timestamp_from_fields(name, &END_COLUMNS, &fields[12..18])?;
            if end < begin {
                return Err(AwrError::BadTimestamp(format!("{name}: snapshot ends at {end} before it begins at {begin}")));
            }

            // short rows are padded, the way a dataframe fills missing cells
            let mut cells: Vec<String> = fields[SYSTEM_INFO_FIELDS..].iter().map(|c| c.to_string()).collect();
            cells.resize(table.columns.len(), String::new());

            table.rows.push(Row {
                identity: Some(identity),
                window: SnapWindow { begin, end },
                cells,
            });
        }
        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, column: &str) -> Result<usize> {
        self.columns.iter().position(|c| c == column).ok_or_else(|| AwrError::UnknownColumn {
            table: self.name.clone(),
            column: column.to_string(),
        })
    }

    pub fn cell<'a>(&self, row: &'a Row, column: usize) -> &'a str {
        row.cells.get(column).map(String::as_str).unwrap_or("")
    }

    pub fn text_column(&self, column: &str) -> Result<Vec<&str>> {
        let idx = self.column_index(column)?;
        Ok(self.rows.iter().map(|r| self.cell(r, idx)).collect())
    }

    pub fn numeric_column(&self, column: &str) -> Result<Vec<f64>> {
        let idx = self.column_index(column)?;
        self.rows.iter().map(|r| parse_field(&self.name, column, self.cell(r, idx))).collect()
    }

    /// Sorted distinct snapshot begin times.
    pub fn timestamps(&self) -> Vec<NaiveDateTime> {
        let mut ts: Vec<NaiveDateTime> = self.rows.iter().map(Row::timestamp).collect();
        ts.sort();
        ts.dedup();
        ts
    }

    fn with_rows(&self, rows: Vec<Row>) -> RecordTable {
        RecordTable { name: self.name.clone(), columns: self.columns.clone(), rows }
    }

    pub fn filter_rows(&self, keep: impl Fn(&Row) -> bool) -> RecordTable {
        self.with_rows(self.rows.iter().filter(|r| keep(r)).cloned().collect())
    }

    pub fn filter_by_date(&self, range: &TimeRange) -> RecordTable {
        self.filter_rows(|r| range.contains(r.timestamp()))
    }

    pub fn filter_by_instance(&self, instance: u32) -> RecordTable {
        self.filter_rows(|r| r.instance() == Some(instance))
    }

    fn require_system_info(&self) -> Result<()> {
        if self.rows.iter().any(|r| r.identity.is_none()) {
            return Err(AwrError::SystemInfoDropped { table: self.name.clone() });
        }
        Ok(())
    }

    /// Highest instance number in the table; `0` for an empty table.
    pub fn instance_count(&self) -> Result<u32> {
        self.require_system_info()?;
        Ok(self.rows.iter().filter_map(Row::instance).max().unwrap_or(0))
    }

    /// One sub-table per instance number in `1..=max(INST_NUM)`.
    pub fn split_by_instance(&self) -> Result<BTreeMap<u32, RecordTable>> {
        let total = self.instance_count()?;
        let mut parts: BTreeMap<u32, RecordTable> =
            (1..=total).map(|i| (i, self.with_rows(Vec::new()))).collect();
        for row in &self.rows {
            if let Some(part) = row.instance().and_then(|i| parts.get_mut(&i)) {
                part.rows.push(row.clone());
            }
        }
        Ok(parts)
    }

    /// Strips the identity from every row and returns it separately.
    pub fn drop_system_info(&self) -> (Option<SystemInfo>, RecordTable) {
        let total = self.rows.iter().filter_map(Row::instance).max().unwrap_or(0);
        let info = self.rows.iter().find_map(|r| r.identity.as_ref()).map(|id| SystemInfo {
            db_name: id.db_name.clone(),
            db_id: id.db_id.clone(),
            unique_name: id.unique_name.clone(),
            role: id.role.clone(),
            instance_name: id.instance_name.clone(),
            total_instances: total,
        });
        let rows = self.rows.iter().map(|r| Row { identity: None, ..r.clone() }).collect();
        (info, self.with_rows(rows))
    }

    /// Keeps only the given columns, in the given order.
    pub fn project(&self, columns: &[&str]) -> Result<RecordTable> {
        let idx: Vec<usize> = columns.iter().map(|c| self.column_index(c)).collect::<Result<_>>()?;
        let rows = self
            .rows
            .iter()
            .map(|r| Row { cells: idx.iter().map(|&i| self.cell(r, i).to_string()).collect(), ..r.clone() })
            .collect();
        Ok(RecordTable {
            name: self.name.clone(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows,
        })
    }

    /// Rows sorted by a numeric column, largest first, cut to `n`.
    pub fn top_n(&self, column: &str, n: usize) -> Result<RecordTable> {
        let values = self.numeric_column(column)?;
        let mut order: Vec<usize> = (0..self.rows.len()).collect();
        order.sort_by(|&a, &b| values[b].total_cmp(&values[a]));
        Ok(self.with_rows(order.into_iter().take(n).map(|i| self.rows[i].clone()).collect()))
    }

    /// Distinct identities, in order of first appearance.
    pub fn identities(&self) -> Vec<DbIdentity> {
        let mut seen: Vec<DbIdentity> = Vec::new();
        for id in self.rows.iter().filter_map(|r| r.identity.as_ref()) {
            if !seen.contains(id) {
                seen.push(id.clone());
            }
        }
        seen
    }
}

fn parse_field<T: FromStr>(table: &str, column: &str, value: &str) -> Result<T> {
    T::from_str(value.trim()).map_err(|_| AwrError::BadNumber {
        table: table.to_string(),
        column: column.to_string(),
        value: value.to_string(),
    })
}

fn timestamp_from_fields(table: &str, names: &[&str; 6], fields: &[&str]) -> Result<NaiveDateTime> {
    let mut parts = [0u32; 6];
    for (i, (name, value)) in names.iter().zip(fields).enumerate() {
        parts[i] = parse_field(table, name, value)?;
    }
    NaiveDate::from_ymd_opt(parts[0] as i32, parts[1], parts[2])
        .and_then(|d| d.and_hms_opt(parts[3], parts[4], parts[5]))
        .ok_or_else(|| AwrError::BadTimestamp(fields.join(",")))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::staticdata::system_info_header;

    pub fn line(inst: u32, hour: u32, minute: u32, rest: &str) -> String {
        format!(
            "ORCL,1234,ORCL,PRIMARY,orcl{inst},{inst},2024,3,15,{hour},{minute},0,2024,3,15,{hour},{end},0,{rest}",
            end = minute + 10
        )
    }

    pub fn table_from(name: &str, columns: &str, rows: &[String]) -> RecordTable {
        let header = format!("{}{}", system_info_header(), columns);
        let lines = std::iter::once(header.as_str()).chain(rows.iter().map(String::as_str));
        RecordTable::from_lines(name, lines).unwrap()
    }

    fn two_instances() -> RecordTable {
        table_from(
            "load_profile.csv",
            "Name,Per Second",
            &[
                line(1, 10, 0, "DB Time(s),10"),
                line(2, 10, 0, "DB Time(s),20"),
                line(1, 10, 10, "DB Time(s),11"),
                line(2, 10, 10, "DB Time(s),21"),
                line(1, 10, 20, "DB Time(s),12"),
            ],
        )
    }

    #[test]
    fn rows_get_identity_and_snapshot_window() {
        let table = two_instances();
        assert_eq!(table.columns, vec!["Name", "Per Second"]);
        let row = &table.rows[1];
        assert_eq!(row.instance(), Some(2));
        assert_eq!(row.identity.as_ref().unwrap().instance_name, "orcl2");
        assert_eq!(row.timestamp(), parse_timestamp("2024-03-15 10:00:00").unwrap());
        assert_eq!(row.window.end, parse_timestamp("2024-03-15 10:10:00").unwrap());
    }

    #[test]
    fn partition_is_total_and_disjoint() {
        let table = two_instances();
        let parts = table.split_by_instance().unwrap();
        assert_eq!(parts.keys().copied().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(parts[&1].len(), 3);
        assert_eq!(parts[&2].len(), 2);

        let total: usize = parts.values().map(RecordTable::len).sum();
        assert_eq!(total, table.len());
        for row in &table.rows {
            let owners = parts.values().filter(|p| p.rows.contains(row)).count();
            assert_eq!(owners, 1);
        }
        for (inst, part) in &parts {
            assert!(part.rows.iter().all(|r| r.instance() == Some(*inst)));
        }
    }

    #[test]
    fn missing_instance_numbers_get_empty_partitions() {
        let table = table_from("t", "Name,Per Second", &[line(3, 10, 0, "x,1")]);
        let parts = table.split_by_instance().unwrap();
        assert_eq!(parts.len(), 3);
        assert!(parts[&1].is_empty() && parts[&2].is_empty());
        assert_eq!(parts[&3].len(), 1);
    }

    #[test]
    fn instance_number_zero_is_rejected() {
        let header = format!("{}Name,Per Second", system_info_header());
        let zero = line(0, 10, 0, "DB Time(s),10");
        let one = line(1, 10, 0, "DB Time(s),11");
        let lines = [header.as_str(), zero.as_str(), one.as_str()];
        let err = RecordTable::from_lines("load_profile.csv", lines.into_iter()).unwrap_err();
        assert!(matches!(err, AwrError::BadNumber { ref column, ref value, .. } if column == "INST_NUM" && value == "0"));
    }

    #[test]
    fn reversed_range_is_rejected() {
        let err = TimeRange::parse("2024-03-15 10:10:00", "2024-03-15 10:00:00").unwrap_err();
        assert!(matches!(err, AwrError::BadTimestamp(_)));
        assert!(TimeRange::parse("2024-03-15 10:00:00", "2024-03-15 10:00:00").is_ok());
    }

    #[test]
    fn stripped_table_cannot_be_partitioned() {
        let (info, stripped) = two_instances().drop_system_info();
        let info = info.unwrap();
        assert_eq!(info.total_instances, 2);
        assert_eq!(info.db_name, "ORCL");
        assert!(matches!(stripped.split_by_instance(), Err(AwrError::SystemInfoDropped { .. })));
    }

    #[test]
    fn date_filter_is_inclusive() {
        let table = two_instances();
        let range = TimeRange::parse("2024-03-15 10:00:00", "2024-03-15 10:10:00").unwrap();
        assert_eq!(table.filter_by_date(&range).len(), 4);

        let point = TimeRange::point(parse_timestamp("2024-03-15 10:20:00").unwrap());
        let rows = table.filter_by_date(&point).filter_by_instance(1);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows.rows[0].cells[1], "12");
    }

    #[test]
    fn header_without_system_info_is_rejected() {
        let lines = ["Name,Per Second", "DB Time(s),10"];
        let err = RecordTable::from_lines("t", lines.into_iter()).unwrap_err();
        assert!(matches!(err, AwrError::MissingSystemColumns { .. }));
    }

    #[test]
    fn unknown_column_fails_fast() {
        let err = two_instances().numeric_column("CPU Time (s)").unwrap_err();
        assert!(matches!(err, AwrError::UnknownColumn { ref column, .. } if column == "CPU Time (s)"));
    }

    #[test]
    fn top_n_orders_by_value_descending() {
        let top = two_instances().top_n("Per Second", 2).unwrap();
        let values: Vec<&str> = top.text_column("Per Second").unwrap();
        assert_eq!(values, vec!["21", "20"]);
    }
}
