//! Long-to-wide reshaping of per-instance tables.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDateTime;
use ndarray::{Array2, ArrayView1, Axis};
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

use crate::error::{AwrError, Result};
use crate::staticdata::WAIT_CLASSES;
use crate::table::{RecordTable, Row};

/// One category of a long table: its timestamps and, per value column, the
/// values in timestamp order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Series {
    pub timestamps: Vec<NaiveDateTime>,
    pub values: Vec<Vec<f64>>,
}

pub fn group_series(table: &RecordTable, key: &str, value_columns: &[&str]) -> Result<BTreeMap<String, Series>> {
    let key_idx = table.column_index(key)?;
    let values: Vec<Vec<f64>> = value_columns.iter().map(|c| table.numeric_column(c)).collect::<Result<_>>()?;

    let mut order: Vec<usize> = (0..table.len()).collect();
    order.sort_by_key(|&i| table.rows[i].timestamp());

    let mut groups: BTreeMap<String, Series> = BTreeMap::new();
    for i in order {
        let row = &table.rows[i];
        let series = groups.entry(table.cell(row, key_idx).to_string()).or_insert_with(|| Series {
            timestamps: Vec::new(),
            values: vec![Vec::new(); value_columns.len()],
        });
        series.timestamps.push(row.timestamp());
        for (out, column) in series.values.iter_mut().zip(&values) {
            out.push(column[i]);
        }
    }
    Ok(groups)
}

/// Wide table: one row per snapshot, one column per category.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricTable {
    pub index: Vec<NaiveDateTime>,
    pub columns: Vec<String>,
    pub data: Array2<f64>,
}

impl MetricTable {
    pub fn nrows(&self) -> usize {
        self.index.len()
    }

    pub fn column(&self, name: &str) -> Option<ArrayView1<'_, f64>> {
        let idx = self.columns.iter().position(|c| c == name)?;
        Some(self.data.column(idx))
    }

    pub fn select_rows(&self, rows: &[usize]) -> MetricTable {
        MetricTable {
            index: rows.iter().map(|&r| self.index[r]).collect(),
            columns: self.columns.clone(),
            data: self.data.select(Axis(0), rows),
        }
    }
}

impl Serialize for MetricTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let rows: Vec<Vec<f64>> = self.data.outer_iter().map(|r| r.to_vec()).collect();
        let mut state = serializer.serialize_struct("MetricTable", 3)?;
        state.serialize_field("index", &self.index)?;
        state.serialize_field("columns", &self.columns)?;
        state.serialize_field("rows", &rows)?;
        state.end()
    }
}

/// Pivots `value` by `key` over the table's distinct timestamps. Every
/// category must have exactly one value per timestamp.
pub fn aggregate(table: &RecordTable, key: &str, value: &str) -> Result<MetricTable> {
    let index = table.timestamps();
    let groups = group_series(table, key, &[value])?;

    let mut data = Array2::<f64>::zeros((index.len(), groups.len()));
    let mut columns = Vec::with_capacity(groups.len());
    for (col, (category, series)) in groups.into_iter().enumerate() {
        let mismatch = series.timestamps.len() != index.len()
            || series.timestamps.iter().zip(&index).any(|(a, b)| a != b);
        if mismatch {
            return Err(AwrError::ShapeMismatch {
                table: table.name.clone(),
                category,
                expected: index.len(),
                found: series.timestamps.len(),
            });
        }
        for (row, v) in series.values[0].iter().enumerate() {
            data[[row, col]] = *v;
        }
        columns.push(category);
    }

    Ok(MetricTable { index, columns, data })
}

/// Adds a zero-valued row for every wait class missing at a timestamp. The
/// class list is the canonical one plus anything observed in the table.
pub fn add_wait_class_placeholders(table: &RecordTable, key: &str, value: &str) -> Result<RecordTable> {
    let key_idx = table.column_index(key)?;
    let value_idx = table.column_index(value)?;

    let mut classes: Vec<String> = WAIT_CLASSES.iter().map(|c| c.to_string()).collect();
    for row in &table.rows {
        let class = table.cell(row, key_idx);
        if !classes.iter().any(|c| c == class) {
            classes.push(class.to_string());
        }
    }

    let mut present: BTreeMap<NaiveDateTime, (&Row, BTreeSet<&str>)> = BTreeMap::new();
    for row in &table.rows {
        present
            .entry(row.timestamp())
            .or_insert_with(|| (row, BTreeSet::new()))
            .1
            .insert(table.cell(row, key_idx));
    }

    let mut filled = table.clone();
    for (template, seen) in present.values() {
        for class in classes.iter().filter(|c| !seen.contains(c.as_str())) {
            let mut cells = vec![String::new(); table.columns.len()];
            cells[key_idx] = class.clone();
            cells[value_idx] = "0".to_string();
            filled.rows.push(Row { identity: template.identity.clone(), window: template.window, cells });
        }
    }
    Ok(filled)
}
