use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::aggregate::MetricTable;
use crate::tools::get_statistics;

pub const DEFAULT_IQR_K: f64 = 1.5;
pub const DEFAULT_ZSCORE_THRESHOLD: f64 = 1.0;

/// How a value is judged an outlier within its own series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum OutlierMethod {
    /// Outside `[Q1 - k*IQR, Q3 + k*IQR]`.
    Iqr { k: f64 },
    /// `|x - mean| / std > threshold`, population standard deviation.
    ZScore { threshold: f64 },
}

impl Default for OutlierMethod {
    fn default() -> Self {
        OutlierMethod::Iqr { k: DEFAULT_IQR_K }
    }
}

impl FromStr for OutlierMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "iqr" => Ok(OutlierMethod::Iqr { k: DEFAULT_IQR_K }),
            "zscore" | "z-score" => Ok(OutlierMethod::ZScore { threshold: DEFAULT_ZSCORE_THRESHOLD }),
            other => Err(format!("unknown outlier method '{}' (expected iqr or zscore)", other)),
        }
    }
}

impl fmt::Display for OutlierMethod {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            OutlierMethod::Iqr { k } => write!(f, "IQR (k = {})", k),
            OutlierMethod::ZScore { threshold } => write!(f, "z-score (threshold = {})", threshold),
        }
    }
}

impl OutlierMethod {
    /// Same method with another k / threshold.
    pub fn with_sensitivity(self, sensitivity: f64) -> Self {
        match self {
            OutlierMethod::Iqr { .. } => OutlierMethod::Iqr { k: sensitivity },
            OutlierMethod::ZScore { .. } => OutlierMethod::ZScore { threshold: sensitivity },
        }
    }

    /// One flag per value. A series with fewer than two finite points or
    /// without any spread has no outliers; NaN and infinities are never flagged.
    pub fn labels(&self, values: &[f64]) -> Vec<bool> {
        let mut flags = vec![false; values.len()];
        let stats = match get_statistics(values) {
            Some(s) if s.samples >= 2 && s.std_dev > 0.0 => s,
            _ => return flags,
        };

        let is_outlier = |v: f64| match *self {
            OutlierMethod::Iqr { k } => {
                let spread = k * stats.iqr();
                v < stats.q1 - spread || v > stats.q3 + spread
            }
            OutlierMethod::ZScore { threshold } => ((v - stats.mean) / stats.std_dev).abs() > threshold,
        };

        for (flag, &v) in flags.iter_mut().zip(values) {
            *flag = v.is_finite() && is_outlier(v);
        }
        flags
    }

    /// Rows of `table` whose `metric` value is an outlier, all columns kept.
    /// `None` when the table has no such column.
    pub fn find_anomalies(&self, table: &MetricTable, metric: &str) -> Option<MetricTable> {
        let values = table.column(metric)?.to_vec();
        let rows: Vec<usize> = self
            .labels(&values)
            .into_iter()
            .enumerate()
            .filter_map(|(i, flagged)| flagged.then_some(i))
            .collect();
        Some(table.select_rows(&rows))
    }
}
