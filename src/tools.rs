use chrono::Local;
use ndarray::{Array1, Axis};
use ndarray_stats::interpolate::Linear;
use ndarray_stats::QuantileExt;
use noisy_float::types::N64;
use serde::Serialize;

/// Local time used to tag trace lines.
pub fn get_timestamp() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SeriesStats {
    pub samples: usize,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl SeriesStats {
    pub fn iqr(&self) -> f64 {
        self.q3 - self.q1
    }
}

pub fn mean(data: &[f64]) -> Option<f64> {
    match data.len() {
        0 => None,
        count => Some(data.iter().sum::<f64>() / count as f64),
    }
}

/// Population standard deviation.
pub fn std_deviation(data: &[f64]) -> Option<f64> {
    let data_mean = mean(data)?;
    let variance = data
        .iter()
        .map(|value| {
            let diff = data_mean - value;
            diff * diff
        })
        .sum::<f64>()
        / data.len() as f64;
    Some(variance.sqrt())
}

/// Descriptive statistics of the finite values in `data`.
/// Quartiles use linear interpolation between closest ranks.
pub fn get_statistics(data: &[f64]) -> Option<SeriesStats> {
    let finite: Vec<f64> = data.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return None;
    }

    let arr = Array1::from(finite);
    let mean = arr.mean()?;
    let std_dev = arr.std(0.0);
    let min = arr.fold(f64::INFINITY, |acc, &x| acc.min(x));
    let max = arr.fold(f64::NEG_INFINITY, |acc, &x| acc.max(x));

    // noisy_float gives us the total order ndarray-stats wants for quantiles
    let mut arr_n64: Array1<N64> = arr.mapv(N64::new);
    let mut quantile = |q: f64| -> Option<f64> {
        arr_n64
            .quantile_axis_mut(Axis(0), N64::new(q), &Linear)
            .ok()
            .map(|v| v.into_scalar().raw())
    };
    let q1 = quantile(0.25)?;
    let median = quantile(0.5)?;
    let q3 = quantile(0.75)?;

    Some(SeriesStats { samples: arr.len(), min, q1, median, q3, max, mean, std_dev })
}
