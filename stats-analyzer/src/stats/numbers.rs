//! Descriptive statistics for numbers pulled out of free text.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static NUMBER: Lazy<Regex> = Lazy::new(|| {
    // This regex is compile-time constant and known to be valid
    #[allow(clippy::expect_used)]
    Regex::new(r"-?\d*\.?\d+").expect("Hard-coded regex pattern should be valid")
});

/// Quantile levels reported by [`analyze_numbers`].
pub const QUANTILE_LEVELS: [f64; 8] = [0.01, 0.025, 0.1, 0.25, 0.75, 0.9, 0.975, 0.99];

/// One reported quantile.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quantile {
    pub level: f64,
    pub value: f64,
}

/// Summary of a list of numbers. Values are rounded to two decimals; outliers
/// are reported as given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumberStats {
    pub count: usize,
    pub average: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    pub quantiles: Vec<Quantile>,
    pub iqr: f64,
    /// Values outside `[q25 - 1.5 IQR, q75 + 1.5 IQR]`, in input order
    pub outliers: Vec<f64>,
}

impl NumberStats {
    /// Reported quantile at `level`, if it is one of [`QUANTILE_LEVELS`].
    pub fn quantile(&self, level: f64) -> Option<f64> {
        self.quantiles
            .iter()
            .find(|q| (q.level - level).abs() < f64::EPSILON)
            .map(|q| q.value)
    }
}

/// Extracts signed decimal numbers from text.
///
/// Commas separate numbers rather than marking decimals, so `"1,5"` yields
/// `1` and `5`.
///
/// ```rust
/// use stats_analyzer::stats::extract_numbers;
///
/// assert_eq!(extract_numbers("spent 12.5, then -3 and .25"), vec![12.5, -3.0, 0.25]);
/// ```
pub fn extract_numbers(text: &str) -> Vec<f64> {
    let text = text.replace(',', " ");
    NUMBER
        .find_iter(&text)
        .filter_map(|m| m.as_str().parse::<f64>().ok())
        .collect()
}

/// Computes [`NumberStats`] for `values`; `None` when there are none.
pub fn analyze_numbers(values: &[f64]) -> Option<NumberStats> {
    if values.is_empty() {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let count = sorted.len();
    let average = values.iter().sum::<f64>() / count as f64;
    let median = if count % 2 == 0 {
        (sorted[count / 2 - 1] + sorted[count / 2]) / 2.0
    } else {
        sorted[count / 2]
    };

    let quantiles: Vec<Quantile> = QUANTILE_LEVELS
        .iter()
        .map(|&level| Quantile {
            level,
            value: round_to_two(interpolated_quantile(&sorted, level)),
        })
        .collect();

    let q1 = round_to_two(interpolated_quantile(&sorted, 0.25));
    let q3 = round_to_two(interpolated_quantile(&sorted, 0.75));
    let iqr = q3 - q1;
    let (lower, upper) = (q1 - 1.5 * iqr, q3 + 1.5 * iqr);
    let outliers = values
        .iter()
        .copied()
        .filter(|v| *v < lower || *v > upper)
        .collect();

    Some(NumberStats {
        count,
        average: round_to_two(average),
        median: round_to_two(median),
        min: round_to_two(sorted[0]),
        max: round_to_two(sorted[count - 1]),
        quantiles,
        iqr: round_to_two(iqr),
        outliers,
    })
}

/// Linear-interpolated quantile of sorted, non-empty data.
fn interpolated_quantile(sorted: &[f64], level: f64) -> f64 {
    let pos = level * (sorted.len() - 1) as f64;
    let (floor, ceil) = (pos.floor(), pos.ceil());
    let lower = sorted[floor as usize];
    if floor == ceil {
        return lower;
    }
    let upper = sorted[ceil as usize];
    lower + (pos - floor) * (upper - lower)
}

fn round_to_two(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
