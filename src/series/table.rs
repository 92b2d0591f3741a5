use serde::Serialize;

use crate::error::{VizError, VizResult};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Column {
    pub name: String,
    pub values: Vec<f64>,
}

/// Ordered named columns sharing one time index (seconds).
///
/// Every column has exactly one value per index entry. Column order is the
/// insertion order; replacing a column keeps its position.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FeatureTable {
    #[serde(rename = "time")]
    index: Vec<f64>,
    columns: Vec<Column>,
}

impl FeatureTable {
    /// Empty table over `index`. Timestamps must be finite and non-decreasing.
    pub fn new(index: Vec<f64>) -> VizResult<Self> {
        if index.is_empty() {
            return Err(VizError::shape("time series", "no rows"));
        }
        check_monotonic("time series index", &index)?;
        Ok(Self { index, columns: Vec::new() })
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn index(&self) -> &[f64] {
        &self.index
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns.iter().find(|c| c.name == name).map(|c| c.values.as_slice())
    }

    /// Column lookup that reports `context` when the name is missing.
    pub fn require_mut(&mut self, name: &str, context: &str) -> VizResult<&mut [f64]> {
        let known = self.position(name);
        match known {
            Some(i) => Ok(self.columns[i].values.as_mut_slice()),
            None => Err(VizError::UnknownColumn {
                context: context.to_string(),
                column: name.to_string(),
            }),
        }
    }

    /// Value at (`column` position, `row`). Positions come from [`Self::position`].
    pub fn value(&self, column: usize, row: usize) -> f64 {
        self.columns[column].values[row]
    }

    /// Insert or replace a column. Length must match the index.
    pub fn set_column(&mut self, name: impl Into<String>, values: Vec<f64>) -> VizResult<()> {
        let name = name.into();
        if values.len() != self.index.len() {
            return Err(VizError::shape(
                "column",
                format!(
                    "'{}' has {} values for {} rows",
                    name,
                    values.len(),
                    self.index.len()
                ),
            ));
        }
        match self.position(&name) {
            Some(i) => self.columns[i].values = values,
            None => self.columns.push(Column { name, values }),
        }
        Ok(())
    }

    /// Min-max normalize every column in place. Constant columns become NaN.
    pub fn normalize(&mut self) {
        for column in &mut self.columns {
            let constant = min_max_normalize(&mut column.values);
            if constant {
                log::warn!(
                    "Column '{}' has zero variance; normalized values are NaN",
                    column.name
                );
            }
        }
    }

    /// Bucket rows into fixed-width bins of `1 / rate` seconds, averaging each column.
    ///
    /// Buckets are aligned to t = 0 and labelled by their left edge. NaN inputs are
    /// skipped by the mean. A bucket with no rows carries the previous bucket's values,
    /// so the output has no gaps.
    pub fn resample_mean(&self, rate: f64) -> VizResult<Self> {
        if !(rate.is_finite() && rate > 0.0) {
            return Err(VizError::option("resample-rate", format!("{rate} is not a positive rate")));
        }
        let bucket_of = |t: f64| (t * rate + 1e-9).floor() as i64;

        let first = bucket_of(self.index[0]);
        let last = bucket_of(self.index[self.index.len() - 1]);
        let n_buckets = (last - first + 1) as usize;

        let index: Vec<f64> = (0..n_buckets).map(|b| (first + b as i64) as f64 / rate).collect();
        let rows: Vec<usize> = self.index.iter().map(|&t| (bucket_of(t) - first) as usize).collect();

        let mut empty = 0usize;
        let mut columns = Vec::with_capacity(self.columns.len());
        for column in &self.columns {
            let mut sums = vec![0.0f64; n_buckets];
            let mut counts = vec![0usize; n_buckets];
            let mut seen = vec![false; n_buckets];
            for (&bucket, &v) in rows.iter().zip(column.values.iter()) {
                seen[bucket] = true;
                if !v.is_nan() {
                    sums[bucket] += v;
                    counts[bucket] += 1;
                }
            }

            let mut values = Vec::with_capacity(n_buckets);
            for b in 0..n_buckets {
                let v = if !seen[b] && b > 0 {
                    values[b - 1]
                } else if counts[b] > 0 {
                    sums[b] / counts[b] as f64
                } else {
                    f64::NAN
                };
                values.push(v);
            }
            empty = seen.iter().filter(|s| !**s).count();
            columns.push(Column { name: column.name.clone(), values });
        }

        log::debug!(
            "Resampled {} rows into {} buckets at {:.3}Hz ({} empty buckets carried forward)",
            self.index.len(),
            n_buckets,
            rate,
            empty
        );

        Ok(Self { index, columns })
    }
}

/// Rescale to `(x - min) / (max - min)`, ignoring NaN when finding the extremes.
/// Returns true when the slice had zero variance (all outputs NaN).
pub fn min_max_normalize(values: &mut [f64]) -> bool {
    let (min, max) = values
        .iter()
        .filter(|v| !v.is_nan())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let span = max - min;
    for v in values.iter_mut() {
        *v = (*v - min) / span;
    }
    !(span > 0.0)
}

/// Trailing mean over `window` rows; the first `window - 1` rows take the first full
/// window's mean. With fewer rows than `window` every row gets the whole-series mean.
pub fn rolling_mean_backfilled(values: &[f64], window: usize) -> Vec<f64> {
    let n = values.len();
    if n == 0 {
        return Vec::new();
    }
    let window = window.clamp(1, n);

    let mut out = vec![0.0f64; n];
    let mut sum: f64 = values[..window].iter().sum();
    out[window - 1] = sum / window as f64;
    for i in window..n {
        sum += values[i] - values[i - window];
        out[i] = sum / window as f64;
    }
    let first = out[window - 1];
    out[..window - 1].fill(first);
    out
}

/// Trailing max over exactly `window` rows. Rows before the window fills, and
/// windows holding a NaN, are NaN.
pub fn rolling_max(values: &[f64], window: usize) -> Vec<f64> {
    let window = window.max(1);
    (0..values.len())
        .map(|i| {
            if i + 1 < window {
                return f64::NAN;
            }
            let slice = &values[i + 1 - window..=i];
            if slice.iter().any(|v| v.is_nan()) {
                f64::NAN
            } else {
                slice.iter().copied().fold(f64::NEG_INFINITY, f64::max)
            }
        })
        .collect()
}

pub(crate) fn check_monotonic(what: &'static str, times: &[f64]) -> VizResult<()> {
    if let Some(i) = times.iter().position(|t| !t.is_finite()) {
        return Err(VizError::shape(what, format!("non-finite timestamp at position {i}")));
    }
    if let Some(i) = times.windows(2).position(|w| w[1] < w[0]) {
        return Err(VizError::shape(
            what,
            format!(
                "timestamps decrease at position {} ({} -> {})",
                i + 1,
                times[i],
                times[i + 1]
            ),
        ));
    }
    Ok(())
}
