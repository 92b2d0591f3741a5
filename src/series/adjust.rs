//! Post-build edits to a feature table: fades, muting windows and synthetic columns.
//!
//! Each edit consumes the table and hands it back, touching only its target
//! column and time window, so edits chain freely.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::error::{VizError, VizResult};

use super::table::{min_max_normalize, FeatureTable};

impl FeatureTable {
    /// Ramp `column` up from 0 over `start <= t < end`, scaled by `factor`.
    pub fn fade_in(mut self, column: &str, start: f64, end: f64, factor: f64) -> VizResult<Self> {
        check_window("fade_in", start, end)?;
        let times = self.index().to_vec();
        let values = self.require_mut(column, "fade_in")?;
        for (v, &t) in values.iter_mut().zip(times.iter()) {
            if t >= start && t < end {
                *v *= (t - start) / (end - start) * factor;
            }
        }
        Ok(self)
    }

    /// Ramp `column` down to 0 over `start < t < end`, scaled by `factor`.
    pub fn fade_out(mut self, column: &str, start: f64, end: f64, factor: f64) -> VizResult<Self> {
        check_window("fade_out", start, end)?;
        let times = self.index().to_vec();
        let values = self.require_mut(column, "fade_out")?;
        for (v, &t) in values.iter_mut().zip(times.iter()) {
            if t > start && t < end {
                *v *= (1.0 - (t - start) / (end - start)) * factor;
            }
        }
        Ok(self)
    }

    /// Set `column` to 0 over the closed window `start <= t <= end`.
    pub fn zero_between(mut self, column: &str, start: f64, end: f64) -> VizResult<Self> {
        if !(start.is_finite() && end.is_finite() && start <= end) {
            return Err(VizError::option("zero_between", format!("window [{start}, {end}] is empty")));
        }
        let times = self.index().to_vec();
        let values = self.require_mut(column, "zero_between")?;
        for (v, &t) in values.iter_mut().zip(times.iter()) {
            if t >= start && t <= end {
                *v = 0.0;
            }
        }
        Ok(self)
    }

    /// Add a sine LFO column; named `LFO {f:.3}Hz` unless `name` is given.
    pub fn add_sine_column(
        mut self,
        frequency_hz: f64,
        name: Option<&str>,
        normalize: bool,
    ) -> VizResult<Self> {
        if !(frequency_hz.is_finite() && frequency_hz > 0.0) {
            return Err(VizError::option("sine frequency", format!("{frequency_hz} must be > 0")));
        }
        let name = name.map_or_else(|| format!("LFO {frequency_hz:.3}Hz"), str::to_string);
        let wavelength = 1.0 / frequency_hz;
        let mut values: Vec<f64> = self
            .index()
            .iter()
            .map(|&t| (t.rem_euclid(wavelength) / wavelength * std::f64::consts::TAU).sin())
            .collect();
        if normalize {
            min_max_normalize(&mut values);
        }
        self.set_column(name, values)?;
        Ok(self)
    }

    /// Add a column of uniform [0, 1) noise from a seeded generator.
    pub fn add_noise_column(mut self, name: &str, seed: u64) -> VizResult<Self> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let values = (0..self.len()).map(|_| rng.gen::<f64>()).collect();
        self.set_column(name, values)?;
        Ok(self)
    }
}

fn check_window(what: &'static str, start: f64, end: f64) -> VizResult<()> {
    if start.is_finite() && end.is_finite() && end > start {
        Ok(())
    } else {
        Err(VizError::option(what, format!("window [{start}, {end}) is empty")))
    }
}
