/// One analysis frame, aligned to the onset grid.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FeatureSample {
    /// Seconds from the start of the track
    pub time: f64,
    pub onset: f64,
    /// Spectral centroid (Hz)
    pub spectral_centroid: f64,
    pub rms: f64,
}

/// A feature sampled on its own time grid (hop may differ from the onset grid).
#[derive(Clone, Debug, Default)]
pub struct FeatureTrack {
    pub times: Vec<f64>,
    pub values: Vec<f64>,
}

impl FeatureTrack {
    pub fn new(times: Vec<f64>, values: Vec<f64>) -> Self {
        Self { times, values }
    }

    /// Linear interpolation at `t`, clamped to the first/last value outside the span.
    /// Expects a non-empty track with equal-length, non-decreasing times.
    pub fn value_at(&self, t: f64) -> f64 {
        let n = self.times.len();
        if t <= self.times[0] {
            return self.values[0];
        }
        if t >= self.times[n - 1] {
            return self.values[n - 1];
        }

        let idx = self.times.partition_point(|&x| x <= t);
        let (t0, t1) = (self.times[idx - 1], self.times[idx]);
        let (v0, v1) = (self.values[idx - 1], self.values[idx]);
        if t1 > t0 {
            v0 + (v1 - v0) * (t - t0) / (t1 - t0)
        } else {
            v0
        }
    }
}

/// Everything the extractor hands to the series builder.
#[derive(Clone, Debug, Default)]
pub struct ExtractedFeatures {
    pub onset_envelope: Vec<f64>,
    pub onset_times: Vec<f64>,
    pub spectral_centroid: FeatureTrack,
    pub rms: FeatureTrack,
    /// Sorted ascending, duplicates allowed
    pub beat_times: Vec<f64>,
    pub duration: f64,
    pub tempo_bpm: f64,
}
