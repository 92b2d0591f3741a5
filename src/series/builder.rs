use crate::audio::features::{ExtractedFeatures, FeatureSample};
use crate::error::{VizError, VizResult};

use super::decay::beat_decay;
use super::table::{check_monotonic, min_max_normalize, rolling_max, rolling_mean_backfilled, FeatureTable};

pub const ONSET: &str = "Onset";
pub const SPECTRAL_CENTROID: &str = "Spectral Centroid";
pub const RMS: &str = "RMS";
pub const CENTROID_ROLLING_MEAN: &str = "Spectral Centroid Rolling Mean";
pub const BEATS_WITH_DECAY: &str = "Beats With Decay";

/// Trailing rows inspected when gating beats by onset strength.
const GATE_WINDOW: usize = 5;

/// Knobs for [`build_feature_series`].
#[derive(Clone, Debug, PartialEq)]
pub struct SeriesOptions {
    pub resample: bool,
    /// Output rows per second when resampling
    pub resample_rate: f64,
    pub rolling_window: usize,
    pub beat_decay_frames: usize,
    /// Normalized onset level below which beat decay is suppressed (0.0-1.0)
    pub beat_onset_threshold: f64,
    pub normalize: bool,
}

impl Default for SeriesOptions {
    fn default() -> Self {
        Self {
            resample: true,
            resample_rate: 24.0,
            rolling_window: 48,
            beat_decay_frames: 5,
            beat_onset_threshold: 0.2,
            normalize: true,
        }
    }
}

impl SeriesOptions {
    pub fn validate(&self) -> VizResult<()> {
        if !(self.resample_rate.is_finite() && self.resample_rate > 0.0) {
            return Err(VizError::option("resample-rate", format!("{} must be > 0", self.resample_rate)));
        }
        if self.rolling_window == 0 {
            return Err(VizError::option("rolling-mean-window", "must be at least 1"));
        }
        if self.beat_decay_frames == 0 {
            return Err(VizError::option("beat-decay-frames", "must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.beat_onset_threshold) {
            return Err(VizError::option(
                "beat-onset-threshold",
                format!("{} is outside [0, 1]", self.beat_onset_threshold),
            ));
        }
        Ok(())
    }
}

/// Align extractor output onto the onset grid.
///
/// Centroid and RMS tracks may use a different hop; they are linearly
/// interpolated at each onset timestamp.
pub fn align_samples(features: &ExtractedFeatures) -> VizResult<Vec<FeatureSample>> {
    if features.onset_envelope.len() != features.onset_times.len() {
        return Err(VizError::shape(
            "onset envelope",
            format!(
                "{} values for {} timestamps",
                features.onset_envelope.len(),
                features.onset_times.len()
            ),
        ));
    }
    if features.onset_times.is_empty() {
        return Err(VizError::shape("onset envelope", "no analysis frames"));
    }
    check_monotonic("onset times", &features.onset_times)?;

    for (what, track) in [
        ("spectral centroid", &features.spectral_centroid),
        ("rms", &features.rms),
    ] {
        if track.times.is_empty() || track.times.len() != track.values.len() {
            return Err(VizError::shape(
                what,
                format!("{} values for {} timestamps", track.values.len(), track.times.len()),
            ));
        }
        check_monotonic(what, &track.times)?;
    }

    Ok(features
        .onset_times
        .iter()
        .zip(features.onset_envelope.iter())
        .map(|(&time, &onset)| FeatureSample {
            time,
            onset,
            spectral_centroid: features.spectral_centroid.value_at(time),
            rms: features.rms.value_at(time),
        })
        .collect())
}

/// Build the per-frame feature table from aligned samples and beat times.
pub fn build_feature_series(
    samples: &[FeatureSample],
    beat_times: &[f64],
    opts: &SeriesOptions,
) -> VizResult<FeatureTable> {
    opts.validate()?;
    check_monotonic("beat times", beat_times)?;

    let mut table = FeatureTable::new(samples.iter().map(|s| s.time).collect())?;
    table.set_column(ONSET, samples.iter().map(|s| s.onset).collect())?;
    table.set_column(SPECTRAL_CENTROID, samples.iter().map(|s| s.spectral_centroid).collect())?;
    table.set_column(RMS, samples.iter().map(|s| s.rms).collect())?;

    let centroid: Vec<f64> = samples.iter().map(|s| s.spectral_centroid).collect();
    table.set_column(
        CENTROID_ROLLING_MEAN,
        rolling_mean_backfilled(&centroid, opts.rolling_window),
    )?;

    if opts.resample {
        table = table.resample_mean(opts.resample_rate)?;
    }

    // Decay is synthesized on the output grid, not the analysis grid
    let decay = beat_decay(table.index(), beat_times, opts.beat_decay_frames);
    table.set_column(BEATS_WITH_DECAY, decay)?;

    let gated = gate_beats_by_onset(&mut table, opts.beat_onset_threshold)?;
    log::debug!(
        "{} beats -> {} rows, {} rows gated below onset threshold {:.2}",
        beat_times.len(),
        table.len(),
        gated,
        opts.beat_onset_threshold
    );

    if opts.normalize {
        table.normalize();
    }

    Ok(table)
}

/// Zero `Beats With Decay` wherever the trailing max of normalized onset is
/// below `threshold`. Rows where that max is undefined (the first
/// `GATE_WINDOW - 1` rows, or a constant onset) are left alone.
fn gate_beats_by_onset(table: &mut FeatureTable, threshold: f64) -> VizResult<usize> {
    let mut onset = table
        .column(ONSET)
        .ok_or_else(|| VizError::UnknownColumn {
            context: "beat gating".into(),
            column: ONSET.into(),
        })?
        .to_vec();
    min_max_normalize(&mut onset);
    let recent_peak = rolling_max(&onset, GATE_WINDOW);

    let beats = table.require_mut(BEATS_WITH_DECAY, "beat gating")?;
    let mut gated = 0;
    for (value, peak) in beats.iter_mut().zip(recent_peak) {
        if peak < threshold {
            if *value != 0.0 {
                gated += 1;
            }
            *value = 0.0;
        }
    }
    Ok(gated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::features::FeatureTrack;

    fn samples(rate: f64, onset: &[f64]) -> Vec<FeatureSample> {
        onset
            .iter()
            .enumerate()
            .map(|(i, &o)| FeatureSample {
                time: i as f64 / rate,
                onset: o,
                spectral_centroid: 1000.0 + 10.0 * i as f64,
                rms: 0.1 + (i % 7) as f64 * 0.01,
            })
            .collect()
    }

    fn raw_opts() -> SeriesOptions {
        SeriesOptions { resample: false, normalize: false, ..SeriesOptions::default() }
    }

    #[test]
    fn columns_present_in_order() {
        let table = build_feature_series(&samples(24.0, &[0.0, 1.0, 0.5]), &[], &raw_opts()).unwrap();
        let names: Vec<&str> = table.column_names().collect();
        assert_eq!(names, vec![ONSET, SPECTRAL_CENTROID, RMS, CENTROID_ROLLING_MEAN, BEATS_WITH_DECAY]);
        assert_eq!(table.column(ONSET).unwrap(), &[0.0, 1.0, 0.5]);
    }

    #[test]
    fn rolling_mean_is_backfilled() {
        let opts = SeriesOptions { rolling_window: 4, ..raw_opts() };
        let table = build_feature_series(&samples(24.0, &[1.0; 10]), &[], &opts).unwrap();
        let mean = table.column(CENTROID_ROLLING_MEAN).unwrap();
        assert_eq!(mean[0], 1015.0);
        assert_eq!(mean[3], 1015.0);
        assert_eq!(mean[4], 1025.0);
    }

    #[test]
    fn resampled_output_has_no_missing_values() {
        // Irregular, sparse analysis grid with a gap
        let times = [0.0, 0.011, 0.03, 0.2, 0.21, 0.5, 0.52, 0.9];
        let input: Vec<FeatureSample> = times
            .iter()
            .enumerate()
            .map(|(i, &t)| FeatureSample {
                time: t,
                onset: i as f64,
                spectral_centroid: 500.0 * (i % 3) as f64,
                rms: 0.2 * i as f64,
            })
            .collect();
        let opts = SeriesOptions { rolling_window: 48, normalize: false, ..SeriesOptions::default() };
        let table = build_feature_series(&input, &[0.2], &opts).unwrap();

        assert_eq!(table.len(), 22);
        assert!(table.index().windows(2).all(|w| w[0] < w[1]));
        for column in table.columns() {
            assert!(column.values.iter().all(|v| !v.is_nan()), "{} has NaN", column.name);
        }
    }

    #[test]
    fn decay_uses_resampled_grid() {
        let input = samples(96.0, &[1.0; 96]);
        let opts = SeriesOptions { normalize: false, ..SeriesOptions::default() };
        let table = build_feature_series(&input, &[0.5], &opts).unwrap();
        assert_eq!(table.len(), 24);
        let beats = table.column(BEATS_WITH_DECAY).unwrap();
        // 0.5s is row 12 on the 24Hz grid, impulse at row 13
        assert_eq!(beats[12], 0.0);
        assert_eq!(beats[13], 1.0);
        assert_eq!(beats[14], 0.8);
    }

    #[test]
    fn quiet_onset_gates_full_beat() {
        // Onset spike early, then silence; a beat late in the quiet stretch
        let mut onset = vec![0.0; 30];
        onset[2] = 1.0;
        let input = samples(24.0, &onset);
        let table = build_feature_series(&input, &[20.0 / 24.0], &raw_opts()).unwrap();
        let beats = table.column(BEATS_WITH_DECAY).unwrap();
        assert!(beats.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn onset_spike_lets_beat_through() {
        let mut onset = vec![0.0; 30];
        onset[20] = 1.0;
        let input = samples(24.0, &onset);
        let table = build_feature_series(&input, &[20.0 / 24.0], &raw_opts()).unwrap();
        let beats = table.column(BEATS_WITH_DECAY).unwrap();
        assert_eq!(beats[21], 1.0);
        assert_eq!(beats[24], 0.4);
        // Row 25's trailing window (21..=25) no longer sees the spike
        assert_eq!(beats[25], 0.0);
    }

    #[test]
    fn gating_respects_threshold_boundary() {
        let mut onset = vec![0.0; 12];
        onset[0] = 1.0;
        onset[6] = 0.15;
        let input = samples(24.0, &onset);
        let table = build_feature_series(&input, &[5.0 / 24.0], &raw_opts()).unwrap();
        // Normalized onset peaks at 0.15 around the beat, below 0.2
        assert!(table.column(BEATS_WITH_DECAY).unwrap().iter().all(|&v| v == 0.0));

        let opts = SeriesOptions { beat_onset_threshold: 0.1, ..raw_opts() };
        let table = build_feature_series(&input, &[5.0 / 24.0], &opts).unwrap();
        assert_eq!(table.column(BEATS_WITH_DECAY).unwrap()[6], 1.0);
    }

    #[test]
    fn warmup_rows_are_never_gated() {
        let mut onset = vec![0.0; 16];
        onset[10] = 1.0;
        let input = samples(24.0, &onset);
        let table = build_feature_series(&input, &[0.0], &raw_opts()).unwrap();
        let beats = table.column(BEATS_WITH_DECAY).unwrap();
        // Rows 1..=3 precede a full gate window; row 4 onward sees only silence
        assert_eq!(&beats[..6], &[0.0, 1.0, 0.8, 0.6, 0.0, 0.0]);
    }

    #[test]
    fn constant_onset_never_gates() {
        let input = samples(24.0, &[0.3; 12]);
        let table = build_feature_series(&input, &[0.1], &raw_opts()).unwrap();
        let total: f64 = table.column(BEATS_WITH_DECAY).unwrap().iter().sum();
        assert!((total - 3.0).abs() < 1e-9);
    }

    #[test]
    fn normalization_covers_every_column() {
        let mut onset: Vec<f64> = (0..48).map(|i| (i % 5) as f64).collect();
        onset[10] = 9.0;
        let input = samples(24.0, &onset);
        let opts = SeriesOptions { resample: false, rolling_window: 8, ..SeriesOptions::default() };
        let table = build_feature_series(&input, &[0.4], &opts).unwrap();
        for column in table.columns() {
            let lo = column.values.iter().copied().fold(f64::INFINITY, f64::min);
            let hi = column.values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            assert_eq!(lo, 0.0, "{}", column.name);
            assert_eq!(hi, 1.0, "{}", column.name);
        }
    }

    #[test]
    fn rejects_bad_shapes_and_options() {
        assert!(matches!(
            build_feature_series(&[], &[], &SeriesOptions::default()),
            Err(VizError::InputShape { .. })
        ));

        let input = samples(24.0, &[0.0, 1.0]);
        assert!(matches!(
            build_feature_series(&input, &[0.5, 0.1], &raw_opts()),
            Err(VizError::InputShape { .. })
        ));

        for opts in [
            SeriesOptions { rolling_window: 0, ..raw_opts() },
            SeriesOptions { beat_decay_frames: 0, ..raw_opts() },
            SeriesOptions { beat_onset_threshold: 1.5, ..raw_opts() },
            SeriesOptions { resample_rate: -1.0, ..raw_opts() },
        ] {
            assert!(matches!(
                build_feature_series(&input, &[], &opts),
                Err(VizError::InvalidOption { .. })
            ));
        }
    }

    #[test]
    fn duplicate_beats_are_tolerated() {
        let mut onset = vec![0.0; 10];
        onset[3] = 1.0;
        let input = samples(24.0, &onset);
        let table = build_feature_series(&input, &[0.125, 0.125], &raw_opts()).unwrap();
        assert_eq!(table.column(BEATS_WITH_DECAY).unwrap()[4], 1.0);
    }

    #[test]
    fn align_interpolates_tracks_by_timestamp() {
        let features = ExtractedFeatures {
            onset_envelope: vec![0.0, 1.0, 2.0, 3.0],
            onset_times: vec![0.0, 0.5, 1.0, 1.5],
            spectral_centroid: FeatureTrack::new(vec![0.0, 0.5, 1.0, 1.5], vec![100.0, 200.0, 300.0, 400.0]),
            rms: FeatureTrack::new(vec![0.0, 1.0], vec![0.0, 1.0]),
            ..Default::default()
        };
        let aligned = align_samples(&features).unwrap();
        assert_eq!(aligned.len(), 4);
        assert_eq!(aligned[1].spectral_centroid, 200.0);
        assert_eq!(aligned[1].rms, 0.5);
        assert_eq!(aligned[3].rms, 1.0);
    }

    #[test]
    fn align_rejects_mismatched_lengths() {
        let features = ExtractedFeatures {
            onset_envelope: vec![0.0, 1.0],
            onset_times: vec![0.0],
            spectral_centroid: FeatureTrack::new(vec![0.0], vec![1.0]),
            rms: FeatureTrack::new(vec![0.0], vec![1.0]),
            ..Default::default()
        };
        assert!(matches!(align_samples(&features), Err(VizError::InputShape { .. })));

        let features = ExtractedFeatures {
            onset_envelope: vec![0.0, 1.0],
            onset_times: vec![0.0, 1.0],
            spectral_centroid: FeatureTrack::new(vec![1.0, 0.0], vec![1.0, 2.0]),
            rms: FeatureTrack::new(vec![0.0], vec![1.0]),
            ..Default::default()
        };
        assert!(matches!(align_samples(&features), Err(VizError::InputShape { .. })));
    }
}
