/// Rows between the first sample at or after a beat and the peak of its impulse.
///
/// Keeps beat flashes landing one frame after the detected beat sample.
pub const BEAT_IMPULSE_OFFSET: usize = 1;

/// Dense impulse-decay signal for `beats` on the sample grid `times`.
///
/// Each beat places a linear ramp `1, 1 - 1/D, ..., 1/D` starting at
/// `BEAT_IMPULSE_OFFSET` rows after the first sample with `t >= beat`.
/// Overlapping ramps combine by elementwise max; ramps running past the end of
/// the grid are clipped. `times` must be sorted ascending.
pub fn beat_decay(times: &[f64], beats: &[f64], decay_frames: usize) -> Vec<f64> {
    let n = times.len();
    let mut signal = vec![0.0f64; n];
    if decay_frames == 0 {
        return signal;
    }

    for &beat in beats {
        let onset = times.partition_point(|&t| t < beat) + BEAT_IMPULSE_OFFSET;
        for k in 0..decay_frames {
            let Some(slot) = signal.get_mut(onset + k) else {
                break;
            };
            let value = (decay_frames - k) as f64 / decay_frames as f64;
            *slot = slot.max(value);
        }
    }

    signal
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(rate: f64, n: usize) -> Vec<f64> {
        (0..n).map(|i| i as f64 / rate).collect()
    }

    #[test]
    fn no_beats_is_all_zero() {
        let times = grid(24.0, 10);
        assert!(beat_decay(&times, &[], 5).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn single_beat_ramps_down_after_offset() {
        let times = grid(10.0, 10);
        let signal = beat_decay(&times, &[0.2], 4);
        // First sample >= 0.2 is row 2, impulse starts at row 3
        assert_eq!(signal, vec![0.0, 0.0, 0.0, 1.0, 0.75, 0.5, 0.25, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn beat_between_samples_uses_next_sample() {
        let times = grid(10.0, 6);
        let signal = beat_decay(&times, &[0.15], 2);
        assert_eq!(signal, vec![0.0, 0.0, 0.0, 1.0, 0.5, 0.0]);
    }

    #[test]
    fn overlapping_beats_take_max_not_sum() {
        let times = grid(24.0, 48);
        let a = beat_decay(&times, &[1.0], 5);
        let b = beat_decay(&times, &[1.02], 5);
        let both = beat_decay(&times, &[1.0, 1.02], 5);
        for i in 0..times.len() {
            assert_eq!(both[i], a[i].max(b[i]));
            assert!(both[i] <= 1.0);
        }
        assert!(a.iter().zip(b.iter()).any(|(x, y)| *x > 0.0 && *y > 0.0));
    }

    #[test]
    fn later_beat_does_not_erase_higher_decay() {
        let times = grid(10.0, 10);
        // Second beat lands on the same impulse row, decays from the top again
        let signal = beat_decay(&times, &[0.1, 0.1], 3);
        assert_eq!(&signal[2..5], &[1.0, 2.0 / 3.0, 1.0 / 3.0]);

        // A beat one row later must not lower the tail of the earlier ramp
        let signal = beat_decay(&times, &[0.1, 0.2], 4);
        assert_eq!(&signal[2..7], &[1.0, 1.0, 0.75, 0.5, 0.25]);
    }

    #[test]
    fn beats_past_the_grid_are_clipped() {
        let times = grid(10.0, 5);
        let signal = beat_decay(&times, &[0.35, 0.4, 7.0], 5);
        assert_eq!(signal.len(), 5);
        // 0.4 hits row 4, impulse at row 5 (outside); 0.35 also hits row 4
        assert!(signal.iter().all(|&v| v == 0.0));

        let signal = beat_decay(&times, &[0.3], 5);
        assert_eq!(signal, vec![0.0, 0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn decay_longer_than_series_is_clipped() {
        let times = grid(10.0, 3);
        let signal = beat_decay(&times, &[0.0], 50);
        assert_eq!(signal[0], 0.0);
        assert_eq!(signal[1], 1.0);
        assert!((signal[2] - 0.98).abs() < 1e-12);
    }

    #[test]
    fn values_stay_in_unit_range_and_zero_outside_windows() {
        let times = grid(24.0, 240);
        let beats: Vec<f64> = (0..25).map(|i| i as f64 * 0.37).collect();
        let decay = 6;
        let signal = beat_decay(&times, &beats, decay);

        let mut covered = vec![false; times.len()];
        for &b in &beats {
            let start = times.partition_point(|&t| t < b) + BEAT_IMPULSE_OFFSET;
            for k in 0..decay {
                if let Some(c) = covered.get_mut(start + k) {
                    *c = true;
                }
            }
        }
        for (v, c) in signal.iter().zip(covered.iter()) {
            assert!((0.0..=1.0).contains(v));
            if !c {
                assert_eq!(*v, 0.0);
            }
        }
    }
}
