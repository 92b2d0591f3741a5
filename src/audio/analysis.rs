use anyhow::Result;
use rayon::prelude::*;
use rustfft::{num_complex::Complex, FftPlanner};

use super::decode::AudioData;
use super::features::{ExtractedFeatures, FeatureTrack};

const FFT_SIZE: usize = 2048;
const HOP_SIZE: usize = 512;
const RMS_HOP_SIZE: usize = 1024;

/// Per-STFT-frame spectral measurements, before onset differencing.
struct SpectralFrame {
    log_magnitudes: Vec<f32>,
    centroid: f32,
}

pub fn extract(audio: &AudioData) -> Result<ExtractedFeatures> {
    let samples = &audio.samples;
    let sr = audio.sample_rate;
    if sr == 0 {
        anyhow::bail!("Audio has a zero sample rate");
    }
    if samples.is_empty() {
        anyhow::bail!("Audio contains no samples");
    }
    let duration = samples.len() as f64 / sr as f64;

    log::info!("Pass 1: STFT ({} hop, {} window)...", HOP_SIZE, FFT_SIZE);
    let spectral = stft_frames(samples, sr);

    log::info!("Pass 2: Onset envelope & beats...");
    let onset_envelope = onset_strength(&spectral);
    let onset_times: Vec<f64> = (0..onset_envelope.len())
        .map(|i| (i * HOP_SIZE) as f64 / sr as f64)
        .collect();
    let beat_times = detect_beats(&onset_times, &onset_envelope);
    let tempo_bpm = estimate_tempo(&beat_times);

    let spectral_centroid = FeatureTrack::new(
        onset_times.clone(),
        spectral.iter().map(|f| f.centroid as f64).collect(),
    );

    log::info!("Pass 3: RMS energy...");
    let rms = rms_track(samples, sr);

    log::info!(
        "Extracted {} onset frames, {} beats, tempo={:.1} BPM, duration={:.1}s",
        onset_envelope.len(),
        beat_times.len(),
        tempo_bpm,
        duration
    );

    Ok(ExtractedFeatures {
        onset_envelope,
        onset_times,
        spectral_centroid,
        rms,
        beat_times,
        duration,
        tempo_bpm,
    })
}

fn stft_frames(samples: &[f32], sample_rate: u32) -> Vec<SpectralFrame> {
    let freq_resolution = sample_rate as f32 / FFT_SIZE as f32;
    let hann = hann_window(FFT_SIZE);
    let total_frames = samples.len() / HOP_SIZE + 1;

    (0..total_frames)
        .into_par_iter()
        .map(|frame_idx| {
            // Centered frames, zero padded at both ends
            let center = frame_idx * HOP_SIZE;
            let mut fft_input: Vec<Complex<f32>> = vec![Complex::new(0.0, 0.0); FFT_SIZE];
            for (i, slot) in fft_input.iter_mut().enumerate() {
                let pos = (center + i).checked_sub(FFT_SIZE / 2);
                if let Some(&s) = pos.and_then(|p| samples.get(p)) {
                    *slot = Complex::new(s * hann[i], 0.0);
                }
            }

            // Per-thread FFT planner (rayon-safe)
            let mut planner = FftPlanner::<f32>::new();
            let fft = planner.plan_fft_forward(FFT_SIZE);
            fft.process(&mut fft_input);

            let half = FFT_SIZE / 2;
            let magnitudes: Vec<f32> = fft_input[..=half].iter().map(|c| c.norm()).collect();

            let total_energy: f32 = magnitudes.iter().sum();
            let centroid = if total_energy > 1e-10 {
                magnitudes
                    .iter()
                    .enumerate()
                    .map(|(i, &mag)| i as f32 * freq_resolution * mag)
                    .sum::<f32>()
                    / total_energy
            } else {
                0.0
            };

            SpectralFrame {
                log_magnitudes: magnitudes.iter().map(|m| (1.0 + 10.0 * m).ln()).collect(),
                centroid,
            }
        })
        .collect()
}

/// Half-wave rectified spectral flux over log magnitudes, averaged across bins.
fn onset_strength(frames: &[SpectralFrame]) -> Vec<f64> {
    let mut envelope = vec![0.0f64; frames.len()];
    for i in 1..frames.len() {
        let cur = &frames[i].log_magnitudes;
        let prev = &frames[i - 1].log_magnitudes;
        let flux: f32 = cur
            .iter()
            .zip(prev.iter())
            .map(|(c, p)| (c - p).max(0.0))
            .sum();
        envelope[i] = flux as f64 / cur.len() as f64;
    }
    envelope
}

fn rms_track(samples: &[f32], sample_rate: u32) -> FeatureTrack {
    let total_frames = samples.len() / RMS_HOP_SIZE + 1;
    let mut times = Vec::with_capacity(total_frames);
    let mut values = Vec::with_capacity(total_frames);

    for frame_idx in 0..total_frames {
        let center = frame_idx * RMS_HOP_SIZE;
        let start = center.saturating_sub(FFT_SIZE / 2);
        let end = (center + FFT_SIZE / 2).min(samples.len());
        let window = &samples[start.min(end)..end];
        let rms = if window.is_empty() {
            0.0
        } else {
            (window.iter().map(|s| s * s).sum::<f32>() / window.len() as f32).sqrt()
        };
        times.push(center as f64 / sample_rate as f64);
        values.push(rms as f64);
    }

    FeatureTrack::new(times, values)
}

fn detect_beats(times: &[f64], onset: &[f64]) -> Vec<f64> {
    if onset.is_empty() {
        return Vec::new();
    }

    let window = 20;
    let mut beat_times: Vec<f64> = Vec::new();

    for i in 0..onset.len() {
        let start = i.saturating_sub(window);
        let end = (i + window + 1).min(onset.len());
        let local_mean: f64 = onset[start..end].iter().sum::<f64>() / (end - start) as f64;

        let threshold = local_mean * 1.5 + 0.01;

        if onset[i] > threshold {
            let is_peak = (i == 0 || onset[i] >= onset[i - 1])
                && (i == onset.len() - 1 || onset[i] >= onset[i + 1]);

            // Minimum gap between beats (100ms)
            let far_enough = beat_times.last().map_or(true, |&last| times[i] - last > 0.1);

            if is_peak && far_enough {
                beat_times.push(times[i]);
            }
        }
    }

    beat_times
}

fn estimate_tempo(beat_times: &[f64]) -> f64 {
    if beat_times.len() < 2 {
        return 120.0;
    }

    // Reasonable intervals: 60-200 BPM → 0.3-1.0s
    let mut reasonable: Vec<f64> = beat_times
        .windows(2)
        .map(|w| w[1] - w[0])
        .filter(|&i| (0.3..=1.0).contains(&i))
        .collect();

    if reasonable.is_empty() {
        return 120.0;
    }

    reasonable.sort_by(|a, b| a.total_cmp(b));
    60.0 / reasonable[reasonable.len() / 2]
}

fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| {
            0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / (size - 1) as f32).cos())
        })
        .collect()
}
