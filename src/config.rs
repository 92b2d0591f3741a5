use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::VizResult;
use crate::render::mapping::ModifierMapping;
use crate::series::builder::{BEATS_WITH_DECAY, ONSET};
use crate::series::table::FeatureTable;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub series: SeriesConfig,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub mappings: Vec<MappingConfig>,
    #[serde(default)]
    pub columns: Vec<ColumnConfig>,
    #[serde(default)]
    pub adjustments: Vec<AdjustmentConfig>,
}

#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_size")]
    pub width: u32,
    #[serde(default = "default_size")]
    pub height: u32,
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default = "default_crf")]
    pub crf: u32,
    #[serde(default = "default_codec")]
    pub codec: String,
    #[serde(default = "default_pix_fmt")]
    pub pix_fmt: String,
    pub bitrate: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SeriesConfig {
    #[serde(default = "default_true")]
    pub resample: bool,
    #[serde(default = "default_resample_rate")]
    pub resample_rate: f64,
    #[serde(default = "default_rolling_window")]
    pub rolling_window: usize,
    #[serde(default = "default_beat_decay_frames")]
    pub beat_decay_frames: usize,
    #[serde(default = "default_beat_onset_threshold")]
    pub beat_onset_threshold: f64,
    #[serde(default = "default_true")]
    pub normalize: bool,
}

#[derive(Debug, Deserialize)]
pub struct RenderConfig {
    #[serde(default)]
    pub seed: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MappingConfig {
    pub transform: String,
    pub column: String,
    #[serde(default)]
    pub params: BTreeMap<String, Vec<f64>>,
}

/// Synthetic columns added after the series build.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ColumnConfig {
    Sine {
        frequency: f64,
        name: Option<String>,
        #[serde(default = "default_true")]
        normalize: bool,
    },
    Noise {
        name: String,
        /// Falls back to the run seed
        seed: Option<u64>,
    },
}

/// Time-windowed edits applied after synthetic columns.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AdjustmentConfig {
    FadeIn {
        column: String,
        start: f64,
        end: f64,
        #[serde(default = "default_factor")]
        factor: f64,
    },
    FadeOut {
        column: String,
        start: f64,
        end: f64,
        #[serde(default = "default_factor")]
        factor: f64,
    },
    ZeroBetween {
        column: String,
        start: f64,
        end: f64,
    },
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            width: default_size(),
            height: default_size(),
            fps: default_fps(),
            crf: default_crf(),
            codec: default_codec(),
            pix_fmt: default_pix_fmt(),
            bitrate: None,
        }
    }
}

impl Default for SeriesConfig {
    fn default() -> Self {
        Self {
            resample: true,
            resample_rate: default_resample_rate(),
            rolling_window: default_rolling_window(),
            beat_decay_frames: default_beat_decay_frames(),
            beat_onset_threshold: default_beat_onset_threshold(),
            normalize: true,
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            batch_size: default_batch_size(),
        }
    }
}

impl Config {
    /// Apply `[[columns]]` then `[[adjustments]]` in declaration order. With
    /// `normalize`, the whole table is normalized again so added and edited
    /// columns share the [0, 1] range.
    pub fn post_process(&self, mut table: FeatureTable, seed: u64, normalize: bool) -> VizResult<FeatureTable> {
        for column in &self.columns {
            table = column.apply(table, seed)?;
        }
        for adjustment in &self.adjustments {
            table = adjustment.apply(table)?;
        }
        if normalize && !(self.columns.is_empty() && self.adjustments.is_empty()) {
            log::debug!("Normalizing feature table after post-processing");
            table.normalize();
        }
        Ok(table)
    }
}

impl MappingConfig {
    pub fn to_mapping(&self) -> VizResult<ModifierMapping> {
        ModifierMapping::from_bounds(&self.transform, &self.column, self.params.clone())
    }
}

impl ColumnConfig {
    pub fn apply(&self, table: FeatureTable, run_seed: u64) -> VizResult<FeatureTable> {
        match self {
            Self::Sine { frequency, name, normalize } => {
                table.add_sine_column(*frequency, name.as_deref(), *normalize)
            }
            Self::Noise { name, seed } => table.add_noise_column(name, seed.unwrap_or(run_seed)),
        }
    }
}

impl AdjustmentConfig {
    pub fn apply(&self, table: FeatureTable) -> VizResult<FeatureTable> {
        match self {
            Self::FadeIn { column, start, end, factor } => table.fade_in(column, *start, *end, *factor),
            Self::FadeOut { column, start, end, factor } => table.fade_out(column, *start, *end, *factor),
            Self::ZeroBetween { column, start, end } => table.zero_between(column, *start, *end),
        }
    }
}

/// Chain used when no `[[mappings]]` are configured.
pub fn default_mappings() -> VizResult<Vec<ModifierMapping>> {
    Ok(vec![
        ModifierMapping::new("gaussian_blur", ONSET, [("kernel_size", (0.0, 31.0))])?,
        ModifierMapping::new("red_scaling", BEATS_WITH_DECAY, [("scale_factor", (0.0, 0.6))])?,
    ])
}

fn default_size() -> u32 { 1080 }
fn default_fps() -> u32 { 24 }
fn default_crf() -> u32 { 18 }
fn default_codec() -> String { "libx264".into() }
fn default_pix_fmt() -> String { "yuv420p".into() }
fn default_true() -> bool { true }
fn default_resample_rate() -> f64 { 24.0 }
fn default_rolling_window() -> usize { 48 }
fn default_beat_decay_frames() -> usize { 5 }
fn default_beat_onset_threshold() -> f64 { 0.2 }
fn default_batch_size() -> usize { 32 }
fn default_factor() -> f64 { 1.0 }

/// Explicit path, else `pulseframe.toml` in the working directory, else the user config dir.
pub fn find_config(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from("pulseframe.toml");
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("pulseframe").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("pulseframe").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Failed to parse config: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VizError;
    use crate::series::builder::SeriesOptions;
    use std::io::Write;

    fn write_config(body: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pulseframe.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(body.as_bytes()).unwrap();
        (dir, path)
    }

    #[test]
    fn empty_file_gives_defaults() {
        let (_dir, path) = write_config("");
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.output.width, 1080);
        assert_eq!(cfg.output.fps, 24);
        let defaults = SeriesOptions::default();
        assert_eq!(cfg.series.resample, defaults.resample);
        assert_eq!(cfg.series.resample_rate, defaults.resample_rate);
        assert_eq!(cfg.series.rolling_window, defaults.rolling_window);
        assert_eq!(cfg.series.beat_decay_frames, defaults.beat_decay_frames);
        assert_eq!(cfg.series.beat_onset_threshold, defaults.beat_onset_threshold);
        assert_eq!(cfg.series.normalize, defaults.normalize);
        assert_eq!(cfg.render.batch_size, 32);
        assert!(cfg.mappings.is_empty());
    }

    #[test]
    fn parses_full_config() {
        let (_dir, path) = write_config(
            r#"
[output]
width = 640
height = 360
fps = 30

[series]
resample_rate = 30.0
rolling_window = 12
beat_onset_threshold = 0.35

[render]
seed = 9

[[mappings]]
transform = "gaussian_blur"
column = "Onset"
params = { kernel_size = [0, 21] }

[[mappings]]
transform = "rgb_multiplication"
column = "RMS"
params = { red_factor = [1.5, 1.0], blue_factor = [1.0, 0.5] }

[[columns]]
kind = "sine"
frequency = 0.5

[[columns]]
kind = "noise"
name = "Grain"

[[adjustments]]
kind = "fade_in"
column = "Onset"
start = 0.0
end = 2.0

[[adjustments]]
kind = "zero_between"
column = "RMS"
start = 10.0
end = 12.5
"#,
        );
        let cfg = load_config(&path).unwrap();
        assert_eq!((cfg.output.width, cfg.output.height, cfg.output.fps), (640, 360, 30));
        assert_eq!(cfg.series.rolling_window, 12);
        assert_eq!(cfg.series.beat_decay_frames, 5);
        assert_eq!(cfg.render.seed, 9);

        let mappings: Vec<_> = cfg.mappings.iter().map(|m| m.to_mapping().unwrap()).collect();
        assert_eq!(mappings[0].ranges[0].max, 21.0);
        assert_eq!(mappings[1].ranges.len(), 2);

        assert_eq!(
            cfg.columns[0],
            ColumnConfig::Sine { frequency: 0.5, name: None, normalize: true }
        );
        assert_eq!(cfg.columns[1], ColumnConfig::Noise { name: "Grain".into(), seed: None });
        assert_eq!(
            cfg.adjustments[0],
            AdjustmentConfig::FadeIn { column: "Onset".into(), start: 0.0, end: 2.0, factor: 1.0 }
        );
        assert!(matches!(cfg.adjustments[1], AdjustmentConfig::ZeroBetween { end, .. } if end == 12.5));
    }

    #[test]
    fn bad_bound_arity_is_a_mapping_error() {
        let (_dir, path) = write_config(
            r#"
[[mappings]]
transform = "red_scaling"
column = "Onset"
params = { scale_factor = [0.1] }
"#,
        );
        let cfg = load_config(&path).unwrap();
        assert!(matches!(cfg.mappings[0].to_mapping(), Err(VizError::InvalidMapping { .. })));
    }

    #[test]
    fn unknown_kind_fails_to_parse() {
        let (_dir, path) = write_config("[[columns]]\nkind = \"square\"\nfrequency = 1.0\n");
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn column_and_adjustment_entries_apply() {
        let mut table = FeatureTable::new((0..10).map(|i| i as f64 / 10.0).collect()).unwrap();
        table.set_column(ONSET, vec![1.0; 10]).unwrap();

        let table = ColumnConfig::Noise { name: "Grain".into(), seed: None }.apply(table, 3).unwrap();
        let table = AdjustmentConfig::ZeroBetween { column: ONSET.into(), start: 0.0, end: 0.25 }
            .apply(table)
            .unwrap();
        assert_eq!(&table.column(ONSET).unwrap()[..4], &[0.0, 0.0, 0.0, 1.0]);

        let same_seed = FeatureTable::new((0..10).map(|i| i as f64 / 10.0).collect())
            .unwrap()
            .add_noise_column("Grain", 3)
            .unwrap();
        assert_eq!(table.column("Grain"), same_seed.column("Grain"));
    }

    fn unit_table() -> FeatureTable {
        let mut table = FeatureTable::new((0..20).map(|i| i as f64 / 10.0).collect()).unwrap();
        table.set_column(ONSET, (0..20).map(|i| i as f64 / 19.0).collect()).unwrap();
        table
    }

    #[test]
    fn post_processed_columns_are_normalized() {
        let cfg = Config {
            columns: vec![ColumnConfig::Noise { name: "Grain".into(), seed: Some(5) }],
            adjustments: vec![AdjustmentConfig::FadeOut {
                column: ONSET.into(),
                start: 1.5,
                end: 2.5,
                factor: 1.0,
            }],
            ..Config::default()
        };
        let table = cfg.post_process(unit_table(), 0, true).unwrap();
        for name in ["Grain", ONSET] {
            let values = table.column(name).unwrap();
            let lo = values.iter().copied().fold(f64::INFINITY, f64::min);
            let hi = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            assert_eq!((lo, hi), (0.0, 1.0), "{name}");
        }
    }

    #[test]
    fn post_processing_respects_no_normalize() {
        let cfg = Config {
            columns: vec![ColumnConfig::Sine { frequency: 1.0, name: Some("Wave".into()), normalize: false }],
            ..Config::default()
        };
        let table = cfg.post_process(unit_table(), 0, false).unwrap();
        assert!(table.column("Wave").unwrap().iter().any(|v| *v < 0.0));
    }

    #[test]
    fn explicit_path_wins_discovery() {
        let path = Path::new("/nonexistent/custom.toml");
        assert_eq!(find_config(Some(path)), Some(path.to_path_buf()));
    }

    #[test]
    fn default_chain_targets_built_columns() {
        let mappings = default_mappings().unwrap();
        assert_eq!(mappings[0].column, ONSET);
        assert_eq!(mappings[1].column, BEATS_WITH_DECAY);
    }
}
