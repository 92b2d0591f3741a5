mod audio;
mod cli;
mod config;
mod encode;
mod error;
mod render;
mod series;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};

use cli::Cli;
use config::Config;
use encode::ffmpeg::{EncoderSettings, FfmpegEncoder};
use render::engine::FrameSynthesizer;
use render::mapping::ModifierMapping;
use render::transforms::TransformRegistry;
use series::builder::SeriesOptions;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let mut cli = Cli::parse();
    let registry = TransformRegistry::builtin();

    // List transforms mode
    if cli.list_transforms {
        println!("Available transforms:");
        for name in registry.names() {
            if let Some(spec) = registry.get(name) {
                let params: Vec<String> = spec
                    .params
                    .iter()
                    .map(|p| format!("{}={}", p.name, p.default))
                    .collect();
                println!("  {:<28} {}", name, spec.description);
                println!("  {:<28} params: {}", "", params.join(", "));
            }
        }
        return Ok(());
    }

    let cfg = match config::find_config(cli.config.as_deref()) {
        Some(path) => {
            let cfg = config::load_config(&path)?;
            log::info!("Loaded config from {}", path.display());
            cfg
        }
        None => Config::default(),
    };
    merge_config(&mut cli, &cfg);

    let audio_path = cli.audio.clone().context("Input audio file is required")?;
    let image_path = cli.image.clone().context("Base image is required")?;
    for path in [&audio_path, &image_path] {
        if !path.exists() {
            anyhow::bail!("Input file not found: {}", path.display());
        }
    }

    let opts = SeriesOptions {
        resample: !cli.no_resample,
        resample_rate: cli.resample_rate,
        rolling_window: cli.rolling_window,
        beat_decay_frames: cli.beat_decay_frames,
        beat_onset_threshold: cli.beat_onset_threshold,
        normalize: !cli.no_normalize,
    };
    opts.validate()?;
    if !opts.resample || (opts.resample_rate - cli.fps as f64).abs() > f64::EPSILON {
        log::warn!(
            "Feature rows are not on a {}fps grid (resample={}, rate={}); video timing will drift from the audio",
            cli.fps,
            opts.resample,
            opts.resample_rate
        );
    }

    log::info!("pulseframe - audio-reactive video generator");
    log::info!("Audio: {}", audio_path.display());
    log::info!("Image: {}", image_path.display());
    log::info!("Output: {}", cli.output.display());
    log::info!("Resolution: {}x{} @ {}fps", cli.width, cli.height, cli.fps);

    // 1. Decode audio
    log::info!("Decoding audio...");
    let audio_data = audio::decode::decode_audio(&audio_path)?;

    // 2. Extract features
    log::info!("Extracting features...");
    let features = audio::analysis::extract(&audio_data)?;
    log::info!(
        "Duration: {:.1}s, {} beats, ~{:.0} BPM",
        features.duration,
        features.beat_times.len(),
        features.tempo_bpm
    );

    // 3. Build the feature table
    log::info!("Building feature series...");
    let samples = series::builder::align_samples(&features)?;
    let table = series::builder::build_feature_series(&samples, &features.beat_times, &opts)?;
    let table = cfg.post_process(table, cli.seed, opts.normalize)?;
    log::info!(
        "Feature table: {} rows, columns: {}",
        table.len(),
        table.column_names().collect::<Vec<_>>().join(", ")
    );

    if let Some(ref path) = cli.dump_features {
        let json = serde_json::to_string_pretty(&table).context("Failed to serialize feature table")?;
        std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        log::info!("Wrote feature table to {}", path.display());
    }

    // 4. Resolve mappings against the table before any frame work
    let mappings = resolve_mappings(&cfg)?;
    let base = render::base_image::load_base_image(&image_path, cli.width, cli.height)?;
    let synth = FrameSynthesizer::new(&base, &table, &mappings, &registry, cli.seed)?
        .with_batch_size(cli.batch_size);
    for (i, m) in mappings.iter().enumerate() {
        log::info!("Mapping [{}]: {} <- '{}'", i, m.transform, m.column);
    }

    // 5. Start FFmpeg encoder
    log::info!("Starting FFmpeg encoder...");
    let settings = EncoderSettings {
        width: cli.width,
        height: cli.height,
        fps: cli.fps,
        codec: cli.codec.clone(),
        pix_fmt: cli.pix_fmt.clone(),
        crf: cli.crf,
        bitrate: cli.bitrate.clone(),
    };
    let audio_track = if cli.no_audio { None } else { Some(audio_path.as_path()) };
    let mut encoder = FfmpegEncoder::new(&cli.output, audio_track, settings)?;

    // 6. Render loop
    let total_frames = synth.frame_count();
    let pb = ProgressBar::new(total_frames as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} frames ({eta} remaining)")
            .context("Invalid progress bar template")?
            .progress_chars("=>-"),
    );

    synth.run(|_, frame| encoder.write_frame(frame.as_raw()), Some(&pb))?;
    pb.finish_with_message("Rendering complete");

    // 7. Finish encoding
    log::info!("Finishing encoding...");
    encoder.finish()?;

    log::info!("Done! Output: {}", cli.output.display());
    Ok(())
}

/// Config values apply only where the CLI is still at its default.
fn merge_config(cli: &mut Cli, cfg: &Config) {
    if cli.width == 1080 { cli.width = cfg.output.width; }
    if cli.height == 1080 { cli.height = cfg.output.height; }
    if cli.fps == 24 { cli.fps = cfg.output.fps; }
    if cli.crf == 18 { cli.crf = cfg.output.crf; }
    if cli.codec == "libx264" { cli.codec = cfg.output.codec.clone(); }
    if cli.pix_fmt == "yuv420p" { cli.pix_fmt = cfg.output.pix_fmt.clone(); }
    if cli.bitrate.is_none() { cli.bitrate = cfg.output.bitrate.clone(); }

    if cli.resample_rate == 24.0 { cli.resample_rate = cfg.series.resample_rate; }
    if cli.rolling_window == 48 { cli.rolling_window = cfg.series.rolling_window; }
    if cli.beat_decay_frames == 5 { cli.beat_decay_frames = cfg.series.beat_decay_frames; }
    if cli.beat_onset_threshold == 0.2 { cli.beat_onset_threshold = cfg.series.beat_onset_threshold; }
    if !cli.no_resample { cli.no_resample = !cfg.series.resample; }
    if !cli.no_normalize { cli.no_normalize = !cfg.series.normalize; }

    if cli.seed == 0 { cli.seed = cfg.render.seed; }
    if cli.batch_size == 32 { cli.batch_size = cfg.render.batch_size; }
}

fn resolve_mappings(cfg: &Config) -> Result<Vec<ModifierMapping>> {
    if cfg.mappings.is_empty() {
        log::info!("No mappings configured, using the default chain");
        return Ok(config::default_mappings()?);
    }
    cfg.mappings
        .iter()
        .enumerate()
        .map(|(i, m)| m.to_mapping().with_context(|| format!("Invalid [[mappings]] entry #{}", i)))
        .collect()
}
