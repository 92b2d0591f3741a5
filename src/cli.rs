use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "pulseframe", about = "Audio-reactive video generator: modulates a still image with music features")]
pub struct Cli {
    /// Input audio file (WAV, MP3, FLAC, OGG)
    pub audio: Option<PathBuf>,

    /// Base image every frame starts from
    pub image: Option<PathBuf>,

    /// Output video file
    #[arg(short, long, default_value = "output.mp4")]
    pub output: PathBuf,

    /// Config file (defaults to ./pulseframe.toml or the user config dir)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Video width in pixels (base image is resized)
    #[arg(long, default_value_t = 1080)]
    pub width: u32,

    /// Video height in pixels (base image is resized)
    #[arg(long, default_value_t = 1080)]
    pub height: u32,

    /// Frames per second
    #[arg(long, default_value_t = 24)]
    pub fps: u32,

    /// H.264 CRF quality (0-51, lower = better). Ignored when --bitrate is set.
    #[arg(long, default_value_t = 18)]
    pub crf: u32,

    /// Video bitrate (e.g. 2400k, 5M). When set, uses -b:v instead of -crf.
    #[arg(short, long)]
    pub bitrate: Option<String>,

    /// FFmpeg video codec
    #[arg(long, default_value = "libx264")]
    pub codec: String,

    /// FFmpeg pixel format
    #[arg(long, default_value = "yuv420p")]
    pub pix_fmt: String,

    /// Feature rows per second after resampling (normally equal to --fps)
    #[arg(long, default_value_t = 24.0)]
    pub resample_rate: f64,

    /// Window for the spectral centroid rolling mean, in analysis frames
    #[arg(long, default_value_t = 48)]
    pub rolling_window: usize,

    /// Rows a beat impulse takes to decay to zero
    #[arg(long, default_value_t = 5)]
    pub beat_decay_frames: usize,

    /// Normalized onset level below which beats are suppressed (0.0-1.0)
    #[arg(long, default_value_t = 0.2)]
    pub beat_onset_threshold: f64,

    /// Keep the extractor's frame grid instead of resampling
    #[arg(long)]
    pub no_resample: bool,

    /// Skip min-max normalization of feature columns
    #[arg(long)]
    pub no_normalize: bool,

    /// Encode video only, without the input audio track
    #[arg(long)]
    pub no_audio: bool,

    /// Seed for randomised transforms and noise columns
    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    /// Frames rendered in parallel before handing off to the encoder
    #[arg(long, default_value_t = 32)]
    pub batch_size: usize,

    /// Write the final feature table as JSON
    #[arg(long)]
    pub dump_features: Option<PathBuf>,

    /// List available image transforms and exit
    #[arg(long)]
    pub list_transforms: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cli = Cli::parse_from(["pulseframe", "song.wav", "cover.png"]);
        assert_eq!(cli.audio, Some(PathBuf::from("song.wav")));
        assert_eq!(cli.image, Some(PathBuf::from("cover.png")));
        assert_eq!(cli.output, PathBuf::from("output.mp4"));
        assert_eq!((cli.width, cli.height, cli.fps), (1080, 1080, 24));
        assert_eq!(cli.resample_rate, 24.0);
        assert!(!cli.no_resample && !cli.no_normalize && !cli.no_audio);
    }

    #[test]
    fn series_flags() {
        let cli = Cli::parse_from([
            "pulseframe",
            "a.mp3",
            "b.jpg",
            "--rolling-window",
            "12",
            "--beat-onset-threshold",
            "0.5",
            "--no-resample",
            "--dump-features",
            "f.json",
        ]);
        assert_eq!(cli.rolling_window, 12);
        assert_eq!(cli.beat_onset_threshold, 0.5);
        assert!(cli.no_resample);
        assert_eq!(cli.dump_features, Some(PathBuf::from("f.json")));
    }
}
