use anyhow::{Context, Result};
use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

#[derive(Clone, Debug)]
pub struct EncoderSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub codec: String,
    pub pix_fmt: String,
    pub crf: u32,
    pub bitrate: Option<String>,
}

impl EncoderSettings {
    fn frame_bytes(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

/// Pipes raw RGB frames into an ffmpeg child process.
///
/// ffmpeg writes to a temporary sibling of the output path, which is renamed into
/// place by [`FfmpegEncoder::finish`]. Dropping the encoder without finishing kills
/// ffmpeg and removes the temporary file.
pub struct FfmpegEncoder {
    child: Option<Child>,
    settings: EncoderSettings,
    partial_path: PathBuf,
    output_path: PathBuf,
    frames: u64,
}

/// `out.mp4` -> `out.partial.mp4`, keeping the extension so ffmpeg picks the container.
pub fn partial_path(output_path: &Path) -> PathBuf {
    let stem = output_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let name = match output_path.extension() {
        Some(ext) => format!("{}.partial.{}", stem, ext.to_string_lossy()),
        None => format!("{}.partial", stem),
    };
    output_path.with_file_name(name)
}

pub fn build_args(settings: &EncoderSettings, audio: Option<&Path>, target: &Path) -> Vec<OsString> {
    // stderr is only read after EOF, so keep ffmpeg quiet until then
    let mut args: Vec<OsString> = vec![
        "-y".into(),
        "-hide_banner".into(),
        "-loglevel".into(), "error".into(),
        "-nostats".into(),
        "-f".into(), "rawvideo".into(),
        "-pixel_format".into(), "rgb24".into(),
        "-video_size".into(), format!("{}x{}", settings.width, settings.height).into(),
        "-framerate".into(), settings.fps.to_string().into(),
        "-i".into(), "pipe:0".into(),
    ];

    if let Some(audio) = audio {
        args.push("-i".into());
        args.push(audio.as_os_str().to_owned());
    }

    args.extend(
        ["-c:v", settings.codec.as_str(), "-pix_fmt", settings.pix_fmt.as_str()].map(OsString::from),
    );

    if let Some(ref br) = settings.bitrate {
        args.extend(["-b:v", br.as_str()].map(OsString::from));
    } else {
        args.extend(["-crf".to_string(), settings.crf.to_string()].map(OsString::from));
        args.extend(["-preset", "medium"].map(OsString::from));
    }

    if audio.is_some() {
        args.extend(["-c:a", "aac", "-b:a", "192k", "-shortest"].map(OsString::from));
    }

    args.push(target.as_os_str().to_owned());
    args
}

impl FfmpegEncoder {
    pub fn new(output_path: &Path, audio: Option<&Path>, settings: EncoderSettings) -> Result<Self> {
        if settings.fps == 0 {
            anyhow::bail!("Frame rate must be a positive integer");
        }
        let partial_path = partial_path(output_path);
        let args = build_args(&settings, audio, &partial_path);

        let child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .context("Failed to spawn ffmpeg. Is ffmpeg installed?")?;

        log::info!(
            "FFmpeg encoder started: {}x{} @ {}fps, codec={}, audio={}",
            settings.width,
            settings.height,
            settings.fps,
            settings.codec,
            audio.is_some()
        );

        Ok(Self {
            child: Some(child),
            settings,
            partial_path,
            output_path: output_path.to_path_buf(),
            frames: 0,
        })
    }

    pub fn write_frame(&mut self, rgb_pixels: &[u8]) -> Result<()> {
        let expected = self.settings.frame_bytes();
        if rgb_pixels.len() != expected {
            anyhow::bail!(
                "Frame {} has {} bytes, expected {} for {}x{} rgb24",
                self.frames,
                rgb_pixels.len(),
                expected,
                self.settings.width,
                self.settings.height
            );
        }
        let stdin = self
            .child
            .as_mut()
            .and_then(|c| c.stdin.as_mut())
            .context("FFmpeg stdin not available")?;
        stdin.write_all(rgb_pixels).context("Failed to write frame to ffmpeg")?;
        self.frames += 1;
        Ok(())
    }

    pub fn finish(mut self) -> Result<()> {
        let mut child = self.child.take().context("FFmpeg already finished")?;
        // Close stdin to signal EOF
        drop(child.stdin.take());

        let output = child.wait_with_output().context("Failed to wait for ffmpeg")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("FFmpeg exited with error:\n{}", stderr);
        }

        std::fs::rename(&self.partial_path, &self.output_path).with_context(|| {
            format!(
                "Failed to move {} to {}",
                self.partial_path.display(),
                self.output_path.display()
            )
        })?;

        log::info!("FFmpeg encoding complete ({} frames)", self.frames);
        Ok(())
    }
}

impl Drop for FfmpegEncoder {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            log::warn!("Encoder dropped before finishing; discarding {}", self.partial_path.display());
            let _ = child.kill();
            let _ = child.wait();
        }
        if self.partial_path.exists() {
            let _ = std::fs::remove_file(&self.partial_path);
        }
    }
}
