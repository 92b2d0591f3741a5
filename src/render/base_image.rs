use anyhow::{Context, Result};
use image::imageops::FilterType;
use image::RgbImage;
use std::path::Path;

/// Load the base image as 8-bit RGB, resizing to `width`x`height` when it differs.
pub fn load_base_image(path: &Path, width: u32, height: u32) -> Result<RgbImage> {
    if width == 0 || height == 0 {
        anyhow::bail!("Output size {}x{} has a zero dimension", width, height);
    }
    let img = image::open(path)
        .with_context(|| format!("Failed to open image: {}", path.display()))?
        .to_rgb8();

    if img.dimensions() == (width, height) {
        return Ok(img);
    }
    log::info!(
        "Resizing base image {}x{} -> {}x{}",
        img.width(),
        img.height(),
        width,
        height
    );
    Ok(image::imageops::resize(&img, width, height, FilterType::Lanczos3))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn write_png(dir: &Path, w: u32, h: u32) -> std::path::PathBuf {
        let path = dir.join("base.png");
        RgbImage::from_pixel(w, h, Rgb([10, 200, 30])).save(&path).unwrap();
        path
    }

    #[test]
    fn keeps_matching_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), 8, 6);
        let img = load_base_image(&path, 8, 6).unwrap();
        assert_eq!(img.dimensions(), (8, 6));
        assert_eq!(img.get_pixel(3, 3), &Rgb([10, 200, 30]));
    }

    #[test]
    fn resizes_to_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), 8, 6);
        let img = load_base_image(&path, 16, 4).unwrap();
        assert_eq!(img.dimensions(), (16, 4));
    }

    #[test]
    fn missing_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_base_image(&dir.path().join("nope.png"), 8, 8).is_err());
        let path = write_png(dir.path(), 8, 6);
        assert!(load_base_image(&path, 0, 6).is_err());
    }
}
