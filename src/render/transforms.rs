use anyhow::Result;
use image::{imageops, Rgb, RgbImage};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use std::collections::HashMap;

/// Uniform transform signature: mutate the frame in place using resolved parameters.
pub type TransformFn = fn(&mut RgbImage, &Params, &mut ChaCha8Rng) -> Result<()>;

#[derive(Clone, Copy, Debug)]
pub struct ParamDef {
    pub name: &'static str,
    pub default: f64,
}

const fn param(name: &'static str, default: f64) -> ParamDef {
    ParamDef { name, default }
}

/// A named image transform and the parameters it accepts.
#[derive(Clone, Copy)]
pub struct TransformSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub params: &'static [ParamDef],
    pub apply: TransformFn,
}

impl TransformSpec {
    pub fn param_slot(&self, name: &str) -> Option<usize> {
        self.params.iter().position(|p| p.name == name)
    }

    pub fn defaults(&self) -> Vec<f64> {
        self.params.iter().map(|p| p.default).collect()
    }
}

impl std::fmt::Debug for TransformSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformSpec")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish()
    }
}

/// Parameter values for one transform call, in the order of `TransformSpec::params`.
pub struct Params<'a> {
    defs: &'a [ParamDef],
    values: &'a [f64],
}

impl<'a> Params<'a> {
    pub fn new(defs: &'a [ParamDef], values: &'a [f64]) -> Self {
        Self { defs, values }
    }

    /// Value for `name`; undeclared names read as 0.
    pub fn get(&self, name: &str) -> f64 {
        match self.defs.iter().position(|d| d.name == name) {
            Some(i) => self.values[i],
            None => {
                log::warn!("Undeclared transform parameter '{}'", name);
                0.0
            }
        }
    }

    fn count(&self, name: &str) -> usize {
        let v = self.get(name);
        if v.is_finite() && v > 0.0 {
            v as usize
        } else {
            0
        }
    }
}

/// Name → transform lookup, resolved once before synthesis.
#[derive(Clone, Debug)]
pub struct TransformRegistry {
    specs: HashMap<&'static str, TransformSpec>,
}

impl Default for TransformRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl TransformRegistry {
    pub fn empty() -> Self {
        Self { specs: HashMap::new() }
    }

    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        for spec in BUILTIN {
            registry.register(*spec);
        }
        registry
    }

    /// Add or replace a transform.
    pub fn register(&mut self, spec: TransformSpec) {
        self.specs.insert(spec.name, spec);
    }

    pub fn get(&self, name: &str) -> Option<&TransformSpec> {
        self.specs.get(name)
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.specs.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

const LINE_PARAMS: &[ParamDef] = &[
    param("no_lines", 10.0),
    param("min_thickness", 1.0),
    param("max_thickness", 8.0),
];

const BUILTIN: &[TransformSpec] = &[
    TransformSpec {
        name: "median_blur",
        description: "Median filter with an odd square kernel",
        params: &[param("kernel_size", 51.0)],
        apply: median_blur,
    },
    TransformSpec {
        name: "gaussian_blur",
        description: "Gaussian blur; kernel_size 0 leaves the frame untouched",
        params: &[param("kernel_size", 51.0)],
        apply: gaussian_blur,
    },
    TransformSpec {
        name: "gaussian_noise",
        description: "Additive per-channel Gaussian noise",
        params: &[param("mean", 0.0), param("standard_deviation", 5.0)],
        apply: gaussian_noise,
    },
    TransformSpec {
        name: "salt_and_pepper",
        description: "Random white and black pixels",
        params: &[param("noise_ratio", 0.1)],
        apply: salt_and_pepper,
    },
    TransformSpec {
        name: "hue_multiplication",
        description: "Scale hue (degrees, wrapped) over the whole frame",
        params: &[param("hue_factor", 1.0)],
        apply: hue_multiplication,
    },
    TransformSpec {
        name: "hue_multiplication_area",
        description: "Scale hue inside a rectangle given as fractions of the frame",
        params: &[
            param("area_centre_width", 0.5),
            param("area_centre_height", 0.5),
            param("area_width", 1.0),
            param("area_height", 1.0),
            param("mod_factor", 1.0),
        ],
        apply: hue_multiplication_area,
    },
    TransformSpec {
        name: "saturation_multiplication",
        description: "Scale saturation, clipped to full saturation",
        params: &[param("saturation_factor", 1.0)],
        apply: saturation_multiplication,
    },
    TransformSpec {
        name: "rgb_multiplication",
        description: "Scale each RGB channel independently",
        params: &[
            param("red_factor", 1.0),
            param("green_factor", 1.0),
            param("blue_factor", 1.0),
        ],
        apply: rgb_multiplication,
    },
    TransformSpec {
        name: "red_scaling",
        description: "Push the red channel toward 0 (negative) or 255 (positive)",
        params: &[param("scale_factor", 0.0)],
        apply: red_scaling,
    },
    TransformSpec {
        name: "green_scaling",
        description: "Push the green channel toward 0 (negative) or 255 (positive)",
        params: &[param("scale_factor", 0.0)],
        apply: green_scaling,
    },
    TransformSpec {
        name: "blue_scaling",
        description: "Push the blue channel toward 0 (negative) or 255 (positive)",
        params: &[param("scale_factor", 0.0)],
        apply: blue_scaling,
    },
    TransformSpec {
        name: "ghost_images",
        description: "Blend randomly shifted copies over the frame",
        params: &[
            param("number_of_ghost_images", 5.0),
            param("max_shift", 75.0),
            param("alpha", 0.1),
        ],
        apply: ghost_images,
    },
    TransformSpec {
        name: "red_vlines",
        description: "Random vertical lines saturating the red channel",
        params: LINE_PARAMS,
        apply: red_vlines,
    },
    TransformSpec {
        name: "green_vlines",
        description: "Random vertical lines saturating the green channel",
        params: LINE_PARAMS,
        apply: green_vlines,
    },
    TransformSpec {
        name: "blue_vlines",
        description: "Random vertical lines saturating the blue channel",
        params: LINE_PARAMS,
        apply: blue_vlines,
    },
    TransformSpec {
        name: "random_coloured_hlines",
        description: "Random horizontal bands of random colour",
        params: LINE_PARAMS,
        apply: random_coloured_hlines,
    },
];

/// Largest size fed to the rounding helpers; keeps `x + 1` from overflowing.
const MAX_ROUNDED: f64 = (u32::MAX - 1) as f64;

fn round_up_odd(x: f64) -> u32 {
    let x = if x.is_finite() && x > 0.0 { x.min(MAX_ROUNDED) as u32 } else { 0 };
    if x % 2 == 1 { x } else { x + 1 }
}

fn round_up_even(x: f64) -> u32 {
    let x = if x.is_finite() && x > 0.0 { x.min(MAX_ROUNDED) as u32 } else { 0 };
    if x % 2 == 0 { x } else { x + 1 }
}

fn clamp_u8(v: f64) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

fn median_blur(img: &mut RgbImage, p: &Params, _rng: &mut ChaCha8Rng) -> Result<()> {
    let (w, h) = img.dimensions();
    // Past twice the longest side the window only adds replicated border pixels
    let k = round_up_odd(p.get("kernel_size")).min(2 * w.max(h) + 1);
    if k <= 1 {
        return Ok(());
    }
    let r = (k / 2) as i64;
    let rank = (k as u64 * k as u64) / 2 + 1;
    let src = img.clone();
    let cx = |x: i64| x.clamp(0, w as i64 - 1) as u32;
    let cy = |y: i64| y.clamp(0, h as i64 - 1) as u32;

    // Sliding histogram per row, border pixels replicated
    for c in 0..3 {
        for y in 0..h as i64 {
            let mut hist = [0u64; 256];
            for dy in -r..=r {
                for dx in -r..=r {
                    hist[src.get_pixel(cx(dx), cy(y + dy))[c] as usize] += 1;
                }
            }
            img.get_pixel_mut(0, y as u32)[c] = histogram_rank(&hist, rank);

            for x in 1..w as i64 {
                let (out_x, in_x) = (cx(x - 1 - r), cx(x + r));
                for dy in -r..=r {
                    let yy = cy(y + dy);
                    hist[src.get_pixel(out_x, yy)[c] as usize] -= 1;
                    hist[src.get_pixel(in_x, yy)[c] as usize] += 1;
                }
                img.get_pixel_mut(x as u32, y as u32)[c] = histogram_rank(&hist, rank);
            }
        }
    }
    Ok(())
}

fn histogram_rank(hist: &[u64; 256], rank: u64) -> u8 {
    let mut seen = 0;
    for (value, &count) in hist.iter().enumerate() {
        seen += count;
        if seen >= rank {
            return value as u8;
        }
    }
    255
}

fn gaussian_blur(img: &mut RgbImage, p: &Params, _rng: &mut ChaCha8Rng) -> Result<()> {
    let size = p.get("kernel_size");
    if !(size >= 1.0) {
        return Ok(());
    }
    let k = round_up_odd(size) as f64;
    // Sigma implied by an odd kernel size
    let sigma = 0.3 * ((k - 1.0) * 0.5 - 1.0) + 0.8;
    *img = imageops::blur(&*img, sigma as f32);
    Ok(())
}

fn gaussian_noise(img: &mut RgbImage, p: &Params, rng: &mut ChaCha8Rng) -> Result<()> {
    let mean = p.get("mean");
    let sd = p.get("standard_deviation");
    for px in img.pixels_mut() {
        for ch in px.0.iter_mut() {
            *ch = clamp_u8(*ch as f64 + mean + sd * standard_normal(rng));
        }
    }
    Ok(())
}

/// Box-Muller draw from N(0, 1).
fn standard_normal(rng: &mut ChaCha8Rng) -> f64 {
    let u1: f64 = 1.0 - rng.gen::<f64>();
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

fn salt_and_pepper(img: &mut RgbImage, p: &Params, rng: &mut ChaCha8Rng) -> Result<()> {
    let ratio = p.get("noise_ratio").clamp(0.0, 1.0);
    let (w, h) = img.dimensions();
    let per_colour = ((w as f64 * h as f64) * ratio / 2.0) as usize;
    for value in [255u8, 0] {
        for _ in 0..per_colour {
            let (x, y) = (rng.gen_range(0..w), rng.gen_range(0..h));
            img.put_pixel(x, y, Rgb([value; 3]));
        }
    }
    Ok(())
}

fn hue_multiplication(img: &mut RgbImage, p: &Params, _rng: &mut ChaCha8Rng) -> Result<()> {
    let factor = p.get("hue_factor");
    let (w, h) = img.dimensions();
    scale_hue(img, (0, w, 0, h), factor);
    Ok(())
}

/// Pixel bounds `(left, right, top, bottom)` of a centred area, clamped to the frame.
/// Horizontal values are fractions of the width, vertical ones of the height.
pub fn area_bounds(
    width: u32,
    height: u32,
    centre_x: f64,
    centre_y: f64,
    area_w: f64,
    area_h: f64,
) -> (u32, u32, u32, u32) {
    let (w, h) = (width as f64, height as f64);
    let cx = (centre_x * w).trunc();
    let cy = (centre_y * h).trunc();
    let half_w = round_up_even(w * area_w) as f64 / 2.0;
    let half_h = round_up_even(h * area_h) as f64 / 2.0;
    let clamp_to = |v: f64, max: f64| if v.is_nan() { 0 } else { v.clamp(0.0, max) as u32 };
    (
        clamp_to(cx - half_w, w),
        clamp_to(cx + half_w, w),
        clamp_to(cy - half_h, h),
        clamp_to(cy + half_h, h),
    )
}

fn hue_multiplication_area(img: &mut RgbImage, p: &Params, _rng: &mut ChaCha8Rng) -> Result<()> {
    let (w, h) = img.dimensions();
    let bounds = area_bounds(
        w,
        h,
        p.get("area_centre_width"),
        p.get("area_centre_height"),
        p.get("area_width"),
        p.get("area_height"),
    );
    scale_hue(img, bounds, p.get("mod_factor"));
    Ok(())
}

fn scale_hue(img: &mut RgbImage, (left, right, top, bottom): (u32, u32, u32, u32), factor: f64) {
    if !factor.is_finite() {
        return;
    }
    for y in top..bottom {
        for x in left..right {
            let px = img.get_pixel_mut(x, y);
            let (hue, s, v) = rgb_to_hsv(px.0);
            px.0 = hsv_to_rgb((hue * factor).rem_euclid(360.0), s, v);
        }
    }
}

fn saturation_multiplication(img: &mut RgbImage, p: &Params, _rng: &mut ChaCha8Rng) -> Result<()> {
    let factor = p.get("saturation_factor");
    if !factor.is_finite() {
        return Ok(());
    }
    for px in img.pixels_mut() {
        let (hue, s, v) = rgb_to_hsv(px.0);
        px.0 = hsv_to_rgb(hue, (s * factor).clamp(0.0, 1.0), v);
    }
    Ok(())
}

fn rgb_multiplication(img: &mut RgbImage, p: &Params, _rng: &mut ChaCha8Rng) -> Result<()> {
    let factors = [p.get("red_factor"), p.get("green_factor"), p.get("blue_factor")];
    for px in img.pixels_mut() {
        for (ch, f) in px.0.iter_mut().zip(factors) {
            *ch = clamp_u8(*ch as f64 * f);
        }
    }
    Ok(())
}

fn scale_channel(img: &mut RgbImage, factor: f64, channel: usize) {
    if factor == 0.0 || !factor.is_finite() {
        return;
    }
    for px in img.pixels_mut() {
        let v = px.0[channel] as f64;
        px.0[channel] = if factor < 0.0 {
            clamp_u8(v + factor * v)
        } else {
            clamp_u8(v + factor * (255.0 - v))
        };
    }
}

fn red_scaling(img: &mut RgbImage, p: &Params, _rng: &mut ChaCha8Rng) -> Result<()> {
    scale_channel(img, p.get("scale_factor"), 0);
    Ok(())
}

fn green_scaling(img: &mut RgbImage, p: &Params, _rng: &mut ChaCha8Rng) -> Result<()> {
    scale_channel(img, p.get("scale_factor"), 1);
    Ok(())
}

fn blue_scaling(img: &mut RgbImage, p: &Params, _rng: &mut ChaCha8Rng) -> Result<()> {
    scale_channel(img, p.get("scale_factor"), 2);
    Ok(())
}

fn ghost_images(img: &mut RgbImage, p: &Params, rng: &mut ChaCha8Rng) -> Result<()> {
    let copies = p.count("number_of_ghost_images");
    let (w, h) = img.dimensions();
    let max_shift = p.count("max_shift").min(w.max(h) as usize) as i64;
    let alpha = p.get("alpha");
    if copies == 0 || !alpha.is_finite() {
        return Ok(());
    }

    let mut acc: Vec<f64> = img.as_raw().iter().map(|&v| v as f64).collect();
    for _ in 0..copies {
        let dx = rng.gen_range(-max_shift..=max_shift);
        let dy = rng.gen_range(-max_shift..=max_shift);
        for y in 0..h as i64 {
            let sy = y - dy;
            if sy < 0 || sy >= h as i64 {
                continue;
            }
            for x in 0..w as i64 {
                let sx = x - dx;
                if sx < 0 || sx >= w as i64 {
                    continue;
                }
                let src = img.get_pixel(sx as u32, sy as u32);
                let base = ((y * w as i64 + x) * 3) as usize;
                for c in 0..3 {
                    acc[base + c] += alpha * src[c] as f64;
                }
            }
        }
    }

    for (dst, v) in img.iter_mut().zip(acc) {
        *dst = clamp_u8(v);
    }
    Ok(())
}

fn line_spans(extent: u32, p: &Params, rng: &mut ChaCha8Rng) -> Vec<(u32, u32)> {
    let lines = p.count("no_lines");
    let min_t = p.count("min_thickness") as u32;
    let max_t = p.count("max_thickness") as u32;
    (0..lines)
        .map(|_| {
            let start = rng.gen_range(0..extent);
            let thickness = if max_t > min_t { rng.gen_range(min_t..max_t) } else { min_t };
            (start, start.saturating_add(thickness).min(extent))
        })
        .collect()
}

fn coloured_vlines(img: &mut RgbImage, p: &Params, rng: &mut ChaCha8Rng, channel: usize) {
    let (w, h) = img.dimensions();
    for (x0, x1) in line_spans(w, p, rng) {
        for y in 0..h {
            for x in x0..x1 {
                img.get_pixel_mut(x, y)[channel] = 255;
            }
        }
    }
}

fn red_vlines(img: &mut RgbImage, p: &Params, rng: &mut ChaCha8Rng) -> Result<()> {
    coloured_vlines(img, p, rng, 0);
    Ok(())
}

fn green_vlines(img: &mut RgbImage, p: &Params, rng: &mut ChaCha8Rng) -> Result<()> {
    coloured_vlines(img, p, rng, 1);
    Ok(())
}

fn blue_vlines(img: &mut RgbImage, p: &Params, rng: &mut ChaCha8Rng) -> Result<()> {
    coloured_vlines(img, p, rng, 2);
    Ok(())
}

fn random_coloured_hlines(img: &mut RgbImage, p: &Params, rng: &mut ChaCha8Rng) -> Result<()> {
    let (w, h) = img.dimensions();
    for (y0, y1) in line_spans(h, p, rng) {
        let colour = Rgb([rng.gen(), rng.gen(), rng.gen()]);
        for y in y0..y1 {
            for x in 0..w {
                img.put_pixel(x, y, colour);
            }
        }
    }
    Ok(())
}

/// RGB → (hue degrees [0, 360), saturation [0, 1], value [0, 1]).
fn rgb_to_hsv([r, g, b]: [u8; 3]) -> (f64, f64, f64) {
    let (r, g, b) = (r as f64 / 255.0, g as f64 / 255.0, b as f64 / 255.0);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let hue = if delta == 0.0 {
        0.0
    } else if max == r {
        60.0 * ((g - b) / delta).rem_euclid(6.0)
    } else if max == g {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };
    let s = if max == 0.0 { 0.0 } else { delta / max };
    (hue, s, max)
}

fn hsv_to_rgb(hue: f64, s: f64, v: f64) -> [u8; 3] {
    let c = v * s;
    let hp = hue.rem_euclid(360.0) / 60.0;
    let x = c * (1.0 - (hp.rem_euclid(2.0) - 1.0).abs());
    let (r, g, b) = match hp as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let m = v - c;
    [
        clamp_u8((r + m) * 255.0),
        clamp_u8((g + m) * 255.0),
        clamp_u8((b + m) * 255.0),
    ]
}
