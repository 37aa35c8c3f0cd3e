//! Cosmetic post-processing applied to a validated capture.
//!
//! Fixed pipeline: color enhancement, rounded-corner alpha mask, then
//! composition onto a white canvas over a blurred drop shadow. The result is
//! written to a temporary file in the same directory and only renamed over
//! the original once the whole pipeline has succeeded, so a failure at any
//! step leaves the capture untouched.

use std::path::Path;

use anyhow::{Context, Result, anyhow};
use image::{ImageBuffer, ImageFormat, Rgba, RgbaImage, imageops};

/// Corner radius of the radar frame, in pixels.
const CORNER_RADIUS: u32 = 24;
/// White padding around the framed radar.
const MARGIN: u32 = 48;
const SHADOW_BLUR_SIGMA: f32 = 12.0;
const SHADOW_OFFSET_Y: i64 = 8;
const SHADOW_ALPHA: u8 = 80;

const SATURATION: f32 = 1.18;
const BRIGHTNESS_LIFT: f32 = 6.0;
const GAMMA: f32 = 0.96;

/// Runs the pipeline over `path`, replacing the file in place on success.
pub fn process_in_place(path: &Path) -> Result<()> {
    let img = image::open(path)
        .with_context(|| format!("failed to decode {}", path.display()))?
        .to_rgba8();

    let framed = frame_with_shadow(&round_corners(enhance_colors(img)));

    let dir = path
        .parent()
        .ok_or_else(|| anyhow!("capture path has no parent directory"))?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .context("failed to create temporary file for post-processing")?;
    framed
        .write_to(tmp.as_file_mut(), ImageFormat::Png)
        .context("failed to encode post-processed image")?;
    tmp.persist(path)
        .with_context(|| format!("failed to replace {}", path.display()))?;
    Ok(())
}

/// Saturation boost, slight brightness lift, and gamma correction.
fn enhance_colors(mut img: RgbaImage) -> RgbaImage {
    for pixel in img.pixels_mut() {
        let luma = 0.299 * f32::from(pixel[0])
            + 0.587 * f32::from(pixel[1])
            + 0.114 * f32::from(pixel[2]);

        for channel in 0..3 {
            let value = f32::from(pixel[channel]);
            let saturated = luma + (value - luma) * SATURATION;
            let lifted = saturated + BRIGHTNESS_LIFT;
            let corrected = (lifted.clamp(0.0, 255.0) / 255.0).powf(GAMMA) * 255.0;
            pixel[channel] = corrected.round().clamp(0.0, 255.0) as u8;
        }
    }
    img
}

/// Makes pixels outside the corner arcs fully transparent.
fn round_corners(mut img: RgbaImage) -> RgbaImage {
    let (width, height) = img.dimensions();
    let radius = CORNER_RADIUS.min(width / 2).min(height / 2);
    if radius == 0 {
        return img;
    }
    let r2 = (radius * radius) as i64;

    for (x, y, pixel) in img.enumerate_pixels_mut() {
        // Arc center of the nearest corner, if this pixel sits in one.
        let cx = if x < radius {
            radius - 1
        } else if x >= width - radius {
            width - radius
        } else {
            continue;
        };
        let cy = if y < radius {
            radius - 1
        } else if y >= height - radius {
            height - radius
        } else {
            continue;
        };

        let dx = i64::from(x) - i64::from(cx);
        let dy = i64::from(y) - i64::from(cy);
        if dx * dx + dy * dy > r2 {
            pixel[3] = 0;
        }
    }
    img
}

/// Composes the radar onto a white canvas, shadow first.
fn frame_with_shadow(img: &RgbaImage) -> RgbaImage {
    let (width, height) = img.dimensions();
    let canvas_w = width + 2 * MARGIN;
    let canvas_h = height + 2 * MARGIN;

    let mut canvas: RgbaImage =
        ImageBuffer::from_pixel(canvas_w, canvas_h, Rgba([255, 255, 255, 255]));

    let mut shadow: RgbaImage = ImageBuffer::from_pixel(canvas_w, canvas_h, Rgba([0, 0, 0, 0]));
    let shadow_top = (i64::from(MARGIN) + SHADOW_OFFSET_Y).max(0) as u32;
    for y in shadow_top..(shadow_top + height).min(canvas_h) {
        for x in MARGIN..(MARGIN + width).min(canvas_w) {
            shadow.put_pixel(x, y, Rgba([40, 40, 40, SHADOW_ALPHA]));
        }
    }
    let shadow = imageops::blur(&shadow, SHADOW_BLUR_SIGMA);

    imageops::overlay(&mut canvas, &shadow, 0, 0);
    imageops::overlay(&mut canvas, img, i64::from(MARGIN), i64::from(MARGIN));
    canvas
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_image(width: u32, height: u32) -> RgbaImage {
        ImageBuffer::from_fn(width, height, |x, y| {
            Rgba([(x % 256) as u8, (y % 256) as u8, 128, 255])
        })
    }

    #[test]
    fn test_enhance_colors_boosts_saturation() {
        let mut img: RgbaImage = ImageBuffer::new(1, 1);
        img.put_pixel(0, 0, Rgba([200, 100, 50, 255]));
        let out = enhance_colors(img);
        let pixel = out.get_pixel(0, 0);

        // Spread between the strongest and weakest channel must grow.
        assert!(pixel[0] > pixel[2]);
        assert!(i32::from(pixel[0]) - i32::from(pixel[2]) > 150);
        assert_eq!(pixel[3], 255, "alpha is untouched");
    }

    #[test]
    fn test_round_corners_masks_corners_only() {
        let out = round_corners(sample_image(100, 100));
        assert_eq!(out.get_pixel(0, 0)[3], 0, "corner pixel becomes transparent");
        assert_eq!(out.get_pixel(99, 99)[3], 0);
        assert_eq!(out.get_pixel(50, 50)[3], 255, "center stays opaque");
        assert_eq!(out.get_pixel(50, 0)[3], 255, "edge midpoints stay opaque");
    }

    #[test]
    fn test_frame_adds_margin() {
        let framed = frame_with_shadow(&sample_image(60, 40));
        assert_eq!(framed.dimensions(), (60 + 2 * MARGIN, 40 + 2 * MARGIN));
        assert_eq!(*framed.get_pixel(0, 0), Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn test_process_in_place_replaces_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("radar_2026-08-04T00-00-00.png");
        sample_image(80, 50).save(&path).unwrap();

        process_in_place(&path).unwrap();

        let processed = image::open(&path).unwrap().to_rgba8();
        assert_eq!(processed.dimensions(), (80 + 2 * MARGIN, 50 + 2 * MARGIN));
    }

    #[test]
    fn test_process_failure_leaves_file_untouched() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("radar_2026-08-04T00-00-00.png");
        std::fs::write(&path, b"not a png at all").unwrap();

        assert!(process_in_place(&path).is_err());
        assert_eq!(std::fs::read(&path).unwrap(), b"not a png at all");
    }

    #[test]
    fn test_process_missing_file_errors() {
        let dir = tempdir().unwrap();
        assert!(process_in_place(&dir.path().join("absent.png")).is_err());
    }
}
