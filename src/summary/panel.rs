use std::fs;
use std::path::{Path, PathBuf};

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};

use crate::error::Result;
use crate::math::tensor::{center_crop, Tensor};

/// Fraction of each spatial dimension kept by the zoomed panel.
pub const CROP_FRACTION: f64 = 0.4;
/// Upscaling applied to the cropped tiles.
pub const CROP_SCALE: f64 = 1.5;

/// Renders sample `index` of `t` as an 8-bit RGB image. Three-channel
/// tensors are drawn in colour, everything else as grayscale of channel 0.
/// Values are clamped to [0, 1].
pub fn tensor_to_rgb(t: &Tensor, index: usize) -> RgbImage {
    let (_, h, w, c) = t.dim();
    let to_u8 = |v: f64| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
    RgbImage::from_fn(w as u32, h as u32, |x, y| {
        let (y, x) = (y as usize, x as usize);
        if c == 3 {
            Rgb([to_u8(t[[index, y, x, 0]]), to_u8(t[[index, y, x, 1]]), to_u8(t[[index, y, x, 2]])])
        } else {
            let g = to_u8(t[[index, y, x, 0]]);
            Rgb([g, g, g])
        }
    })
}

/// Lays the tensors side by side (`input | prediction | gt`), one row per
/// sample, for the first `max_images` samples. Each tile is resized by
/// `scale` with bilinear filtering when `scale != 1`.
pub fn triptych(tensors: [&Tensor; 3], max_images: usize, scale: f64) -> RgbImage {
    let (b, h, w, _) = tensors[0].dim();
    let rows = b.min(max_images.max(1));
    let tile_w = ((w as f64 * scale).round() as u32).max(1);
    let tile_h = ((h as f64 * scale).round() as u32).max(1);

    let mut panel = RgbImage::new(tile_w * 3, tile_h * rows as u32);
    for row in 0..rows {
        for (col, t) in tensors.iter().enumerate() {
            let mut tile = tensor_to_rgb(t, row);
            if tile.dimensions() != (tile_w, tile_h) {
                tile = imageops::resize(&tile, tile_w, tile_h, FilterType::Triangle);
            }
            let x = i64::from(tile_w) * col as i64;
            let y = i64::from(tile_h) * row as i64;
            imageops::replace(&mut panel, &tile, x, y);
        }
    }
    panel
}

/// Writes the full triptych and its centre-cropped, upscaled variant into
/// `dir`. Returns the two file paths.
pub fn write_eval_panels(
    dir: &Path,
    step: u64,
    input: &Tensor,
    prediction: &Tensor,
    gt: &Tensor,
    max_images: usize,
) -> Result<[PathBuf; 2]> {
    fs::create_dir_all(dir)?;

    let full = triptych([input, prediction, gt], max_images, 1.0);
    let full_path = dir.join(format!("step_{step:08}_panel.png"));
    full.save(&full_path)?;

    let cropped = [
        center_crop(input, CROP_FRACTION),
        center_crop(prediction, CROP_FRACTION),
        center_crop(gt, CROP_FRACTION),
    ];
    let zoom = triptych([&cropped[0], &cropped[1], &cropped[2]], max_images, CROP_SCALE);
    let zoom_path = dir.join(format!("step_{step:08}_panel_crop.png"));
    zoom.save(&zoom_path)?;

    Ok([full_path, zoom_path])
}
