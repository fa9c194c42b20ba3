use std::fs;
use std::path::{Path, PathBuf};

use image::DynamicImage;
use log::{debug, info};
use ndarray::Array3;

use crate::error::{N2nError, Result};

const EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "gif"];

/// Converts a decoded image to a `[height, width, channels]` array in [0, 1].
/// One channel means luma, three means RGB.
pub fn image_to_array(img: &DynamicImage, channels: usize) -> Result<Array3<f64>> {
    let (data, w, h) = match channels {
        1 => {
            let gray = img.to_luma8();
            let (w, h) = gray.dimensions();
            (gray.into_raw(), w, h)
        }
        3 => {
            let rgb = img.to_rgb8();
            let (w, h) = rgb.dimensions();
            (rgb.into_raw(), w, h)
        }
        n => return Err(N2nError::input(format!("images can be read as 1 or 3 channels, not {n}"))),
    };
    let values = data.into_iter().map(|v| f64::from(v) / 255.0).collect();
    Ok(Array3::from_shape_vec((h as usize, w as usize, channels), values)?)
}

/// Decodes PNG/JPEG/BMP/GIF bytes.
pub fn decode_image(bytes: &[u8], channels: usize) -> Result<Array3<f64>> {
    let img = image::load_from_memory(bytes)?;
    image_to_array(&img, channels)
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Loads every image file of `dir`, in file-name order.
pub fn load_images(dir: impl AsRef<Path>, channels: usize) -> Result<Vec<Array3<f64>>> {
    let dir = dir.as_ref();
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && is_image(p))
        .collect();
    paths.sort();

    let images = paths
        .iter()
        .map(|path| {
            debug!("loading {}", path.display());
            image_to_array(&image::open(path)?, channels)
        })
        .collect::<Result<Vec<_>>>()?;
    info!("loaded {} image(s) from {}", images.len(), dir.display());
    Ok(images)
}
