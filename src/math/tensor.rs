use std::f64::consts::PI;

use ndarray::{concatenate, s, Array4, Axis};
use rand::Rng;

use crate::error::Result;

/// Dense image batch laid out as `[batch, height, width, channels]`.
pub type Tensor = Array4<f64>;

/// Samples a single value from N(0, 1) using the Box-Muller transform.
pub fn sample_standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    // Two independent uniform samples in (0, 1] to avoid log(0).
    let u1: f64 = 1.0 - rng.gen::<f64>();
    let u2: f64 = 1.0 - rng.gen::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

/// He initialization for a convolution kernel of shape
/// `[k, k, in_channels, out_channels]`: samples from N(0, sqrt(2 / fan_in))
/// with `fan_in = k * k * in_channels`.
pub fn he_kernel<R: Rng + ?Sized>(
    k: usize,
    in_channels: usize,
    out_channels: usize,
    rng: &mut R,
) -> Array4<f64> {
    let fan_in = (k * k * in_channels).max(1);
    let std_dev = (2.0 / fan_in as f64).sqrt();
    Array4::from_shape_simple_fn((k, k, in_channels, out_channels), || {
        sample_standard_normal(rng) * std_dev
    })
}

/// Concatenates two tensors along the channel axis.
pub fn concat_channels(a: &Tensor, b: &Tensor) -> Result<Tensor> {
    Ok(concatenate(Axis(3), &[a.view(), b.view()])?.as_standard_layout().into_owned())
}

/// Inverse of [`concat_channels`]: splits `t` into channels `[..at]` and `[at..]`.
pub fn split_channels(t: &Tensor, at: usize) -> (Tensor, Tensor) {
    (
        t.slice(s![.., .., .., ..at]).to_owned(),
        t.slice(s![.., .., .., at..]).to_owned(),
    )
}

/// Keeps the central `fraction` of both spatial dimensions.
///
/// The offset is `floor((size - size * fraction) / 2)` on each side and the
/// kept extent is `size - 2 * offset`, never less than one pixel.
pub fn center_crop(t: &Tensor, fraction: f64) -> Tensor {
    let (_, h, w, _) = t.dim();
    let (y0, ch) = crop_window(h, fraction);
    let (x0, cw) = crop_window(w, fraction);
    t.slice(s![.., y0..y0 + ch, x0..x0 + cw, ..]).to_owned()
}

fn crop_window(size: usize, fraction: f64) -> (usize, usize) {
    let fraction = fraction.clamp(0.0, 1.0);
    let start = ((size as f64 - size as f64 * fraction) / 2.0).floor() as usize;
    let start = start.min(size.saturating_sub(1) / 2);
    (start, (size - 2 * start).max(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn he_kernel_has_requested_shape_and_spread() {
        let mut rng = StdRng::seed_from_u64(7);
        let k = he_kernel(3, 8, 16, &mut rng);
        assert_eq!(k.dim(), (3, 3, 8, 16));
        let mean = k.mean().unwrap();
        let var = k.mapv(|x| (x - mean).powi(2)).mean().unwrap();
        // Expected variance 2 / 72.
        assert!((var - 2.0 / 72.0).abs() < 0.01, "variance {var}");
    }

    #[test]
    fn concat_then_split_restores_both_halves() {
        let a = Tensor::from_elem((1, 2, 2, 1), 1.0);
        let b = Tensor::from_elem((1, 2, 2, 2), 2.0);
        let joined = concat_channels(&a, &b).unwrap();
        assert_eq!(joined.dim(), (1, 2, 2, 3));
        assert!(joined.is_standard_layout());
        assert!(joined.clone().into_shape_with_order((4, 3)).is_ok());
        let (left, right) = split_channels(&joined, 1);
        assert_eq!(left, a);
        assert_eq!(right, b);
    }

    #[test]
    fn center_crop_keeps_middle_region() {
        let t = Tensor::from_shape_fn((1, 10, 5, 1), |(_, y, x, _)| (y * 10 + x) as f64);
        let c = center_crop(&t, 0.4);
        // height 10 -> offset 3, keep 4; width 5 -> offset 1, keep 3
        assert_eq!(c.dim(), (1, 4, 3, 1));
        assert_eq!(c[[0, 0, 0, 0]], 31.0);
    }

    #[test]
    fn center_crop_never_empties_tiny_images() {
        let t = Tensor::zeros((1, 1, 2, 1));
        assert_eq!(center_crop(&t, 0.1).dim(), (1, 1, 2, 1));
    }
}
