use crate::math::tensor::Tensor;

/// 2x2 average pooling, stride 2. Odd trailing rows/columns form partial
/// windows, so the output is `ceil(h / 2) x ceil(w / 2)`.
#[derive(Debug, Default)]
pub struct AvgPool2 {
    input_dim: (usize, usize, usize, usize),
}

impl AvgPool2 {
    pub fn new() -> AvgPool2 {
        AvgPool2::default()
    }

    pub fn forward(&mut self, x: &Tensor) -> Tensor {
        let (b, h, w, c) = x.dim();
        self.input_dim = (b, h, w, c);
        let mut out = Tensor::zeros((b, h.div_ceil(2), w.div_ceil(2), c));
        for ((n, y, xx, ch), v) in x.indexed_iter() {
            out[[n, y / 2, xx / 2, ch]] += v;
        }
        for ((_, oy, ox, _), v) in out.indexed_iter_mut() {
            *v /= window(h, oy) * window(w, ox);
        }
        out
    }

    pub fn backward(&self, grad: &Tensor) -> Tensor {
        let (b, h, w, c) = self.input_dim;
        Tensor::from_shape_fn((b, h, w, c), |(n, y, x, ch)| {
            grad[[n, y / 2, x / 2, ch]] / (window(h, y / 2) * window(w, x / 2))
        })
    }
}

/// Number of input cells pooled into output cell `o` along an axis of `size`.
fn window(size: usize, o: usize) -> f64 {
    ((2 * o + 2).min(size) - 2 * o) as f64
}

/// Nearest-neighbour 2x upsampling onto an explicit target size, so the
/// result lines up with the skip connection it is concatenated with.
#[derive(Debug, Default)]
pub struct Upsample2 {
    input_dim: (usize, usize, usize, usize),
}

impl Upsample2 {
    pub fn new() -> Upsample2 {
        Upsample2::default()
    }

    pub fn forward(&mut self, x: &Tensor, height: usize, width: usize) -> Tensor {
        let (b, _, _, c) = x.dim();
        self.input_dim = x.dim();
        Tensor::from_shape_fn((b, height, width, c), |(n, y, xx, ch)| x[[n, y / 2, xx / 2, ch]])
    }

    pub fn backward(&self, grad: &Tensor) -> Tensor {
        let mut d_input = Tensor::zeros(self.input_dim);
        for ((n, y, x, ch), g) in grad.indexed_iter() {
            d_input[[n, y / 2, x / 2, ch]] += g;
        }
        d_input
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pooling_averages_partial_windows() {
        let x = Tensor::from_shape_fn((1, 3, 3, 1), |(_, y, x, _)| (y * 3 + x) as f64);
        let mut pool = AvgPool2::new();
        let p = pool.forward(&x);
        assert_eq!(p.dim(), (1, 2, 2, 1));
        assert_eq!(p[[0, 0, 0, 0]], (0.0 + 1.0 + 3.0 + 4.0) / 4.0);
        assert_eq!(p[[0, 0, 1, 0]], (2.0 + 5.0) / 2.0);
        assert_eq!(p[[0, 1, 1, 0]], 8.0);
    }

    #[test]
    fn pooling_backward_preserves_total_gradient() {
        let mut pool = AvgPool2::new();
        pool.forward(&Tensor::zeros((2, 5, 4, 3)));
        let g = Tensor::ones((2, 3, 2, 3));
        let d = pool.backward(&g);
        assert_eq!(d.dim(), (2, 5, 4, 3));
        assert!((d.sum() - g.sum()).abs() < 1e-9);
    }

    #[test]
    fn upsample_then_backward_sums_copies() {
        let mut up = Upsample2::new();
        let x = Tensor::from_shape_fn((1, 2, 2, 1), |(_, y, x, _)| (y * 2 + x) as f64);
        let u = up.forward(&x, 3, 4);
        assert_eq!(u.dim(), (1, 3, 4, 1));
        assert_eq!(u[[0, 2, 3, 0]], 3.0);

        let d = up.backward(&Tensor::ones((1, 3, 4, 1)));
        assert_eq!(d[[0, 0, 0, 0]], 4.0);
        assert_eq!(d[[0, 1, 1, 0]], 2.0);
    }
}
