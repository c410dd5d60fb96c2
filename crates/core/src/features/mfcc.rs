use ndarray::Array2;
use std::f64::consts::PI;

/// Orthonormal DCT-II basis truncated to the first `n_coeffs` rows, shape `(n_coeffs, n_inputs)`.
pub fn dct_basis(n_coeffs: usize, n_inputs: usize) -> Array2<f32> {
    let n = n_inputs as f64;
    Array2::from_shape_fn((n_coeffs, n_inputs), |(k, i)| {
        let scale = if k == 0 {
            (1.0 / n).sqrt()
        } else {
            (2.0 / n).sqrt()
        };
        (scale * (PI * k as f64 * (2.0 * i as f64 + 1.0) / (2.0 * n)).cos()) as f32
    })
}
