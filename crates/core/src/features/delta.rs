use ndarray::{Array2, Axis};

pub const DELTA_WIDTH: usize = 9;

/// Local time derivative of `data` along its columns (the time axis).
///
/// Savitzky-Golay estimate: a polynomial of degree `order` is least-squares
/// fitted over a `width`-frame window and its `order`-th derivative is taken.
/// The first and last `width / 2` frames reuse the edge window, evaluated at
/// their own offset, instead of padding.
///
/// With fewer than `width` frames the window shrinks to the largest odd size
/// that fits; if no window can support the polynomial the result is all zeros.
pub fn delta(data: &Array2<f32>, width: usize, order: usize) -> Array2<f32> {
    if order == 0 {
        return data.clone();
    }

    let n = data.ncols();
    let mut window = width.min(n);
    if window % 2 == 0 {
        window = window.saturating_sub(1);
    }
    if window < 3 || window <= order {
        return Array2::zeros(data.raw_dim());
    }

    let half = window / 2;
    let kernels: Vec<Vec<f32>> = (0..window)
        .map(|pos| savgol_coeffs(window, order, order, pos as f64 - half as f64))
        .collect();

    let mut out = Array2::<f32>::zeros(data.raw_dim());
    for (row_in, mut row_out) in data.axis_iter(Axis(0)).zip(out.axis_iter_mut(Axis(0))) {
        for t in 0..n {
            let (start, pos) = if t < half {
                (0, t)
            } else if t >= n - half {
                (n - window, t - (n - window))
            } else {
                (t - half, half)
            };

            row_out[t] = kernels[pos]
                .iter()
                .enumerate()
                .map(|(i, &c)| c * row_in[start + i])
                .sum();
        }
    }

    out
}

/// Filter taps that evaluate the `deriv`-th derivative, at offset `x0` from the
/// window centre, of the degree-`polyorder` least-squares fit over `window` points.
fn savgol_coeffs(window: usize, polyorder: usize, deriv: usize, x0: f64) -> Vec<f32> {
    let half = (window / 2) as f64;
    let cols = polyorder + 1;
    let xs: Vec<f64> = (0..window).map(|i| i as f64 - half).collect();

    // Normal equations: (A^T A) z = e, taps = A z.
    let mut ata = vec![vec![0.0f64; cols]; cols];
    for &x in &xs {
        for (j, row) in ata.iter_mut().enumerate() {
            for (k, cell) in row.iter_mut().enumerate() {
                *cell += x.powi((j + k) as i32);
            }
        }
    }

    let mut e = vec![0.0f64; cols];
    for (j, ej) in e.iter_mut().enumerate().skip(deriv) {
        let falling: f64 = ((j - deriv + 1)..=j).map(|v| v as f64).product();
        *ej = falling * x0.powi((j - deriv) as i32);
    }

    let Some(z) = solve(ata, e) else {
        return vec![0.0; window];
    };

    xs.iter()
        .map(|&x| {
            z.iter()
                .enumerate()
                .map(|(j, &zj)| zj * x.powi(j as i32))
                .sum::<f64>() as f32
        })
        .collect()
}

/// Gaussian elimination with partial pivoting. `None` for a singular system.
fn solve(mut m: Vec<Vec<f64>>, mut rhs: Vec<f64>) -> Option<Vec<f64>> {
    let n = rhs.len();
    for col in 0..n {
        let pivot = (col..n).max_by(|&a, &b| m[a][col].abs().total_cmp(&m[b][col].abs()))?;
        if m[pivot][col].abs() < 1e-12 {
            return None;
        }
        m.swap(col, pivot);
        rhs.swap(col, pivot);

        for r in (col + 1)..n {
            let factor = m[r][col] / m[col][col];
            for c in col..n {
                m[r][c] -= factor * m[col][c];
            }
            rhs[r] -= factor * rhs[col];
        }
    }

    let mut x = vec![0.0f64; n];
    for r in (0..n).rev() {
        let tail: f64 = ((r + 1)..n).map(|c| m[r][c] * x[c]).sum();
        x[r] = (rhs[r] - tail) / m[r][r];
    }
    Some(x)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(values: Vec<f32>) -> Array2<f32> {
        let n = values.len();
        Array2::from_shape_vec((1, n), values).expect("shape")
    }

    #[test]
    fn first_order_taps_match_closed_form() {
        let taps = savgol_coeffs(9, 1, 1, 0.0);
        for (i, &c) in taps.iter().enumerate() {
            let k = i as f32 - 4.0;
            assert!((c - k / 60.0).abs() < 1e-6);
        }
    }

    #[test]
    fn second_order_taps_match_closed_form() {
        let taps = savgol_coeffs(9, 2, 2, 0.0);
        for (i, &c) in taps.iter().enumerate() {
            let k = i as f32 - 4.0;
            let expected = 2.0 * (k * k - 20.0 / 3.0) / 308.0;
            assert!((c - expected).abs() < 1e-6, "tap {i}: {c} vs {expected}");
        }
    }

    #[test]
    fn delta_of_ramp_is_its_slope_everywhere() {
        let data = row((0..20).map(|i| 3.0 * i as f32 + 1.0).collect());
        let d = delta(&data, DELTA_WIDTH, 1);
        assert!(d.iter().all(|&v| (v - 3.0).abs() < 1e-4), "{d:?}");
    }

    #[test]
    fn delta_delta_of_parabola_is_constant() {
        let data = row((0..20).map(|i| 0.5 * (i * i) as f32).collect());
        let dd = delta(&data, DELTA_WIDTH, 2);
        assert!(dd.iter().all(|&v| (v - 1.0).abs() < 1e-3), "{dd:?}");
    }

    #[test]
    fn constant_input_has_zero_derivatives() {
        let data = Array2::from_elem((3, 157), -7.5f32);
        for order in [1, 2] {
            let d = delta(&data, DELTA_WIDTH, order);
            assert_eq!(d.dim(), (3, 157));
            assert!(d.iter().all(|&v| v.abs() < 1e-4));
        }
    }

    #[test]
    fn short_input_shrinks_window() {
        let data = row(vec![0.0, 2.0, 4.0, 6.0, 8.0]);
        let d = delta(&data, DELTA_WIDTH, 1);
        assert!(d.iter().all(|&v| (v - 2.0).abs() < 1e-4));

        let tiny = row(vec![1.0, 2.0]);
        assert!(delta(&tiny, DELTA_WIDTH, 1).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn order_zero_is_identity() {
        let data = row(vec![1.0, -1.0, 2.0]);
        assert_eq!(delta(&data, DELTA_WIDTH, 0), data);
    }
}
