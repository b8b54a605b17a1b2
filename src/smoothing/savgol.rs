use ndarray::{Array1, Array2};

use super::kernels::largest_odd_at_most;
use super::FilterDegraded;

const DEFAULT_WINDOW: usize = 7;
const DEFAULT_ORDER: usize = 2;
const PIVOT_EPS: f64 = 1e-12;

pub(super) fn savitzky_golay_default(x: &[f64]) -> Result<Vec<f64>, FilterDegraded> {
    if x.len() < 5 {
        return Err(FilterDegraded {
            filter: "Savitzky-Golay",
            reason: format!("{} points", x.len()),
        });
    }
    let window = DEFAULT_WINDOW.min(largest_odd_at_most(x.len()));
    savitzky_golay(x, window, DEFAULT_ORDER).ok_or_else(|| FilterDegraded {
        filter: "Savitzky-Golay",
        reason: "singular least-squares system".into(),
    })
}

/// Savitzky-Golay smoothing. Interior points use the centred convolution
/// weights; the first and last half-windows are evaluated on a polynomial
/// fitted to the edge window.
pub(crate) fn savitzky_golay(x: &[f64], window: usize, order: usize) -> Option<Vec<f64>> {
    if window % 2 == 0 || window <= order || x.len() < window {
        return None;
    }
    let half = window / 2;
    let n = x.len();

    let offsets: Vec<f64> = (0..window).map(|j| j as f64 - half as f64).collect();
    let weights = centre_weights(&offsets, order)?;

    let mut out = vec![0.0; n];
    for i in half..n - half {
        out[i] = weights
            .iter()
            .zip(&x[i - half..=i + half])
            .map(|(w, v)| w * v)
            .sum();
    }

    let positions: Vec<f64> = (0..window).map(|j| j as f64).collect();
    let head = fit(&positions, &x[..window], order)?;
    for (i, slot) in out.iter_mut().enumerate().take(half) {
        *slot = eval(&head, i as f64);
    }
    let tail = fit(&positions, &x[n - window..], order)?;
    for i in n - half..n {
        out[i] = eval(&tail, (i + window - n) as f64);
    }
    Some(out)
}

fn vandermonde(xs: &[f64], order: usize) -> Array2<f64> {
    Array2::from_shape_fn((xs.len(), order + 1), |(r, c)| xs[r].powi(c as i32))
}

// Row of the pseudo-inverse that evaluates the fit at offset 0.
fn centre_weights(offsets: &[f64], order: usize) -> Option<Array1<f64>> {
    let a = vandermonde(offsets, order);
    let normal = a.t().dot(&a);
    let mut e0 = Array1::<f64>::zeros(order + 1);
    e0[0] = 1.0;
    let g = solve(normal, e0)?;
    Some(a.dot(&g))
}

fn fit(xs: &[f64], ys: &[f64], order: usize) -> Option<Array1<f64>> {
    let a = vandermonde(xs, order);
    let normal = a.t().dot(&a);
    let rhs = a.t().dot(&Array1::from(ys.to_vec()));
    solve(normal, rhs)
}

fn eval(coeffs: &Array1<f64>, x: f64) -> f64 {
    coeffs.iter().rev().fold(0.0, |acc, c| acc * x + c)
}

/// Gaussian elimination with partial pivoting. `None` when the system is singular.
fn solve(mut a: Array2<f64>, mut b: Array1<f64>) -> Option<Array1<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| a[[i, col]].abs().total_cmp(&a[[j, col]].abs()))?;
        if a[[pivot, col]].abs() < PIVOT_EPS {
            return None;
        }
        if pivot != col {
            for k in 0..n {
                a.swap([col, k], [pivot, k]);
            }
            b.swap(col, pivot);
        }
        for row in col + 1..n {
            let factor = a[[row, col]] / a[[col, col]];
            for k in col..n {
                a[[row, k]] -= factor * a[[col, k]];
            }
            b[row] -= factor * b[col];
        }
    }
    let mut x = Array1::<f64>::zeros(n);
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[[row, k]] * x[k]).sum();
        x[row] = (b[row] - tail) / a[[row, row]];
    }
    Some(x)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn five_point_quadratic_weights() {
        let offsets = [-2.0, -1.0, 0.0, 1.0, 2.0];
        let w = centre_weights(&offsets, 2).unwrap();
        let expected = [-3.0, 12.0, 17.0, 12.0, -3.0];
        for (got, want) in w.iter().zip(expected) {
            assert!((got - want / 35.0).abs() < 1e-12);
        }
    }

    #[test]
    fn reproduces_a_parabola_exactly() {
        let x: Vec<f64> = (0..12)
            .map(|i| {
                let t = i as f64;
                0.5 * t * t - 2.0 * t + 1.0
            })
            .collect();
        let out = savitzky_golay(&x, 7, 2).unwrap();
        for (a, b) in out.iter().zip(&x) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn singular_system_is_reported() {
        let a = Array2::zeros((2, 2));
        assert!(solve(a, Array1::zeros(2)).is_none());
    }
}
