use ndarray::{s, Array1, ArrayView1};

use super::savgol::savitzky_golay;
use super::FilterDegraded;

const GAUSSIAN_SIGMA: f64 = 1.0;
const GAUSSIAN_RADIUS: usize = 4;
const EXP_ALPHA: f64 = 0.3;

/// Round to 3 decimals; `-0.0` comes out as `0.0`.
pub fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0 + 0.0
}

/// `f0 = x0`, `f1 = (x0+x1)/2`, `fi = (xi+xi-1+xi-2)/3`.
pub fn three_point(x: &[f64]) -> Vec<f64> {
    x.iter()
        .enumerate()
        .map(|(i, &v)| match i {
            0 => v,
            1 => (x[0] + v) / 2.0,
            _ => (v + x[i - 1] + x[i - 2]) / 3.0,
        })
        .collect()
}

pub(super) fn trailing_three(x: &[f64]) -> Result<Vec<f64>, FilterDegraded> {
    Ok(three_point(x))
}

fn degraded(filter: &'static str, reason: impl Into<String>) -> FilterDegraded {
    FilterDegraded {
        filter,
        reason: reason.into(),
    }
}

fn moving_average(x: &[f64], width: usize, name: &'static str) -> Result<Vec<f64>, FilterDegraded> {
    if x.len() < width {
        return Err(degraded(name, format!("{} points, window {width}", x.len())));
    }
    let half = width / 2;
    let padded = edge_padded(ArrayView1::from(x), half);
    Ok(padded
        .windows(width)
        .into_iter()
        .map(|w| w.sum() / width as f64)
        .collect())
}

pub(super) fn moving_average_7(x: &[f64]) -> Result<Vec<f64>, FilterDegraded> {
    moving_average(x, 7, "1/7")
}

pub(super) fn moving_average_9(x: &[f64]) -> Result<Vec<f64>, FilterDegraded> {
    moving_average(x, 9, "1/9")
}

pub(super) fn moving_average_11(x: &[f64]) -> Result<Vec<f64>, FilterDegraded> {
    moving_average(x, 11, "1/11")
}

pub(super) fn moving_average_13(x: &[f64]) -> Result<Vec<f64>, FilterDegraded> {
    moving_average(x, 13, "1/13")
}

pub(super) fn moving_average_15(x: &[f64]) -> Result<Vec<f64>, FilterDegraded> {
    moving_average(x, 15, "1/15")
}

fn edge_padded(x: ArrayView1<f64>, half: usize) -> Array1<f64> {
    let n = x.len();
    let mut out = Array1::<f64>::zeros(n + 2 * half);
    out.slice_mut(s![..half]).fill(x[0]);
    out.slice_mut(s![half..half + n]).assign(&x);
    out.slice_mut(s![half + n..]).fill(x[n - 1]);
    out
}

fn zero_padded(x: ArrayView1<f64>, half: usize) -> Array1<f64> {
    let n = x.len();
    let mut out = Array1::<f64>::zeros(n + 2 * half);
    out.slice_mut(s![half..half + n]).assign(&x);
    out
}

// Mirror about the outer edge: x[-1] = x[0], x[n] = x[n-1].
fn reflect_index(idx: isize, n: usize) -> usize {
    let n = n as isize;
    let period = 2 * n;
    let mut i = idx.rem_euclid(period);
    if i >= n {
        i = period - 1 - i;
    }
    i as usize
}

pub(super) fn gaussian(x: &[f64]) -> Result<Vec<f64>, FilterDegraded> {
    if x.len() < 5 {
        return Err(degraded("Gaussian Filter", format!("{} points", x.len())));
    }
    let radius = GAUSSIAN_RADIUS as isize;
    let mut weights: Array1<f64> = (-radius..=radius)
        .map(|k| (-0.5 * (k as f64 / GAUSSIAN_SIGMA).powi(2)).exp())
        .collect();
    let total = weights.sum();
    weights /= total;

    Ok((0..x.len() as isize)
        .map(|i| {
            weights
                .iter()
                .zip(-radius..=radius)
                .map(|(w, k)| w * x[reflect_index(i + k, x.len())])
                .sum::<f64>()
        })
        .collect())
}

fn median_with_kernel(x: &[f64], kernel: usize) -> Vec<f64> {
    let padded = zero_padded(ArrayView1::from(x), kernel / 2);
    padded
        .windows(kernel)
        .into_iter()
        .map(|w| {
            let mut window = w.to_vec();
            window.sort_by(|a, b| a.total_cmp(b));
            window[kernel / 2]
        })
        .collect()
}

pub(super) fn median(x: &[f64]) -> Result<Vec<f64>, FilterDegraded> {
    if x.len() < 3 {
        return Ok(x.to_vec());
    }
    Ok(median_with_kernel(x, 5.min(largest_odd_at_most(x.len()))))
}

pub(super) fn combo(x: &[f64]) -> Result<Vec<f64>, FilterDegraded> {
    if x.len() < 7 {
        return Err(degraded("Combo Filter", format!("{} points", x.len())));
    }
    let despiked = median_with_kernel(x, 3);
    savitzky_golay(&despiked, 5, 2).ok_or_else(|| degraded("Combo Filter", "singular fit"))
}

pub(super) fn exponential(x: &[f64]) -> Result<Vec<f64>, FilterDegraded> {
    let mut out = Vec::with_capacity(x.len());
    for (i, &v) in x.iter().enumerate() {
        let next = if i == 0 {
            v
        } else {
            EXP_ALPHA * v + (1.0 - EXP_ALPHA) * out[i - 1]
        };
        // the recurrence runs on the rounded previous value
        out.push(round3(next));
    }
    Ok(out)
}

pub(super) fn largest_odd_at_most(n: usize) -> usize {
    if n % 2 == 0 {
        n.saturating_sub(1)
    } else {
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moving_average_pads_with_edge_values() {
        let x = [0.0, 0.0, 0.0, 7.0, 0.0, 0.0, 0.0, 0.0];
        let out = moving_average_7(&x).unwrap();
        assert_eq!(out.len(), 8);
        assert!((out[3] - 1.0).abs() < 1e-12);
        assert!((out[0] - 1.0).abs() < 1e-12);
        assert_eq!(out[7], 0.0);
    }

    #[test]
    fn median_uses_zero_padding() {
        let out = median(&[5.0, 5.0, 5.0, 5.0, 5.0]).unwrap();
        // edges see two zeros in their window
        assert_eq!(out, vec![5.0, 5.0, 5.0, 5.0, 5.0]);
        let out = median(&[5.0, 5.0, 5.0]).unwrap();
        assert_eq!(out, vec![5.0, 5.0, 5.0]);
        let out = median(&[1.0, 9.0, 1.0, 1.0, 1.0, 1.0]).unwrap();
        assert_eq!(out[1], 1.0);
    }

    #[test]
    fn gaussian_keeps_constants_and_sums_to_one() {
        let out = gaussian(&[3.0; 9]).unwrap();
        for v in out {
            assert!((v - 3.0).abs() < 1e-12);
        }
    }

    #[test]
    fn reflect_mirrors_about_edges() {
        assert_eq!(reflect_index(-1, 5), 0);
        assert_eq!(reflect_index(-4, 5), 3);
        assert_eq!(reflect_index(5, 5), 4);
        assert_eq!(reflect_index(8, 5), 1);
        assert_eq!(reflect_index(2, 5), 2);
    }

    #[test]
    fn exponential_rounds_each_step() {
        let out = exponential(&[1.0, 0.0, 0.0]).unwrap();
        assert_eq!(out, vec![1.0, 0.7, 0.49]);
    }
}
