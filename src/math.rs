use nalgebra as na;
use num_traits::{Float, NumCast};

/// Least-squares line `y = b0 * x + b1`, returned as `[b0, b1]`.
pub fn linear_ls<T: na::RealField + Float>(
    x: &na::DVector<T>,
    y: &na::DVector<T>,
) -> Option<na::Vector2<T>> {
    let n = <T as NumCast>::from(x.len())?;

    let s_x = x.sum();
    let s_x2 = x.map(|v| v * v).sum();
    let s_xy = x.zip_map(y, |a, b| a * b).sum();
    let s_y = y.sum();

    let a = na::Matrix2::new(s_x2, s_x, s_x, n);
    let b = na::Vector2::new(s_xy, s_y);

    let qr_result = a.qr();
    let qty = qr_result.q().transpose() * b;
    let beta_hat = qr_result.r().solve_upper_triangular(&qty)?;

    if beta_hat.iter().all(|v| Float::is_finite(*v)) {
        Some(beta_hat)
    } else {
        None
    }
}

/// Least-squares parabola `y = a * x^2 + b * x + c`, returned as `[a, b, c]`.
pub fn quadratic_ls<T: na::RealField + Float>(
    x: &na::DVector<T>,
    y: &na::DVector<T>,
) -> Option<na::Vector3<T>> {
    let n = <T as NumCast>::from(x.len())?;

    let s_x1 = x.sum();
    let x2 = x.map(|v| v * v);
    let s_x2 = x2.sum();
    let x3 = x2.zip_map(x, |a, b| a * b);
    let s_x3 = x3.sum();
    let x4 = x3.zip_map(x, |a, b| a * b);
    let s_x4 = x4.sum();
    let s_x2y = x2.zip_map(y, |a, b| a * b).sum();
    let s_xy = x.zip_map(y, |a, b| a * b).sum();
    let s_y = y.sum();

    let a = na::Matrix3::new(s_x4, s_x3, s_x2, s_x3, s_x2, s_x1, s_x2, s_x1, n);
    let b = na::Vector3::new(s_x2y, s_xy, s_y);

    let qr_result = a.qr();
    let qty = qr_result.q().transpose() * b;
    let beta_hat = qr_result.r().solve_upper_triangular(&qty)?;

    if beta_hat.iter().all(|v| Float::is_finite(*v)) {
        Some(beta_hat)
    } else {
        None
    }
}

/// Real roots of `a * t^2 + b * t + c`, ascending. Degenerates to the linear root when `|a| < eps`.
pub fn quadratic_roots(a: f64, b: f64, c: f64, eps: f64) -> Vec<f64> {
    if a.abs() < eps {
        if b.abs() < eps {
            return Vec::new();
        }
        return vec![-c / b];
    }

    let disc = b * b - 4.0 * a * c;
    if disc < 0.0 {
        // complex pair; tolerate tiny negative discriminants from rounding
        if disc > -eps * b.abs().max(1.0) {
            return vec![-b / (2.0 * a)];
        }
        return Vec::new();
    }

    let sq = disc.sqrt();
    // numerically stable form, avoids cancellation for small `c`
    let q = -0.5 * (b + b.signum() * sq);
    let mut roots = if q.abs() < f64::MIN_POSITIVE {
        vec![-b / (2.0 * a)]
    } else {
        vec![q / a, c / q]
    };

    roots.retain(|r| r.is_finite());
    roots.sort_by(f64::total_cmp);
    roots
}

pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

pub fn mean<I: IntoIterator<Item = f64>>(values: I) -> Option<f64> {
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));

    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

/// Fraction of `values` for which `pred` holds, zero on empty input.
pub fn fraction<F: Fn(f64) -> bool>(values: &[f64], pred: F) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    values.iter().filter(|&&v| pred(v)).count() as f64 / values.len() as f64
}

#[inline]
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let k = 10f64.powi(decimals);
    (value * k).round() / k
}

/// Positive, finite and not NaN.
#[inline]
pub fn is_positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn linear_fit_recovers_line() {
        let x = na::DVector::from_vec(vec![0.0, 1.0, 2.0, 3.0, 4.0]);
        let y = x.map(|v| 2.5 * v - 1.0);
        let beta = linear_ls(&x, &y).unwrap();

        assert_relative_eq!(beta[0], 2.5, epsilon = 1e-9);
        assert_relative_eq!(beta[1], -1.0, epsilon = 1e-9);
    }

    #[test]
    fn quadratic_fit_recovers_parabola() {
        let x = na::DVector::from_iterator(12, (0..12).map(|i| i as f64 / 120.0));
        let y = x.map(|t| -4.905 * t * t + 14.0 * t + 0.25);
        let beta = quadratic_ls(&x, &y).unwrap();

        assert_relative_eq!(beta[0], -4.905, epsilon = 1e-5);
        assert_relative_eq!(beta[1], 14.0, epsilon = 1e-6);
        assert_relative_eq!(beta[2], 0.25, epsilon = 1e-8);
    }

    #[test]
    fn roots_of_launch_parabola() {
        // -4.905 t^2 + 14 t = 0 -> 0 and 14 / 4.905
        let roots = quadratic_roots(-4.905, 14.0, 0.0, 1e-9);
        assert_eq!(roots.len(), 2);
        assert_relative_eq!(roots[0], 0.0, epsilon = 1e-12);
        assert_relative_eq!(roots[1], 14.0 / 4.905, epsilon = 1e-12);

        assert!(quadratic_roots(1.0, 0.0, 1.0, 1e-9).is_empty());
        assert_eq!(quadratic_roots(0.0, 2.0, -4.0, 1e-9), vec![2.0]);
    }

    #[test]
    fn median_even_and_odd() {
        assert_eq!(median(&[]), None);
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), Some(2.5));
    }

    #[test]
    fn positivity_guards_nan() {
        assert!(is_positive(0.1));
        assert!(!is_positive(0.0));
        assert!(!is_positive(f64::NAN));
        assert!(!is_positive(f64::INFINITY));
    }
}
