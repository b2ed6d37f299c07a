//! Regression error metrics.

/// Mean absolute error. `NaN` for empty input.
pub fn mean_absolute_error(actual: &[f64], predicted: &[f64]) -> f64 {
    let n = actual.len().min(predicted.len());
    if n == 0 {
        return f64::NAN;
    }
    actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).abs())
        .sum::<f64>()
        / n as f64
}

/// Median absolute error. `NaN` for empty input.
pub fn median_absolute_error(actual: &[f64], predicted: &[f64]) -> f64 {
    let errors: Vec<f64> = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).abs())
        .collect();
    median(&errors)
}

/// Coefficient of determination.
///
/// A constant target gives `0.0` rather than dividing by zero.
pub fn r_squared(actual: &[f64], predicted: &[f64]) -> f64 {
    let n = actual.len().min(predicted.len());
    if n == 0 {
        return f64::NAN;
    }
    let mean = actual[..n].iter().sum::<f64>() / n as f64;
    let ss_tot: f64 = actual[..n].iter().map(|a| (a - mean).powi(2)).sum();
    let ss_res: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum();
    if ss_tot <= 0.0 {
        return 0.0;
    }
    1.0 - ss_res / ss_tot
}

/// Median of a slice (average of the middle pair for even lengths).
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_on_small_sample() {
        let actual = [100.0, 200.0, 300.0, 400.0];
        let predicted = [110.0, 190.0, 330.0, 400.0];
        assert!((mean_absolute_error(&actual, &predicted) - 12.5).abs() < 1e-12);
        assert!((median_absolute_error(&actual, &predicted) - 10.0).abs() < 1e-12);
        let r2 = r_squared(&actual, &predicted);
        assert!(r2 > 0.9 && r2 < 1.0);
    }

    #[test]
    fn perfect_and_constant_cases() {
        let y = [1.0, 2.0, 3.0];
        assert_eq!(r_squared(&y, &y), 1.0);
        assert_eq!(r_squared(&[5.0, 5.0], &[4.0, 6.0]), 0.0);
        assert!(mean_absolute_error(&[], &[]).is_nan());
    }
}
