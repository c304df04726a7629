//! Sample statistics and Welch's unequal-variance t-test

use statrs::distribution::{ContinuousCDF, StudentsT};

use crate::types::SampleStats;
use crate::OUTLIER_SD_LIMIT;

pub fn mean(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    data.iter().sum::<f64>() / data.len() as f64
}

/// Sample standard deviation (n - 1); 0 below two samples
pub fn sample_sd(data: &[f64]) -> f64 {
    if data.len() < 2 {
        return 0.0;
    }
    let m = mean(data);
    let var = data.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (data.len() - 1) as f64;
    var.sqrt()
}

/// sd / mean × 100; 0 when the mean is 0
pub fn cv(mean: f64, sd: f64) -> f64 {
    if mean == 0.0 {
        0.0
    } else {
        sd / mean * 100.0
    }
}

/// Drop points further than 3 sd from the first-pass mean
pub fn trim_outliers(data: &[f64]) -> Vec<f64> {
    if data.len() <= 1 {
        return data.to_vec();
    }
    let m = mean(data);
    let sd = sample_sd(data);
    if sd == 0.0 {
        return data.to_vec();
    }
    data.iter()
        .copied()
        .filter(|x| (x - m).abs() <= OUTLIER_SD_LIMIT * sd)
        .collect()
}

/// Trim, then summarize what is left. Returns the kept samples as well.
pub fn summarize(data: &[f64]) -> (SampleStats, Vec<f64>) {
    let kept = trim_outliers(data);
    let m = mean(&kept);
    let sd = sample_sd(&kept);
    let stats = SampleStats {
        n: kept.len(),
        trimmed: data.len() - kept.len(),
        mean: m,
        sd,
        cv: cv(m, sd),
    };
    (stats, kept)
}

/// Welch t statistic and Welch–Satterthwaite degrees of freedom.
/// None when either side has fewer than two samples or both variances are 0.
pub fn welch_t(a: &[f64], b: &[f64]) -> Option<(f64, f64)> {
    if a.len() < 2 || b.len() < 2 {
        return None;
    }
    let (n1, n2) = (a.len() as f64, b.len() as f64);
    let (v1, v2) = (sample_sd(a).powi(2) / n1, sample_sd(b).powi(2) / n2);
    let se2 = v1 + v2;
    if se2 == 0.0 {
        return None;
    }
    let t = (mean(a) - mean(b)) / se2.sqrt();
    let df = se2 * se2 / (v1 * v1 / (n1 - 1.0) + v2 * v2 / (n2 - 1.0));
    Some((t, df))
}

/// Two-sided Welch p-value.
///
/// Empty or single-sample sides give 1. With zero spread on both sides the
/// result is 1 for equal means and 0 otherwise.
pub fn welch_p(a: &[f64], b: &[f64]) -> f64 {
    if a.len() < 2 || b.len() < 2 {
        return 1.0;
    }
    match welch_t(a, b) {
        Some((t, df)) => student_t_two_sided(t, df),
        None if mean(a) == mean(b) => 1.0,
        None => 0.0,
    }
}

/// P(|T| ≥ |t|) for Student's t with `df` degrees of freedom
pub fn student_t_two_sided(t: f64, df: f64) -> f64 {
    if !t.is_finite() {
        return 0.0;
    }
    match StudentsT::new(0.0, 1.0, df) {
        Ok(dist) => (2.0 * (1.0 - dist.cdf(t.abs()))).clamp(0.0, 1.0),
        Err(_) => 1.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() < tol
    }

    #[test]
    fn test_empty_and_single() {
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(sample_sd(&[42.0]), 0.0);
        assert_eq!(cv(0.0, 10.0), 0.0);
    }

    #[test]
    fn test_sample_sd_uses_n_minus_one() {
        assert!(close(sample_sd(&[1.0, 2.0, 3.0, 4.0, 5.0]), 2.5f64.sqrt(), 1e-12));
    }

    #[test]
    fn test_trim_removes_far_point() {
        let mut data = vec![100.0, 101.0, 99.0, 102.0, 98.0, 100.0, 101.0, 99.0, 100.0, 102.0, 98.0, 100.0];
        data.push(5000.0);
        let (stats, kept) = summarize(&data);
        assert_eq!(stats.trimmed, 1);
        assert!(!kept.contains(&5000.0));
        assert!(close(stats.mean, 100.0, 0.01));
    }

    #[test]
    fn test_four_points_cannot_exceed_three_sd() {
        // With n = 4 no point can sit more than (n-1)/sqrt(n) = 1.5 sd away
        let (stats, _) = summarize(&[100.0, 105.0, 110.0, 5000.0]);
        assert_eq!(stats.trimmed, 0);
        assert_eq!(stats.n, 4);
    }

    #[test]
    fn test_trim_skipped_on_zero_sd() {
        assert_eq!(trim_outliers(&[300.0, 300.0, 300.0]).len(), 3);
    }

    #[test]
    fn test_t_distribution_critical_values() {
        // Two-sided 5% critical values
        assert!(close(student_t_two_sided(2.2281, 10.0), 0.05, 1e-3));
        assert!(close(student_t_two_sided(12.706, 1.0), 0.05, 1e-3));
        assert!(close(student_t_two_sided(0.0, 7.0), 1.0, 1e-9));
    }

    #[test]
    fn test_welch_reference_case() {
        let a = [1.0, 2.0, 3.0, 4.0, 5.0];
        let b = [2.0, 4.0, 6.0, 8.0, 10.0];
        let (t, df) = welch_t(&a, &b).unwrap();
        assert!(close(t, -1.897_366, 1e-5));
        assert!(close(df, 5.882_353, 1e-5));
        assert!(close(welch_p(&a, &b), 0.107_531, 1e-4));
    }

    #[test]
    fn test_welch_degenerate_inputs() {
        assert_eq!(welch_p(&[], &[1.0, 2.0]), 1.0);
        assert_eq!(welch_p(&[1.0], &[1.0, 2.0]), 1.0);
        assert_eq!(welch_p(&[5.0, 5.0], &[5.0, 5.0]), 1.0);
        assert_eq!(welch_p(&[5.0, 5.0], &[6.0, 6.0]), 0.0);
    }
}
