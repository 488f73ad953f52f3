//! Online statistics shared by the experiment engine and version comparison.
//!
//! This module is policy-light: it provides numerical primitives (a Welford
//! accumulator with batch merge, a Welch two-sample test, standard-normal
//! helpers) that the decision-making modules consume. Nothing here decides
//! anything by itself.

/// Running mean/variance accumulator (Welford's algorithm).
///
/// Stores `(count, mean, m2)` where `m2` is the sum of squared deviations
/// from the running mean. Supports both single-value updates and merging a
/// pre-aggregated batch (Chan et al.'s parallel combine), which is what the
/// experiment engine uses when metrics arrive as per-window summaries rather
/// than individual rewards.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RunningStats {
    /// Number of observations accumulated.
    pub count: u64,
    /// Running mean.
    pub mean: f64,
    /// Sum of squared deviations from the mean (Welford's `m2`).
    pub m2: f64,
}

impl RunningStats {
    /// Accumulator seeded from a pre-aggregated summary.
    ///
    /// When `m2` is unknown it can be reconstructed from a standard
    /// deviation via [`m2_from_std_dev`].
    pub fn from_parts(count: u64, mean: f64, m2: f64) -> Self {
        Self {
            count,
            mean: if mean.is_finite() { mean } else { 0.0 },
            m2: if m2.is_finite() && m2 >= 0.0 { m2 } else { 0.0 },
        }
    }

    /// Add a single observation.
    pub fn push(&mut self, x: f64) {
        if !x.is_finite() {
            return;
        }
        self.count += 1;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        let delta2 = x - self.mean;
        self.m2 += delta * delta2;
    }

    /// Merge a pre-aggregated batch into this accumulator.
    ///
    /// Chan's parallel combine: exact (up to float error) regardless of how
    /// the observations were split between the two halves.
    pub fn merge(&mut self, other: RunningStats) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            *self = other;
            return;
        }
        let n1 = self.count as f64;
        let n2 = other.count as f64;
        let n = n1 + n2;
        let delta = other.mean - self.mean;
        self.mean += delta * (n2 / n);
        self.m2 += other.m2 + delta * delta * (n1 * n2 / n);
        self.count += other.count;
    }

    /// Sample variance (`m2 / (n - 1)`), 0 with fewer than two observations.
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            (self.m2 / (self.count as f64 - 1.0)).max(0.0)
        }
    }

    /// Sample standard deviation.
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }
}

/// Reconstruct Welford's `m2` from a sample standard deviation.
///
/// Inverse of `std_dev = sqrt(m2 / (n - 1))`; returns 0 for `n < 2` or a
/// non-finite input.
#[must_use]
pub fn m2_from_std_dev(std_dev: f64, count: u64) -> f64 {
    if count < 2 || !std_dev.is_finite() || std_dev < 0.0 {
        return 0.0;
    }
    std_dev * std_dev * (count as f64 - 1.0)
}

/// Result of a two-sample mean-difference test.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WelchTest {
    /// `mean_b - mean_a`.
    pub mean_diff: f64,
    /// Test statistic. Infinite when both sample variances are zero but the
    /// means differ.
    pub t: f64,
    /// Welch–Satterthwaite degrees of freedom.
    pub df: f64,
    /// Two-sided p-value.
    pub p_value: f64,
    /// `p_value < alpha`.
    pub is_significant: bool,
}

/// Welch's unequal-variances t-test from summary statistics.
///
/// Inputs are `(count, mean, sample variance)` per group and the two-sided
/// significance level `alpha`. The p-value uses the standard-normal
/// approximation to the t distribution, which is accurate at the sample
/// sizes these components gate on (`min_sample_size` defaults to 100) and
/// conservative enough below them.
///
/// Degenerate inputs are handled without panicking:
/// - either group empty: `p_value = 1`, not significant
/// - both variances zero: significant iff the means differ
pub fn welch_test(
    n_a: u64,
    mean_a: f64,
    var_a: f64,
    n_b: u64,
    mean_b: f64,
    var_b: f64,
    alpha: f64,
) -> WelchTest {
    let mean_diff = mean_b - mean_a;
    if n_a == 0 || n_b == 0 {
        return WelchTest {
            mean_diff,
            t: 0.0,
            df: 0.0,
            p_value: 1.0,
            is_significant: false,
        };
    }

    let na = n_a as f64;
    let nb = n_b as f64;
    let va = if var_a.is_finite() && var_a > 0.0 { var_a } else { 0.0 };
    let vb = if var_b.is_finite() && var_b > 0.0 { var_b } else { 0.0 };
    let se2 = va / na + vb / nb;

    if se2 <= 0.0 {
        // Zero observed variance on both sides: any mean difference is exact.
        let differs = mean_diff.abs() > 0.0;
        return WelchTest {
            mean_diff,
            t: if differs { f64::INFINITY } else { 0.0 },
            df: (na + nb - 2.0).max(1.0),
            p_value: if differs { 0.0 } else { 1.0 },
            is_significant: differs && alpha > 0.0,
        };
    }

    let t = mean_diff / se2.sqrt();
    let df_num = se2 * se2;
    let df_den = (va / na) * (va / na) / (na - 1.0).max(1.0)
        + (vb / nb) * (vb / nb) / (nb - 1.0).max(1.0);
    let df = if df_den > 0.0 { df_num / df_den } else { (na + nb - 2.0).max(1.0) };
    let p_value = (2.0 * (1.0 - normal_cdf(t.abs()))).clamp(0.0, 1.0);

    WelchTest {
        mean_diff,
        t,
        df,
        p_value,
        is_significant: p_value < alpha,
    }
}

/// Standard normal probability density.
#[must_use]
pub fn normal_pdf(x: f64) -> f64 {
    const INV_SQRT_2PI: f64 = 0.398_942_280_401_432_7;
    INV_SQRT_2PI * (-0.5 * x * x).exp()
}

/// Standard normal cumulative distribution.
#[must_use]
pub fn normal_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

/// Error function, Abramowitz & Stegun 7.1.26 (max abs error ~1.5e-7).
fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();

    const A1: f64 = 0.254829592;
    const A2: f64 = -0.284496736;
    const A3: f64 = 1.421413741;
    const A4: f64 = -1.453152027;
    const A5: f64 = 1.061405429;
    const P: f64 = 0.3275911;

    let t = 1.0 / (1.0 + P * x);
    let y = 1.0 - (((((A5 * t + A4) * t) + A3) * t + A2) * t + A1) * t * (-x * x).exp();
    sign * y
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn welford_push_matches_closed_form() {
        let xs = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let mut s = RunningStats::default();
        for &x in &xs {
            s.push(x);
        }
        assert_eq!(s.count, 8);
        assert!((s.mean - 5.0).abs() < 1e-12);
        // Sample variance of the classic example is 32/7.
        assert!((s.variance() - 32.0 / 7.0).abs() < 1e-12);
    }

    #[test]
    fn merge_equals_sequential_push() {
        let xs: Vec<f64> = (0..40).map(|i| (i as f64 * 0.37).sin()).collect();
        let mut whole = RunningStats::default();
        for &x in &xs {
            whole.push(x);
        }
        let mut left = RunningStats::default();
        let mut right = RunningStats::default();
        for &x in &xs[..17] {
            left.push(x);
        }
        for &x in &xs[17..] {
            right.push(x);
        }
        left.merge(right);
        assert_eq!(left.count, whole.count);
        assert!((left.mean - whole.mean).abs() < 1e-10);
        assert!((left.m2 - whole.m2).abs() < 1e-9);
    }

    #[test]
    fn merge_into_empty_adopts_batch() {
        let mut s = RunningStats::default();
        s.merge(RunningStats::from_parts(100, 0.6, 2.5));
        assert_eq!(s.count, 100);
        assert!((s.mean - 0.6).abs() < 1e-12);
    }

    #[test]
    fn m2_reconstruction_round_trips() {
        let mut s = RunningStats::default();
        for i in 0..50 {
            s.push((i % 7) as f64);
        }
        let m2 = m2_from_std_dev(s.std_dev(), s.count);
        assert!((m2 - s.m2).abs() < 1e-9);
    }

    #[test]
    fn non_finite_observations_are_ignored() {
        let mut s = RunningStats::default();
        s.push(f64::NAN);
        s.push(f64::INFINITY);
        assert_eq!(s.count, 0);
        s.push(1.0);
        assert_eq!(s.count, 1);
    }

    #[test]
    fn welch_detects_clear_separation() {
        // Two groups with well-separated means and modest variance.
        let w = welch_test(100, 0.60, 0.04, 100, 0.75, 0.04, 0.05);
        assert!(w.is_significant, "p = {}", w.p_value);
        assert!((w.mean_diff - 0.15).abs() < 1e-12);
        assert!(w.t > 0.0);
    }

    #[test]
    fn welch_identical_groups_are_not_significant() {
        let w = welch_test(200, 0.5, 0.02, 200, 0.5, 0.02, 0.05);
        assert!(!w.is_significant);
        assert!(w.p_value > 0.9);
    }

    #[test]
    fn welch_zero_variance_degenerate_cases() {
        let differs = welch_test(100, 0.60, 0.0, 100, 0.75, 0.0, 0.05);
        assert!(differs.is_significant);
        assert_eq!(differs.p_value, 0.0);

        let same = welch_test(100, 0.5, 0.0, 100, 0.5, 0.0, 0.05);
        assert!(!same.is_significant);
        assert_eq!(same.p_value, 1.0);
    }

    #[test]
    fn welch_empty_group_is_never_significant() {
        let w = welch_test(0, 0.0, 0.0, 100, 0.9, 0.01, 0.05);
        assert!(!w.is_significant);
        assert_eq!(w.p_value, 1.0);
    }

    #[test]
    fn normal_cdf_reference_points() {
        assert!((normal_cdf(0.0) - 0.5).abs() < 1e-7);
        assert!((normal_cdf(1.96) - 0.975).abs() < 1e-3);
        assert!((normal_cdf(-1.96) - 0.025).abs() < 1e-3);
        assert!(normal_cdf(8.0) > 0.999_999);
    }

    #[test]
    fn normal_pdf_is_symmetric() {
        for x in [0.3, 1.1, 2.7] {
            assert!((normal_pdf(x) - normal_pdf(-x)).abs() < 1e-15);
        }
    }
}
