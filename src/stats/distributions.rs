use statrs::distribution::{ChiSquared, ContinuousCDF};

/// Upper tail probability of a chi-square distribution with `df` degrees of
/// freedom.
pub fn chi_square_survival(statistic: f64, df: usize) -> f64 {
    if df == 0 || !statistic.is_finite() {
        return if statistic.is_nan() { 1.0 } else { 0.0 };
    }
    if statistic <= 0.0 {
        return 1.0;
    }

    match ChiSquared::new(df as f64) {
        Ok(dist) => dist.sf(statistic).clamp(0.0, 1.0),
        Err(_) => 1.0,
    }
}
