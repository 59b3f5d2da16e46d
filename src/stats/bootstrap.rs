use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::Serialize;

use crate::classify::{MetricKind, OutcomeCounts};
use crate::model::{ClassifiedRecord, Outcome};

use super::StatResult;

const LOWER_PERCENTILE: f64 = 0.025;
const UPPER_PERCENTILE: f64 = 0.975;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BootstrapInterval {
    pub metric: MetricKind,
    /// Metric over the full record set.
    pub estimate: f64,
    /// Mean of the resampled metric values.
    pub point_estimate: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
    pub std_error: f64,
    pub iterations: usize,
    pub n: usize,
    pub seed: u64,
}

/// Percentile bootstrap for one metric over classified records.
///
/// Duplicates carry no weight and are left out of the resampled population.
/// Resample `i` draws from its own generator seeded with `seed + i`, so the
/// interval does not depend on how rayon schedules the iterations.
pub fn bootstrap_ci(
    records: &[ClassifiedRecord],
    metric: MetricKind,
    iterations: usize,
    seed: u64,
) -> StatResult<BootstrapInterval> {
    let outcomes = records
        .iter()
        .map(|record| record.outcome)
        .filter(|outcome| *outcome != Outcome::Duplicate)
        .collect::<Vec<Outcome>>();
    if outcomes.is_empty() {
        return StatResult::insufficient("no classified records to resample");
    }
    if iterations == 0 {
        return StatResult::insufficient("bootstrap iterations must be positive");
    }

    let n = outcomes.len();
    let mut samples = (0..iterations)
        .into_par_iter()
        .map(|iteration| {
            let mut rng = StdRng::seed_from_u64(seed.wrapping_add(iteration as u64));
            let mut counts = OutcomeCounts::default();
            for _ in 0..n {
                counts.add(outcomes[rng.gen_range(0..n)]);
            }
            metric.value(&counts)
        })
        .collect::<Vec<f64>>();

    let estimate = metric.value(&OutcomeCounts::from_records(records));
    let point_estimate = samples.iter().sum::<f64>() / iterations as f64;
    let std_error = if iterations > 1 {
        let variance = samples
            .iter()
            .map(|value| (value - point_estimate).powi(2))
            .sum::<f64>()
            / (iterations - 1) as f64;
        variance.sqrt()
    } else {
        0.0
    };

    samples.sort_by(|left, right| left.total_cmp(right));
    StatResult::Computed(BootstrapInterval {
        metric,
        estimate,
        point_estimate,
        ci_lower: percentile(&samples, LOWER_PERCENTILE),
        ci_upper: percentile(&samples, UPPER_PERCENTILE),
        std_error,
        iterations,
        n,
        seed,
    })
}

/// Intervals for precision, recall and F1, keyed by metric name.
pub fn bootstrap_metrics(
    records: &[ClassifiedRecord],
    iterations: usize,
    seed: u64,
) -> BTreeMap<String, StatResult<BootstrapInterval>> {
    MetricKind::ALL
        .iter()
        .map(|metric| {
            (
                metric.as_str().to_string(),
                bootstrap_ci(records, *metric, iterations, seed),
            )
        })
        .collect()
}

// Linear interpolation between closest ranks; `sorted` must be non-empty.
fn percentile(sorted: &[f64], fraction: f64) -> f64 {
    let position = fraction * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let weight = position - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * weight
}

#[cfg(test)]
mod tests {
    use super::percentile;

    #[test]
    fn percentile_interpolates_between_ranks() {
        let sorted = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile(&sorted, 0.5), 3.0);
        assert!((percentile(&sorted, 0.025) - 1.1).abs() < 1e-12);
        assert!((percentile(&sorted, 0.975) - 4.9).abs() < 1e-12);
        assert_eq!(percentile(&[0.7], 0.975), 0.7);
    }
}
