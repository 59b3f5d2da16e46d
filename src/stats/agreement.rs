use std::collections::BTreeMap;

use serde::Serialize;

use super::StatResult;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KappaResult {
    pub kappa: f64,
    pub observed_agreement: f64,
    pub expected_agreement: f64,
    pub n: usize,
    pub interpretation: &'static str,
}

/// Cohen's kappa between two equally long label sequences.
///
/// When both raters use a single identical label the chance agreement is 1 and
/// kappa is reported as 1.0.
pub fn cohens_kappa<L: Ord>(first: &[L], second: &[L]) -> StatResult<KappaResult> {
    if first.len() != second.len() {
        return StatResult::insufficient(format!(
            "label sequences differ in length ({} vs {})",
            first.len(),
            second.len()
        ));
    }
    if first.is_empty() {
        return StatResult::insufficient("no labels to compare");
    }

    let n = first.len() as f64;
    let mut agreements = 0usize;
    let mut marginals = BTreeMap::<&L, (usize, usize)>::new();
    for (left, right) in first.iter().zip(second) {
        if left == right {
            agreements += 1;
        }
        marginals.entry(left).or_default().0 += 1;
        marginals.entry(right).or_default().1 += 1;
    }

    let observed = agreements as f64 / n;
    let expected = marginals
        .values()
        .map(|(left, right)| (*left as f64 / n) * (*right as f64 / n))
        .sum::<f64>();
    let kappa = if (1.0 - expected).abs() < f64::EPSILON {
        1.0
    } else {
        (observed - expected) / (1.0 - expected)
    };

    StatResult::Computed(KappaResult {
        kappa,
        observed_agreement: observed,
        expected_agreement: expected,
        n: first.len(),
        interpretation: kappa_interpretation(kappa),
    })
}

/// Landis & Koch bands.
pub fn kappa_interpretation(kappa: f64) -> &'static str {
    if kappa < 0.0 {
        "poor"
    } else if kappa <= 0.20 {
        "slight"
    } else if kappa <= 0.40 {
        "fair"
    } else if kappa <= 0.60 {
        "moderate"
    } else if kappa <= 0.80 {
        "substantial"
    } else {
        "almost_perfect"
    }
}
