use serde::Serialize;

use super::StatResult;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CliffsDeltaResult {
    pub delta: f64,
    pub magnitude: &'static str,
    pub n_first: usize,
    pub n_second: usize,
    pub greater: usize,
    pub less: usize,
}

/// Cliff's delta of `first` over `second`: positive when values from `first`
/// tend to be larger.
pub fn cliffs_delta(first: &[f64], second: &[f64]) -> StatResult<CliffsDeltaResult> {
    if first.is_empty() || second.is_empty() {
        return StatResult::insufficient(format!(
            "both samples must be non-empty ({} vs {})",
            first.len(),
            second.len()
        ));
    }

    let mut greater = 0usize;
    let mut less = 0usize;
    for left in first {
        for right in second {
            if left > right {
                greater += 1;
            } else if left < right {
                less += 1;
            }
        }
    }

    let delta = (greater as f64 - less as f64) / (first.len() * second.len()) as f64;
    StatResult::Computed(CliffsDeltaResult {
        delta,
        magnitude: cliffs_delta_magnitude(delta),
        n_first: first.len(),
        n_second: second.len(),
        greater,
        less,
    })
}

pub fn cliffs_delta_magnitude(delta: f64) -> &'static str {
    let magnitude = delta.abs();
    if magnitude < 0.147 {
        "negligible"
    } else if magnitude < 0.33 {
        "small"
    } else if magnitude < 0.474 {
        "medium"
    } else {
        "large"
    }
}
