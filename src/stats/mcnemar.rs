use std::collections::BTreeMap;

use serde::Serialize;

use super::StatResult;
use super::distributions::chi_square_survival;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct McNemarResult {
    pub n_pairs: usize,
    pub both_correct: usize,
    /// First correct, second wrong.
    pub only_first: usize,
    /// Second correct, first wrong.
    pub only_second: usize,
    pub both_wrong: usize,
    pub statistic: f64,
    pub p_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairwiseMcNemar {
    pub first: String,
    pub second: String,
    pub result: StatResult<McNemarResult>,
    pub p_holm: Option<f64>,
}

/// Continuity-corrected McNemar test over the keys both series share.
pub fn mcnemar_test<K: Ord>(
    first: &BTreeMap<K, bool>,
    second: &BTreeMap<K, bool>,
    min_pairs: usize,
) -> StatResult<McNemarResult> {
    let mut table = [[0usize; 2]; 2];
    let mut n_pairs = 0usize;
    for (key, first_correct) in first {
        let Some(second_correct) = second.get(key) else {
            continue;
        };
        table[usize::from(!*first_correct)][usize::from(!*second_correct)] += 1;
        n_pairs += 1;
    }

    if n_pairs < min_pairs {
        return StatResult::insufficient(format!(
            "{n_pairs} paired samples, need at least {min_pairs}"
        ));
    }

    let only_first = table[0][1];
    let only_second = table[1][0];
    let discordant = only_first + only_second;
    let (statistic, p_value) = if discordant == 0 {
        (0.0, 1.0)
    } else {
        let difference = (only_first as f64 - only_second as f64).abs();
        let corrected = (difference - 1.0).max(0.0);
        let statistic = corrected * corrected / discordant as f64;
        (statistic, chi_square_survival(statistic, 1))
    };

    StatResult::Computed(McNemarResult {
        n_pairs,
        both_correct: table[0][0],
        only_first,
        only_second,
        both_wrong: table[1][1],
        statistic,
        p_value,
    })
}

/// Holm step-down adjustment; output order matches input order.
pub fn holm_adjust(p_values: &[f64]) -> Vec<f64> {
    let m = p_values.len();
    let mut order = (0..m).collect::<Vec<usize>>();
    order.sort_by(|left, right| p_values[*left].total_cmp(&p_values[*right]));

    let mut adjusted = vec![0.0; m];
    let mut running_max = 0.0_f64;
    for (rank, index) in order.into_iter().enumerate() {
        let scaled = (p_values[index] * (m - rank) as f64).min(1.0);
        running_max = running_max.max(scaled);
        adjusted[index] = running_max;
    }
    adjusted
}

/// Every unordered pair of groups, in name order, with Holm-adjusted p-values
/// across the tests that could be computed.
pub fn pairwise_mcnemar<K: Ord>(
    groups: &BTreeMap<String, BTreeMap<K, bool>>,
    min_pairs: usize,
) -> Vec<PairwiseMcNemar> {
    let names = groups.keys().collect::<Vec<&String>>();
    let mut comparisons = Vec::new();
    for (index, first) in names.iter().enumerate() {
        for second in &names[index + 1..] {
            comparisons.push(PairwiseMcNemar {
                first: (*first).clone(),
                second: (*second).clone(),
                result: mcnemar_test(&groups[*first], &groups[*second], min_pairs),
                p_holm: None,
            });
        }
    }

    let computed = comparisons
        .iter()
        .enumerate()
        .filter_map(|(index, comparison)| {
            comparison
                .result
                .computed()
                .map(|result| (index, result.p_value))
        })
        .collect::<Vec<(usize, f64)>>();
    let adjusted = holm_adjust(
        &computed
            .iter()
            .map(|(_, p_value)| *p_value)
            .collect::<Vec<f64>>(),
    );
    for ((index, _), p_holm) in computed.into_iter().zip(adjusted) {
        comparisons[index].p_holm = Some(p_holm);
    }

    comparisons
}
