use std::collections::BTreeMap;

use serde::Serialize;

use super::StatResult;
use super::distributions::chi_square_survival;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CochranQResult {
    pub groups: Vec<String>,
    pub n_complete: usize,
    pub q: f64,
    pub df: usize,
    pub p_value: f64,
}

/// Cochran's Q over the samples every group recorded an outcome for.
pub fn cochran_q<K: Ord>(groups: &BTreeMap<String, BTreeMap<K, bool>>) -> StatResult<CochranQResult> {
    let k = groups.len();
    if k < 2 {
        return StatResult::insufficient(format!("{k} groups, need at least 2"));
    }

    let series = groups.values().collect::<Vec<&BTreeMap<K, bool>>>();
    let Some((reference, rest)) = series.split_first() else {
        return StatResult::insufficient("no groups");
    };

    let mut column_totals = vec![0usize; k];
    let mut row_square_sum = 0usize;
    let mut n_complete = 0usize;
    for (key, first) in reference.iter() {
        let mut row = Vec::with_capacity(k);
        row.push(*first);
        for other in rest {
            match other.get(key) {
                Some(value) => row.push(*value),
                None => break,
            }
        }
        if row.len() < k {
            continue;
        }

        n_complete += 1;
        let mut row_total = 0usize;
        for (column, correct) in row.iter().enumerate() {
            if *correct {
                column_totals[column] += 1;
                row_total += 1;
            }
        }
        row_square_sum += row_total * row_total;
    }

    if n_complete == 0 {
        return StatResult::insufficient("no sample has an outcome for every group");
    }

    let k_f = k as f64;
    let grand_total = column_totals.iter().sum::<usize>() as f64;
    let column_square_sum = column_totals
        .iter()
        .map(|total| (*total as f64).powi(2))
        .sum::<f64>();
    let denominator = k_f * grand_total - row_square_sum as f64;
    let df = k - 1;
    let (q, p_value) = if denominator <= 0.0 {
        (0.0, 1.0)
    } else {
        let q = (k_f - 1.0) * (k_f * column_square_sum - grand_total * grand_total) / denominator;
        (q, chi_square_survival(q, df))
    };

    StatResult::Computed(CochranQResult {
        groups: groups.keys().cloned().collect(),
        n_complete,
        q,
        df,
        p_value,
    })
}
