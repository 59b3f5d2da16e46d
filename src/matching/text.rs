use std::collections::BTreeSet;

/// Lowercases and turns separators (`_`, `-`, `/`, punctuation) into spaces.
pub(crate) fn normalize_text(input: &str) -> String {
    let mapped = input
        .chars()
        .map(|character| {
            if character.is_alphanumeric() {
                character.to_ascii_lowercase()
            } else {
                ' '
            }
        })
        .collect::<String>();
    mapped.split_whitespace().collect::<Vec<&str>>().join(" ")
}

pub(crate) fn token_set(input: &str) -> BTreeSet<String> {
    normalize_text(input)
        .split(' ')
        .filter(|token| !token.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

pub(crate) fn jaccard(left: &BTreeSet<String>, right: &BTreeSet<String>) -> f64 {
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }
    let intersection = left.intersection(right).count();
    let union = left.union(right).count();
    intersection as f64 / union as f64
}

/// Character-sequence similarity of the normalized strings.
pub(crate) fn sequence_similarity(left: &str, right: &str) -> f64 {
    let left = normalize_text(left);
    let right = normalize_text(right);
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }
    strsim::normalized_levenshtein(&left, &right)
}

/// Best of token-set Jaccard and sequence similarity; 0 when either side is empty.
pub(crate) fn text_similarity(left: &str, right: &str) -> f64 {
    let token_score = jaccard(&token_set(left), &token_set(right));
    let sequence_score = sequence_similarity(left, right);
    token_score.max(sequence_score)
}
