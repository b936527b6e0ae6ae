use crate::data::model::CellValue;
use crate::error::{Result, SiftError};

use super::names::{normalize_name, NameTokens};

/// Threshold for one-off name comparisons.
pub const DEFAULT_THRESHOLD: u8 = 80;

/// Threshold used by the de-duplication job.
pub const DEDUP_DEFAULT_THRESHOLD: u8 = 75;

// ---------------------------------------------------------------------------
// Character similarity
// ---------------------------------------------------------------------------

/// Similarity of two strings in `0..=100`.
///
/// `round(100 * (len_a + len_b - indel) / (len_a + len_b))`, where `indel`
/// is the insert/delete edit distance (a substitution costs two). Lengths are
/// in chars. Halves round to even, so 62.5 scores 62. Empty input scores 0.
pub fn ratio(a: &str, b: &str) -> u8 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    // len_a + len_b - indel == 2 * lcs
    let matched = 2 * lcs_len(&a, &b);
    round_half_even(100 * matched, total) as u8
}

/// `num / den` rounded to the nearest integer, ties to even.
fn round_half_even(num: usize, den: usize) -> usize {
    let (q, r) = (num / den, num % den);
    match (2 * r).cmp(&den) {
        std::cmp::Ordering::Less => q,
        std::cmp::Ordering::Greater => q + 1,
        std::cmp::Ordering::Equal => q + (q % 2),
    }
}

/// Length of the longest common subsequence, two-row DP.
fn lcs_len(a: &[char], b: &[char]) -> usize {
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for ca in a {
        for (j, cb) in b.iter().enumerate() {
            curr[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

// ---------------------------------------------------------------------------
// Name matching
// ---------------------------------------------------------------------------

/// Lowest of the per-token best scores from `from` into `to`. `None` when
/// `from` has no tokens.
fn weakest_best_score(from: &NameTokens, to: &NameTokens) -> Option<u8> {
    from.iter()
        .map(|token| to.iter().map(|other| ratio(token, other)).max().unwrap_or(0))
        .min()
}

/// Token-set match: sizes within one of each other, and every token on both
/// sides has a counterpart scoring at least `threshold`.
pub fn tokens_match(a: &NameTokens, b: &NameTokens, threshold: u8) -> bool {
    if a.len().abs_diff(b.len()) > 1 {
        return false;
    }
    match (weakest_best_score(a, b), weakest_best_score(b, a)) {
        (Some(ab), Some(ba)) => ab >= threshold && ba >= threshold,
        _ => false,
    }
}

/// Whether two cells name the same facility. Missing names never match.
pub fn is_similar_name(a: &CellValue, b: &CellValue, threshold: u8) -> bool {
    match (normalize_name(a), normalize_name(b)) {
        (Some(a), Some(b)) => tokens_match(&a, &b, threshold),
        _ => false,
    }
}

/// A validated similarity threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FuzzyMatcher {
    threshold: u8,
}

impl FuzzyMatcher {
    pub fn new(threshold: u32) -> Result<Self> {
        match u8::try_from(threshold) {
            Ok(t) if t <= 100 => Ok(FuzzyMatcher { threshold: t }),
            _ => Err(SiftError::InvalidThreshold(threshold)),
        }
    }

    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    pub fn matches(&self, a: &NameTokens, b: &NameTokens) -> bool {
        tokens_match(a, b, self.threshold)
    }
}

impl Default for FuzzyMatcher {
    fn default() -> Self {
        FuzzyMatcher {
            threshold: DEFAULT_THRESHOLD,
        }
    }
}
