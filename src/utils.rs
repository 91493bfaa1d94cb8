use std::collections::HashMap;

pub struct DPMatrix {
    pub n_rows: usize,
    pub n_cols: usize,
    data: Vec<u32>,
}

impl DPMatrix {
    pub fn new(n_rows: usize, n_cols: usize) -> Self {
        Self {
            data: vec![0; n_rows * n_cols],
            n_rows,
            n_cols,
        }
    }
    pub fn at(&self, i: usize, j: usize) -> u32 {
        self.data[i * self.n_cols + j]
    }
    pub fn set(&mut self, i: usize, j: usize, val: u32) {
        self.data[i * self.n_cols + j] = val;
    }
}

/// Round half away from zero to `places` decimals.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

pub fn ngrams<T: AsRef<str>>(tokens: &[T], n: usize) -> Vec<Vec<&str>> {
    // Asking for more than we have yields nothing, not a panic
    if n == 0 || tokens.len() < n {
        return vec![];
    }
    tokens
        .windows(n)
        .map(|window| window.iter().map(|t| t.as_ref()).collect())
        .collect()
}

pub fn ngram_counts<T: AsRef<str>>(tokens: &[T], n: usize) -> HashMap<Vec<&str>, usize> {
    let mut counts: HashMap<Vec<&str>, usize> = HashMap::new();
    for ngram in ngrams(tokens, n) {
        *counts.entry(ngram).or_insert(0) += 1;
    }
    counts
}

/// Matches between two n-gram multisets, with each count clipped to the
/// other side's count.
pub fn clipped_matches(pred: &HashMap<Vec<&str>, usize>, gold: &HashMap<Vec<&str>, usize>) -> usize {
    let mut matches: usize = 0;
    for (ng, pred_count) in pred {
        if let Some(gold_count) = gold.get(ng) {
            matches += pred_count.min(gold_count);
        }
    }
    matches
}

pub fn f1(precision: f64, recall: f64) -> f64 {
    if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    }
}
