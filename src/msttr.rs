use crate::error::Result;
use crate::metric::{Inputs, Metric, MetricOutput, Requirement};
use crate::score::{Score, Scores};
use std::collections::HashSet;

pub const WINDOW_SIZE: usize = 100;

/// Mean segmental type-token ratio (Johnson, 1944) over windows of
/// [`WINDOW_SIZE`] lowercased tokens, with and without punctuation.
pub struct Msttr;

fn ttr(chunk: &[&str]) -> f64 {
    let types: HashSet<&str> = chunk.iter().copied().collect();
    types.len() as f64 / chunk.len() as f64
}

/// Token stream is cut into consecutive windows across instance boundaries
/// and the TTRs of the full windows are averaged. A corpus shorter than one
/// window falls back to the TTR of what there is; no tokens at all is NaN.
pub fn msttr(data: &[&Vec<String>], window_size: usize) -> f64 {
    let tokens: Vec<&str> = data
        .iter()
        .flat_map(|inst| inst.iter().map(String::as_str))
        .collect();
    if tokens.is_empty() || window_size == 0 {
        return f64::NAN;
    }
    if tokens.len() < window_size {
        return ttr(&tokens);
    }

    let ttrs: Vec<f64> = tokens.chunks_exact(window_size).map(ttr).collect();
    ttrs.iter().sum::<f64>() / ttrs.len() as f64
}

impl Metric for Msttr {
    fn name(&self) -> &str {
        "msttr"
    }

    fn requirement(&self) -> Requirement {
        Requirement::Referenceless
    }

    fn support_caching(&self) -> bool {
        false
    }

    fn compute(&self, inputs: &Inputs<'_>) -> Result<MetricOutput> {
        let lower: Vec<&Vec<String>> = inputs
            .predictions
            .list_tokenized_lower()
            .iter()
            .map(|alts| &alts[0])
            .collect();
        let nopunct: Vec<&Vec<String>> = inputs
            .predictions
            .list_tokenized_lower_nopunct()
            .iter()
            .map(|alts| &alts[0])
            .collect();

        let mut scores = Scores::new();
        scores.insert(
            format!("msttr-{}", WINDOW_SIZE),
            Score::Value(msttr(&lower, WINDOW_SIZE)),
        );
        scores.insert(
            format!("msttr-{}_nopunct", WINDOW_SIZE),
            Score::Value(msttr(&nopunct, WINDOW_SIZE)),
        );
        Ok(MetricOutput::Corpus(scores))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::texts::Texts;

    fn tokens(text: &str) -> Vec<String> {
        text.split_whitespace().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_msttr_windows_cross_instances() {
        let a = tokens("a b a");
        let b = tokens("b c d e");
        // windows of 2: [a b] [a b] [c d], trailing [e] is dropped
        let score = msttr(&[&a, &b], 2);
        assert!((score - (1.0 + 1.0 + 1.0) / 3.0).abs() < 1e-9, "got {}", score);

        let c = tokens("x x x x");
        let score = msttr(&[&c], 2);
        assert!((score - 0.5).abs() < 1e-9, "got {}", score);
    }

    #[test]
    fn test_msttr_short_and_empty() {
        let a = tokens("a a b");
        let score = msttr(&[&a], 100);
        assert!((score - 2.0 / 3.0).abs() < 1e-9, "got {}", score);
        assert!(msttr(&[], 100).is_nan());
    }

    #[test]
    fn test_msttr_metric_keys() {
        let preds = Texts::predictions(["Hello , hello !"]);
        let MetricOutput::Corpus(scores) = Msttr.compute(&Inputs::new(&preds)).unwrap() else {
            panic!("msttr is corpus-level");
        };
        assert_eq!(scores["msttr-100"], Score::Value(0.75));
        assert_eq!(scores["msttr-100_nopunct"], Score::Value(0.5));
    }
}
