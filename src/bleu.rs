use crate::error::Result;
use crate::metric::{Inputs, Metric, MetricOutput, Requirement};
use crate::score::{Score, Scores};
use crate::utils::{clipped_matches, ngram_counts};
use std::collections::HashMap;

const MAX_NGRAMS: usize = 4;

/// Corpus BLEU-4 on tokenized text, scaled to 0..100.
pub struct Bleu;

impl Metric for Bleu {
    fn name(&self) -> &str {
        "bleu"
    }

    fn requirement(&self) -> Requirement {
        Requirement::Referenced
    }

    // n-gram statistics are summed over the corpus before dividing, so
    // per-instance scores can't be averaged back into this number
    fn support_caching(&self) -> bool {
        false
    }

    fn compute(&self, inputs: &Inputs<'_>) -> Result<MetricOutput> {
        let references = inputs.references(self.name())?;
        let preds: Vec<&Vec<String>> = inputs
            .predictions
            .list_tokenized()
            .iter()
            .map(|alts| &alts[0])
            .collect();
        let score = corpus_bleu(&preds, references.list_tokenized());

        let mut scores = Scores::new();
        scores.insert("bleu".to_string(), Score::Value(score * 100.0));
        Ok(MetricOutput::Corpus(scores))
    }
}

#[derive(Debug, Default)]
struct BleuStats {
    matches: [usize; MAX_NGRAMS],
    totals: [usize; MAX_NGRAMS],
    pred_len: usize,
    ref_len: usize,
}

impl BleuStats {
    fn append(&mut self, pred: &[String], refs: &[Vec<String>]) {
        self.pred_len += pred.len();
        // Brevity is judged against the reference closest in length,
        // shorter one wins a tie
        self.ref_len += refs
            .iter()
            .map(|r| r.len())
            .min_by_key(|&len| (len.abs_diff(pred.len()), len))
            .unwrap_or(0);

        for n in 1..=MAX_NGRAMS {
            let pred_counts = ngram_counts(pred, n);
            // With several references, each n-gram can be matched as
            // often as it shows up in the most generous reference
            let mut max_ref_counts: HashMap<Vec<&str>, usize> = HashMap::new();
            for r in refs {
                for (ng, count) in ngram_counts(r, n) {
                    let slot = max_ref_counts.entry(ng).or_insert(0);
                    *slot = (*slot).max(count);
                }
            }
            self.matches[n - 1] += clipped_matches(&pred_counts, &max_ref_counts);
            self.totals[n - 1] += pred.len().saturating_sub(n - 1);
        }
    }

    fn score(&self) -> f64 {
        if self.pred_len == 0 {
            return 0.0;
        }
        let precisions: Vec<f64> = self
            .matches
            .iter()
            .zip(self.totals.iter())
            .map(|(&m, &t)| if t == 0 { 0.0 } else { m as f64 / t as f64 })
            .collect();
        let mean = geometric_mean(&precisions);

        let brevity_penalty = if self.pred_len >= self.ref_len {
            1.0
        } else {
            (1.0 - self.ref_len as f64 / self.pred_len as f64).exp()
        };
        brevity_penalty * mean
    }
}

fn geometric_mean(values: &[f64]) -> f64 {
    if values.is_empty() || values.iter().any(|&v| v == 0.0) {
        return 0.0;
    }

    let log_sum: f64 = values.iter().map(|v| v.ln()).sum();
    (log_sum / values.len() as f64).exp()
}

pub fn corpus_bleu(preds: &[&Vec<String>], refs: &[Vec<Vec<String>>]) -> f64 {
    let mut stats = BleuStats::default();
    for (pred, alts) in preds.iter().zip(refs.iter()) {
        stats.append(pred, alts);
    }
    stats.score()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::texts::Texts;

    fn toks(text: &str) -> Vec<String> {
        text.split_whitespace().map(|s| s.to_string()).collect()
    }

    fn bleu(preds: &[&str], refs: &[&[&str]]) -> f64 {
        let preds: Vec<Vec<String>> = preds.iter().map(|p| toks(p)).collect();
        let pred_refs: Vec<&Vec<String>> = preds.iter().collect();
        let refs: Vec<Vec<Vec<String>>> = refs
            .iter()
            .map(|alts| alts.iter().map(|r| toks(r)).collect())
            .collect();
        corpus_bleu(&pred_refs, &refs)
    }

    #[test]
    fn test_bleu_perfect_match() {
        let score = bleu(&["the quick brown fox jumps"], &[&["the quick brown fox jumps"]]);
        assert!(
            (score - 1.0).abs() < 1e-6,
            "Expected BLEU 1.0, got {}",
            score
        );
    }

    // No 4-gram survives, and without smoothing the geometric mean
    // collapses to zero
    #[test]
    fn test_bleu_partial_match() {
        let score = bleu(&["the quick brown fox"], &[&["the quick fox"]]);
        assert_eq!(score, 0.0, "Expected BLEU 0.0, got {}", score);
    }

    #[test]
    fn test_bleu_picks_best_reference() {
        let single = bleu(&["a cat sat on the mat"], &[&["the cat is on the mat"]]);
        let multi = bleu(
            &["a cat sat on the mat"],
            &[&["the cat is on the mat", "a cat sat on the mat"]],
        );
        assert!(
            multi > single,
            "Expected a matching extra reference to help: {} vs {}",
            multi,
            single
        );
        assert!((multi - 1.0).abs() < 1e-6, "got {}", multi);
    }

    #[test]
    fn test_bleu_brevity_penalty() {
        let score = bleu(
            &["the quick brown fox"],
            &[&["the quick brown fox jumps over the lazy dog"]],
        );
        // precisions are all 1, only the length is off
        let expected = (1.0f64 - 9.0 / 4.0).exp();
        assert!((score - expected).abs() < 1e-9, "Expected {}, got {}", expected, score);
    }

    #[test]
    fn test_bleu_empty_pred() {
        assert_eq!(bleu(&[""], &[&["the quick brown fox"]]), 0.0);
        assert_eq!(bleu(&[], &[]), 0.0);
    }

    #[test]
    fn test_bleu_metric_scales_to_100() {
        let preds = Texts::predictions(["There is a house in New Orleans ."]).with_language("en");
        let refs = Texts::references(["There is a house in New Orleans ."]).with_language("en");
        let output = Bleu
            .compute(&Inputs::new(&preds).with_references(&refs))
            .unwrap();
        match output {
            MetricOutput::Corpus(scores) => {
                let bleu = scores["bleu"].as_value().unwrap();
                assert!((bleu - 100.0).abs() < 1e-6, "Expected BLEU 100, got {}", bleu);
            }
            other => panic!("expected a corpus score, got {:?}", other),
        }
    }
}
