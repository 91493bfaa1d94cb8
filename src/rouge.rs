use crate::error::Result;
use crate::metric::{Inputs, Metric, MetricOutput, Requirement};
use crate::score::{Score, Scores};
use crate::utils::{clipped_matches, f1, ngram_counts, DPMatrix};
use std::collections::BTreeMap;

const ROUGE_TYPES: [&str; 3] = ["rouge1", "rouge2", "rougeL"];

/// ROUGE-1/2/L per instance, on lowercased tokens without punctuation.
pub struct Rouge;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Prf {
    precision: f64,
    recall: f64,
    fmeasure: f64,
}

impl Prf {
    fn from_counts(overlap: usize, pred_total: usize, gold_total: usize) -> Self {
        let precision = if pred_total == 0 { 0.0 } else { overlap as f64 / pred_total as f64 };
        let recall = if gold_total == 0 { 0.0 } else { overlap as f64 / gold_total as f64 };
        Prf {
            precision,
            recall,
            fmeasure: f1(precision, recall),
        }
    }

    fn to_score(self) -> Score {
        Score::block([
            ("precision", self.precision),
            ("recall", self.recall),
            ("fmeasure", self.fmeasure),
        ])
    }
}

fn get_lcs(pred: &[String], gold: &[String]) -> usize {
    // Add +1 to both rows and cols to accommodate the empty prefix
    // of the dynamic programming matrix
    let mut dp = DPMatrix::new(pred.len() + 1, gold.len() + 1);
    for i in 1..=pred.len() {
        for j in 1..=gold.len() {
            // Off-by-one between dp and token indexing is intentional,
            // row/col 0 is the empty prefix
            if pred[i - 1] == gold[j - 1] {
                dp.set(i, j, dp.at(i - 1, j - 1) + 1)
            } else {
                // LCS doesn't need contiguity, so skipping a token on
                // either side is allowed; keep whichever is longer
                dp.set(i, j, dp.at(i - 1, j).max(dp.at(i, j - 1)));
            }
        }
    }
    dp.at(pred.len(), gold.len()) as usize
}

fn rouge_n(pred: &[String], gold: &[String], n: usize) -> Prf {
    let pred_counts = ngram_counts(pred, n);
    let gold_counts = ngram_counts(gold, n);
    let overlap = clipped_matches(&pred_counts, &gold_counts);
    Prf::from_counts(
        overlap,
        pred.len().saturating_sub(n - 1),
        gold.len().saturating_sub(n - 1),
    )
}

fn rouge_l(pred: &[String], gold: &[String]) -> Prf {
    Prf::from_counts(get_lcs(pred, gold), pred.len(), gold.len())
}

fn score_pair(pred: &[String], gold: &[String]) -> [Prf; 3] {
    [rouge_n(pred, gold, 1), rouge_n(pred, gold, 2), rouge_l(pred, gold)]
}

/// Multi-reference jackknifing: for every leave-one-out subset of the
/// references take the best-F reference per ROUGE type, then average the
/// subsets. A single reference is scored directly.
fn score_instance(pred: &[String], refs: &[Vec<String>]) -> [Prf; 3] {
    let per_ref: Vec<[Prf; 3]> = refs.iter().map(|r| score_pair(pred, r)).collect();
    if per_ref.len() == 1 {
        return per_ref[0];
    }

    let mut result = [Prf::default(); 3];
    for leave in 0..per_ref.len() {
        for (t, slot) in result.iter_mut().enumerate() {
            let best = per_ref
                .iter()
                .enumerate()
                .filter(|(k, _)| *k != leave)
                .map(|(_, scores)| scores[t])
                .fold(None, |best: Option<Prf>, cur| match best {
                    Some(b) if b.fmeasure >= cur.fmeasure => Some(b),
                    _ => Some(cur),
                })
                .unwrap_or_default();
            slot.precision += best.precision;
            slot.recall += best.recall;
            slot.fmeasure += best.fmeasure;
        }
    }
    let folds = per_ref.len() as f64;
    for slot in result.iter_mut() {
        slot.precision /= folds;
        slot.recall /= folds;
        slot.fmeasure /= folds;
    }
    result
}

impl Metric for Rouge {
    fn name(&self) -> &str {
        "rouge"
    }

    fn requirement(&self) -> Requirement {
        Requirement::Referenced
    }

    fn compute(&self, inputs: &Inputs<'_>) -> Result<MetricOutput> {
        let references = inputs.references(self.name())?;
        let preds = inputs.predictions.list_tokenized_lower_nopunct();
        let refs = references.list_tokenized_lower_nopunct();

        let mut per_instance = BTreeMap::new();
        for ((id, pred), alts) in inputs
            .predictions
            .effective_ids()
            .into_iter()
            .zip(preds.iter())
            .zip(refs.iter())
        {
            let prfs = score_instance(&pred[0], alts);
            let scores: Scores = ROUGE_TYPES
                .iter()
                .zip(prfs)
                .map(|(name, prf)| (name.to_string(), prf.to_score()))
                .collect();
            per_instance.insert(id, scores);
        }
        Ok(MetricOutput::PerInstance(per_instance))
    }
}
