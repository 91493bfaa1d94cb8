use crate::error::Result;
use crate::metric::{Inputs, Metric, MetricOutput, Requirement};
use crate::score::{Score, Scores};
use crate::utils::f1;
use std::collections::{BTreeMap, HashSet};

/// Bag-of-words F1 per instance against the best-matching reference.
pub struct TokenF1;

// Order blind:
// Reference: "the quick brown fox"
// Prediction: "fox quick the brown"
// score a perfect 1.0 because the token sets are identical
fn get_token_f1(pred: &[String], gold: &[String]) -> f64 {
    let pred_set: HashSet<&str> = pred.iter().map(String::as_str).collect();
    let gold_set: HashSet<&str> = gold.iter().map(String::as_str).collect();

    // One side empty means nothing can be matched; both empty is
    // undefined precision/recall and also scores 0
    if pred_set.is_empty() || gold_set.is_empty() {
        return 0.0;
    }

    let num_common = gold_set.intersection(&pred_set).count() as f64;
    let precision = num_common / pred_set.len() as f64;
    let recall = num_common / gold_set.len() as f64;
    f1(precision, recall)
}

impl Metric for TokenF1 {
    fn name(&self) -> &str {
        "token_f1"
    }

    fn requirement(&self) -> Requirement {
        Requirement::Referenced
    }

    fn compute(&self, inputs: &Inputs<'_>) -> Result<MetricOutput> {
        let references = inputs.references(self.name())?;
        let preds = inputs.predictions.list_tokenized_lower_nopunct();
        let refs = references.list_tokenized_lower_nopunct();

        let per_instance: BTreeMap<String, Scores> = inputs
            .predictions
            .effective_ids()
            .into_iter()
            .zip(preds.iter().zip(refs.iter()))
            .map(|(id, (pred, alts))| {
                let best = alts
                    .iter()
                    .map(|gold| get_token_f1(&pred[0], gold))
                    .fold(0.0, f64::max);
                let mut scores = Scores::new();
                scores.insert("token_f1".to_string(), Score::Value(best));
                (id, scores)
            })
            .collect();
        Ok(MetricOutput::PerInstance(per_instance))
    }
}
