use crate::error::Result;
use crate::metric::{Inputs, Metric, MetricOutput, Requirement};
use crate::score::{Score, Scores};
use crate::utils::round_to;
use std::collections::HashMap;

/// Type-token ratio over whitespace tokens of the raw predictions.
pub struct Ttr;

/// Total token count and per-type frequencies.
pub(crate) fn vocabulary<'a>(texts: impl Iterator<Item = &'a str>) -> (usize, HashMap<&'a str, usize>) {
    let mut vocab: HashMap<&str, usize> = HashMap::new();
    let mut total = 0;
    for text in texts {
        for token in text.split_whitespace() {
            *vocab.entry(token).or_insert(0) += 1;
            total += 1;
        }
    }
    (total, vocab)
}

impl Metric for Ttr {
    fn name(&self) -> &str {
        "ttr"
    }

    fn requirement(&self) -> Requirement {
        Requirement::Referenceless
    }

    fn support_caching(&self) -> bool {
        false
    }

    fn compute(&self, inputs: &Inputs<'_>) -> Result<MetricOutput> {
        let (total, vocab) = vocabulary(inputs.predictions.texts());
        // undefined without tokens, reported as NaN (null in JSON)
        let score = if total == 0 {
            f64::NAN
        } else {
            round_to(vocab.len() as f64 / total as f64, 5)
        };
        let mut scores = Scores::new();
        scores.insert("ttr".to_string(), Score::Value(score));
        Ok(MetricOutput::Corpus(scores))
    }
}
