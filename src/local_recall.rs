use crate::error::Result;
use crate::metric::{Inputs, Metric, MetricOutput, Requirement};
use crate::score::{Score, Scores};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Local recall (van Miltenburg et al., 2018): how many of the words used
/// by exactly N references the prediction reproduces, for every N up to
/// the largest reference count. All tokens count, not just content words.
pub struct LocalRecall;

// word -> number of references using it, grouped by that number
fn reference_index(refs: &[Vec<String>]) -> HashMap<usize, HashSet<&str>> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for r in refs {
        let words: HashSet<&str> = r.iter().map(String::as_str).collect();
        for word in words {
            *counts.entry(word).or_insert(0) += 1;
        }
    }
    let mut index: HashMap<usize, HashSet<&str>> = HashMap::new();
    for (word, count) in counts {
        index.entry(count).or_default().insert(word);
    }
    index
}

pub fn local_recall_scores(preds: &[&Vec<String>], refs: &[Vec<Vec<String>>]) -> BTreeMap<usize, f64> {
    // n -> (overlap, reference words) summed over instances
    let mut outcomes: BTreeMap<usize, (usize, usize)> = BTreeMap::new();
    let mut max_refs = 0;
    for (pred, alts) in preds.iter().zip(refs.iter()) {
        let index = reference_index(alts);
        let pred_tokens: HashSet<&str> = pred.iter().map(String::as_str).collect();
        max_refs = max_refs.max(alts.len());
        for n in 1..=alts.len() {
            let slot = outcomes.entry(n).or_insert((0, 0));
            if let Some(words) = index.get(&n) {
                slot.0 += words.intersection(&pred_tokens).count();
                slot.1 += words.len();
            }
        }
    }
    (1..=max_refs)
        .map(|n| {
            let (overlap, total) = outcomes.get(&n).copied().unwrap_or((0, 0));
            let score = if total > 0 { overlap as f64 / total as f64 } else { 0.0 };
            (n, score)
        })
        .collect()
}

impl Metric for LocalRecall {
    fn name(&self) -> &str {
        "local_recall"
    }

    fn requirement(&self) -> Requirement {
        Requirement::Referenced
    }

    fn support_caching(&self) -> bool {
        false
    }

    fn compute(&self, inputs: &Inputs<'_>) -> Result<MetricOutput> {
        let references = inputs.references(self.name())?;
        let preds: Vec<&Vec<String>> = inputs
            .predictions
            .list_tokenized_lower_nopunct()
            .iter()
            .map(|alts| &alts[0])
            .collect();
        let results = local_recall_scores(&preds, references.list_tokenized_lower_nopunct());

        let mut scores = Scores::new();
        scores.insert(
            "local_recall".to_string(),
            Score::Block(
                results
                    .into_iter()
                    .map(|(n, score)| (n.to_string(), Score::Value(score)))
                    .collect(),
            ),
        );
        Ok(MetricOutput::Corpus(scores))
    }
}
