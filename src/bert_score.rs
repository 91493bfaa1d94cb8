use crate::error::{Error, Result};
use crate::lang::Language;
use crate::metric::{Inputs, Metric, MetricOutput, Requirement};
use crate::score::{Score, Scores};
use crate::utils::f1;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Contextual token embeddings from some model backend. One vector per
/// input token, all of the same dimension.
pub trait Embedder: Send + Sync {
    fn embed(&self, tokens: &[String], language: Option<&Language>) -> Result<Vec<Vec<f32>>>;
}

/// BERTScore-style greedy matching over token embeddings. Every prediction
/// token is matched to its most similar reference token (precision) and the
/// other way round (recall).
pub struct BertScore {
    embedder: Arc<dyn Embedder>,
}

impl BertScore {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self { embedder }
    }

    fn embed(&self, tokens: &[String], language: Option<&Language>) -> Result<Vec<Vec<f32>>> {
        let embeddings = self.embedder.embed(tokens, language)?;
        if embeddings.len() != tokens.len() {
            return Err(Error::metric(
                "bertscore",
                format!(
                    "embedder returned {} vectors for {} tokens",
                    embeddings.len(),
                    tokens.len()
                ),
            ));
        }
        Ok(embeddings)
    }
}

fn cos_sim(a: &[f32], b: &[f32]) -> f64 {
    // dot product over the hidden dimension divided by both L2 norms;
    // the denominator is clamped so zero vectors give 0 instead of NaN
    let dot: f64 = a.iter().zip(b).map(|(x, y)| *x as f64 * *y as f64).sum();
    let norm_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    dot / (norm_a * norm_b).max(1e-9)
}

// Mean over `from` of the best similarity found in `to`
fn greedy_match(from: &[Vec<f32>], to: &[Vec<f32>]) -> f64 {
    if from.is_empty() || to.is_empty() {
        return 0.0;
    }
    let total: f64 = from
        .iter()
        .map(|a| {
            to.iter()
                .map(|b| cos_sim(a, b))
                .fold(f64::NEG_INFINITY, f64::max)
        })
        .sum();
    total / from.len() as f64
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Matched {
    precision: f64,
    recall: f64,
    f1: f64,
}

fn match_embeddings(pred: &[Vec<f32>], gold: &[Vec<f32>]) -> Matched {
    let precision = greedy_match(pred, gold);
    let recall = greedy_match(gold, pred);
    Matched {
        precision,
        recall,
        f1: f1(precision, recall),
    }
}

impl Metric for BertScore {
    fn name(&self) -> &str {
        "bertscore"
    }

    fn requirement(&self) -> Requirement {
        Requirement::Referenced
    }

    fn compute(&self, inputs: &Inputs<'_>) -> Result<MetricOutput> {
        let references = inputs.references(self.name())?;
        let language = inputs.predictions.language();
        let preds = inputs.predictions.list_tokenized();
        let refs = references.list_tokenized();

        let mut per_instance = BTreeMap::new();
        for (id, (pred, alts)) in inputs
            .predictions
            .effective_ids()
            .into_iter()
            .zip(preds.iter().zip(refs.iter()))
        {
            let pred_emb = self.embed(&pred[0], language)?;
            // with several references the best F1 wins
            let mut best: Option<Matched> = None;
            for gold in alts {
                let gold_emb = self.embed(gold, language)?;
                let matched = match_embeddings(&pred_emb, &gold_emb);
                if best.map_or(true, |b| matched.f1 > b.f1) {
                    best = Some(matched);
                }
            }
            let best = best.unwrap_or_default();

            let mut scores = Scores::new();
            scores.insert(
                "bertscore".to_string(),
                Score::block([
                    ("precision", best.precision),
                    ("recall", best.recall),
                    ("f1", best.f1),
                ]),
            );
            per_instance.insert(id, scores);
        }
        Ok(MetricOutput::PerInstance(per_instance))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::texts::Texts;

    // One-hot vectors over a tiny fixed vocabulary
    struct OneHot;

    impl Embedder for OneHot {
        fn embed(&self, tokens: &[String], _: Option<&Language>) -> Result<Vec<Vec<f32>>> {
            const VOCAB: [&str; 4] = ["the", "cat", "sat", "dog"];
            Ok(tokens
                .iter()
                .map(|t| {
                    VOCAB
                        .iter()
                        .map(|v| if v.eq_ignore_ascii_case(t) { 1.0 } else { 0.0 })
                        .collect()
                })
                .collect())
        }
    }

    #[test]
    fn test_cos_sim_is_one_for_same_vectors() {
        assert!((1f64 - cos_sim(&[1.0, 1.0, 1.0], &[1.0, 1.0, 1.0])).abs() < 0.0001);
    }

    #[test]
    fn test_cos_sim_is_zero_for_orthogonal_vectors() {
        // 1 * 0 + 1 * 1 + 1 * -1 = 0
        assert!(cos_sim(&[1.0, 1.0, 1.0], &[0.0, 1.0, -1.0]).abs() < 0.0001);
        assert_eq!(cos_sim(&[0.0, 0.0], &[0.0, 0.0]), 0.0);
    }

    #[test]
    fn test_greedy_matching() {
        let pred = OneHot.embed(&["the".into(), "cat".into()], None).unwrap();
        let gold = OneHot.embed(&["the".into(), "dog".into(), "sat".into()], None).unwrap();
        let m = match_embeddings(&pred, &gold);
        assert!((m.precision - 0.5).abs() < 1e-9, "got {:?}", m);
        assert!((m.recall - 1.0 / 3.0).abs() < 1e-9, "got {:?}", m);
    }

    #[test]
    fn test_bertscore_per_instance() {
        let metric = BertScore::new(Arc::new(OneHot));
        let preds = Texts::predictions(["the cat sat", ""]).with_ids(["a", "b"]).unwrap();
        let refs = Texts::multi_references(vec![vec!["the dog", "the cat sat"], vec!["cat"]]).unwrap();
        let output = metric
            .compute(&Inputs::new(&preds).with_references(&refs))
            .unwrap();
        let MetricOutput::PerInstance(per_instance) = output else {
            panic!("bertscore is per-instance");
        };
        let first = &per_instance["a"]["bertscore"];
        assert!((first.get("f1").unwrap().as_value().unwrap() - 1.0).abs() < 1e-9);
        let empty = &per_instance["b"]["bertscore"];
        assert_eq!(empty.get("f1"), Some(&Score::Value(0.0)));
    }
}
