use crate::cache::{CacheKey, ScoreCache};
use crate::error::{Error, Result};
use crate::metric::{Inputs, Metric, MetricOutput};
use crate::score::{aggregate, Scores};
use crate::texts::Texts;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Scores for one dataset: the metric results flattened next to the
/// predictions file name and the instance count.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DatasetResults {
    pub predictions_file: String,
    #[serde(rename = "N")]
    pub n: usize,
    #[serde(flatten)]
    pub scores: Scores,
    /// Metric name -> error message for metrics that failed. Failed metrics
    /// are absent from `scores` and never serialized.
    #[serde(skip)]
    pub failures: BTreeMap<String, String>,
}

impl DatasetResults {
    pub fn new(predictions: &Texts) -> Self {
        Self {
            predictions_file: predictions.filename().to_string(),
            n: predictions.len(),
            ..Default::default()
        }
    }

    /// Fold another group's results for the same dataset into this one.
    pub fn merge(&mut self, other: DatasetResults) {
        self.scores.extend(other.scores);
        self.failures.extend(other.failures);
    }
}

/// Run one metric with the per-instance cache.
///
/// Only ids without a cache entry are computed, on filtered copies of the
/// inputs; the caller's collections are never touched. Fresh per-instance
/// results are written back and the full list is rebuilt in the
/// predictions' original order before aggregation. Metrics that don't
/// support caching skip the cache entirely and their corpus scores are
/// returned as-is.
pub fn compute_cached(
    metric: &dyn Metric,
    cache: Option<&dyn ScoreCache>,
    inputs: &Inputs<'_>,
) -> Result<Scores> {
    let name = metric.name();
    let predictions = inputs.predictions;
    let original_order = predictions.effective_ids();
    let cache = cache.filter(|_| metric.support_caching());

    let mut cached: BTreeMap<String, Scores> = BTreeMap::new();
    let mut to_compute: Vec<String> = Vec::new();
    match cache {
        Some(cache) => {
            for id in &original_order {
                let key = CacheKey::new(name, predictions.filename(), id);
                match cache.get(&key) {
                    Some(scores) => {
                        cached.insert(id.clone(), scores);
                    }
                    None => to_compute.push(id.clone()),
                }
            }
            tracing::debug!(
                metric = name,
                file = predictions.filename(),
                hits = cached.len(),
                misses = to_compute.len(),
                "cache lookup"
            );
        }
        None => to_compute = original_order.clone(),
    }

    let mut fresh: BTreeMap<String, Scores> = BTreeMap::new();
    if to_compute.is_empty() {
        tracing::debug!(metric = name, file = predictions.filename(), "all instances cached, skipping compute");
    } else {
        let output = if to_compute.len() == original_order.len() {
            metric.compute(inputs)?
        } else {
            let filtered = FilteredInputs::new(inputs, &original_order, &to_compute)?;
            metric.compute(&filtered.as_inputs())?
        };

        match output {
            MetricOutput::Corpus(scores) => {
                if metric.support_caching() {
                    return Err(Error::contract(
                        name,
                        "cacheable metric returned a corpus-level score",
                    ));
                }
                return Ok(scores);
            }
            MetricOutput::PerInstance(mut per_instance) => {
                for id in &to_compute {
                    let scores = per_instance.remove(id).ok_or_else(|| {
                        Error::contract(name, format!("no score for instance `{}`", id))
                    })?;
                    if let Some(cache) = cache {
                        let key = CacheKey::new(name, predictions.filename(), id);
                        if let Err(err) = cache.set(key, scores.clone()) {
                            tracing::warn!(metric = name, id = id.as_str(), error = %err, "cache write failed");
                        }
                    }
                    fresh.insert(id.clone(), scores);
                }
            }
        }
    }

    let mut ordered = Vec::with_capacity(original_order.len());
    for id in &original_order {
        let scores = cached
            .remove(id)
            .or_else(|| fresh.remove(id))
            .ok_or_else(|| Error::contract(name, format!("no score for instance `{}`", id)))?;
        ordered.push(scores);
    }
    aggregate(&ordered)
}

// Owned copies restricted to the ids that still need computing.
struct FilteredInputs {
    predictions: Texts,
    references: Option<Texts>,
    sources: Option<Texts>,
}

impl FilteredInputs {
    fn new(inputs: &Inputs<'_>, original_order: &[String], to_compute: &[String]) -> Result<Self> {
        let restrict = |texts: &Texts| -> Result<Texts> {
            // Collections without ids are aligned by position with the
            // predictions, so they take over the predictions' order first
            let texts = match texts.ids() {
                Some(_) => texts.clone(),
                None => texts.unscramble(original_order)?,
            };
            texts.unscramble(to_compute)
        };
        Ok(Self {
            predictions: restrict(inputs.predictions)?,
            references: inputs.references.map(restrict).transpose()?,
            sources: inputs.sources.map(restrict).transpose()?,
        })
    }

    fn as_inputs(&self) -> Inputs<'_> {
        Inputs {
            predictions: &self.predictions,
            references: self.references.as_ref(),
            sources: self.sources.as_ref(),
        }
    }
}

/// Align the collections of one dataset and run every applicable metric.
///
/// Predictions are reordered to the references' ids when both carry ids,
/// predictions without ids take over the references' (or sources') ids,
/// and sources follow the predictions. A failing metric is logged and
/// recorded in [`DatasetResults::failures`]; the others still run.
pub fn compute(
    predictions: &Texts,
    references: Option<&Texts>,
    sources: Option<&Texts>,
    metrics: &[Arc<dyn Metric>],
    cache: Option<&dyn ScoreCache>,
) -> Result<DatasetResults> {
    let (predictions, references, sources) = align(predictions, references, sources)?;

    let mut results = DatasetResults::new(&predictions);
    let mut inputs = Inputs::new(&predictions);
    inputs.references = references.as_ref();
    inputs.sources = sources.as_ref();

    for metric in metrics {
        let name = metric.name();
        if !metric
            .requirement()
            .is_satisfied(inputs.references.is_some(), inputs.sources.is_some())
        {
            tracing::debug!(metric = name, requirement = ?metric.requirement(), "inputs missing, skipping metric");
            continue;
        }
        tracing::info!(metric = name, file = predictions.filename(), "computing");
        match compute_cached(metric.as_ref(), cache, &inputs) {
            Ok(scores) => results.scores.extend(scores),
            Err(err) => {
                tracing::warn!(metric = name, file = predictions.filename(), error = %err, "metric failed");
                results.failures.insert(name.to_string(), err.to_string());
            }
        }
    }
    Ok(results)
}

fn align(
    predictions: &Texts,
    references: Option<&Texts>,
    sources: Option<&Texts>,
) -> Result<(Texts, Option<Texts>, Option<Texts>)> {
    // Positional predictions adopt the references' ids, or the sources'
    // when there are no references. A size mismatch is left for the
    // length check below.
    let anchor = match references {
        Some(refs) => refs.ids(),
        None => sources.and_then(Texts::ids),
    };
    let predictions = match (anchor, predictions.ids()) {
        (Some(ids), Some(_)) if references.is_some() => predictions.unscramble(ids)?,
        (Some(ids), None) if ids.len() == predictions.len() => predictions.unscramble(ids)?,
        _ => predictions.clone(),
    };
    let sources = match (sources, predictions.ids()) {
        (Some(srcs), Some(pred_ids)) if srcs.ids().is_some() => Some(srcs.unscramble(pred_ids)?),
        (srcs, _) => srcs.cloned(),
    };
    let references = references.cloned();

    let refs_len = references.as_ref().map(Texts::len);
    let srcs_len = sources.as_ref().map(Texts::len);
    let n = predictions.len();
    if refs_len.is_some_and(|len| len != n) || srcs_len.is_some_and(|len| len != n) {
        return Err(Error::LengthMismatch {
            dataset: predictions.filename().to_string(),
            predictions: n,
            references: refs_len,
            sources: srcs_len,
        });
    }
    Ok((predictions, references, sources))
}
