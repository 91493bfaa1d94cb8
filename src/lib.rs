pub mod bert_score;
pub mod bleu;
pub mod cache;
pub mod challenge;
pub mod chrf;
pub mod config;
pub mod error;
pub mod lang;
pub mod loader;
pub mod local_recall;
pub mod metric;
pub mod msttr;
pub mod ngrams;
pub mod orchestrator;
pub mod rouge;
pub mod runner;
pub mod sari;
pub mod ter;
pub mod score;
pub mod texts;
pub mod tokenize;
pub mod tokf1;
pub mod ttr;
pub mod utils;
pub mod wer;
pub mod yules_i;

pub use cache::{CacheKey, DiskCache, MemoryCache, ScoreCache};
pub use challenge::DatasetTexts;
pub use config::EvalConfig;
pub use error::{Error, Result};
pub use metric::{Inputs, Metric, MetricId, MetricOutput, MetricRegistry, Requirement};
pub use orchestrator::{process_submission, Orchestrator, SubmissionResults};
pub use runner::{compute, compute_cached, DatasetResults};
pub use score::{aggregate, Score, Scores};
pub use texts::{Submission, TextKind, Texts};

#[cfg(feature = "python")]
mod python {
    use crate::cache::{DiskCache, ScoreCache};
    use crate::challenge::DatasetTexts;
    use crate::config::EvalConfig;
    use crate::error::Error;
    use crate::metric::MetricRegistry;
    use crate::orchestrator::Orchestrator;
    use crate::runner;
    use crate::texts::{Submission, TextKind, Texts};
    use pyo3::exceptions::{PyRuntimeError, PyValueError};
    use pyo3::prelude::*;
    use serde_json::Value;
    use std::collections::BTreeMap;

    impl From<Error> for PyErr {
        fn from(err: Error) -> PyErr {
            match err {
                Error::Io(_) | Error::Cache(_) | Error::Runtime(_) => PyRuntimeError::new_err(err.to_string()),
                _ => PyValueError::new_err(err.to_string()),
            }
        }
    }

    fn parse_texts(kind: TextKind, raw: &str) -> crate::Result<Texts> {
        Texts::from_value(kind, serde_json::from_str(raw)?)
    }

    // {dataset: collection}
    fn parse_texts_map(kind: TextKind, raw: Option<&str>) -> crate::Result<BTreeMap<String, Texts>> {
        let Some(raw) = raw else {
            return Ok(BTreeMap::new());
        };
        let map: BTreeMap<String, Value> = serde_json::from_str(raw)?;
        map.into_iter()
            .map(|(dataset, value)| Ok((dataset, Texts::from_value(kind, value)?)))
            .collect()
    }

    /// Score one prediction collection. All arguments are JSON strings; the
    /// result is the JSON of `{"predictions_file", "N", <metric results>}`.
    #[pyfunction]
    #[pyo3(signature = (predictions, references=None, sources=None, metrics=None, cache_dir=None))]
    fn compute_json(
        py: Python,
        predictions: String,
        references: Option<String>,
        sources: Option<String>,
        metrics: Option<Vec<String>>,
        cache_dir: Option<String>,
    ) -> PyResult<String> {
        let output = py.allow_threads(|| -> crate::Result<String> {
            let predictions = parse_texts(TextKind::Predictions, &predictions)?;
            let references = references
                .as_deref()
                .map(|raw| parse_texts(TextKind::References, raw))
                .transpose()?;
            let sources = sources
                .as_deref()
                .map(|raw| parse_texts(TextKind::Sources, raw))
                .transpose()?;
            let registry = MetricRegistry::builtin();
            let metrics = match metrics {
                Some(names) => registry.resolve(&names)?,
                None => registry.resolve(crate::metric::DEFAULT_METRICS)?,
            };
            let cache = cache_dir.map(DiskCache::new).transpose()?;
            let results = runner::compute(
                &predictions,
                references.as_ref(),
                sources.as_ref(),
                &metrics,
                cache.as_ref().map(|c| c as &dyn ScoreCache),
            )?;
            Ok(serde_json::to_string(&results)?)
        })?;
        Ok(output)
    }

    /// Score a submission file's content. `config` is an `EvalConfig` JSON.
    #[pyfunction]
    #[pyo3(signature = (submission, references=None, sources=None, config=None))]
    fn process_submission_json(
        py: Python,
        submission: String,
        references: Option<String>,
        sources: Option<String>,
        config: Option<String>,
    ) -> PyResult<String> {
        let output = py.allow_threads(|| -> crate::Result<String> {
            let submission = Submission::from_value(serde_json::from_str(&submission)?)?;
            let overrides = DatasetTexts {
                references: parse_texts_map(TextKind::References, references.as_deref())?,
                sources: parse_texts_map(TextKind::Sources, sources.as_deref())?,
            };
            let config = match config {
                Some(raw) => EvalConfig::from_json_str(&raw)?,
                None => EvalConfig::default(),
            };
            let orchestrator = Orchestrator::from_config(MetricRegistry::builtin(), config)?;
            let results = orchestrator.run(submission, overrides)?;
            Ok(serde_json::to_string(&results)?)
        })?;
        Ok(output)
    }

    #[pymodule]
    fn gemscore(m: &Bound<'_, PyModule>) -> PyResult<()> {
        m.add_function(wrap_pyfunction!(compute_json, m)?)?;
        m.add_function(wrap_pyfunction!(process_submission_json, m)?)?;
        Ok(())
    }
}
