use crate::cache::{DiskCache, ScoreCache};
use crate::challenge::{derive_contrast_sets, derive_parent_sets, DatasetTexts};
use crate::config::{check_metric_groups, EvalConfig};
use crate::error::{Error, Result};
use crate::loader::{DatasetLoader, NoLoader};
use crate::metric::{Metric, MetricRegistry};
use crate::runner::{self, DatasetResults};
use crate::texts::{Submission, Texts};
use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

pub type SubmissionResults = BTreeMap<String, DatasetResults>;

// One dataset, ready to score. Shared between both metric groups.
#[derive(Clone)]
struct Unit {
    dataset: String,
    predictions: Arc<Texts>,
    references: Option<Arc<Texts>>,
    sources: Option<Arc<Texts>>,
}

impl Unit {
    fn compute(&self, metrics: &[Arc<dyn Metric>], cache: Option<&dyn ScoreCache>) -> Result<DatasetResults> {
        runner::compute(
            &self.predictions,
            self.references.as_deref(),
            self.sources.as_deref(),
            metrics,
            cache,
        )
    }
}

/// Scores a whole submission: the expensive metric group runs with one
/// worker per dataset, then the cheap group runs dataset by dataset.
pub struct Orchestrator {
    registry: MetricRegistry,
    config: EvalConfig,
    loader: Arc<dyn DatasetLoader>,
    cache: Option<Arc<dyn ScoreCache>>,
}

impl Orchestrator {
    pub fn new(registry: MetricRegistry, config: EvalConfig) -> Self {
        Self {
            registry,
            config,
            loader: Arc::new(NoLoader),
            cache: None,
        }
    }

    /// Like [`Orchestrator::new`], with a disk cache when `cache_dir` is set.
    pub fn from_config(registry: MetricRegistry, config: EvalConfig) -> Result<Self> {
        config.validate()?;
        let cache: Option<Arc<dyn ScoreCache>> = match &config.cache_dir {
            Some(dir) => Some(Arc::new(DiskCache::new(dir)?)),
            None => None,
        };
        Ok(Self {
            cache,
            ..Self::new(registry, config)
        })
    }

    pub fn with_loader(mut self, loader: Arc<dyn DatasetLoader>) -> Self {
        self.loader = loader;
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn ScoreCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn config(&self) -> &EvalConfig {
        &self.config
    }

    /// Resolve references and sources for every dataset (explicit
    /// `overrides` first, then the loader) and add the derived challenge
    /// datasets. Everything is built before any metric runs.
    pub fn assemble(&self, submission: Submission, overrides: DatasetTexts) -> (Submission, DatasetTexts) {
        let Submission {
            name,
            param_count,
            entries,
        } = submission;
        let DatasetTexts {
            references: mut ref_overrides,
            sources: mut src_overrides,
        } = overrides;

        let mut submission = Submission {
            name,
            param_count,
            entries: BTreeMap::new(),
        };
        let mut texts = DatasetTexts::default();
        for (dataset, preds) in entries {
            let settings = self.config.dataset_settings(&dataset);
            let preds = if preds.filename().is_empty() {
                preds.with_filename(dataset.clone())
            } else {
                preds
            };
            let preds = match preds.language() {
                Some(_) => preds,
                None => preds.with_language(&settings.language),
            };

            let refs = ref_overrides
                .remove(&dataset)
                .or_else(|| self.loader.references(&dataset));
            let srcs = src_overrides
                .remove(&dataset)
                .or_else(|| self.loader.sources(&dataset));
            match &refs {
                Some(_) => tracing::debug!(dataset = dataset.as_str(), "references resolved"),
                None => tracing::info!(dataset = dataset.as_str(), "no references, referenced metrics will be skipped"),
            }
            if let Some(refs) = refs {
                texts.references.insert(dataset.clone(), refs);
            }
            if let Some(srcs) = srcs {
                texts.sources.insert(dataset.clone(), srcs);
            }
            submission.entries.insert(dataset, preds);
        }

        derive_parent_sets(&mut submission, &mut texts, &self.config.transformation_parents);
        for dataset in &self.config.subpopulation_datasets {
            if !submission.entries.contains_key(dataset) {
                continue;
            }
            if let Some(sets) = self.loader.contrast_sets(dataset) {
                derive_contrast_sets(&mut submission, &mut texts, dataset, &sets);
            }
        }
        (submission, texts)
    }

    pub fn run(&self, submission: Submission, overrides: DatasetTexts) -> Result<SubmissionResults> {
        check_metric_groups(&self.config.expensive_metrics, &self.config.cheap_metrics)?;
        let expensive = self.registry.resolve(&self.config.expensive_metrics)?;
        let cheap = self.registry.resolve(&self.config.cheap_metrics)?;

        let (submission, mut texts) = self.assemble(submission, overrides);
        let mut units = Vec::with_capacity(submission.entries.len());
        for (dataset, preds) in submission.entries {
            let refs = texts.references.remove(&dataset);
            let srcs = texts.sources.remove(&dataset);
            let (n_refs, n_srcs) = (refs.as_ref().map(Texts::len), srcs.as_ref().map(Texts::len));
            // Id-aligned collections may legitimately differ in size, the
            // runner checks them after alignment
            let positional = preds.ids().is_none()
                || refs.as_ref().is_some_and(|r| r.ids().is_none())
                || srcs.as_ref().is_some_and(|s| s.ids().is_none());
            if positional
                && (n_refs.is_some_and(|n| n != preds.len()) || n_srcs.is_some_and(|n| n != preds.len()))
            {
                let err = Error::LengthMismatch {
                    dataset: dataset.clone(),
                    predictions: preds.len(),
                    references: n_refs,
                    sources: n_srcs,
                };
                tracing::error!(dataset = dataset.as_str(), error = %err, "skipping dataset");
                continue;
            }
            units.push(Unit {
                dataset,
                predictions: Arc::new(preds),
                references: refs.map(Arc::new),
                sources: srcs.map(Arc::new),
            });
        }

        let mut results = SubmissionResults::new();
        if !expensive.is_empty() && !units.is_empty() {
            tracing::info!(datasets = units.len(), workers = self.config.num_workers, "running expensive metrics");
            for (dataset, outcome) in self.run_parallel(&units, expensive)? {
                record(&mut results, dataset, outcome);
            }
        }

        // strictly after the parallel pass
        if !cheap.is_empty() {
            tracing::info!(datasets = units.len(), "running cheap metrics");
            for unit in &units {
                let outcome = unit.compute(&cheap, self.cache.as_deref());
                record(&mut results, unit.dataset.clone(), outcome);
            }
        }
        Ok(results)
    }

    fn run_parallel(
        &self,
        units: &[Unit],
        metrics: Vec<Arc<dyn Metric>>,
    ) -> Result<Vec<(String, Result<DatasetResults>)>> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.config.num_workers.max(1))
            .enable_time()
            .build()
            .map_err(|e| Error::Runtime(e.to_string()))?;
        let timeout = self.config.unit_timeout_secs.map(Duration::from_secs);
        let names: Arc<Vec<String>> = Arc::new(metrics.iter().map(|m| m.name().to_string()).collect());
        let metrics = Arc::new(metrics);

        let tasks = units.iter().cloned().map(|unit| {
            let metrics = Arc::clone(&metrics);
            let names = Arc::clone(&names);
            let cache = self.cache.clone();
            async move {
                let dataset = unit.dataset.clone();
                let predictions = Arc::clone(&unit.predictions);
                let handle = tokio::task::spawn_blocking(move || unit.compute(&metrics, cache.as_deref()));
                let failure = match timeout {
                    Some(limit) => match tokio::time::timeout(limit, handle).await {
                        Ok(Ok(outcome)) => return (dataset, outcome),
                        Ok(Err(join_err)) => format!("worker failed: {}", join_err),
                        // the blocking task can't be cancelled; its result is dropped
                        Err(_) => format!("timed out after {:?}", limit),
                    },
                    None => match handle.await {
                        Ok(outcome) => return (dataset, outcome),
                        Err(join_err) => format!("worker failed: {}", join_err),
                    },
                };
                tracing::warn!(dataset = dataset.as_str(), error = failure.as_str(), "expensive unit failed");
                let mut results = DatasetResults::new(&predictions);
                for name in names.iter() {
                    results.failures.insert(name.clone(), failure.clone());
                }
                (dataset, Ok(results))
            }
        });

        let messages = runtime.block_on(
            stream::iter(tasks)
                .buffer_unordered(self.config.num_workers.max(1))
                .collect::<Vec<_>>(),
        );
        // don't wait on workers that outlived their timeout
        runtime.shutdown_background();
        Ok(messages)
    }
}

// Single writer for all results, keyed by dataset
fn record(results: &mut SubmissionResults, dataset: String, outcome: Result<DatasetResults>) {
    match outcome {
        Ok(partial) => match results.get_mut(&dataset) {
            Some(existing) => existing.merge(partial),
            None => {
                results.insert(dataset, partial);
            }
        },
        Err(err) => {
            tracing::error!(dataset = dataset.as_str(), error = %err, "dataset failed");
        }
    }
}

/// Score a submission with the built-in metrics and explicit references
/// and sources. No default loader is consulted.
pub fn process_submission<S: AsRef<str>>(
    submission: Submission,
    references: BTreeMap<String, Texts>,
    sources: BTreeMap<String, Texts>,
    expensive_metrics: &[S],
    cheap_metrics: &[S],
    cache: Option<Arc<dyn ScoreCache>>,
    num_workers: usize,
) -> Result<SubmissionResults> {
    let config = EvalConfig {
        num_workers,
        expensive_metrics: expensive_metrics.iter().map(|m| m.as_ref().to_string()).collect(),
        cheap_metrics: cheap_metrics.iter().map(|m| m.as_ref().to_string()).collect(),
        ..EvalConfig::default()
    };
    config.validate()?;
    let mut orchestrator = Orchestrator::new(MetricRegistry::builtin(), config);
    if let Some(cache) = cache {
        orchestrator = orchestrator.with_cache(cache);
    }
    orchestrator.run(submission, DatasetTexts { references, sources })
}
