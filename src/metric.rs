use crate::bert_score::{BertScore, Embedder};
use crate::bleu::Bleu;
use crate::chrf::Chrf;
use crate::error::{Error, Result};
use crate::local_recall::LocalRecall;
use crate::msttr::Msttr;
use crate::ngrams::NGramStats;
use crate::rouge::Rouge;
use crate::sari::Sari;
use crate::ter::Ter;
use crate::score::Scores;
use crate::texts::Texts;
use crate::tokf1::TokenF1;
use crate::ttr::Ttr;
use crate::wer::Wer;
use crate::yules_i::YulesI;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Which collections a metric needs besides the predictions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Requirement {
    Referenceless,
    Referenced,
    SourcedAndReferenced,
}

impl Requirement {
    pub fn is_satisfied(&self, has_references: bool, has_sources: bool) -> bool {
        match self {
            Requirement::Referenceless => true,
            Requirement::Referenced => has_references,
            Requirement::SourcedAndReferenced => has_references && has_sources,
        }
    }
}

/// Collections handed to a metric, already aligned by position.
#[derive(Debug, Clone, Copy)]
pub struct Inputs<'a> {
    pub predictions: &'a Texts,
    pub references: Option<&'a Texts>,
    pub sources: Option<&'a Texts>,
}

impl<'a> Inputs<'a> {
    pub fn new(predictions: &'a Texts) -> Self {
        Self {
            predictions,
            references: None,
            sources: None,
        }
    }

    pub fn with_references(mut self, references: &'a Texts) -> Self {
        self.references = Some(references);
        self
    }

    pub fn with_sources(mut self, sources: &'a Texts) -> Self {
        self.sources = Some(sources);
        self
    }

    pub fn references(&self, metric: &str) -> Result<&'a Texts> {
        self.references
            .ok_or_else(|| Error::contract(metric, "called without references"))
    }

    pub fn sources(&self, metric: &str) -> Result<&'a Texts> {
        self.sources
            .ok_or_else(|| Error::contract(metric, "called without sources"))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MetricOutput {
    /// One score dict for the whole corpus.
    Corpus(Scores),
    /// Instance id -> score dict.
    PerInstance(BTreeMap<String, Scores>),
}

/// A scoring backend.
///
/// Cacheable metrics (the default) must return [`MetricOutput::PerInstance`]
/// keyed by the predictions' ids. Corpus-level statistics that can't be
/// averaged from per-instance values override `support_caching` to `false`
/// and return [`MetricOutput::Corpus`].
pub trait Metric: Send + Sync {
    /// Stable name, used in cache keys and for dispatch.
    fn name(&self) -> &str;

    fn requirement(&self) -> Requirement;

    fn support_caching(&self) -> bool {
        true
    }

    fn compute(&self, inputs: &Inputs<'_>) -> Result<MetricOutput>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricId {
    Bleu,
    Chrf,
    Ter,
    Rouge,
    Wer,
    TokenF1,
    BertScore,
    Sari,
    Ttr,
    Msttr,
    NGrams,
    YulesI,
    LocalRecall,
}

impl MetricId {
    pub const ALL: [MetricId; 13] = [
        MetricId::Bleu,
        MetricId::Chrf,
        MetricId::Ter,
        MetricId::Rouge,
        MetricId::Wer,
        MetricId::TokenF1,
        MetricId::BertScore,
        MetricId::Sari,
        MetricId::Ttr,
        MetricId::Msttr,
        MetricId::NGrams,
        MetricId::YulesI,
        MetricId::LocalRecall,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricId::Bleu => "bleu",
            MetricId::Chrf => "chrf",
            MetricId::Ter => "ter",
            MetricId::Rouge => "rouge",
            MetricId::Wer => "wer",
            MetricId::TokenF1 => "token_f1",
            MetricId::BertScore => "bertscore",
            MetricId::Sari => "sari",
            MetricId::Ttr => "ttr",
            MetricId::Msttr => "msttr",
            MetricId::NGrams => "ngrams",
            MetricId::YulesI => "yules_i",
            MetricId::LocalRecall => "local_recall",
        }
    }
}

impl fmt::Display for MetricId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        MetricId::ALL
            .iter()
            .find(|id| id.as_str() == s)
            .copied()
            .ok_or_else(|| Error::UnknownMetric(s.to_string()))
    }
}

/// Metrics shipped with the crate that run without external resources.
pub const DEFAULT_METRICS: &[&str] = &[
    "bleu",
    "chrf",
    "ter",
    "rouge",
    "wer",
    "token_f1",
    "sari",
    "ttr",
    "msttr",
    "ngrams",
    "yules_i",
    "local_recall",
];

/// Name -> metric table, filled once at startup.
#[derive(Clone, Default)]
pub struct MetricRegistry {
    metrics: HashMap<String, Arc<dyn Metric>>,
}

impl MetricRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// All built-in metrics. `bertscore` needs an embedding backend and is
    /// added with [`MetricRegistry::with_embedder`].
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for id in MetricId::ALL {
            let metric: Arc<dyn Metric> = match id {
                MetricId::Bleu => Arc::new(Bleu),
                MetricId::Chrf => Arc::new(Chrf),
                MetricId::Ter => Arc::new(Ter),
                MetricId::Rouge => Arc::new(Rouge),
                MetricId::Wer => Arc::new(Wer),
                MetricId::TokenF1 => Arc::new(TokenF1),
                MetricId::Sari => Arc::new(Sari),
                MetricId::Ttr => Arc::new(Ttr),
                MetricId::Msttr => Arc::new(Msttr),
                MetricId::NGrams => Arc::new(NGramStats),
                MetricId::YulesI => Arc::new(YulesI),
                MetricId::LocalRecall => Arc::new(LocalRecall),
                MetricId::BertScore => continue,
            };
            registry.register(metric);
        }
        registry
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.register(Arc::new(BertScore::new(embedder)));
        self
    }

    /// Add or replace a metric under its own name.
    pub fn register(&mut self, metric: Arc<dyn Metric>) {
        self.metrics.insert(metric.name().to_string(), metric);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Metric>> {
        if let Some(metric) = self.metrics.get(name) {
            return Ok(Arc::clone(metric));
        }
        match MetricId::from_str(name) {
            Ok(MetricId::BertScore) => Err(Error::UnknownMetric(format!(
                "{} (no embedding backend registered)",
                name
            ))),
            Ok(id) => Err(Error::UnknownMetric(format!("{} (not registered)", id))),
            Err(err) => Err(err),
        }
    }

    /// Resolve a list of names in order, failing on the first unknown one.
    pub fn resolve<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<Arc<dyn Metric>>> {
        names.iter().map(|name| self.get(name.as_ref())).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.metrics.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for MetricRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricRegistry")
            .field("metrics", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_id_roundtrip() {
        for id in MetricId::ALL {
            assert_eq!(id.as_str().parse::<MetricId>().unwrap(), id);
        }
        assert!(matches!(
            "blue".parse::<MetricId>(),
            Err(Error::UnknownMetric(ref name)) if name == "blue"
        ));
    }

    #[test]
    fn test_builtin_registry() {
        let registry = MetricRegistry::builtin();
        for name in DEFAULT_METRICS {
            let metric = registry.get(name).unwrap();
            assert_eq!(metric.name(), *name);
        }
        assert!(
            registry.get("bertscore").is_err(),
            "bertscore needs an embedder"
        );
        assert!(registry.resolve(&["bleu", "nope"]).is_err());
    }

    #[test]
    fn test_requirements() {
        let registry = MetricRegistry::builtin();
        assert_eq!(registry.get("ttr").unwrap().requirement(), Requirement::Referenceless);
        assert_eq!(registry.get("bleu").unwrap().requirement(), Requirement::Referenced);
        assert_eq!(
            registry.get("sari").unwrap().requirement(),
            Requirement::SourcedAndReferenced
        );
        assert!(!registry.get("bleu").unwrap().support_caching());
        assert!(!registry.get("chrf").unwrap().support_caching());
        assert!(!registry.get("ter").unwrap().support_caching());
        assert!(registry.get("rouge").unwrap().support_caching());

        assert!(Requirement::Referenceless.is_satisfied(false, false));
        assert!(!Requirement::Referenced.is_satisfied(false, true));
        assert!(!Requirement::SourcedAndReferenced.is_satisfied(true, false));
    }
}
