use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

pub const DEFAULT_LANGUAGE: &str = "en";
pub const DEFAULT_TASK: &str = "text2text";
const DATA_URL: &str = "https://github.com/GEM-benchmark/GEM-metrics/releases/download/data";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetSettings {
    pub language: String,
    pub task: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl Default for DatasetSettings {
    fn default() -> Self {
        Self {
            language: DEFAULT_LANGUAGE.to_string(),
            task: DEFAULT_TASK.to_string(),
            url: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    /// Upper bound on datasets scored in parallel by the expensive group.
    pub num_workers: usize,
    pub cache_dir: Option<PathBuf>,
    pub expensive_metrics: Vec<String>,
    pub cheap_metrics: Vec<String>,
    /// Per (dataset, expensive group) unit; exceeding it counts as a metric
    /// failure for that dataset.
    pub unit_timeout_secs: Option<u64>,
    /// Overrides for the built-in dataset table.
    pub datasets: BTreeMap<String, DatasetSettings>,
    pub transformation_parents: BTreeMap<String, String>,
    pub subpopulation_datasets: Vec<String>,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            num_workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            cache_dir: None,
            expensive_metrics: vec!["rouge".to_string(), "sari".to_string()],
            cheap_metrics: [
                "bleu",
                "chrf",
                "ter",
                "wer",
                "token_f1",
                "ttr",
                "msttr",
                "ngrams",
                "yules_i",
                "local_recall",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            unit_timeout_secs: None,
            datasets: BTreeMap::new(),
            transformation_parents: TRANSFORMATION_PARENTS.iter().cloned().collect(),
            subpopulation_datasets: SUBPOPULATION_BASE.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl EvalConfig {
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: EvalConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json_str(&std::fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_workers == 0 {
            return Err(Error::invalid_input("num_workers must be at least 1"));
        }
        check_metric_groups(&self.expensive_metrics, &self.cheap_metrics)
    }

    /// Language and task for a dataset: explicit override, then the built-in
    /// table by dataset family, then the defaults.
    pub fn dataset_settings(&self, dataset: &str) -> DatasetSettings {
        if let Some(settings) = self.datasets.get(dataset) {
            return settings.clone();
        }
        KNOWN_DATASETS
            .iter()
            .filter(|(family, _, _)| dataset.starts_with(family))
            .max_by_key(|(family, _, _)| family.len())
            .map(|(_, language, task)| DatasetSettings {
                language: language.to_string(),
                task: task.to_string(),
                url: None,
            })
            .unwrap_or_default()
    }

    pub fn dataset_url(&self, dataset: &str) -> String {
        self.datasets
            .get(dataset)
            .and_then(|settings| settings.url.clone())
            .unwrap_or_else(|| default_dataset_url(dataset))
    }
}

/// A metric can't be in both groups.
pub fn check_metric_groups<S: AsRef<str>>(expensive: &[S], cheap: &[S]) -> Result<()> {
    let expensive: HashSet<&str> = expensive.iter().map(AsRef::as_ref).collect();
    match cheap.iter().map(AsRef::as_ref).find(|m| expensive.contains(m)) {
        Some(metric) => Err(Error::MetricGroupConflict(metric.to_string())),
        None => Ok(()),
    }
}

/// `{DATA_URL}/{dataset}.json`; a `_val` split suffix is spelled out as
/// `_validation` in file names.
pub fn default_dataset_url(dataset: &str) -> String {
    let name = match dataset.strip_suffix("_val") {
        Some(base) => format!("{}_validation", base),
        None => dataset.to_string(),
    };
    format!("{}/{}.json", DATA_URL, name)
}

static TRANSFORMATION_PARENTS: Lazy<Vec<(String, String)>> = Lazy::new(|| {
    let mut parents: Vec<(String, String)> = [
        ("cs_restaurants_challenge_test_scramble", "cs_restaurants_test"),
        ("web_nlg_ru_challenge_test_scramble", "web_nlg_ru_test"),
        ("e2e_nlg_challenge_test_scramble", "e2e_nlg_test"),
        ("web_nlg_en_challenge_test_scramble", "web_nlg_en_test"),
        ("web_nlg_en_challenge_test_numbers", "web_nlg_en_test"),
    ]
    .iter()
    .map(|(child, parent)| (child.to_string(), parent.to_string()))
    .collect();
    for suffix in ["backtranslation", "bfp02", "bfp05", "nopunc", "scramble"] {
        parents.push((
            format!("schema_guided_dialog_challenge_test_{}", suffix),
            "schema_guided_dialog_test".to_string(),
        ));
    }
    for suffix in ["backtranslation", "bfp_02", "bfp_05", "nopunc"] {
        parents.push((format!("xsum_challenge_test_{}", suffix), "xsum_test".to_string()));
    }
    for split in ["asset", "turk"] {
        for suffix in ["backtranslation", "bfp02", "bfp05", "nopunc"] {
            parents.push((
                format!("wiki_auto_asset_turk_challenge_test_{}_{}", split, suffix),
                format!("wiki_auto_asset_turk_test_{}", split),
            ));
        }
    }
    parents
});

const SUBPOPULATION_BASE: &[&str] = &[
    "cs_restaurants_test",
    "e2e_nlg_test",
    "schema_guided_dialog_test",
    "totto_test",
    "xsum_test",
    "web_nlg_en_test",
    "web_nlg_ru_test",
    "wiki_auto_asset_turk_test_asset",
    "wiki_auto_asset_turk_test_turk",
];

// (dataset family prefix, language, task)
const KNOWN_DATASETS: &[(&str, &str, &str)] = &[
    ("ART", "en", "data2text"),
    ("BiSECT_de", "de", "simplification"),
    ("BiSECT_en", "en", "simplification"),
    ("BiSECT_es", "es", "simplification"),
    ("BiSECT_fr", "fr", "simplification"),
    ("RotoWire_English_German", "de", "data2text"),
    ("Taskmaster", "en", "dialog"),
    ("common_gen", "en", "data2text"),
    ("conversational_weather", "en", "data2text"),
    ("cs_restaurants", "cs", "data2text"),
    ("dart", "en", "data2text"),
    ("e2e_nlg", "en", "data2text"),
    ("mlsum_de", "de", "summarization"),
    ("mlsum_es", "es", "summarization"),
    ("schema_guided_dialog", "en", "dialog"),
    ("sportsett_basketball", "en", "data2text"),
    ("squad_v2", "en", "question_generation"),
    ("totto", "en", "data2text"),
    ("turku_hockey_data2text", "fi", "data2text"),
    ("web_nlg_en", "en", "data2text"),
    ("web_nlg_ru", "ru", "data2text"),
    ("wiki_auto_asset_turk", "en", "simplification"),
    ("wiki_lingua_english_en", "en", "summarization"),
    ("wiki_lingua_russian_ru", "ru", "summarization"),
    ("wiki_lingua_spanish_es", "es", "summarization"),
    ("wiki_lingua_turkish_tr", "tr", "summarization"),
    ("wiki_lingua_vietnamese_vi", "vi", "summarization"),
    ("xsum", "en", "summarization"),
];
