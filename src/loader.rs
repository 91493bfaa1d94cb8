use crate::challenge::{parse_contrast_sets, ContrastSets};
use crate::config::EvalConfig;
use crate::error::Result;
use crate::texts::{TextKind, Texts};
use std::path::{Path, PathBuf};

/// Default source of references, sources and contrast sets for datasets
/// that weren't given explicitly. Failures are logged by the implementation
/// and come back as `None`.
pub trait DatasetLoader: Send + Sync {
    fn references(&self, dataset: &str) -> Option<Texts>;

    fn sources(&self, dataset: &str) -> Option<Texts>;

    fn contrast_sets(&self, _dataset: &str) -> Option<ContrastSets> {
        None
    }
}

/// Loads nothing; every dataset must come with explicit inputs.
pub struct NoLoader;

impl DatasetLoader for NoLoader {
    fn references(&self, _dataset: &str) -> Option<Texts> {
        None
    }

    fn sources(&self, _dataset: &str) -> Option<Texts> {
        None
    }
}

/// Reads the dataset's reference file (named as in its download URL, or
/// `<root>/<dataset>.json`; sources too when the instances carry a
/// `source` field), `<root>/<dataset>_sources.json` and
/// `<root>/<dataset>_contrast_sets.json`.
pub struct DirectoryLoader {
    root: PathBuf,
    config: EvalConfig,
}

impl DirectoryLoader {
    pub fn new(root: impl Into<PathBuf>, config: EvalConfig) -> Self {
        Self {
            root: root.into(),
            config,
        }
    }

    fn path(&self, file_stem: &str) -> PathBuf {
        self.root.join(format!("{}.json", file_stem))
    }

    fn load(&self, kind: TextKind, dataset: &str, path: &Path) -> Result<Texts> {
        let texts = Texts::from_path(kind, path)?;
        // fall back to the dataset table when the file doesn't say
        Ok(match texts.language() {
            Some(_) => texts,
            None => {
                let settings = self.config.dataset_settings(dataset);
                let texts = texts.with_language(&settings.language);
                match texts.task() {
                    Some(_) => texts,
                    None => texts.with_task(settings.task),
                }
            }
        })
    }

    fn load_logged(&self, kind: TextKind, dataset: &str, path: &Path) -> Option<Texts> {
        if !path.exists() {
            tracing::debug!(dataset, path = %path.display(), %kind, "no file");
            return None;
        }
        match self.load(kind, dataset, path) {
            Ok(texts) => Some(texts),
            Err(err) => {
                tracing::warn!(dataset, path = %path.display(), %kind, error = %err, "cannot load");
                None
            }
        }
    }

    // The root mirrors the release downloads, so the file is named after the
    // dataset's URL (`e2e_nlg_val` -> `e2e_nlg_validation.json`). Plain
    // `<dataset>.json` is accepted too.
    fn reference_path(&self, dataset: &str) -> PathBuf {
        let url = self.config.dataset_url(dataset);
        let mirrored = url
            .rsplit('/')
            .next()
            .filter(|name| !name.is_empty())
            .map(|name| self.root.join(name));
        match mirrored {
            Some(path) if path.exists() => path,
            _ => self.path(dataset),
        }
    }
}

impl DatasetLoader for DirectoryLoader {
    fn references(&self, dataset: &str) -> Option<Texts> {
        self.load_logged(TextKind::References, dataset, &self.reference_path(dataset))
    }

    fn sources(&self, dataset: &str) -> Option<Texts> {
        let path = self.path(&format!("{}_sources", dataset));
        if path.exists() {
            return self.load_logged(TextKind::Sources, dataset, &path);
        }
        // reference files often carry the source next to the target
        let path = self.reference_path(dataset);
        if !path.exists() {
            return None;
        }
        match self.load(TextKind::Sources, dataset, &path) {
            Ok(texts) => Some(texts),
            Err(err) => {
                tracing::debug!(dataset, error = %err, "no sources in reference file");
                None
            }
        }
    }

    fn contrast_sets(&self, dataset: &str) -> Option<ContrastSets> {
        let path = self.path(&format!("{}_contrast_sets", dataset));
        let raw = std::fs::read_to_string(&path).ok()?;
        match parse_contrast_sets(&raw) {
            Ok(sets) => Some(sets),
            Err(err) => {
                tracing::warn!(dataset, path = %path.display(), error = %err, "cannot parse contrast sets");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatasetSettings;
    use std::fs;

    fn write(dir: &Path, name: &str, body: &str) {
        fs::write(dir.join(name), body).unwrap();
    }

    #[test]
    fn test_directory_loader() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "web_nlg_ru_test.json",
            r#"{"values": [{"target": ["a", "b"], "source": "s", "gem_id": "1"}]}"#,
        );
        write(
            dir.path(),
            "web_nlg_ru_test_contrast_sets.json",
            r#"{"size": {"one": ["1"]}}"#,
        );
        let loader = DirectoryLoader::new(dir.path(), EvalConfig::default());

        let refs = loader.references("web_nlg_ru_test").unwrap();
        assert!(refs.is_multi_ref());
        // language comes from the dataset table
        assert_eq!(refs.language().unwrap().alpha_2, "ru");
        assert_eq!(refs.task(), Some("data2text"));
        assert!(refs.filename().ends_with("web_nlg_ru_test.json"));

        let srcs = loader.sources("web_nlg_ru_test").unwrap();
        assert_eq!(srcs.text(0), "s");

        let sets = loader.contrast_sets("web_nlg_ru_test").unwrap();
        assert_eq!(sets["size"]["one"], vec!["1".to_string()]);
    }

    #[test]
    fn test_directory_loader_missing_and_broken() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "broken.json", "{ not json");
        write(dir.path(), "no_src.json", r#"{"values": [{"target": "t"}]}"#);
        let loader = DirectoryLoader::new(dir.path(), EvalConfig::default());

        assert!(loader.references("missing").is_none());
        assert!(loader.references("broken").is_none());
        assert!(loader.sources("no_src").is_none());
        assert!(loader.contrast_sets("no_src").is_none());
        assert!(NoLoader.references("anything").is_none());
    }

    #[test]
    fn test_reference_file_named_after_url() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "e2e_nlg_validation.json",
            r#"{"values": [{"target": "t", "source": "s"}]}"#,
        );
        write(dir.path(), "custom.json", r#"{"values": [{"target": "u"}]}"#);
        let mut config = EvalConfig::default();
        config.datasets.insert(
            "mine_test".to_string(),
            DatasetSettings {
                url: Some("https://example.org/files/custom.json".to_string()),
                ..DatasetSettings::default()
            },
        );
        let loader = DirectoryLoader::new(dir.path(), config);

        let refs = loader.references("e2e_nlg_val").unwrap();
        assert!(refs.filename().ends_with("e2e_nlg_validation.json"));
        assert_eq!(loader.sources("e2e_nlg_val").unwrap().text(0), "s");
        assert_eq!(loader.references("mine_test").unwrap().text(0), "u");
    }
}
