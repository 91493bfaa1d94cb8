use crate::error::{Error, Result};
use crate::lang::{resolve_language, Language};
use crate::tokenize::{default_tokenize_func, is_punctuation, TokenizeFn};
use once_cell::sync::OnceCell;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextKind {
    Predictions,
    References,
    Sources,
}

impl TextKind {
    /// Field holding the text when instances are given as JSON objects.
    pub fn key(&self) -> &'static str {
        match self {
            TextKind::Predictions => "generated",
            TextKind::References => "target",
            TextKind::Sources => "source",
        }
    }
}

impl fmt::Display for TextKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextKind::Predictions => write!(f, "predictions"),
            TextKind::References => write!(f, "references"),
            TextKind::Sources => write!(f, "sources"),
        }
    }
}

/// A collection of predictions, references or sources.
///
/// Every instance is stored as a list of alternative texts. Predictions and
/// sources always hold exactly one alternative; references hold one or more,
/// so single-reference data is handled as a 1-element list everywhere.
///
/// Tokenized views are computed lazily and memoized. The collection is never
/// mutated after construction: [`Texts::unscramble`] returns a new value, so
/// a derived view can't go stale.
#[derive(Debug, Clone)]
pub struct Texts {
    kind: TextKind,
    filename: String,
    language: Option<Language>,
    task: Option<String>,
    instances: Vec<Vec<String>>,
    multi_ref: bool,
    ids: Option<Vec<String>>,
    parent_ids: Option<Vec<Option<String>>>,
    tokenizer: TokenizeFn,
    tokenized: OnceCell<Vec<Vec<Vec<String>>>>,
    whitespace: OnceCell<Vec<Vec<String>>>,
    lower: OnceCell<Vec<Vec<Vec<String>>>>,
    lower_nopunct: OnceCell<Vec<Vec<Vec<String>>>>,
}

impl Texts {
    pub fn new(kind: TextKind, instances: Vec<Vec<String>>) -> Result<Self> {
        if let Some(pos) = instances.iter().position(|alts| alts.is_empty()) {
            return Err(Error::invalid_input(format!(
                "{} instance {} has no text",
                kind, pos
            )));
        }
        if kind != TextKind::References {
            if let Some(pos) = instances.iter().position(|alts| alts.len() > 1) {
                return Err(Error::invalid_input(format!(
                    "{} instance {} holds {} texts, only references may hold several",
                    kind,
                    pos,
                    instances[pos].len()
                )));
            }
        }
        Ok(Self::raw(kind, instances))
    }

    fn raw(kind: TextKind, instances: Vec<Vec<String>>) -> Self {
        Self {
            kind,
            filename: String::new(),
            language: None,
            task: None,
            multi_ref: instances.iter().any(|alts| alts.len() > 1),
            instances,
            ids: None,
            parent_ids: None,
            tokenizer: default_tokenize_func(None),
            tokenized: OnceCell::new(),
            whitespace: OnceCell::new(),
            lower: OnceCell::new(),
            lower_nopunct: OnceCell::new(),
        }
    }

    pub fn predictions<S: Into<String>>(texts: impl IntoIterator<Item = S>) -> Self {
        Self::single(TextKind::Predictions, texts)
    }

    pub fn sources<S: Into<String>>(texts: impl IntoIterator<Item = S>) -> Self {
        Self::single(TextKind::Sources, texts)
    }

    /// Single-reference collection; each text becomes a 1-element list.
    pub fn references<S: Into<String>>(texts: impl IntoIterator<Item = S>) -> Self {
        Self::single(TextKind::References, texts)
    }

    pub fn multi_references<S: Into<String>>(
        refs: impl IntoIterator<Item = Vec<S>>,
    ) -> Result<Self> {
        let instances = refs
            .into_iter()
            .map(|alts| alts.into_iter().map(Into::into).collect())
            .collect();
        Self::new(TextKind::References, instances)
    }

    fn single<S: Into<String>>(kind: TextKind, texts: impl IntoIterator<Item = S>) -> Self {
        Self::raw(kind, texts.into_iter().map(|t| vec![t.into()]).collect())
    }

    pub fn with_ids<S: Into<String>>(mut self, ids: impl IntoIterator<Item = S>) -> Result<Self> {
        let ids: Vec<String> = ids.into_iter().map(Into::into).collect();
        check_ids(&ids, self.instances.len(), self.kind)?;
        self.ids = Some(ids);
        Ok(self)
    }

    pub fn with_parent_ids(mut self, parent_ids: Vec<Option<String>>) -> Result<Self> {
        if parent_ids.len() != self.instances.len() {
            return Err(Error::invalid_input(format!(
                "{} parent ids for {} instances",
                parent_ids.len(),
                self.instances.len()
            )));
        }
        self.parent_ids = Some(parent_ids);
        Ok(self)
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = filename.into();
        self
    }

    /// Sets the language from an ISO code or name. Unknown tags leave the
    /// language unset, which selects the fallback tokenizer.
    pub fn with_language(mut self, tag: &str) -> Self {
        self.language = resolve_language(tag);
        if self.language.is_none() {
            tracing::warn!(tag, "unknown language tag, using fallback tokenizer");
        }
        self.set_tokenizer(default_tokenize_func(self.language.as_ref()));
        self
    }

    pub fn with_task(mut self, task: impl Into<String>) -> Self {
        self.task = Some(task.into());
        self
    }

    pub fn with_tokenizer(mut self, tokenizer: TokenizeFn) -> Self {
        self.set_tokenizer(tokenizer);
        self
    }

    fn set_tokenizer(&mut self, tokenizer: TokenizeFn) {
        self.tokenizer = tokenizer;
        self.reset_views();
    }

    fn reset_views(&mut self) {
        self.tokenized = OnceCell::new();
        self.whitespace = OnceCell::new();
        self.lower = OnceCell::new();
        self.lower_nopunct = OnceCell::new();
    }

    /// Parse the JSON collection format:
    /// `{"filename"?, "language"?, "task"?, "values": [...]}` where each value
    /// is a string, a list of strings, or an object with the text under the
    /// kind's key plus optional `gem_id` / `gem_parent_id`.
    pub fn from_value(kind: TextKind, data: Value) -> Result<Self> {
        let Value::Object(mut data) = data else {
            return Err(Error::invalid_input(format!("{} must be a JSON object", kind)));
        };
        let values = match data.remove("values") {
            Some(Value::Array(values)) => values,
            _ => {
                return Err(Error::invalid_input(format!(
                    "{} is missing the `values` list",
                    kind
                )))
            }
        };

        let mut instances = Vec::with_capacity(values.len());
        let mut ids = Vec::new();
        let mut parent_ids = Vec::new();
        for (pos, value) in values.into_iter().enumerate() {
            match value {
                Value::Object(mut item) => {
                    let text = item.remove(kind.key()).ok_or_else(|| {
                        Error::invalid_input(format!(
                            "{} instance {} has no `{}` field",
                            kind,
                            pos,
                            kind.key()
                        ))
                    })?;
                    instances.push(parse_alternatives(kind, pos, text)?);
                    if let Some(id) = item.get("gem_id") {
                        ids.push(id_to_string(id));
                    }
                    parent_ids.push(
                        item.get("gem_parent_id")
                            .filter(|id| !id.is_null())
                            .map(id_to_string),
                    );
                }
                other => {
                    instances.push(parse_alternatives(kind, pos, other)?);
                    parent_ids.push(None);
                }
            }
        }

        let mut texts = Self::new(kind, instances)?;
        if !ids.is_empty() {
            texts = texts.with_ids(ids)?;
        }
        if parent_ids.iter().any(Option::is_some) {
            texts = texts.with_parent_ids(parent_ids)?;
        }
        if let Some(Value::String(filename)) = data.get("filename") {
            texts.filename = filename.clone();
        }
        if let Some(Value::String(tag)) = data.get("language") {
            texts = texts.with_language(tag);
        }
        if let Some(Value::String(task)) = data.get("task") {
            texts.task = Some(task.clone());
        }
        Ok(texts)
    }

    pub fn from_path(kind: TextKind, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data: Value = serde_json::from_str(&std::fs::read_to_string(path)?)?;
        let mut texts = Self::from_value(kind, data)?;
        if texts.filename.is_empty() {
            texts.filename = path.display().to_string();
        }
        Ok(texts)
    }

    pub fn kind(&self) -> TextKind {
        self.kind
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn language(&self) -> Option<&Language> {
        self.language.as_ref()
    }

    pub fn task(&self) -> Option<&str> {
        self.task.as_deref()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn is_multi_ref(&self) -> bool {
        self.multi_ref
    }

    pub fn ids(&self) -> Option<&[String]> {
        self.ids.as_deref()
    }

    pub fn parent_ids(&self) -> Option<&[Option<String>]> {
        self.parent_ids.as_deref()
    }

    /// Declared ids, or positional ids ("0", "1", ...) when none were given.
    pub fn effective_ids(&self) -> Vec<String> {
        match &self.ids {
            Some(ids) => ids.clone(),
            None => (0..self.instances.len()).map(|i| i.to_string()).collect(),
        }
    }

    /// All alternatives per instance, untokenized.
    pub fn untokenized(&self) -> &[Vec<String>] {
        &self.instances
    }

    /// First (for predictions and sources: the only) text of instance `i`.
    pub fn text(&self, i: usize) -> &str {
        self.instances[i][0].as_str()
    }

    pub fn texts(&self) -> impl Iterator<Item = &str> + '_ {
        self.instances.iter().map(|alts| alts[0].as_str())
    }

    pub fn list_tokenized(&self) -> &[Vec<Vec<String>>] {
        self.tokenized.get_or_init(|| {
            self.instances
                .iter()
                .map(|alts| alts.iter().map(|text| (self.tokenizer)(text)).collect())
                .collect()
        })
    }

    /// Tokens joined by single spaces.
    pub fn whitespace_tokenized(&self) -> &[Vec<String>] {
        self.whitespace.get_or_init(|| {
            self.list_tokenized()
                .iter()
                .map(|alts| alts.iter().map(|toks| toks.join(" ")).collect())
                .collect()
        })
    }

    pub fn list_tokenized_lower(&self) -> &[Vec<Vec<String>>] {
        self.lower.get_or_init(|| {
            self.list_tokenized()
                .iter()
                .map(|alts| {
                    alts.iter()
                        .map(|toks| toks.iter().map(|t| t.to_lowercase()).collect())
                        .collect()
                })
                .collect()
        })
    }

    pub fn list_tokenized_lower_nopunct(&self) -> &[Vec<Vec<String>>] {
        self.lower_nopunct.get_or_init(|| {
            self.list_tokenized_lower()
                .iter()
                .map(|alts| {
                    alts.iter()
                        .map(|toks| {
                            toks.iter()
                                .filter(|t| !is_punctuation(t))
                                .cloned()
                                .collect()
                        })
                        .collect()
                })
                .collect()
        })
    }

    /// Reorder and filter the collection to `target` ids, returning a new
    /// collection.
    ///
    /// Without ids the target list is adopted as-is (trusting the declared
    /// order). With ids equal to the target this is a plain copy. Otherwise
    /// instances are projected onto the target order, dropping ids not in
    /// `target`; a target id the collection does not hold is an error.
    pub fn unscramble(&self, target: &[String]) -> Result<Texts> {
        let Some(ids) = &self.ids else {
            let mut adopted = self.clone();
            check_ids(target, adopted.instances.len(), adopted.kind)?;
            adopted.ids = Some(target.to_vec());
            return Ok(adopted);
        };
        if ids.as_slice() == target {
            return Ok(self.clone());
        }

        let lookup: HashMap<&str, usize> = ids
            .iter()
            .enumerate()
            .map(|(pos, id)| (id.as_str(), pos))
            .collect();
        let mut positions = Vec::with_capacity(target.len());
        for id in target {
            let pos = lookup.get(id.as_str()).ok_or_else(|| Error::MissingId {
                id: id.clone(),
                collection: self.label(),
            })?;
            positions.push(*pos);
        }

        let instances: Vec<Vec<String>> = positions
            .iter()
            .map(|&pos| self.instances[pos].clone())
            .collect();
        let parent_ids = self
            .parent_ids
            .as_ref()
            .map(|parents| positions.iter().map(|&pos| parents[pos].clone()).collect());
        Ok(Texts {
            kind: self.kind,
            filename: self.filename.clone(),
            language: self.language,
            task: self.task.clone(),
            multi_ref: instances.iter().any(|alts| alts.len() > 1),
            instances,
            ids: Some(target.to_vec()),
            parent_ids,
            tokenizer: self.tokenizer,
            tokenized: OnceCell::new(),
            whitespace: OnceCell::new(),
            lower: OnceCell::new(),
            lower_nopunct: OnceCell::new(),
        })
    }

    fn label(&self) -> String {
        if self.filename.is_empty() {
            self.kind.to_string()
        } else {
            format!("{} ({})", self.kind, self.filename)
        }
    }
}

fn check_ids(ids: &[String], len: usize, kind: TextKind) -> Result<()> {
    if ids.len() != len {
        return Err(Error::invalid_input(format!(
            "{} ids given for {} {} instances",
            ids.len(),
            len,
            kind
        )));
    }
    let mut seen = HashSet::with_capacity(ids.len());
    if let Some(dup) = ids.iter().find(|id| !seen.insert(id.as_str())) {
        return Err(Error::invalid_input(format!(
            "duplicate id `{}` in {}",
            dup, kind
        )));
    }
    Ok(())
}

fn id_to_string(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn parse_alternatives(kind: TextKind, pos: usize, value: Value) -> Result<Vec<String>> {
    match value {
        Value::String(text) => Ok(vec![text]),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::String(text) => Ok(text),
                other => Err(Error::invalid_input(format!(
                    "{} instance {} holds a non-string text: {}",
                    kind, pos, other
                ))),
            })
            .collect(),
        other => Err(Error::invalid_input(format!(
            "{} instance {} is not text: {}",
            kind, pos, other
        ))),
    }
}

/// A multi-dataset submission: one predictions collection per dataset.
#[derive(Debug, Clone)]
pub struct Submission {
    pub name: String,
    pub param_count: Option<u64>,
    pub entries: BTreeMap<String, Texts>,
}

impl Submission {
    /// Parse `{"submission_name", "param_count"?, "tasks": {dataset: collection}}`.
    pub fn from_value(data: Value) -> Result<Self> {
        let Value::Object(mut data) = data else {
            return Err(Error::invalid_input("submission must be a JSON object"));
        };
        let name = match data.remove("submission_name") {
            Some(Value::String(name)) => name,
            _ => return Err(Error::invalid_input("submission has no `submission_name`")),
        };
        let param_count = data.get("param_count").and_then(Value::as_u64);
        let tasks = match data.remove("tasks") {
            Some(Value::Object(tasks)) => tasks,
            _ => return Err(Error::invalid_input("submission has no `tasks` object")),
        };
        let mut entries = BTreeMap::new();
        for (dataset, collection) in tasks {
            let preds = Texts::from_value(TextKind::Predictions, collection)?;
            entries.insert(dataset, preds);
        }
        Ok(Self {
            name,
            param_count,
            entries,
        })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let data: Value = serde_json::from_str(&std::fs::read_to_string(path)?)?;
        Self::from_value(data)
    }

    pub fn predictions_for(&self, dataset: &str) -> Option<&Texts> {
        self.entries.get(dataset)
    }

    pub fn datasets(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_unscramble_reorders_and_filters() {
        let texts = Texts::predictions(["A", "B", "C", "D"])
            .with_ids(["a", "b", "c", "d"])
            .unwrap();
        let filtered = texts.unscramble(&ids(&["c", "a"])).unwrap();
        assert_eq!(filtered.texts().collect::<Vec<_>>(), vec!["C", "A"]);
        assert_eq!(filtered.ids().unwrap(), ids(&["c", "a"]).as_slice());
        // the source collection is untouched
        assert_eq!(texts.len(), 4);
    }

    #[test]
    fn test_unscramble_missing_id_fails() {
        let texts = Texts::predictions(["A", "B", "C", "D"])
            .with_ids(["a", "b", "c", "d"])
            .unwrap();
        let err = texts.unscramble(&ids(&["c", "z"])).unwrap_err();
        assert!(
            matches!(err, Error::MissingId { ref id, .. } if id == "z"),
            "unexpected error {:?}",
            err
        );
    }

    #[test]
    fn test_unscramble_adopts_ids_without_reordering() {
        let texts = Texts::references(["x", "y"]);
        let adopted = texts.unscramble(&ids(&["q", "p"])).unwrap();
        assert_eq!(adopted.ids().unwrap(), ids(&["q", "p"]).as_slice());
        assert_eq!(adopted.texts().collect::<Vec<_>>(), vec!["x", "y"]);

        assert!(texts.unscramble(&ids(&["only-one"])).is_err());
    }

    #[test]
    fn test_unscramble_same_order_is_noop() {
        let texts = Texts::predictions(["A", "B"]).with_ids(["a", "b"]).unwrap();
        let same = texts.unscramble(&ids(&["a", "b"])).unwrap();
        assert_eq!(same.texts().collect::<Vec<_>>(), vec!["A", "B"]);
    }

    #[test]
    fn test_views_follow_reordering() {
        let texts = Texts::predictions(["One fish.", "Two Fish!"])
            .with_language("en")
            .with_ids(["1", "2"])
            .unwrap();
        assert_eq!(texts.list_tokenized_lower()[0][0], vec!["one", "fish", "."]);

        let swapped = texts.unscramble(&ids(&["2", "1"])).unwrap();
        assert_eq!(swapped.list_tokenized_lower_nopunct()[0][0], vec!["two", "fish"]);
        assert_eq!(swapped.whitespace_tokenized()[1][0], "One fish .");
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        assert!(Texts::predictions(["A", "B"]).with_ids(["a", "a"]).is_err());
        assert!(Texts::predictions(["A", "B"]).with_ids(["a"]).is_err());
    }

    #[test]
    fn test_from_value_objects_with_ids() {
        let refs = Texts::from_value(
            TextKind::References,
            json!({
                "filename": "refs.json",
                "language": "en",
                "values": [
                    {"target": ["a b", "a c"], "gem_id": "d-1", "gem_parent_id": "p-1"},
                    {"target": "b c", "gem_id": "d-2", "gem_parent_id": null}
                ]
            }),
        )
        .unwrap();
        assert!(refs.is_multi_ref());
        assert_eq!(refs.filename(), "refs.json");
        assert_eq!(refs.ids().unwrap(), ids(&["d-1", "d-2"]).as_slice());
        assert_eq!(refs.untokenized()[1], vec!["b c".to_string()]);
        assert_eq!(
            refs.parent_ids().unwrap(),
            &[Some("p-1".to_string()), None]
        );
        assert_eq!(refs.language().unwrap().alpha_2, "en");
    }

    #[test]
    fn test_from_value_rejects_bad_shapes() {
        assert!(Texts::from_value(TextKind::Predictions, json!({"values": [1, 2]})).is_err());
        assert!(Texts::from_value(TextKind::Predictions, json!({"values": [["a", "b"]]})).is_err());
        assert!(Texts::from_value(TextKind::Predictions, json!({"nothing": []})).is_err());
        assert!(
            Texts::from_value(TextKind::Predictions, json!({"values": [{"target": "x"}]}))
                .is_err()
        );
    }

    #[test]
    fn test_empty_collection_views() {
        let texts = Texts::from_value(TextKind::Predictions, json!({"values": [], "language": "en"}))
            .unwrap();
        assert!(texts.is_empty());
        assert!(texts.list_tokenized().is_empty());
        assert!(!texts.is_multi_ref());
    }

    #[test]
    fn test_submission_from_value() {
        let submission = Submission::from_value(json!({
            "submission_name": "baseline",
            "param_count": 1000,
            "tasks": {
                "e2e_nlg_test": {"values": ["x", "y"], "language": "en"},
                "web_nlg_en_test": {"values": ["z"]}
            }
        }))
        .unwrap();
        assert_eq!(submission.name, "baseline");
        assert_eq!(submission.param_count, Some(1000));
        assert_eq!(submission.datasets(), vec!["e2e_nlg_test", "web_nlg_en_test"]);
        assert_eq!(submission.predictions_for("web_nlg_en_test").unwrap().len(), 1);
        assert!(submission.predictions_for("missing").is_none());
    }
}
