//! Synthetic datasets carved out of loaded ones by id.
//!
//! Derived collections are projections of their parent, so they keep the
//! parent's filename and share its cache entries.

use crate::error::Result;
use crate::texts::{Submission, Texts};
use std::collections::{BTreeMap, HashSet};

/// `{set_name: {subset_name: [ids]}}`
pub type ContrastSets = BTreeMap<String, BTreeMap<String, Vec<String>>>;

/// Reference and source collections per dataset name.
#[derive(Debug, Clone, Default)]
pub struct DatasetTexts {
    pub references: BTreeMap<String, Texts>,
    pub sources: BTreeMap<String, Texts>,
}

pub fn parse_contrast_sets(raw: &str) -> Result<ContrastSets> {
    Ok(serde_json::from_str(raw)?)
}

pub fn parent_set_name(child: &str) -> String {
    format!("{}_parent", child)
}

pub fn contrast_set_name(dataset: &str, set: &str, subset: &str) -> String {
    format!("{}_{}_{}", dataset, set, subset)
}

// Restrict to `target`. Collections without ids are aligned by position
// with `order` and take those ids first.
fn project(texts: &Texts, order: &[String], target: &[String]) -> Result<Texts> {
    match texts.ids() {
        Some(_) => texts.unscramble(target),
        None => texts.unscramble(order)?.unscramble(target),
    }
}

/// For every child dataset with a configured parent, build `{child}_parent`
/// from the parent's predictions and references restricted to the parent ids
/// the child's references point at. Returns the names of the new datasets.
pub fn derive_parent_sets(
    submission: &mut Submission,
    texts: &mut DatasetTexts,
    parents: &BTreeMap<String, String>,
) -> Vec<String> {
    let mut derived = Vec::new();
    for (child, parent) in parents {
        let Some(child_refs) = texts.references.get(child) else {
            continue;
        };
        if !submission.entries.contains_key(child) {
            continue;
        }
        let Some(parent_ids) = child_refs.parent_ids() else {
            tracing::warn!(dataset = child.as_str(), "references carry no parent ids, skipping parent set");
            continue;
        };

        let mut seen = HashSet::new();
        let target: Vec<String> = parent_ids
            .iter()
            .flatten()
            .filter(|id| seen.insert(id.as_str()))
            .cloned()
            .collect();

        let (Some(parent_preds), Some(parent_refs)) = (
            submission.entries.get(parent),
            texts.references.get(parent),
        ) else {
            tracing::warn!(
                dataset = child.as_str(),
                parent = parent.as_str(),
                "parent dataset not loaded, skipping parent set"
            );
            continue;
        };

        let order = parent_refs.effective_ids();
        let derive = || -> Result<(Texts, Texts, Option<Texts>)> {
            let preds = project(parent_preds, &order, &target)?;
            let refs = project(parent_refs, &order, &target)?;
            let srcs = texts
                .sources
                .get(parent)
                .map(|srcs| project(srcs, &order, &target))
                .transpose()?;
            Ok((preds, refs, srcs))
        };
        match derive() {
            Ok((preds, refs, srcs)) => {
                let name = parent_set_name(child);
                tracing::info!(dataset = name.as_str(), instances = preds.len(), "derived parent set");
                submission.entries.insert(name.clone(), preds);
                texts.references.insert(name.clone(), refs);
                if let Some(srcs) = srcs {
                    texts.sources.insert(name.clone(), srcs);
                }
                derived.push(name);
            }
            Err(err) => {
                tracing::warn!(dataset = child.as_str(), parent = parent.as_str(), error = %err, "cannot derive parent set");
            }
        }
    }
    derived
}

/// Register `{dataset}_{set}_{subset}` for every id list. A subset naming
/// ids the dataset doesn't hold is skipped with a warning.
pub fn derive_contrast_sets(
    submission: &mut Submission,
    texts: &mut DatasetTexts,
    dataset: &str,
    sets: &ContrastSets,
) -> Vec<String> {
    let mut derived = Vec::new();
    let Some(preds) = submission.entries.get(dataset).cloned() else {
        tracing::warn!(dataset, "contrast sets given for a dataset without predictions");
        return derived;
    };
    let refs = texts.references.get(dataset).cloned();
    let srcs = texts.sources.get(dataset).cloned();
    let order = match &refs {
        Some(refs) => refs.effective_ids(),
        None => preds.effective_ids(),
    };

    for (set, subsets) in sets {
        for (subset, ids) in subsets {
            let name = contrast_set_name(dataset, set, subset);
            let derive = || -> Result<(Texts, Option<Texts>, Option<Texts>)> {
                Ok((
                    project(&preds, &order, ids)?,
                    refs.as_ref().map(|r| project(r, &order, ids)).transpose()?,
                    srcs.as_ref().map(|s| project(s, &order, ids)).transpose()?,
                ))
            };
            match derive() {
                Ok((sub_preds, sub_refs, sub_srcs)) => {
                    tracing::debug!(dataset = name.as_str(), instances = sub_preds.len(), "derived contrast set");
                    submission.entries.insert(name.clone(), sub_preds);
                    if let Some(r) = sub_refs {
                        texts.references.insert(name.clone(), r);
                    }
                    if let Some(s) = sub_srcs {
                        texts.sources.insert(name.clone(), s);
                    }
                    derived.push(name);
                }
                Err(err) => {
                    tracing::warn!(dataset = name.as_str(), error = %err, "cannot derive contrast set");
                }
            }
        }
    }
    derived
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submission(entries: Vec<(&str, Texts)>) -> Submission {
        Submission {
            name: "test".to_string(),
            param_count: None,
            entries: entries
                .into_iter()
                .map(|(name, texts)| (name.to_string(), texts))
                .collect(),
        }
    }

    fn parent_data() -> (Texts, Texts) {
        let preds = Texts::predictions(["P1", "P2", "P3"])
            .with_ids(["p1", "p2", "p3"])
            .unwrap()
            .with_filename("parent.json");
        let refs = Texts::references(["R1", "R2", "R3"])
            .with_ids(["p1", "p2", "p3"])
            .unwrap();
        (preds, refs)
    }

    #[test]
    fn test_parent_set_derivation() {
        let (preds, refs) = parent_data();
        let child_preds = Texts::predictions(["C1", "C2", "C3"]);
        let child_refs = Texts::references(["c1", "c2", "c3"])
            .with_ids(["c1", "c2", "c3"])
            .unwrap()
            .with_parent_ids(vec![Some("p3".into()), Some("p1".into()), Some("p3".into())])
            .unwrap();

        let mut sub = submission(vec![("xsum", preds), ("xsum_backtranslation", child_preds)]);
        let mut texts = DatasetTexts::default();
        texts.references.insert("xsum".into(), refs);
        texts.references.insert("xsum_backtranslation".into(), child_refs);
        let parents = BTreeMap::from([("xsum_backtranslation".to_string(), "xsum".to_string())]);

        let derived = derive_parent_sets(&mut sub, &mut texts, &parents);
        assert_eq!(derived, vec!["xsum_backtranslation_parent"]);

        let derived_preds = &sub.entries["xsum_backtranslation_parent"];
        assert_eq!(derived_preds.texts().collect::<Vec<_>>(), vec!["P3", "P1"]);
        // the copy keeps the parent's filename, so cache entries are shared
        assert_eq!(derived_preds.filename(), "parent.json");
        let derived_refs = &texts.references["xsum_backtranslation_parent"];
        assert_eq!(derived_refs.texts().collect::<Vec<_>>(), vec!["R3", "R1"]);
        // the parent is left as it was
        assert_eq!(sub.entries["xsum"].len(), 3);
    }

    #[test]
    fn test_parent_set_skipped_when_parent_missing() {
        let child_refs = Texts::references(["c1"])
            .with_parent_ids(vec![Some("p1".into())])
            .unwrap();
        let mut sub = submission(vec![("child", Texts::predictions(["C1"]))]);
        let mut texts = DatasetTexts::default();
        texts.references.insert("child".into(), child_refs);
        let parents = BTreeMap::from([("child".to_string(), "never_loaded".to_string())]);

        assert!(derive_parent_sets(&mut sub, &mut texts, &parents).is_empty());
        assert_eq!(sub.entries.len(), 1);
    }

    #[test]
    fn test_contrast_sets() {
        let (preds, refs) = parent_data();
        let mut sub = submission(vec![("web_nlg_en", preds)]);
        let mut texts = DatasetTexts::default();
        texts.references.insert("web_nlg_en".into(), refs);

        let sets = parse_contrast_sets(
            r#"{"size": {"small": ["p2"], "large": ["p3", "p1"], "broken": ["p1", "nope"]}}"#,
        )
        .unwrap();
        let derived = derive_contrast_sets(&mut sub, &mut texts, "web_nlg_en", &sets);
        assert_eq!(
            derived,
            vec!["web_nlg_en_size_large", "web_nlg_en_size_small"],
            "the subset with an unknown id is skipped"
        );
        assert_eq!(
            sub.entries["web_nlg_en_size_large"].texts().collect::<Vec<_>>(),
            vec!["P3", "P1"]
        );
        assert_eq!(
            texts.references["web_nlg_en_size_small"].texts().collect::<Vec<_>>(),
            vec!["R2"]
        );
        assert!(!sub.entries.contains_key("web_nlg_en_size_broken"));
    }

    #[test]
    fn test_contrast_sets_positional_predictions() {
        // predictions without ids follow the references' order
        let preds = Texts::predictions(["P1", "P2", "P3"]);
        let (_, refs) = parent_data();
        let mut sub = submission(vec![("d", preds)]);
        let mut texts = DatasetTexts::default();
        texts.references.insert("d".into(), refs);
        let sets = parse_contrast_sets(r#"{"s": {"x": ["p3"]}}"#).unwrap();
        derive_contrast_sets(&mut sub, &mut texts, "d", &sets);
        assert_eq!(sub.entries["d_s_x"].texts().collect::<Vec<_>>(), vec!["P3"]);
    }
}
