use gemscore::{
    compute, compute_cached, DiskCache, Inputs, MemoryCache, Metric, MetricOutput, MetricRegistry, Requirement,
    Result, Score, ScoreCache, Scores, Texts,
};
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// Word count per instance; counts the instances it was asked to score.
#[derive(Default)]
struct WordCount {
    scored: AtomicUsize,
}

impl Metric for WordCount {
    fn name(&self) -> &str {
        "word_count"
    }

    fn requirement(&self) -> Requirement {
        Requirement::Referenceless
    }

    fn compute(&self, inputs: &Inputs<'_>) -> Result<MetricOutput> {
        let preds = inputs.predictions;
        self.scored.fetch_add(preds.len(), Ordering::SeqCst);
        Ok(MetricOutput::PerInstance(
            preds
                .effective_ids()
                .into_iter()
                .zip(preds.texts())
                .map(|(id, text)| {
                    let mut scores = Scores::new();
                    scores.insert(
                        "word_count".to_string(),
                        Score::Value(text.split_whitespace().count() as f64),
                    );
                    (id, scores)
                })
                .collect(),
        ))
    }
}

fn predictions() -> Texts {
    Texts::predictions(["one", "one two", "one two three", "one two three four"])
        .with_ids(["a", "b", "c", "d"])
        .unwrap()
        .with_filename("preds.json")
}

#[test]
fn test_disk_cache_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let preds = predictions();
    let metric = WordCount::default();

    let first = {
        let cache = DiskCache::new(dir.path()).unwrap();
        compute_cached(&metric, Some(&cache), &Inputs::new(&preds)).unwrap()
    };
    assert_eq!(metric.scored.load(Ordering::SeqCst), 4);

    let cache = DiskCache::new(dir.path()).unwrap();
    let second = compute_cached(&metric, Some(&cache), &Inputs::new(&preds)).unwrap();
    assert_eq!(first, second);
    assert_eq!(metric.scored.load(Ordering::SeqCst), 4, "second run must be served from disk");
    assert_eq!(first["word_count"], Score::Value(2.5));
}

#[test]
fn test_partial_disk_cache() {
    let dir = tempfile::tempdir().unwrap();
    let cache = DiskCache::new(dir.path()).unwrap();
    let preds = predictions();

    // populate a and c from an earlier subset run
    let subset = preds.unscramble(&["a".to_string(), "c".to_string()]).unwrap();
    let warmup = WordCount::default();
    compute_cached(&warmup, Some(&cache), &Inputs::new(&subset)).unwrap();

    let metric = WordCount::default();
    let cached = compute_cached(&metric, Some(&cache), &Inputs::new(&preds)).unwrap();
    assert_eq!(metric.scored.load(Ordering::SeqCst), 2, "only b and d are computed");

    let uncached = compute_cached(&WordCount::default(), None, &Inputs::new(&preds)).unwrap();
    assert_eq!(cached, uncached);
}

#[test]
fn test_distinct_filenames_do_not_share_entries() {
    let cache = MemoryCache::new();
    let metric = WordCount::default();
    let preds = predictions();
    let other = predictions().with_filename("other.json");
    compute_cached(&metric, Some(&cache), &Inputs::new(&preds)).unwrap();
    compute_cached(&metric, Some(&cache), &Inputs::new(&other)).unwrap();
    assert_eq!(metric.scored.load(Ordering::SeqCst), 8);
    assert_eq!(cache.len(), 8);
}

#[test]
fn test_compute_reuses_cache_across_datasets_with_shared_file() {
    let cache: Arc<dyn ScoreCache> = Arc::new(MemoryCache::new());
    let metric = Arc::new(WordCount::default());
    let metrics: Vec<Arc<dyn Metric>> = vec![metric.clone()];
    let preds = predictions();
    let subset = preds.unscramble(&["d".to_string(), "b".to_string()]).unwrap();

    compute(&preds, None, None, &metrics, Some(cache.as_ref())).unwrap();
    let results = compute(&subset, None, None, &metrics, Some(cache.as_ref())).unwrap();
    assert_eq!(metric.scored.load(Ordering::SeqCst), 4);
    assert_eq!(results.scores["word_count"], Score::Value(3.0));
    assert_eq!(results.n, 2);
}

fn sentence() -> impl Strategy<Value = String> {
    prop::collection::vec(prop::sample::select(vec!["cat", "dog", "sat", "mat", "the", "on", "a"]), 1..8)
        .prop_map(|words| words.join(" "))
}

fn permuted_pairs() -> impl Strategy<Value = (Vec<(String, String)>, Vec<usize>)> {
    prop::collection::vec((sentence(), sentence()), 1..10).prop_flat_map(|pairs| {
        let n = pairs.len();
        (Just(pairs), Just((0..n).collect::<Vec<_>>()).prop_shuffle())
    })
}

fn leaf_values(scores: &Scores) -> BTreeMap<String, f64> {
    let mut leaves = BTreeMap::new();
    for (key, score) in scores {
        match score {
            Score::Value(v) => {
                leaves.insert(key.clone(), *v);
            }
            Score::Block(block) => {
                for (inner, s) in block {
                    if let Some(v) = s.as_value() {
                        leaves.insert(format!("{}.{}", key, inner), v);
                    }
                }
            }
        }
    }
    leaves
}

proptest! {
    #[test]
    fn test_cacheable_metrics_ignore_instance_order((pairs, order) in permuted_pairs()) {
        let ids: Vec<String> = (0..pairs.len()).map(|i| format!("id{}", i)).collect();
        let preds = Texts::predictions(pairs.iter().map(|(p, _)| p.clone()))
            .with_ids(ids.clone())
            .unwrap();
        let refs = Texts::references(pairs.iter().map(|(_, r)| r.clone()))
            .with_ids(ids.clone())
            .unwrap();

        let shuffled_ids: Vec<String> = order.iter().map(|&i| ids[i].clone()).collect();
        let shuffled_preds = preds.unscramble(&shuffled_ids).unwrap();
        let shuffled_refs = refs.unscramble(&shuffled_ids).unwrap();

        let metrics = MetricRegistry::builtin().resolve(&["rouge", "token_f1"]).unwrap();
        let a = compute(&preds, Some(&refs), None, &metrics, None).unwrap();
        let b = compute(&shuffled_preds, Some(&shuffled_refs), None, &metrics, None).unwrap();

        let (a, b) = (leaf_values(&a.scores), leaf_values(&b.scores));
        prop_assert_eq!(a.keys().collect::<Vec<_>>(), b.keys().collect::<Vec<_>>());
        for (key, value) in &a {
            prop_assert!((value - b[key]).abs() < 1e-4, "{}: {} vs {}", key, value, b[key]);
        }
    }

    #[test]
    fn test_unscramble_projects_by_id(order in Just((0..6usize).collect::<Vec<_>>()).prop_shuffle(), take in 0..=6usize) {
        let texts: Vec<String> = (0..6).map(|i| format!("text {}", i)).collect();
        let ids: Vec<String> = (0..6).map(|i| format!("i{}", i)).collect();
        let collection = Texts::predictions(texts.clone()).with_ids(ids.clone()).unwrap();

        let target: Vec<String> = order.iter().take(take).map(|&i| ids[i].clone()).collect();
        let projected = collection.unscramble(&target).unwrap();
        prop_assert_eq!(projected.ids().unwrap(), target.as_slice());
        for (pos, &i) in order.iter().take(take).enumerate() {
            prop_assert_eq!(projected.text(pos), texts[i].as_str());
        }
        // the original is untouched
        prop_assert_eq!(collection.ids().unwrap(), ids.as_slice());
    }
}
