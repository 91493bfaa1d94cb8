use crate::error::Result;
use crate::metric::{Inputs, Metric, MetricOutput, Requirement};
use crate::score::{Score, Scores};
use crate::utils::{f1, ngram_counts};
use std::collections::{BTreeMap, HashMap, HashSet};

const MAX_NGRAMS: usize = 4;

type Counter<'a> = HashMap<Vec<&'a str>, usize>;

/// SARI (Xu et al., 2016) per instance: how well the prediction keeps,
/// deletes and adds n-grams relative to the source, judged against the
/// references. Scaled to 0..100.
///
/// Follows the tensor2tensor variant: 0/0 counts as 1 so an exact match
/// with a reference scores high, and keep recall is normalized by the
/// total kept count.
pub struct Sari;

// multiset intersection, smaller count wins
fn counter_and<'a>(a: &Counter<'a>, b: &Counter<'a>) -> Counter<'a> {
    a.iter()
        .filter_map(|(k, &va)| b.get(k).map(|&vb| (k.clone(), va.min(vb))))
        .filter(|(_, v)| *v > 0)
        .collect()
}

// multiset difference, only positive counts survive
fn counter_sub<'a>(a: &Counter<'a>, b: &Counter<'a>) -> Counter<'a> {
    a.iter()
        .filter_map(|(k, &va)| {
            let left = va.saturating_sub(b.get(k).copied().unwrap_or(0));
            (left > 0).then(|| (k.clone(), left))
        })
        .collect()
}

fn scaled<'a>(counter: Counter<'a>, factor: usize) -> Counter<'a> {
    counter.into_iter().map(|(k, v)| (k, v * factor)).collect()
}

fn f1_or_zero(precision: f64, recall: f64) -> f64 {
    if precision > 0.0 || recall > 0.0 {
        f1(precision, recall)
    } else {
        0.0
    }
}

/// (keep F1, deletion precision, addition F1) for one n-gram order.
fn sari_ngram(source: &Counter<'_>, candidate: &Counter<'_>, refs: &Counter<'_>, num_refs: usize) -> (f64, f64, f64) {
    let source_rep = scaled(source.clone(), num_refs);
    let candidate_rep = scaled(candidate.clone(), num_refs);

    // KEEP
    let keep_rep = counter_and(&source_rep, &candidate_rep);
    let keep_good = counter_and(&keep_rep, refs);
    let keep_all = counter_and(&source_rep, refs);

    let keep_tmp1: f64 = keep_good
        .iter()
        .map(|(k, &v)| v as f64 / keep_rep[k] as f64)
        .sum();
    let keep_tmp2: usize = keep_good.values().sum();
    let keep_precision = if keep_rep.is_empty() {
        1.0
    } else {
        keep_tmp1 / keep_rep.len() as f64
    };
    let keep_recall = if keep_all.is_empty() {
        1.0
    } else {
        keep_tmp2 as f64 / keep_all.values().sum::<usize>() as f64
    };
    let keep_score = f1_or_zero(keep_precision, keep_recall);

    // DELETION, only precision enters the final score
    let del_rep = counter_sub(&source_rep, &candidate_rep);
    let del_good = counter_sub(&del_rep, refs);
    let del_tmp: f64 = del_good
        .iter()
        .map(|(k, &v)| v as f64 / del_rep[k] as f64)
        .sum();
    let del_precision = if del_rep.is_empty() {
        1.0
    } else {
        del_tmp / del_rep.len() as f64
    };

    // ADDITION, on n-gram types rather than counts
    let source_types: HashSet<&Vec<&str>> = source.keys().collect();
    let ref_types: HashSet<&Vec<&str>> = refs.keys().collect();
    let added: HashSet<&Vec<&str>> = candidate
        .keys()
        .filter(|k| !source_types.contains(k))
        .collect();
    let added_good = added.iter().filter(|k| ref_types.contains(*k)).count();
    let added_all = ref_types.iter().filter(|k| !source_types.contains(*k)).count();
    let add_precision = if added.is_empty() {
        1.0
    } else {
        added_good as f64 / added.len() as f64
    };
    let add_recall = if added_all == 0 {
        1.0
    } else {
        added_good as f64 / added_all as f64
    };
    let add_score = f1_or_zero(add_precision, add_recall);

    (keep_score, del_precision, add_score)
}

pub fn sari_sentence(source: &[String], candidate: &[String], refs: &[Vec<String>]) -> f64 {
    let num_refs = refs.len();
    let (mut keep, mut del, mut add) = (0.0, 0.0, 0.0);
    for n in 1..=MAX_NGRAMS {
        let mut ref_counts: Counter<'_> = HashMap::new();
        for r in refs {
            for (ng, count) in ngram_counts(r, n) {
                *ref_counts.entry(ng).or_insert(0) += count;
            }
        }
        let (k, d, a) = sari_ngram(
            &ngram_counts(source, n),
            &ngram_counts(candidate, n),
            &ref_counts,
            num_refs,
        );
        keep += k;
        del += d;
        add += a;
    }
    let orders = MAX_NGRAMS as f64;
    (keep / orders + del / orders + add / orders) / 3.0
}

impl Metric for Sari {
    fn name(&self) -> &str {
        "sari"
    }

    fn requirement(&self) -> Requirement {
        Requirement::SourcedAndReferenced
    }

    fn compute(&self, inputs: &Inputs<'_>) -> Result<MetricOutput> {
        let references = inputs.references(self.name())?;
        let sources = inputs.sources(self.name())?;
        let preds = inputs.predictions.list_tokenized_lower();
        let refs = references.list_tokenized_lower();
        let srcs = sources.list_tokenized_lower();

        let mut per_instance = BTreeMap::new();
        for (i, id) in inputs.predictions.effective_ids().into_iter().enumerate() {
            let score = sari_sentence(&srcs[i][0], &preds[i][0], &refs[i]) * 100.0;
            let mut scores = Scores::new();
            scores.insert("sari".to_string(), Score::Value(score));
            per_instance.insert(id, scores);
        }
        Ok(MetricOutput::PerInstance(per_instance))
    }
}
