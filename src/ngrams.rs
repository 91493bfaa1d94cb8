use crate::error::Result;
use crate::metric::{Inputs, Metric, MetricOutput, Requirement};
use crate::score::{Score, Scores};
use crate::utils::ngram_counts;
use std::collections::HashMap;

/// Length statistics, distinct-N, vocabulary size, unique-N, entropy and
/// conditional entropy for N = 1..3 on lowercased tokens, plus the same
/// on tokens without punctuation (`-nopunct` suffix).
pub struct NGramStats;

const MAX_N: usize = 3;

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

// population standard deviation
fn std_dev(values: &[f64]) -> f64 {
    let m = mean(values);
    mean(&values.iter().map(|v| (v - m).powi(2)).collect::<Vec<_>>()).sqrt()
}

fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

fn entropy(freqs: &HashMap<Vec<&str>, usize>) -> f64 {
    let total: usize = freqs.values().sum();
    if total == 0 {
        return 0.0;
    }
    -freqs
        .values()
        .map(|&f| {
            let p = f as f64 / total as f64;
            p * p.log2()
        })
        .sum::<f64>()
}

// H(y|x) = -sum p(x,y) log2 p(y|x), with p(y|x) = p(x,y) / p(x) taken
// from the N-grams (joint) and their (N-1)-gram prefixes (ctx)
fn cond_entropy(joint: &HashMap<Vec<&str>, usize>, ctx: &HashMap<Vec<&str>, usize>) -> f64 {
    let total_joint: usize = joint.values().sum();
    let total_ctx: usize = ctx.values().sum();
    if total_joint == 0 || total_ctx == 0 {
        return 0.0;
    }
    -joint
        .iter()
        .map(|(ngram, &f)| {
            let p_joint = f as f64 / total_joint as f64;
            let prefix = &ngram[..ngram.len() - 1];
            let p_ctx = ctx.get(prefix).copied().unwrap_or(0) as f64 / total_ctx as f64;
            if p_ctx == 0.0 {
                0.0
            } else {
                p_joint * (p_joint / p_ctx).log2()
            }
        })
        .sum::<f64>()
}

fn stats_into(scores: &mut Scores, data: &[Vec<Vec<String>>], suffix: &str) {
    let lengths: Vec<f64> = data.iter().map(|alts| alts[0].len() as f64).collect();
    let mut put = |name: &str, value: f64| {
        scores.insert(format!("{}{}", name, suffix), Score::Value(value));
    };
    put("total_length", lengths.iter().sum());
    put("mean_pred_length", mean(&lengths));
    put("std_pred_length", std_dev(&lengths));
    put("median_pred_length", median(&lengths));
    put("min_pred_length", lengths.iter().copied().fold(f64::NAN, f64::min));
    put("max_pred_length", lengths.iter().copied().fold(f64::NAN, f64::max));

    let mut last: Option<HashMap<Vec<&str>, usize>> = None;
    for n in 1..=MAX_N {
        let mut freqs: HashMap<Vec<&str>, usize> = HashMap::new();
        for alts in data {
            for (ngram, count) in ngram_counts(&alts[0], n) {
                *freqs.entry(ngram).or_insert(0) += count;
            }
        }
        let total: usize = freqs.values().sum();
        let unique = freqs.values().filter(|&&f| f == 1).count();

        put(
            &format!("distinct-{}", n),
            if total > 0 { freqs.len() as f64 / total as f64 } else { 0.0 },
        );
        put(&format!("vocab_size-{}", n), freqs.len() as f64);
        put(&format!("unique-{}", n), unique as f64);
        put(&format!("entropy-{}", n), entropy(&freqs));
        if let Some(ctx) = &last {
            put(&format!("cond_entropy-{}", n), cond_entropy(&freqs, ctx));
        }
        last = Some(freqs);
    }
}

impl Metric for NGramStats {
    fn name(&self) -> &str {
        "ngrams"
    }

    fn requirement(&self) -> Requirement {
        Requirement::Referenceless
    }

    fn support_caching(&self) -> bool {
        false
    }

    fn compute(&self, inputs: &Inputs<'_>) -> Result<MetricOutput> {
        let mut scores = Scores::new();
        stats_into(&mut scores, inputs.predictions.list_tokenized_lower(), "");
        stats_into(
            &mut scores,
            inputs.predictions.list_tokenized_lower_nopunct(),
            "-nopunct",
        );
        Ok(MetricOutput::Corpus(scores))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::texts::Texts;

    fn stats(texts: &[&str]) -> Scores {
        let preds = Texts::predictions(texts.iter().copied());
        match NGramStats.compute(&Inputs::new(&preds)).unwrap() {
            MetricOutput::Corpus(scores) => scores,
            other => panic!("ngrams is corpus-level, got {:?}", other),
        }
    }

    fn value(scores: &Scores, key: &str) -> f64 {
        scores[key].as_value().unwrap()
    }

    #[test]
    fn test_length_stats() {
        let s = stats(&["a b c", "a", "a b"]);
        assert_eq!(value(&s, "total_length"), 6.0);
        assert_eq!(value(&s, "mean_pred_length"), 2.0);
        assert_eq!(value(&s, "median_pred_length"), 2.0);
        assert_eq!(value(&s, "min_pred_length"), 1.0);
        assert_eq!(value(&s, "max_pred_length"), 3.0);
        assert!((value(&s, "std_pred_length") - (2.0f64 / 3.0).sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_distinct_and_entropy() {
        let s = stats(&["a b", "a b"]);
        assert_eq!(value(&s, "distinct-1"), 0.5);
        assert_eq!(value(&s, "vocab_size-2"), 1.0);
        assert_eq!(value(&s, "unique-1"), 0.0);
        assert!((value(&s, "entropy-1") - 1.0).abs() < 1e-9);
        assert!(s.contains_key("cond_entropy-2"));
        assert_eq!(value(&s, "distinct-3"), 0.0);
        assert!(!s.contains_key("cond_entropy-1"));
    }

    #[test]
    fn test_nopunct_variant() {
        let s = stats(&["Hi !"]);
        assert_eq!(value(&s, "total_length"), 2.0);
        assert_eq!(value(&s, "total_length-nopunct"), 1.0);
    }
}
