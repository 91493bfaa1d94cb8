use crate::error::Result;
use crate::metric::{Inputs, Metric, MetricOutput, Requirement};
use crate::score::{Score, Scores};
use crate::utils::ngram_counts;
use std::collections::HashMap;

const CHAR_ORDER: usize = 6;
const BETA: f64 = 2.0;
const EPS: f64 = 1e-16;
const PUNCTUATION: &str = "!\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~";

/// Corpus chrF (Popović, 2015) with epsilon smoothing, reported as
/// `chrf`, `chrf+` (word unigrams added) and `chrf++` (word bigrams too).
/// Character n-grams ignore whitespace. Scaled to 0..100.
pub struct Chrf;

// (hypothesis, reference, matched) n-gram counts, one triple per order
type Stats = Vec<[usize; 3]>;

fn char_ngrams(text: &str) -> Vec<HashMap<String, usize>> {
    let chars: Vec<char> = text.chars().filter(|c| !c.is_whitespace()).collect();
    (1..=CHAR_ORDER)
        .map(|n| {
            let mut counts = HashMap::new();
            if chars.len() >= n {
                for window in chars.windows(n) {
                    *counts.entry(window.iter().collect::<String>()).or_insert(0) += 1;
                }
            }
            counts
        })
        .collect()
}

// A single leading or trailing punctuation mark becomes its own word
fn split_punctuation(text: &str) -> Vec<String> {
    let mut words = Vec::new();
    for word in text.split_whitespace() {
        let mut chars = word.chars();
        let (first, last) = (chars.next(), chars.next_back());
        match (first, last) {
            (Some(_), Some(l)) if PUNCTUATION.contains(l) => {
                let cut = word.len() - l.len_utf8();
                words.push(word[..cut].to_string());
                words.push(l.to_string());
            }
            (Some(f), Some(_)) if PUNCTUATION.contains(f) => {
                let cut = f.len_utf8();
                words.push(f.to_string());
                words.push(word[cut..].to_string());
            }
            _ => words.push(word.to_string()),
        }
    }
    words
}

fn word_ngrams(words: &[String], word_order: usize) -> Vec<HashMap<String, usize>> {
    (1..=word_order)
        .map(|n| {
            ngram_counts(words, n)
                .into_iter()
                .map(|(ngram, count)| (ngram.join(" "), count))
                .collect()
        })
        .collect()
}

fn extract(text: &str, word_order: usize) -> Vec<HashMap<String, usize>> {
    let mut ngrams = char_ngrams(text);
    if word_order > 0 {
        ngrams.extend(word_ngrams(&split_punctuation(text), word_order));
    }
    ngrams
}

fn match_stats(hyp: &[HashMap<String, usize>], reference: &[HashMap<String, usize>]) -> Stats {
    hyp.iter()
        .zip(reference)
        .map(|(h, r)| {
            let matched = h
                .iter()
                .filter_map(|(ng, &count)| r.get(ng).map(|&rc| count.min(rc)))
                .sum();
            [h.values().sum(), r.values().sum(), matched]
        })
        .collect()
}

fn f_score(stats: &[[usize; 3]]) -> f64 {
    let factor = BETA * BETA;
    let mut score = 0.0;
    for &[n_hyp, n_ref, n_match] in stats {
        let precision = if n_hyp > 0 { n_match as f64 / n_hyp as f64 } else { EPS };
        let recall = if n_ref > 0 { n_match as f64 / n_ref as f64 } else { EPS };
        let denom = factor * precision + recall;
        score += if denom > 0.0 {
            (1.0 + factor) * precision * recall / denom
        } else {
            EPS
        };
    }
    100.0 * score / stats.len() as f64
}

/// Corpus chrF with `word_order` word n-gram orders on top of the
/// character orders. Each hypothesis is scored against the reference with
/// the best sentence-level score.
pub fn corpus_chrf(preds: &[&str], refs: &[Vec<&str>], word_order: usize) -> f64 {
    let mut totals: Stats = vec![[0; 3]; CHAR_ORDER + word_order];
    for (pred, alts) in preds.iter().zip(refs) {
        let hyp = extract(pred, word_order);
        let best = alts
            .iter()
            .map(|r| match_stats(&hyp, &extract(r, word_order)))
            .map(|stats| (f_score(&stats), stats))
            .fold(None, |best: Option<(f64, Stats)>, cur| match best {
                Some(b) if b.0 >= cur.0 => Some(b),
                _ => Some(cur),
            });
        if let Some((_, stats)) = best {
            for (total, s) in totals.iter_mut().zip(stats) {
                for k in 0..3 {
                    total[k] += s[k];
                }
            }
        }
    }
    f_score(&totals)
}

impl Metric for Chrf {
    fn name(&self) -> &str {
        "chrf"
    }

    fn requirement(&self) -> Requirement {
        Requirement::Referenced
    }

    fn support_caching(&self) -> bool {
        false
    }

    fn compute(&self, inputs: &Inputs<'_>) -> Result<MetricOutput> {
        let references = inputs.references(self.name())?;
        let preds: Vec<&str> = inputs.predictions.texts().collect();
        let refs: Vec<Vec<&str>> = references
            .untokenized()
            .iter()
            .map(|alts| alts.iter().map(String::as_str).collect())
            .collect();

        let mut scores = Scores::new();
        for (word_order, key) in ["chrf", "chrf+", "chrf++"].iter().enumerate() {
            scores.insert(key.to_string(), Score::Value(corpus_chrf(&preds, &refs, word_order)));
        }
        Ok(MetricOutput::Corpus(scores))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::texts::Texts;

    #[test]
    fn test_identical_is_100() {
        let refs = vec![vec!["The cat sat on the mat."]];
        for word_order in 0..3 {
            let score = corpus_chrf(&["The cat sat on the mat."], &refs, word_order);
            assert!((score - 100.0).abs() < 1e-9, "order {}: {}", word_order, score);
        }
    }

    #[test]
    fn test_whitespace_is_ignored_for_characters() {
        let refs = vec![vec!["thecat"]];
        let score = corpus_chrf(&["the cat"], &refs, 0);
        assert!((score - 100.0).abs() < 1e-9, "got {}", score);
    }

    #[test]
    fn test_empty_prediction_is_zero() {
        let refs = vec![vec!["something to match"]];
        let score = corpus_chrf(&[""], &refs, 2);
        assert!(score.abs() < 1e-6, "got {}", score);
    }

    #[test]
    fn test_best_reference_wins() {
        let single = corpus_chrf(&["a small house"], &[vec!["a small house"]], 0);
        let multi = corpus_chrf(&["a small house"], &[vec!["nothing alike", "a small house"]], 0);
        assert_eq!(single, multi);
    }

    #[test]
    fn test_split_punctuation() {
        assert_eq!(split_punctuation("mat. (hi !"), vec!["mat", ".", "(", "hi", "!"]);
    }

    #[test]
    fn test_chrf_metric_keys() {
        let preds = Texts::predictions(["the cat is on the mat"]);
        let refs = Texts::references(["there is a cat on the mat"]);
        let MetricOutput::Corpus(scores) = Chrf.compute(&Inputs::new(&preds).with_references(&refs)).unwrap() else {
            panic!("chrf is corpus-level");
        };
        let chrf = scores["chrf"].as_value().unwrap();
        let chrf_pp = scores["chrf++"].as_value().unwrap();
        assert!(chrf > 0.0 && chrf < 100.0, "got {}", chrf);
        assert!(chrf_pp > 0.0 && chrf_pp < 100.0, "got {}", chrf_pp);
        assert!(scores.contains_key("chrf+"));
        assert!(!Chrf.support_caching());
    }
}
