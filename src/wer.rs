use crate::error::Result;
use crate::metric::{Inputs, Metric, MetricOutput, Requirement};
use crate::score::{Score, Scores};
use crate::utils::{round_to, DPMatrix};

/// Word error rate on lowercased tokens without punctuation, best reference
/// per instance, averaged over the corpus. Lower is better, range [0, inf).
pub struct Wer;

fn edit_distance(pred_words: &[String], gold_words: &[String]) -> u32 {
    let n_words_pred = pred_words.len();
    let n_words_gold = gold_words.len();

    let mut dp = DPMatrix::new(n_words_pred + 1, n_words_gold + 1);

    // First row and column are the cost of building either prefix out of
    // nothing:
    //     ""  s
    // "" [ 0  1 ]
    //  k [ 1  ? ]
    // Every ? is the cheapest of a deletion, an insertion or a substitution
    for i in 0..=n_words_pred {
        dp.set(i, 0, i as u32);
    }
    for j in 0..=n_words_gold {
        dp.set(0, j, j as u32);
    }

    for i in 1..=n_words_pred {
        for j in 1..=n_words_gold {
            let cost = if pred_words[i - 1] == gold_words[j - 1] { 0 } else { 1 };

            let delete_cost = dp.at(i - 1, j) + 1;
            let insert_cost = dp.at(i, j - 1) + 1;
            let substitution_cost = dp.at(i - 1, j - 1) + cost;

            dp.set(i, j, delete_cost.min(insert_cost).min(substitution_cost));
        }
    }
    dp.at(n_words_pred, n_words_gold)
}

/// Edits per reference word, in percent.
fn word_error_rate(pred: &[String], gold: &[String]) -> f64 {
    if gold.is_empty() {
        // nothing to get wrong unless something was produced
        return if pred.is_empty() { 0.0 } else { 100.0 };
    }
    edit_distance(pred, gold) as f64 / gold.len() as f64 * 100.0
}

impl Metric for Wer {
    fn name(&self) -> &str {
        "wer"
    }

    fn requirement(&self) -> Requirement {
        Requirement::Referenced
    }

    fn support_caching(&self) -> bool {
        false
    }

    fn compute(&self, inputs: &Inputs<'_>) -> Result<MetricOutput> {
        let references = inputs.references(self.name())?;
        let preds = inputs.predictions.list_tokenized_lower_nopunct();
        let refs = references.list_tokenized_lower_nopunct();

        let scores: Vec<f64> = preds
            .iter()
            .zip(refs.iter())
            .map(|(pred, alts)| {
                alts.iter()
                    .map(|gold| word_error_rate(&pred[0], gold))
                    .fold(f64::INFINITY, f64::min)
            })
            .collect();

        let mut result = Scores::new();
        if !scores.is_empty() {
            let mean = scores.iter().sum::<f64>() / scores.len() as f64;
            result.insert("wer".to_string(), Score::Value(round_to(mean, 5)));
        }
        Ok(MetricOutput::Corpus(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::texts::Texts;

    fn words(text: &str) -> Vec<String> {
        text.split_whitespace().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_levenshtein_distance_words() {
        // kitten -> sitting is a substitution, "the" is deleted
        let distance = edit_distance(&words("kitten sat on the mat"), &words("sitting sat on mat"));
        assert_eq!(distance, 2);
    }

    #[test]
    fn test_identical_sentences() {
        let distance = edit_distance(&words("the quick brown fox"), &words("the quick brown fox"));
        assert_eq!(distance, 0);
    }

    #[test]
    fn test_empty_input() {
        let distance = edit_distance(&words(""), &words("hello world"));
        assert_eq!(distance, 2);
        assert_eq!(word_error_rate(&words(""), &words("hello world")), 100.0);
        assert_eq!(word_error_rate(&words(""), &words("")), 0.0);
    }

    #[test]
    fn test_reordering_is_penalized() {
        let rate = word_error_rate(&words("fox brown quick the"), &words("the quick brown fox"));
        assert_eq!(rate, 100.0);
    }

    #[test]
    fn test_wer_takes_best_reference() {
        let preds = Texts::predictions(["The quick brown fox.", "a b"]);
        let refs = Texts::multi_references(vec![
            vec!["the quick blue fox", "the quick brown fox"],
            vec!["a c"],
        ])
        .unwrap();
        let output = Wer
            .compute(&Inputs::new(&preds).with_references(&refs))
            .unwrap();
        let MetricOutput::Corpus(scores) = output else {
            panic!("wer is corpus-level");
        };
        // 0% on the first instance, 50% on the second
        assert_eq!(scores["wer"], Score::Value(25.0));
    }
}
