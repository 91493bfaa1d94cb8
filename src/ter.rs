use crate::error::Result;
use crate::metric::{Inputs, Metric, MetricOutput, Requirement};
use crate::score::{Score, Scores};
use crate::utils::round_to;

const MAX_SHIFT_SIZE: usize = 10;
const MAX_SHIFT_DIST: usize = 50;
const MAX_SHIFT_CANDIDATES: usize = 1000;
const BEAM_WIDTH: usize = 25;
const INFINITY: usize = usize::MAX / 2;

/// Translation edit rate (Snover et al., 2006): word edits including block
/// shifts needed to turn the prediction into the reference, per reference
/// word, in percent. Case-insensitive, whitespace tokenized, best reference
/// per instance.
pub struct Ter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Nop,
    Sub,
    // consumes a reference word only
    Ins,
    // consumes a hypothesis word only
    Del,
    Unset,
}

/// Beam-limited Levenshtein distance with the operation trace, ties broken
/// match/substitution first, then insertion, then deletion.
fn edit_distance(hyp: &[&str], reference: &[&str]) -> (usize, Vec<Op>) {
    let (len_h, len_r) = (hyp.len(), reference.len());
    let mut rows: Vec<Vec<(usize, Op)>> = Vec::with_capacity(len_h + 1);
    rows.push((0..=len_r).map(|j| (j, if j == 0 { Op::Nop } else { Op::Ins })).collect());

    for i in 1..=len_h {
        let diag = i * len_r / len_h;
        let min_j = diag.saturating_sub(BEAM_WIDTH);
        let max_j = if i == len_h { len_r + 1 } else { (len_r + 1).min(diag + BEAM_WIDTH) };

        let prev = &rows[i - 1];
        let mut row = vec![(INFINITY, Op::Unset); len_r + 1];
        for j in min_j..max_j {
            if j == 0 {
                row[0] = (prev[0].0 + 1, Op::Del);
                continue;
            }
            let (sub_cost, sub_op) = if hyp[i - 1] == reference[j - 1] { (0, Op::Nop) } else { (1, Op::Sub) };
            let candidates = [
                (prev[j - 1].0 + sub_cost, sub_op),
                (row[j - 1].0 + 1, Op::Ins),
                (prev[j].0 + 1, Op::Del),
            ];
            for (cost, op) in candidates {
                if row[j].0 > cost {
                    row[j] = (cost, op);
                }
            }
        }
        rows.push(row);
    }

    let mut trace = Vec::new();
    let (mut i, mut j) = (len_h, len_r);
    while i > 0 || j > 0 {
        let op = rows[i][j].1;
        trace.push(op);
        match op {
            Op::Nop | Op::Sub => {
                i -= 1;
                j -= 1;
            }
            Op::Ins => j -= 1,
            Op::Del | Op::Unset => i -= 1,
        }
    }
    trace.reverse();
    (rows[len_h][len_r].0, trace)
}

struct Alignment {
    // reference position -> hypothesis position
    align: Vec<Option<usize>>,
    ref_err: Vec<bool>,
    hyp_err: Vec<bool>,
}

fn alignment(trace: &[Op], len_r: usize) -> Alignment {
    let mut align = vec![None; len_r];
    let (mut ref_err, mut hyp_err) = (Vec::new(), Vec::new());
    let (mut pos_h, mut pos_r): (isize, isize) = (-1, -1);
    for &op in trace {
        match op {
            Op::Nop | Op::Sub => {
                pos_h += 1;
                pos_r += 1;
                align[pos_r as usize] = Some(pos_h.max(0) as usize);
                hyp_err.push(op == Op::Sub);
                ref_err.push(op == Op::Sub);
            }
            Op::Ins => {
                pos_r += 1;
                // a reference word with no hypothesis word maps to the previous one
                align[pos_r as usize] = (pos_h >= 0).then_some(pos_h as usize).or(Some(usize::MAX));
                ref_err.push(true);
            }
            Op::Del | Op::Unset => {
                pos_h += 1;
                hyp_err.push(true);
            }
        }
    }
    Alignment { align, ref_err, hyp_err }
}

fn perform_shift<'a>(words: &[&'a str], start: usize, length: usize, target: usize) -> Vec<&'a str> {
    let block = &words[start..start + length];
    let mut out = Vec::with_capacity(words.len());
    if target < start {
        out.extend_from_slice(&words[..target]);
        out.extend_from_slice(block);
        out.extend_from_slice(&words[target..start]);
        out.extend_from_slice(&words[start + length..]);
    } else if target > start + length {
        out.extend_from_slice(&words[..start]);
        out.extend_from_slice(&words[start + length..target]);
        out.extend_from_slice(block);
        out.extend_from_slice(&words[target..]);
    } else {
        let mid = (length + target).min(words.len());
        out.extend_from_slice(&words[..start]);
        out.extend_from_slice(&words[start + length..mid]);
        out.extend_from_slice(block);
        out.extend_from_slice(&words[mid..]);
    }
    out
}

// (start in hypothesis, start in reference, length) of matching word runs
fn shifted_pairs(hyp: &[&str], reference: &[&str]) -> Vec<(usize, usize, usize)> {
    let mut pairs = Vec::new();
    for start_h in 0..hyp.len() {
        for start_r in 0..reference.len() {
            if start_h.abs_diff(start_r) > MAX_SHIFT_DIST {
                continue;
            }
            let mut length = 0;
            while length < MAX_SHIFT_SIZE && hyp[start_h + length] == reference[start_r + length] {
                length += 1;
                pairs.push((start_h, start_r, length));
                if start_h + length == hyp.len() || start_r + length == reference.len() {
                    break;
                }
            }
        }
    }
    pairs
}

// Best single shift as (gain, shifted words), and the updated candidate count
fn best_shift<'a>(hyp: &[&'a str], reference: &[&str], mut checked: usize) -> (usize, Option<Vec<&'a str>>, usize) {
    let (pre_score, trace) = edit_distance(hyp, reference);
    let Alignment { align, ref_err, hyp_err } = alignment(&trace, reference.len());

    // ranked by gain, then length, then earliest start, then earliest target
    let mut best: Option<(isize, usize, isize, isize, Vec<&'a str>)> = None;
    for (start_h, start_r, length) in shifted_pairs(hyp, reference) {
        if !hyp_err[start_h..start_h + length].iter().any(|&e| e) {
            continue;
        }
        if !ref_err[start_r..start_r + length].iter().any(|&e| e) {
            continue;
        }
        if let Some(Some(a)) = align.get(start_r) {
            if (start_h..start_h + length).contains(a) {
                continue;
            }
        }

        let mut prev_idx = None;
        for offset in -1..length as isize {
            let pos = start_r as isize + offset;
            let idx = if pos == -1 {
                0
            } else {
                match align.get(pos as usize).copied().flatten() {
                    Some(usize::MAX) => 0,
                    Some(a) => a + 1,
                    None => break,
                }
            };
            if prev_idx == Some(idx) {
                continue;
            }
            prev_idx = Some(idx);

            let shifted = perform_shift(hyp, start_h, length, idx);
            let gain = pre_score as isize - edit_distance(&shifted, reference).0 as isize;
            let candidate = (gain, length, -(start_h as isize), -(idx as isize), shifted);
            checked += 1;
            let better = match &best {
                None => true,
                Some(b) => (candidate.0, candidate.1, candidate.2, candidate.3) > (b.0, b.1, b.2, b.3),
            };
            if better {
                best = Some(candidate);
            }
        }
        if checked >= MAX_SHIFT_CANDIDATES {
            break;
        }
    }
    match best {
        Some((gain, _, _, _, shifted)) if gain > 0 => (gain as usize, Some(shifted), checked),
        _ => (0, None, checked),
    }
}

/// Number of edits (shifts plus word edits) turning `hyp` into `reference`.
pub fn translation_edits(hyp: &[&str], reference: &[&str]) -> usize {
    if reference.is_empty() {
        return hyp.len();
    }
    let mut words: Vec<&str> = hyp.to_vec();
    let mut shifts = 0;
    let mut checked = 0;
    loop {
        let (gain, shifted, now_checked) = best_shift(&words, reference, checked);
        checked = now_checked;
        if checked >= MAX_SHIFT_CANDIDATES || gain == 0 {
            break;
        }
        if let Some(shifted) = shifted {
            words = shifted;
            shifts += 1;
        }
    }
    shifts + edit_distance(&words, reference).0
}

/// Corpus TER in percent: best-reference edits over average reference
/// lengths.
pub fn corpus_ter(preds: &[Vec<String>], refs: &[Vec<Vec<String>>]) -> f64 {
    let (mut edits, mut ref_words) = (0usize, 0.0f64);
    for (pred, alts) in preds.iter().zip(refs) {
        if alts.is_empty() {
            continue;
        }
        let hyp: Vec<&str> = pred.iter().map(String::as_str).collect();
        let mut best = usize::MAX;
        let mut lengths = 0usize;
        for alt in alts {
            let reference: Vec<&str> = alt.iter().map(String::as_str).collect();
            best = best.min(translation_edits(&hyp, &reference));
            lengths += reference.len();
        }
        edits += best;
        ref_words += lengths as f64 / alts.len() as f64;
    }
    let rate = if ref_words > 0.0 {
        edits as f64 / ref_words
    } else if edits > 0 {
        1.0
    } else {
        0.0
    };
    100.0 * rate
}

fn lower_words(text: &str) -> Vec<String> {
    text.to_lowercase().split_whitespace().map(str::to_string).collect()
}

impl Metric for Ter {
    fn name(&self) -> &str {
        "ter"
    }

    fn requirement(&self) -> Requirement {
        Requirement::Referenced
    }

    fn support_caching(&self) -> bool {
        false
    }

    fn compute(&self, inputs: &Inputs<'_>) -> Result<MetricOutput> {
        let references = inputs.references(self.name())?;
        let preds: Vec<Vec<String>> = inputs.predictions.texts().map(lower_words).collect();
        let refs: Vec<Vec<Vec<String>>> = references
            .untokenized()
            .iter()
            .map(|alts| alts.iter().map(|r| lower_words(r)).collect())
            .collect();

        let mut scores = Scores::new();
        scores.insert("ter".to_string(), Score::Value(round_to(corpus_ter(&preds, &refs), 5)));
        Ok(MetricOutput::Corpus(scores))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::texts::Texts;

    fn words(text: &str) -> Vec<&str> {
        text.split_whitespace().collect()
    }

    #[test]
    fn test_edit_distance() {
        assert_eq!(edit_distance(&words("a b c"), &words("a b c")).0, 0);
        assert_eq!(edit_distance(&words("a x c"), &words("a b c")).0, 1);
        assert_eq!(edit_distance(&words(""), &words("a b")).0, 2);
        assert_eq!(edit_distance(&words("a b"), &words("")).0, 2);
    }

    #[test]
    fn test_block_shift_counts_once() {
        // moving "on the mat" to the front is one shift, not six edits
        let hyp = words("on the mat the cat sat");
        let reference = words("the cat sat on the mat");
        assert_eq!(translation_edits(&hyp, &reference), 1);
    }

    #[test]
    fn test_perform_shift() {
        let w = words("a b c d e");
        assert_eq!(perform_shift(&w, 3, 2, 0), words("d e a b c"));
        assert_eq!(perform_shift(&w, 0, 2, 4), words("c d a b e"));
    }

    #[test]
    fn test_corpus_ter_edges() {
        let refs = vec![vec![vec!["a".to_string(), "b".to_string()]]];
        assert_eq!(corpus_ter(&[vec!["a".to_string(), "b".to_string()]], &refs), 0.0);
        assert_eq!(corpus_ter(&[vec![]], &refs), 100.0);
        // empty reference against a non-empty prediction
        assert_eq!(corpus_ter(&[vec!["a".to_string()]], &[vec![vec![]]]), 100.0);
        assert_eq!(corpus_ter(&[vec![]], &[vec![vec![]]]), 0.0);
    }

    #[test]
    fn test_ter_metric() {
        let preds = Texts::predictions(["The cat sat", "totally different words"]);
        let refs = Texts::multi_references(vec![
            vec!["the cat sat", "a cat sat"],
            vec!["nothing in common", "none here either"],
        ])
        .unwrap();
        let MetricOutput::Corpus(scores) = Ter.compute(&Inputs::new(&preds).with_references(&refs)).unwrap() else {
            panic!("ter is corpus-level");
        };
        // 0 edits + 3 substitutions over 6 reference words
        assert_eq!(scores["ter"], Score::Value(50.0));
        assert!(!Ter.support_caching());
    }
}
