use crate::error::{Error, Result};
use crate::utils::round_to;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Decimal places kept by [`aggregate`].
pub const AGGREGATE_PRECISION: i32 = 5;

/// A score leaf or a named block of scores. Metrics emit either flat
/// `{name: value}` dicts or one level of nesting (`{"rouge1": {"fmeasure": ..}}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Score {
    Value(f64),
    Block(BTreeMap<String, Score>),
}

pub type Scores = BTreeMap<String, Score>;

impl Score {
    pub fn as_value(&self) -> Option<f64> {
        match self {
            Score::Value(v) => Some(*v),
            Score::Block(_) => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Score> {
        match self {
            Score::Value(_) => None,
            Score::Block(block) => block.get(key),
        }
    }

    pub fn block<K: Into<String>>(entries: impl IntoIterator<Item = (K, f64)>) -> Self {
        Score::Block(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), Score::Value(v)))
                .collect(),
        )
    }
}

impl From<f64> for Score {
    fn from(value: f64) -> Self {
        Score::Value(value)
    }
}

/// Mean of every leaf over a list of per-instance score dicts, rounded to
/// [`AGGREGATE_PRECISION`] decimals.
///
/// The first element decides the shape: every other element must carry the
/// same keys with the same nesting. Blocks nested deeper than one level are
/// rejected.
pub fn aggregate(scores: &[Scores]) -> Result<Scores> {
    let Some(first) = scores.first() else {
        return Ok(Scores::new());
    };

    let mut aggregated = Scores::new();
    for (key, shape) in first {
        match shape {
            Score::Value(_) => {
                let values = scores
                    .iter()
                    .enumerate()
                    .map(|(pos, s)| leaf(s.get(key), pos, key))
                    .collect::<Result<Vec<f64>>>()?;
                aggregated.insert(key.clone(), Score::Value(mean(&values)));
            }
            Score::Block(block) => {
                let mut inner = BTreeMap::new();
                for (sub, sub_shape) in block {
                    if let Score::Block(_) = sub_shape {
                        return Err(Error::UnsupportedScoreShape {
                            key: format!("{}.{}", key, sub),
                            shape: "block nested two levels deep".to_string(),
                        });
                    }
                    let path = format!("{}.{}", key, sub);
                    let values = scores
                        .iter()
                        .enumerate()
                        .map(|(pos, s)| {
                            let outer = s.get(key).ok_or_else(|| missing(pos, key))?;
                            match outer {
                                Score::Block(b) => leaf(b.get(sub), pos, &path),
                                Score::Value(_) => Err(Error::InconsistentScores(format!(
                                    "instance {} has a scalar `{}` where a block was expected",
                                    pos, key
                                ))),
                            }
                        })
                        .collect::<Result<Vec<f64>>>()?;
                    inner.insert(sub.clone(), Score::Value(mean(&values)));
                }
                aggregated.insert(key.clone(), Score::Block(inner));
            }
        }
    }
    Ok(aggregated)
}

fn leaf(score: Option<&Score>, pos: usize, path: &str) -> Result<f64> {
    match score {
        Some(Score::Value(v)) => Ok(*v),
        Some(Score::Block(_)) => Err(Error::InconsistentScores(format!(
            "instance {} has a block `{}` where a scalar was expected",
            pos, path
        ))),
        None => Err(missing(pos, path)),
    }
}

fn missing(pos: usize, path: &str) -> Error {
    Error::InconsistentScores(format!("instance {} is missing `{}`", pos, path))
}

fn mean(values: &[f64]) -> f64 {
    let sum: f64 = values.iter().sum();
    round_to(sum / values.len() as f64, AGGREGATE_PRECISION)
}
