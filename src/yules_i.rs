use crate::error::Result;
use crate::metric::{Inputs, Metric, MetricOutput, Requirement};
use crate::score::{Score, Scores};
use crate::ttr::vocabulary;
use crate::utils::round_to;
use std::collections::BTreeMap;

/// Yule's I, the inverse of Yule's K (Vanmassenhove et al., 2021).
/// Higher means a richer vocabulary; less sensitive to text length than TTR.
pub struct YulesI;

impl Metric for YulesI {
    fn name(&self) -> &str {
        "yules_i"
    }

    fn requirement(&self) -> Requirement {
        Requirement::Referenceless
    }

    fn support_caching(&self) -> bool {
        false
    }

    fn compute(&self, inputs: &Inputs<'_>) -> Result<MetricOutput> {
        let (_, vocab) = vocabulary(inputs.predictions.texts());

        // M1 = number of types, M2 = sum over frequencies f of V(f) * f^2,
        // V(f) being the number of types seen exactly f times
        let m1 = vocab.len() as f64;
        let mut spectrum: BTreeMap<usize, usize> = BTreeMap::new();
        for freq in vocab.values() {
            *spectrum.entry(*freq).or_insert(0) += 1;
        }
        let m2: f64 = spectrum
            .iter()
            .map(|(freq, types)| (*types * freq * freq) as f64)
            .sum();

        let score = if m2 - m1 == 0.0 { 0.0 } else { m1 * m1 / (m2 - m1) };
        let mut scores = Scores::new();
        scores.insert("yules_i".to_string(), Score::Value(round_to(score, 3)));
        Ok(MetricOutput::Corpus(scores))
    }
}
