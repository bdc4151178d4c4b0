use std::collections::BTreeMap;

use crate::error::PipelineError;

/// Probabilities this far outside `[0, 1]` are rejected instead of clamped.
const RANGE_TOLERANCE: f32 = 1e-3;

/// Immutable outcome of one inference.
#[derive(Clone, Debug, PartialEq)]
pub struct ClassificationResult {
    label: String,
    probabilities: BTreeMap<String, f32>,
    frame_sequence: u64,
}

impl ClassificationResult {
    /// Build a result from raw model scores.
    ///
    /// Scores must be finite and within `[0, 1]` (small float error is clamped).
    /// Repeated labels are merged by summing their probabilities. The top label is
    /// the highest probability; ties resolve to the lexicographically first label.
    pub fn from_scores<L: Into<String>>(
        scores: impl IntoIterator<Item = (L, f32)>,
        frame_sequence: u64,
    ) -> Result<Self, PipelineError> {
        let mut probabilities: BTreeMap<String, f32> = BTreeMap::new();
        for (label, score) in scores {
            let label = label.into();
            if !score.is_finite() {
                return Err(PipelineError::InferenceFailed(format!(
                    "non-finite score for '{}'",
                    label
                )));
            }
            if !(-RANGE_TOLERANCE..=1.0 + RANGE_TOLERANCE).contains(&score) {
                return Err(PipelineError::InferenceFailed(format!(
                    "score {} for '{}' is outside [0, 1]",
                    score, label
                )));
            }
            let entry = probabilities.entry(label).or_insert(0.0);
            *entry = (*entry + score).clamp(0.0, 1.0);
        }

        let label = probabilities
            .iter()
            .fold(None::<(&String, f32)>, |best, (label, &p)| match best {
                Some((_, best_p)) if best_p >= p => best,
                _ => Some((label, p)),
            })
            .map(|(label, _)| label.clone())
            .ok_or_else(|| PipelineError::InferenceFailed("model produced no scores".into()))?;

        Ok(Self {
            label,
            probabilities,
            frame_sequence,
        })
    }

    /// Top label.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn probabilities(&self) -> &BTreeMap<String, f32> {
        &self.probabilities
    }

    pub fn probability(&self, label: &str) -> Option<f32> {
        self.probabilities.get(label).copied()
    }

    /// Sequence number of the frame this result was computed from.
    pub fn frame_sequence(&self) -> u64 {
        self.frame_sequence
    }

    /// The `k` most probable labels, highest first.
    pub fn top_k(&self, k: usize) -> Vec<(&str, f32)> {
        let mut ranked: Vec<(&str, f32)> = self
            .probabilities
            .iter()
            .map(|(label, &p)| (label.as_str(), p))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked.truncate(k);
        ranked
    }

    /// Human-readable `label = probability` lines for the diagnostic stream.
    pub fn diagnostic_lines(&self, k: usize) -> Vec<String> {
        self.top_k(k)
            .into_iter()
            .map(|(label, p)| format!("{} = {:.4}", label, p))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn top_label_is_highest_probability() {
        let result =
            ClassificationResult::from_scores([("cat", 0.2), ("dog", 0.7), ("bird", 0.1)], 3)
                .expect("valid scores");
        assert_eq!(result.label(), "dog");
        assert_eq!(result.probability("cat"), Some(0.2));
        assert_eq!(result.frame_sequence(), 3);
    }

    #[test]
    fn ties_resolve_alphabetically() {
        let result = ClassificationResult::from_scores([("zebra", 0.5), ("ant", 0.5)], 0)
            .expect("valid scores");
        assert_eq!(result.label(), "ant");
    }

    #[test]
    fn duplicate_labels_are_merged() {
        let result =
            ClassificationResult::from_scores([("crane", 0.3), ("crane", 0.4), ("heron", 0.3)], 0)
                .expect("valid scores");
        assert_eq!(result.probabilities().len(), 2);
        assert!((result.probability("crane").unwrap_or_default() - 0.7).abs() < 1e-6);
        assert_eq!(result.label(), "crane");
    }

    #[test]
    fn invalid_scores_fail_inference() {
        let empty: [(&str, f32); 0] = [];
        assert!(matches!(
            ClassificationResult::from_scores(empty, 0),
            Err(PipelineError::InferenceFailed(_))
        ));
        assert!(ClassificationResult::from_scores([("a", f32::NAN)], 0).is_err());
        assert!(ClassificationResult::from_scores([("a", 1.5)], 0).is_err());
        assert!(ClassificationResult::from_scores([("a", -0.2)], 0).is_err());
    }

    #[test]
    fn float_error_is_clamped() {
        let result = ClassificationResult::from_scores([("a", 1.0004), ("b", -0.0002)], 0)
            .expect("within tolerance");
        assert_eq!(result.probability("a"), Some(1.0));
        assert_eq!(result.probability("b"), Some(0.0));
    }

    #[test]
    fn diagnostic_lines_are_ranked() {
        let result =
            ClassificationResult::from_scores([("other", 0.03), ("calibration-card", 0.97)], 0)
                .expect("valid scores");
        assert_eq!(
            result.diagnostic_lines(5),
            vec!["calibration-card = 0.9700", "other = 0.0300"]
        );
        assert_eq!(result.top_k(1), vec![("calibration-card", 0.97)]);
    }
}
