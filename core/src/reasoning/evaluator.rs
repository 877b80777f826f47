//! Step quality evaluation.

use async_trait::async_trait;

use super::tree::ThoughtNode;
use crate::errors::ReasoningResult;

/// Scores candidate reasoning steps.
///
/// Implementations may be heuristic or call out to a model. `score_step` must
/// return a value in `[0.0, 1.0]`.
#[async_trait]
pub trait StepEvaluator: Send + Sync {
    /// Score `candidate` as the next step after `path` (root excluded).
    async fn score_step(&self, query: &str, path: &[String], candidate: &str)
        -> ReasoningResult<f64>;

    /// Aggregate quality of a path: the mean step score, or 0.0 when empty.
    fn evaluate_path(&self, nodes: &[&ThoughtNode]) -> f64 {
        mean_step_score(nodes)
    }

    fn name(&self) -> &str {
        "evaluator"
    }
}

/// Mean of the nodes' step scores; 0.0 for an empty slice.
pub fn mean_step_score(nodes: &[&ThoughtNode]) -> f64 {
    if nodes.is_empty() {
        return 0.0;
    }
    nodes.iter().map(|n| n.step_score).sum::<f64>() / nodes.len() as f64
}

const DEFAULT_CONNECTIVES: &[&str] = &[
    "therefore", "because", "implies", "if", "then", "let", "assume", "step",
];

/// Keyword heuristic standing in for a learned process reward model.
///
/// Starts from `baseline`, adds `connective_bonus` when the candidate mentions
/// a logical connective (case-insensitive substring match) and subtracts
/// `repeat_penalty` when it repeats a step already on the path.
#[derive(Debug, Clone)]
pub struct HeuristicEvaluator {
    pub baseline: f64,
    pub connective_bonus: f64,
    pub repeat_penalty: f64,
    pub connectives: Vec<String>,
}

impl Default for HeuristicEvaluator {
    fn default() -> Self {
        Self {
            baseline: 0.5,
            connective_bonus: 0.2,
            repeat_penalty: 0.4,
            connectives: DEFAULT_CONNECTIVES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl HeuristicEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connectives<I, S>(mut self, connectives: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.connectives = connectives
            .into_iter()
            .map(|s| s.into().to_lowercase())
            .collect();
        self
    }

    /// Synchronous scoring core.
    pub fn score(&self, path: &[String], candidate: &str) -> f64 {
        let mut score = self.baseline;

        let lowered = candidate.to_lowercase();
        if self.connectives.iter().any(|kw| lowered.contains(kw.as_str())) {
            score += self.connective_bonus;
        }

        if path.iter().any(|step| step == candidate) {
            score -= self.repeat_penalty;
        }

        score.clamp(0.0, 1.0)
    }
}

#[async_trait]
impl StepEvaluator for HeuristicEvaluator {
    async fn score_step(
        &self,
        _query: &str,
        path: &[String],
        candidate: &str,
    ) -> ReasoningResult<f64> {
        Ok(self.score(path, candidate))
    }

    fn name(&self) -> &str {
        "heuristic"
    }
}
