//! Monte Carlo Tree Search over thought trees.
//!
//! Each iteration runs four phases:
//! 1. **Selection**: descend from the root by UCB1 to a leaf
//! 2. **Expansion**: ask the [`StepGenerator`] for candidate next steps
//! 3. **Evaluation**: score every new child with the [`StepEvaluator`]
//! 4. **Backpropagation**: add each child's score from the child up to the root
//!
//! Iterations are strictly sequential. Scoring the children of a single
//! expansion may run concurrently, but their results are always applied in
//! generator order.
//!
//! # Example
//!
//! ```ignore
//! let engine = MctsEngine::new(generator, Arc::new(HeuristicEvaluator::new()));
//! let mut state = ReasoningState::new("What is 17 * 3?");
//! let outcome = engine.run(&mut state).await?;
//! println!("{:?}", outcome.thoughts);
//! ```

use futures::future::join_all;
use serde::Serialize;
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::evaluator::StepEvaluator;
use super::generator::StepGenerator;
use super::state::{ReasoningState, PATH_SCORE_KEY, THOUGHTS_KEY};
use super::tree::{NodeId, ThoughtNode, ThoughtTree};
use crate::errors::{ReasoningError, ReasoningResult};

/// Configuration for the search engine.
#[derive(Debug, Clone)]
pub struct MctsConfig {
    /// Iteration budget per `run` call.
    pub max_iterations: usize,
    /// UCB1 exploration coefficient.
    pub exploration_weight: f64,
    /// Empty expansions after which a leaf becomes terminal. The default of
    /// 1 marks a leaf on its first empty expansion and never re-expands it;
    /// 2 allows one retry, for generators that are not deterministic. 0 never
    /// marks, so an empty leaf is re-selected every iteration.
    pub empty_expansion_limit: u32,
    /// Score the children of one expansion concurrently.
    pub parallel_scoring: bool,
}

impl Default for MctsConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            exploration_weight: std::f64::consts::SQRT_2,
            empty_expansion_limit: 1,
            parallel_scoring: true,
        }
    }
}

/// Counters gathered during one `run` call.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MctsStats {
    /// Iterations that selected a leaf.
    pub iterations: usize,
    /// Generator calls.
    pub expansions: usize,
    /// Nodes added to the tree.
    pub nodes_created: usize,
    /// Generator calls that returned no candidates.
    pub empty_expansions: usize,
    /// Deepest node in the tree after the search.
    pub max_depth: usize,
}

/// Result of a completed search.
#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    /// Most-visited path, root excluded.
    pub path: Vec<NodeId>,
    /// Step texts along `path`.
    pub thoughts: Vec<String>,
    /// Evaluator's aggregate score for `path`.
    pub path_score: f64,
    pub stats: MctsStats,
}

/// Fixed-budget MCTS driver with injected generation and evaluation.
pub struct MctsEngine {
    config: MctsConfig,
    generator: Arc<dyn StepGenerator>,
    evaluator: Arc<dyn StepEvaluator>,
}

impl MctsEngine {
    pub fn new(generator: Arc<dyn StepGenerator>, evaluator: Arc<dyn StepEvaluator>) -> Self {
        Self {
            config: MctsConfig::default(),
            generator,
            evaluator,
        }
    }

    pub fn with_config(mut self, config: MctsConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &MctsConfig {
        &self.config
    }

    /// Run the search on `state`, creating its tree on first use.
    pub async fn run(&self, state: &mut ReasoningState) -> ReasoningResult<SearchOutcome> {
        self.run_with_cancellation(state, CancellationToken::new())
            .await
    }

    /// Like [`run`](Self::run), but aborts with [`ReasoningError::Cancelled`]
    /// at the next generator or evaluator call once `cancel` fires.
    ///
    /// On any error the tree keeps every node created and scored so far.
    pub async fn run_with_cancellation(
        &self,
        state: &mut ReasoningState,
        cancel: CancellationToken,
    ) -> ReasoningResult<SearchOutcome> {
        let language = state.language_context.clone();
        let tree = state
            .tree
            .get_or_insert_with(|| ThoughtTree::new(&language));

        info!(
            query = %state.query,
            max_iterations = self.config.max_iterations,
            "Starting tree search"
        );

        let mut stats = MctsStats::default();
        self.search(&state.query, tree, &mut stats, &cancel).await?;

        let path = tree.best_path();
        let thoughts = path
            .iter()
            .map(|id| tree.node(*id).map(|n| n.text.clone()))
            .collect::<ReasoningResult<Vec<_>>>()?;
        let nodes: Vec<&ThoughtNode> = path.iter().filter_map(|id| tree.get(*id)).collect();
        let path_score = self.evaluator.evaluate_path(&nodes);
        stats.max_depth = tree.max_depth();

        state
            .metadata
            .insert(THOUGHTS_KEY.to_string(), json!(thoughts));
        state
            .metadata
            .insert(PATH_SCORE_KEY.to_string(), json!(path_score));
        state.current_node = Some(path.last().copied().unwrap_or(NodeId::ROOT));

        info!(
            iterations = stats.iterations,
            nodes = stats.nodes_created,
            path_len = path.len(),
            path_score,
            "Tree search complete"
        );

        Ok(SearchOutcome {
            path,
            thoughts,
            path_score,
            stats,
        })
    }

    async fn search(
        &self,
        query: &str,
        tree: &mut ThoughtTree,
        stats: &mut MctsStats,
        cancel: &CancellationToken,
    ) -> ReasoningResult<()> {
        for iteration in 0..self.config.max_iterations {
            let Some(leaf) = tree.select_leaf(self.config.exploration_weight) else {
                debug!(iteration, "Every branch is terminal, stopping early");
                break;
            };
            stats.iterations += 1;

            let path = tree.path_texts(leaf)?;
            let candidates = cancellable(cancel, self.generator.generate(query, &path)).await?;
            stats.expansions += 1;

            debug!(
                iteration,
                leaf = %leaf,
                depth = path.len(),
                candidates = candidates.len(),
                "Expanded leaf"
            );

            if candidates.is_empty() {
                stats.empty_expansions += 1;
                self.record_empty_expansion(tree, leaf)?;
                continue;
            }

            let mut children = Vec::with_capacity(candidates.len());
            for text in &candidates {
                children.push(tree.add_child(leaf, text.as_str())?);
            }
            stats.nodes_created += children.len();

            if self.config.parallel_scoring {
                let scoring = join_all(
                    candidates
                        .iter()
                        .map(|c| self.evaluator.score_step(query, &path, c)),
                );
                let scores = cancellable(cancel, async { Ok(scoring.await) }).await?;
                for (child, score) in children.into_iter().zip(scores) {
                    apply_score(tree, child, score?)?;
                }
            } else {
                for (child, candidate) in children.into_iter().zip(&candidates) {
                    let score =
                        cancellable(cancel, self.evaluator.score_step(query, &path, candidate))
                            .await?;
                    apply_score(tree, child, score)?;
                }
            }
        }
        Ok(())
    }

    fn record_empty_expansion(&self, tree: &mut ThoughtTree, leaf: NodeId) -> ReasoningResult<()> {
        let node = tree.node_mut(leaf)?;
        node.empty_expansions += 1;
        let limit = self.config.empty_expansion_limit;
        if limit > 0 && node.empty_expansions >= limit {
            debug!(leaf = %leaf, "Leaf yields no candidates, marking terminal");
            tree.mark_terminal(leaf)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for MctsEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MctsEngine")
            .field("config", &self.config)
            .field("evaluator", &self.evaluator.name())
            .finish()
    }
}

/// Store a validated score on `child` and backpropagate it.
fn apply_score(tree: &mut ThoughtTree, child: NodeId, raw: f64) -> ReasoningResult<()> {
    let score = checked_score(raw)?;
    tree.node_mut(child)?.step_score = score;
    tree.backpropagate(child, score)
}

fn checked_score(raw: f64) -> ReasoningResult<f64> {
    if !raw.is_finite() {
        return Err(ReasoningError::InvalidScore(raw));
    }
    if !(0.0..=1.0).contains(&raw) {
        warn!(score = raw, "Evaluator score outside [0, 1], clamping");
    }
    Ok(raw.clamp(0.0, 1.0))
}

async fn cancellable<F, T>(cancel: &CancellationToken, fut: F) -> ReasoningResult<T>
where
    F: Future<Output = ReasoningResult<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ReasoningError::Cancelled),
        result = fut => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reasoning::generator::FnGenerator;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct ConstEvaluator(f64);

    #[async_trait]
    impl StepEvaluator for ConstEvaluator {
        async fn score_step(&self, _: &str, _: &[String], _: &str) -> ReasoningResult<f64> {
            Ok(self.0)
        }
    }

    /// Fails on one specific candidate text.
    struct RejectingEvaluator(&'static str);

    #[async_trait]
    impl StepEvaluator for RejectingEvaluator {
        async fn score_step(&self, _: &str, _: &[String], candidate: &str) -> ReasoningResult<f64> {
            if candidate == self.0 {
                Err(ReasoningError::Evaluator(format!("cannot score {candidate}")))
            } else {
                Ok(0.5)
            }
        }
    }

    fn ab_generator() -> Arc<dyn StepGenerator> {
        Arc::new(FnGenerator::new(|_: String, _: Vec<String>| async {
            Ok(vec!["A".to_string(), "B".to_string()])
        }))
    }

    fn empty_generator() -> Arc<dyn StepGenerator> {
        Arc::new(FnGenerator::new(|_: String, _: Vec<String>| async {
            Ok(Vec::new())
        }))
    }

    fn engine(generator: Arc<dyn StepGenerator>, score: f64, iterations: usize) -> MctsEngine {
        MctsEngine::new(generator, Arc::new(ConstEvaluator(score))).with_config(MctsConfig {
            max_iterations: iterations,
            ..Default::default()
        })
    }

    fn subtree_size(tree: &ThoughtTree, id: NodeId) -> u32 {
        1 + tree
            .get(id)
            .unwrap()
            .children()
            .iter()
            .map(|c| subtree_size(tree, *c))
            .sum::<u32>()
    }

    #[tokio::test]
    async fn test_constant_generator_end_to_end() {
        let engine = engine(ab_generator(), 0.6, 4);
        let mut state = ReasoningState::new("q");

        let outcome = engine.run(&mut state).await.unwrap();

        assert!(!outcome.path.is_empty());
        let tree = state.tree.as_ref().unwrap();
        for id in &outcome.path {
            let node = tree.get(*id).unwrap();
            assert!(node.visit_count >= 1);
            assert!(node.text == "A" || node.text == "B");
        }
        assert_eq!(outcome.thoughts, vec!["A", "A", "A"]);
        assert_eq!(outcome.stats.iterations, 4);
        assert_eq!(outcome.stats.nodes_created, 8);
        assert_eq!(tree.len(), 9);
        assert!((outcome.path_score - 0.6).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_visit_counts_match_subtree_sizes() {
        let engine = engine(ab_generator(), 0.6, 6);
        let mut state = ReasoningState::new("q");
        engine.run(&mut state).await.unwrap();

        let tree = state.tree.as_ref().unwrap();
        for node in tree.iter().filter(|n| !n.is_root()) {
            assert_eq!(node.visit_count, subtree_size(tree, node.id()));
        }
        // Root: seeded visit plus one per created node.
        assert_eq!(tree.root().visit_count, tree.len() as u32);
    }

    #[tokio::test]
    async fn test_zero_iterations_returns_empty_path() {
        let engine = engine(ab_generator(), 0.6, 0);
        let mut state = ReasoningState::new("q");

        let outcome = engine.run(&mut state).await.unwrap();

        assert!(outcome.path.is_empty());
        assert_eq!(outcome.path_score, 0.0);
        let tree = state.tree.as_ref().unwrap();
        assert_eq!(tree.len(), 1);
        assert!(tree.root().is_leaf());
        assert_eq!(state.current_node, Some(NodeId::ROOT));
    }

    #[tokio::test]
    async fn test_empty_expansion_marks_terminal_and_stops() {
        let engine = engine(empty_generator(), 0.5, 5);
        let mut state = ReasoningState::new("q");

        let outcome = engine.run(&mut state).await.unwrap();

        assert!(outcome.path.is_empty());
        assert_eq!(outcome.stats.iterations, 1);
        assert_eq!(outcome.stats.empty_expansions, 1);
        assert!(state.tree.as_ref().unwrap().root().is_terminal());
    }

    #[tokio::test]
    async fn test_limit_two_retries_once_before_marking() {
        let engine = MctsEngine::new(empty_generator(), Arc::new(ConstEvaluator(0.5)))
            .with_config(MctsConfig {
                max_iterations: 5,
                empty_expansion_limit: 2,
                ..Default::default()
            });
        let mut state = ReasoningState::new("q");

        let outcome = engine.run(&mut state).await.unwrap();

        assert_eq!(outcome.stats.expansions, 2);
        let root = state.tree.as_ref().unwrap().root();
        assert_eq!(root.empty_expansions, 2);
        assert!(root.is_terminal());
    }

    #[tokio::test]
    async fn test_zero_limit_keeps_reexpanding() {
        let engine = MctsEngine::new(empty_generator(), Arc::new(ConstEvaluator(0.5)))
            .with_config(MctsConfig {
                max_iterations: 5,
                empty_expansion_limit: 0,
                ..Default::default()
            });
        let mut state = ReasoningState::new("q");

        let outcome = engine.run(&mut state).await.unwrap();

        assert_eq!(outcome.stats.expansions, 5);
        assert_eq!(state.tree.as_ref().unwrap().root().empty_expansions, 5);
    }

    #[tokio::test]
    async fn test_dead_end_branch_is_skipped() {
        // One step at the top level, nothing below it.
        let generator = Arc::new(FnGenerator::new(|_: String, path: Vec<String>| async move {
            if path.is_empty() {
                Ok(vec!["only".to_string()])
            } else {
                Ok(Vec::new())
            }
        }));
        let engine = engine(generator, 0.5, 10);
        let mut state = ReasoningState::new("q");

        let outcome = engine.run(&mut state).await.unwrap();

        assert_eq!(outcome.stats.iterations, 2);
        assert_eq!(outcome.thoughts, vec!["only"]);
    }

    #[tokio::test]
    async fn test_generator_failure_keeps_partial_tree() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let generator = Arc::new(FnGenerator::new(move |_: String, _: Vec<String>| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Ok(vec!["A".to_string(), "B".to_string()])
                } else {
                    Err(ReasoningError::Generator("model offline".to_string()))
                }
            }
        }));
        let engine = engine(generator, 0.6, 4);
        let mut state = ReasoningState::new("q");

        let err = engine.run(&mut state).await.unwrap_err();

        assert_eq!(err, ReasoningError::Generator("model offline".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        let tree = state.tree.as_ref().unwrap();
        assert_eq!(tree.len(), 3);
        assert_eq!(tree.root().visit_count, 3);
        assert!(!state.metadata.contains_key(THOUGHTS_KEY));
    }

    #[tokio::test]
    async fn test_evaluator_failure_stops_in_generator_order() {
        for parallel_scoring in [true, false] {
            let engine = MctsEngine::new(ab_generator(), Arc::new(RejectingEvaluator("B")))
                .with_config(MctsConfig {
                    max_iterations: 3,
                    parallel_scoring,
                    ..Default::default()
                });
            let mut state = ReasoningState::new("q");

            let err = engine.run(&mut state).await.unwrap_err();

            assert!(matches!(err, ReasoningError::Evaluator(_)));
            let tree = state.tree.as_ref().unwrap();
            let children = tree.root().children().to_vec();
            assert_eq!(children.len(), 2);
            assert_eq!(tree.get(children[0]).unwrap().visit_count, 1);
            assert_eq!(tree.get(children[1]).unwrap().visit_count, 0);
        }
    }

    #[tokio::test]
    async fn test_non_finite_score_is_rejected() {
        let engine = engine(ab_generator(), f64::NAN, 2);
        let mut state = ReasoningState::new("q");

        let err = engine.run(&mut state).await.unwrap_err();
        assert!(matches!(err, ReasoningError::InvalidScore(s) if s.is_nan()));
    }

    #[tokio::test]
    async fn test_out_of_range_score_is_clamped() {
        let engine = engine(ab_generator(), 1.5, 1);
        let mut state = ReasoningState::new("q");

        let outcome = engine.run(&mut state).await.unwrap();

        let tree = state.tree.as_ref().unwrap();
        let first = tree.get(outcome.path[0]).unwrap();
        assert_eq!(first.step_score, 1.0);
        assert_eq!(first.total_reward, 1.0);
    }

    #[tokio::test]
    async fn test_sequential_scoring_matches_parallel() {
        let mut thoughts = Vec::new();
        for parallel_scoring in [true, false] {
            let engine = MctsEngine::new(ab_generator(), Arc::new(ConstEvaluator(0.6)))
                .with_config(MctsConfig {
                    max_iterations: 5,
                    parallel_scoring,
                    ..Default::default()
                });
            let mut state = ReasoningState::new("q");
            thoughts.push(engine.run(&mut state).await.unwrap().thoughts);
        }
        assert_eq!(thoughts[0], thoughts[1]);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let engine = engine(ab_generator(), 0.6, 4);
        let mut state = ReasoningState::new("q");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = engine
            .run_with_cancellation(&mut state, cancel)
            .await
            .unwrap_err();

        assert_eq!(err, ReasoningError::Cancelled);
        assert_eq!(state.tree.as_ref().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_stalled_generator() {
        let generator = Arc::new(FnGenerator::new(|_: String, _: Vec<String>| async {
            std::future::pending::<()>().await;
            Ok(Vec::new())
        }));
        let engine = engine(generator, 0.6, 4);
        let mut state = ReasoningState::new("q");
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = engine
            .run_with_cancellation(&mut state, cancel)
            .await
            .unwrap_err();
        assert_eq!(err, ReasoningError::Cancelled);
    }

    #[tokio::test]
    async fn test_run_records_metadata_and_cursor() {
        let engine = engine(ab_generator(), 0.6, 3);
        let mut state = ReasoningState::new("q");

        let outcome = engine.run(&mut state).await.unwrap();

        assert_eq!(state.thoughts(), outcome.thoughts);
        assert_eq!(state.metadata[PATH_SCORE_KEY], json!(outcome.path_score));
        assert_eq!(state.current_node, outcome.path.last().copied());
    }

    #[tokio::test]
    async fn test_second_run_extends_existing_tree() {
        let engine = engine(ab_generator(), 0.6, 2);
        let mut state = ReasoningState::new("q");

        engine.run(&mut state).await.unwrap();
        let first = state.tree.as_ref().unwrap().len();
        engine.run(&mut state).await.unwrap();

        assert_eq!(state.tree.as_ref().unwrap().len(), first + 4);
    }
}
