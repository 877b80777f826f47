/// Integration tests for the MCTS engine with the built-in evaluator
use async_trait::async_trait;
use ponder_core::reasoning::mean_step_score;
use ponder_core::{
    FnGenerator, HeuristicEvaluator, MctsConfig, MctsEngine, NodeId, ReasoningResult, ReasoningState,
    StepEvaluator, StepGenerator, ThoughtTree,
};
use std::sync::Arc;

struct Fixed(f64);

#[async_trait]
impl StepEvaluator for Fixed {
    async fn score_step(&self, _: &str, _: &[String], _: &str) -> ReasoningResult<f64> {
        Ok(self.0)
    }
}

fn engine_with(
    generator: Arc<dyn StepGenerator>,
    evaluator: Arc<dyn StepEvaluator>,
    max_iterations: usize,
) -> MctsEngine {
    MctsEngine::new(generator, evaluator).with_config(MctsConfig {
        max_iterations,
        ..Default::default()
    })
}

#[tokio::test]
async fn test_fixed_candidates_produce_visited_path() {
    let generator = Arc::new(FnGenerator::new(|_: String, _: Vec<String>| async {
        Ok(vec!["A".to_string(), "B".to_string()])
    }));
    let engine = engine_with(generator, Arc::new(Fixed(0.6)), 4);
    let mut state = ReasoningState::new("pick a letter");

    let outcome = engine.run(&mut state).await.expect("search failed");

    assert!(!outcome.path.is_empty());
    let tree = state.tree.as_ref().expect("tree created");
    for id in &outcome.path {
        let node = tree.get(*id).expect("path node exists");
        assert!(node.visit_count >= 1);
        assert!(["A", "B"].contains(&node.text.as_str()));
    }
}

#[tokio::test]
async fn test_heuristic_prefers_reasoned_steps() {
    // Each level offers one connective-bearing step and one filler step.
    let generator = Arc::new(FnGenerator::new(|_: String, path: Vec<String>| async move {
        let depth = path.len() + 1;
        Ok(vec![
            format!("filler {}", depth),
            format!("therefore level {}", depth),
        ])
    }));
    // Near-greedy selection so the better branch keeps winning.
    let engine = MctsEngine::new(generator, Arc::new(HeuristicEvaluator::new())).with_config(
        MctsConfig {
            max_iterations: 10,
            exploration_weight: 0.01,
            ..Default::default()
        },
    );
    let mut state = ReasoningState::new("why?");

    let outcome = engine.run(&mut state).await.expect("search failed");

    assert_eq!(outcome.thoughts.len(), 10);
    assert_eq!(outcome.thoughts[0], "therefore level 1");
    assert_eq!(outcome.thoughts[8], "therefore level 9");
    // The final leaf pair is unvisited below, so the first (filler) wins the tie.
    assert_eq!(outcome.thoughts[9], "filler 10");
    assert!((outcome.path_score - 0.68).abs() < 1e-9);
}

#[tokio::test]
async fn test_loop_suppression_through_engine() {
    // The generator keeps proposing the same step; repeats score low.
    let generator = Arc::new(FnGenerator::new(|_: String, _: Vec<String>| async {
        Ok(vec!["same step".to_string()])
    }));
    let engine = engine_with(generator, Arc::new(HeuristicEvaluator::new()), 3);
    let mut state = ReasoningState::new("q");

    let outcome = engine.run(&mut state).await.expect("search failed");

    let tree = state.tree.as_ref().expect("tree created");
    let scores: Vec<f64> = outcome
        .path
        .iter()
        .map(|id| tree.get(*id).expect("node").step_score)
        .collect();
    assert_eq!(scores.len(), 3);
    // "step" is a connective: 0.7 first, then 0.7 - 0.4 for each repeat.
    assert!((scores[0] - 0.7).abs() < 1e-9);
    assert!((scores[1] - 0.3).abs() < 1e-9);
    assert!((scores[2] - 0.3).abs() < 1e-9);
}

#[tokio::test]
async fn test_heuristic_scores_are_bounded_for_odd_inputs() {
    let evaluator = HeuristicEvaluator::new();
    let long = "therefore ".repeat(1000);
    let path: Vec<String> = vec![String::new(), long.clone(), "🙂".to_string()];
    for candidate in ["", long.as_str(), "🙂", "\n\t", "IF THEN"] {
        let score = evaluator
            .score_step("", &path, candidate)
            .await
            .expect("scoring failed");
        assert!((0.0..=1.0).contains(&score), "{candidate:?} scored {score}");
    }
}

#[test]
fn test_evaluate_path_examples() {
    let mut tree = ThoughtTree::new("en");
    let a = tree.add_child(NodeId::ROOT, "a").expect("add a");
    let b = tree.add_child(a, "b").expect("add b");
    tree.node_mut(a).expect("a").step_score = 0.2;
    tree.node_mut(b).expect("b").step_score = 0.8;

    let nodes = vec![tree.get(a).expect("a"), tree.get(b).expect("b")];
    assert!((mean_step_score(&nodes) - 0.5).abs() < 1e-12);
    assert_eq!(mean_step_score(&[]), 0.0);
}

#[test]
fn test_best_path_is_stable() {
    let mut tree = ThoughtTree::new("en");
    let a = tree.add_child(NodeId::ROOT, "a").expect("add");
    let b = tree.add_child(NodeId::ROOT, "b").expect("add");
    tree.backpropagate(a, 0.3).expect("backprop");
    tree.backpropagate(b, 0.9).expect("backprop");

    let first = tree.best_path();
    for _ in 0..10 {
        assert_eq!(tree.best_path(), first);
    }
    assert_eq!(first, vec![a]);
}
