//! Tree-search reasoning: the thought tree, step generation and evaluation
//! contracts, and the MCTS engine that ties them together.

pub mod evaluator;
pub mod generator;
pub mod mcts;
pub mod state;
pub mod tree;

pub use evaluator::{mean_step_score, HeuristicEvaluator, StepEvaluator};
pub use generator::{FnGenerator, StepGenerator};
pub use mcts::{MctsConfig, MctsEngine, MctsStats, SearchOutcome};
pub use state::{ReasoningState, DEFAULT_LANGUAGE, PATH_SCORE_KEY, THOUGHTS_KEY};
pub use tree::{NodeId, ThoughtNode, ThoughtTree};
