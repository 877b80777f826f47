//! Per-query reasoning workspace.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::tree::{NodeId, ThoughtTree};
use crate::bus::Message;

/// Metadata key holding the extracted path of step texts.
pub const THOUGHTS_KEY: &str = "thoughts";

/// Metadata key holding the evaluator's score for the extracted path.
pub const PATH_SCORE_KEY: &str = "path_score";

/// Language tag used when the caller does not pick one.
pub const DEFAULT_LANGUAGE: &str = "th";

/// Workspace for one query, mutated in place by the search engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningState {
    /// The question being reasoned about
    pub query: String,
    /// Language tag for the conversation
    pub language_context: String,
    /// Earlier messages, for multi-turn extension
    pub history: Vec<Message>,
    /// Thought tree, created on the first search
    pub tree: Option<ThoughtTree>,
    /// Most recently visited node
    pub current_node: Option<NodeId>,
    /// Free-form annotations
    pub metadata: Map<String, Value>,
    pub is_complete: bool,
    pub final_answer: Option<String>,
}

impl ReasoningState {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            language_context: DEFAULT_LANGUAGE.to_string(),
            history: Vec::new(),
            tree: None,
            current_node: None,
            metadata: Map::new(),
            is_complete: false,
            final_answer: None,
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language_context = language.into();
        self
    }

    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.history = history;
        self
    }

    /// Step texts stashed by the last search, if any.
    pub fn thoughts(&self) -> Vec<String> {
        self.metadata
            .get(THOUGHTS_KEY)
            .and_then(Value::as_array)
            .map(|steps| {
                steps
                    .iter()
                    .filter_map(|s| s.as_str().map(str::to_owned))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Record the final answer and mark the state complete.
    pub fn complete(&mut self, answer: impl Into<String>) {
        self.final_answer = Some(answer.into());
        self.is_complete = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_state_is_blank() {
        let state = ReasoningState::new("what is 2+2?");
        assert_eq!(state.language_context, DEFAULT_LANGUAGE);
        assert_eq!(state.clone().with_language("en").language_context, "en");
        assert!(state.tree.is_none());
        assert!(state.thoughts().is_empty());
        assert!(!state.is_complete);
    }

    #[test]
    fn test_thoughts_and_completion() {
        let mut state = ReasoningState::new("q");
        state
            .metadata
            .insert(THOUGHTS_KEY.to_string(), json!(["first", "second"]));
        state.complete("done");

        assert_eq!(state.thoughts(), vec!["first", "second"]);
        assert_eq!(state.final_answer.as_deref(), Some("done"));
        assert!(state.is_complete);
    }
}
