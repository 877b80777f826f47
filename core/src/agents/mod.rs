//! Agents that collaborate over the message bus.
//!
//! The [`Orchestrator`] answers queries submitted on [`topics::QUERY_SUBMIT`]
//! by running the tree search; the [`EvolutionHarvester`] collects the
//! published traces for later self-training.

pub mod harvester;
pub mod orchestrator;

pub use harvester::{EvolutionHarvester, WisdomGem};
pub use orchestrator::{synthesize_answer, wants_thai, Orchestrator};

/// Topic names shared by the agents.
pub mod topics {
    /// `{text}`: a user query to answer.
    pub const QUERY_SUBMIT: &str = "query.submit";
    /// `{answer, thought_trace, query, path_score}`: the answer to a query.
    pub const QUERY_RESPONSE: &str = "query.response";
    /// `{generation, gems}`: a harvest batch was handed off for training.
    pub const EVOLUTION_COMPLETE: &str = "system.evolution_complete";
}

/// Role an agent plays in the system.
#[derive(
    Debug, Clone, Copy, serde::Serialize, serde::Deserialize, PartialEq, Eq, Hash,
)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Orchestrator,
    Evolution,
    Verifier,
    Tool,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Orchestrator => "orchestrator",
            AgentRole::Evolution => "evolution",
            AgentRole::Verifier => "verifier",
            AgentRole::Tool => "tool",
        }
    }
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AgentRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "orchestrator" => Ok(AgentRole::Orchestrator),
            "evolution" => Ok(AgentRole::Evolution),
            "verifier" => Ok(AgentRole::Verifier),
            "tool" => Ok(AgentRole::Tool),
            _ => Err(format!("Invalid agent role: {}", s)),
        }
    }
}
