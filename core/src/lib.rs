// Ponder: tree-search reasoning over an async message bus
// Core library providing the bus, the MCTS engine and the collaborating agents

pub mod agents;
pub mod bus;
pub mod config;
pub mod errors;
pub mod logging;
pub mod prompt;
pub mod reasoning;

// Re-export commonly used types
pub use errors::{
    AgentError, AgentResult, BusError, BusResult, ConfigError, ConfigResult, ReasoningError,
    ReasoningResult,
};

pub use bus::{
    log_stats, BusStats, FnHandler, Message, MessageBus, MessageBusConfig, MessageHandler,
    SubscriptionId, SyncHandler, CORRELATION_ID_KEY,
};

pub use reasoning::{
    FnGenerator, HeuristicEvaluator, MctsConfig, MctsEngine, MctsStats, NodeId, ReasoningState,
    SearchOutcome, StepEvaluator, StepGenerator, ThoughtNode, ThoughtTree,
};

pub use agents::{topics, AgentRole, EvolutionHarvester, Orchestrator, WisdomGem};

pub use config::{
    BusConfig, ConfigManager, EngineConfig, HarvestConfig, LoggingConfig, PonderConfig,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
