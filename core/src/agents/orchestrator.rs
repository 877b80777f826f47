//! Query orchestration: submit -> tree search -> response.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

use super::{topics, AgentRole};
use crate::bus::{Message, MessageBus, MessageHandler, SubscriptionId};
use crate::errors::{AgentError, AgentResult, BusError, BusResult};
use crate::reasoning::{MctsEngine, ReasoningState};

/// Answer used when the search produced no steps.
pub const NO_PATH_ANSWER: &str = "No reasoning path was found for this query.";

/// Turns submitted queries into searched, answered [`ReasoningState`]s.
pub struct Orchestrator {
    bus: MessageBus,
    engine: Arc<MctsEngine>,
}

impl Orchestrator {
    pub fn new(bus: MessageBus, engine: Arc<MctsEngine>) -> Self {
        Self { bus, engine }
    }

    /// Create an orchestrator and subscribe it to [`topics::QUERY_SUBMIT`].
    pub fn attach(bus: &MessageBus, engine: Arc<MctsEngine>) -> (Arc<Self>, SubscriptionId) {
        let agent = Arc::new(Self::new(bus.clone(), engine));
        let id = bus.subscribe(topics::QUERY_SUBMIT, agent.clone());
        (agent, id)
    }

    /// Answer one `query.submit` message.
    ///
    /// Publishes the response on [`topics::QUERY_RESPONSE`]. If the submit
    /// came from a pending `request`, a reply carrying its correlation id is
    /// published after the broadcast so the requester receives it too.
    pub async fn handle_query(&self, message: &Message) -> AgentResult<ReasoningState> {
        let query = message
            .get_str("text")
            .ok_or_else(|| {
                AgentError::InvalidMessage(format!(
                    "message {} on '{}' has no text field",
                    message.id, message.topic
                ))
            })?
            .to_string();

        info!("Received query: {}", query);

        let mut state = ReasoningState::new(query.clone());
        let outcome = self.engine.run(&mut state).await?;

        let answer = synthesize_answer(&query, &outcome.thoughts);
        state.complete(answer.clone());

        let content = json!({
            "answer": answer,
            "thought_trace": outcome.thoughts,
            "query": query,
            "path_score": outcome.path_score,
        });

        let response = Message::new(topics::QUERY_RESPONSE)
            .with_sender(AgentRole::Orchestrator.as_str())
            .with_content(content.clone());
        self.bus.publish(response).await?;

        if let Some(correlation_id) = message.correlation_id() {
            if self.bus.is_pending(correlation_id) {
                debug!("Replying to request {}", correlation_id);
                let reply = message
                    .reply(topics::QUERY_RESPONSE, content)
                    .with_sender(AgentRole::Orchestrator.as_str());
                self.bus.publish(reply).await?;
            }
        }

        Ok(state)
    }
}

#[async_trait]
impl MessageHandler for Orchestrator {
    async fn handle(&self, message: &Message) -> BusResult<()> {
        self.handle_query(message)
            .await
            .map(|_| ())
            .map_err(BusError::from)
    }

    fn name(&self) -> &str {
        AgentRole::Orchestrator.as_str()
    }
}

/// Final user-facing answer built from the last step of the trace.
///
/// Queries written in Thai script, or asking for Thai, get a Thai answer.
pub fn synthesize_answer(query: &str, thoughts: &[String]) -> String {
    let Some(last) = thoughts.last() else {
        return NO_PATH_ANSWER.to_string();
    };
    if wants_thai(query) {
        format!("จากกระบวนการคิดที่ตรวจสอบแล้ว: {} (คำตอบสุดท้ายสำหรับคุณ)", last)
    } else {
        format!("Final answer based on reasoning: {}", last)
    }
}

/// Whether `query` is written in Thai script or asks for Thai.
pub fn wants_thai(query: &str) -> bool {
    query.contains("Thai") || query.chars().any(|c| ('\u{0E00}'..='\u{0E7F}').contains(&c))
}
