//! Trace harvesting for self-training.
//!
//! Every answered query is stored as a [`WisdomGem`]. Once a batch is full
//! it is handed off, the generation counter advances and
//! `system.evolution_complete` is announced.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

use super::{topics, AgentRole};
use crate::bus::{Message, MessageBus, MessageHandler, SubscriptionId};
use crate::errors::{AgentError, AgentResult, BusError, BusResult};

/// One harvested reasoning trace.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WisdomGem {
    pub query: String,
    pub reasoning_trace: Vec<String>,
    pub final_answer: String,
    pub quality_score: f64,
}

impl WisdomGem {
    /// Parse a `query.response` message.
    ///
    /// The quality score is the response's `path_score`, or 1.0 when absent.
    pub fn from_response(message: &Message) -> AgentResult<Self> {
        let final_answer = message
            .get_str("answer")
            .ok_or_else(|| {
                AgentError::InvalidMessage(format!("response {} has no answer", message.id))
            })?
            .to_string();

        let reasoning_trace = message
            .content
            .get("thought_trace")
            .and_then(Value::as_array)
            .map(|steps| {
                steps
                    .iter()
                    .filter_map(|s| s.as_str().map(str::to_owned))
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            query: message.get_str("query").unwrap_or_default().to_string(),
            reasoning_trace,
            final_answer,
            quality_score: message
                .content
                .get("path_score")
                .and_then(Value::as_f64)
                .unwrap_or(1.0),
        })
    }
}

/// Collects answered traces in batches.
pub struct EvolutionHarvester {
    bus: MessageBus,
    batch_size: usize,
    gems: Mutex<Vec<WisdomGem>>,
    generation: AtomicU64,
}

impl EvolutionHarvester {
    pub fn new(bus: MessageBus, batch_size: usize) -> Self {
        Self {
            bus,
            batch_size: batch_size.max(1),
            gems: Mutex::new(Vec::new()),
            generation: AtomicU64::new(0),
        }
    }

    /// Create a harvester and subscribe it to [`topics::QUERY_RESPONSE`].
    pub fn attach(bus: &MessageBus, batch_size: usize) -> (Arc<Self>, SubscriptionId) {
        let agent = Arc::new(Self::new(bus.clone(), batch_size));
        let id = bus.subscribe(topics::QUERY_RESPONSE, agent.clone());
        (agent, id)
    }

    /// Store one response. Returns the new generation when it completed a batch.
    pub async fn harvest(&self, message: &Message) -> AgentResult<Option<u64>> {
        let gem = WisdomGem::from_response(message)?;
        info!(
            "Harvesting trace for '{}' ({} steps)",
            gem.query,
            gem.reasoning_trace.len()
        );

        let batch = {
            let mut gems = self.gems.lock();
            gems.push(gem);
            if gems.len() >= self.batch_size {
                Some(std::mem::take(&mut *gems))
            } else {
                None
            }
        };

        match batch {
            Some(batch) => self.complete_generation(batch).await.map(Some),
            None => Ok(None),
        }
    }

    async fn complete_generation(&self, batch: Vec<WisdomGem>) -> AgentResult<u64> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        info!(
            "Evolving: {} gems handed off, generation {}",
            batch.len(),
            generation
        );

        let announcement = Message::new(topics::EVOLUTION_COMPLETE)
            .with_sender(AgentRole::Evolution.as_str())
            .with_content(json!({
                "generation": generation.to_string(),
                "gems": batch.len(),
            }));
        self.bus.publish(announcement).await?;
        Ok(generation)
    }

    /// Gems waiting for the current batch to fill.
    pub fn pending(&self) -> Vec<WisdomGem> {
        self.gems.lock().clone()
    }

    /// Completed generations so far.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}

#[async_trait]
impl MessageHandler for EvolutionHarvester {
    async fn handle(&self, message: &Message) -> BusResult<()> {
        self.harvest(message)
            .await
            .map(|_| ())
            .map_err(BusError::from)
    }

    fn name(&self) -> &str {
        AgentRole::Evolution.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(query: &str) -> Message {
        Message::new(topics::QUERY_RESPONSE).with_content(json!({
            "answer": format!("answer to {query}"),
            "thought_trace": ["a", "b"],
            "query": query,
        }))
    }

    #[test]
    fn test_gem_from_response() {
        let gem = WisdomGem::from_response(&response("q").with_field("path_score", 0.4)).unwrap();
        assert_eq!(gem.query, "q");
        assert_eq!(gem.reasoning_trace, vec!["a", "b"]);
        assert_eq!(gem.final_answer, "answer to q");
        assert_eq!(gem.quality_score, 0.4);

        let default_score = WisdomGem::from_response(&response("q")).unwrap();
        assert_eq!(default_score.quality_score, 1.0);

        assert!(matches!(
            WisdomGem::from_response(&Message::new(topics::QUERY_RESPONSE)),
            Err(AgentError::InvalidMessage(_))
        ));
    }

    #[tokio::test]
    async fn test_batch_completion_announces_generation() {
        let bus = MessageBus::default();
        let harvester = EvolutionHarvester::new(bus.clone(), 2);

        let announced = Arc::new(Mutex::new(Vec::new()));
        let sink = announced.clone();
        bus.subscribe_sync(topics::EVOLUTION_COMPLETE, move |msg| {
            sink.lock().push(msg.get_str("generation").unwrap_or_default().to_string());
            Ok(())
        });

        assert_eq!(harvester.harvest(&response("one")).await.unwrap(), None);
        assert_eq!(harvester.pending().len(), 1);
        assert_eq!(harvester.harvest(&response("two")).await.unwrap(), Some(1));
        assert!(harvester.pending().is_empty());
        assert_eq!(harvester.harvest(&response("three")).await.unwrap(), None);

        assert_eq!(harvester.generation(), 1);
        assert_eq!(*announced.lock(), vec!["1"]);
    }

    #[tokio::test]
    async fn test_zero_batch_size_is_raised_to_one() {
        let bus = MessageBus::default();
        let (harvester, _) = EvolutionHarvester::attach(&bus, 0);
        assert_eq!(harvester.batch_size(), 1);

        bus.publish(response("q")).await.unwrap();
        assert_eq!(harvester.generation(), 1);
    }
}
