//! Candidate step generation.

use async_trait::async_trait;
use std::future::Future;

use crate::errors::ReasoningResult;

/// Proposes candidate next steps for a partial reasoning path.
#[async_trait]
pub trait StepGenerator: Send + Sync {
    /// Candidates for the step after `path` (root excluded), in preference order.
    async fn generate(&self, query: &str, path: &[String]) -> ReasoningResult<Vec<String>>;
}

/// Adapts an async closure into a [`StepGenerator`].
pub struct FnGenerator<F> {
    f: F,
}

impl<F, Fut> FnGenerator<F>
where
    F: Fn(String, Vec<String>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ReasoningResult<Vec<String>>> + Send + 'static,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> StepGenerator for FnGenerator<F>
where
    F: Fn(String, Vec<String>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ReasoningResult<Vec<String>>> + Send + 'static,
{
    async fn generate(&self, query: &str, path: &[String]) -> ReasoningResult<Vec<String>> {
        (self.f)(query.to_string(), path.to_vec()).await
    }
}
