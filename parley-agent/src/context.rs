//! Conversation context assembly
//!
//! Builds the bounded [`ContextWindow`] for one turn from a session snapshot
//! and the retrieval collaborator. Never mutates the session.

use parley_core::config::{ContextConfig, RetrievalConfig};
use parley_core::session::{Session, Turn};
use parley_core::Error;
use parley_providers::{ContextWindow, Passage, Retriever};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Assembles context windows
pub struct ContextAssembler {
    retriever: Option<Arc<dyn Retriever>>,
    max_history_turns: usize,
    max_history_chars: usize,
    retrieval_k: usize,
    context_k: usize,
    min_relevance_score: f32,
    retrieval_timeout: Duration,
}

impl ContextAssembler {
    /// Create an assembler; without a retriever every window is history-only
    pub fn new(
        retriever: Option<Arc<dyn Retriever>>,
        context: &ContextConfig,
        retrieval: &RetrievalConfig,
    ) -> Self {
        Self {
            retriever,
            max_history_turns: context.max_history_turns,
            max_history_chars: context.max_history_chars,
            retrieval_k: context.retrieval_k,
            context_k: context.context_k,
            min_relevance_score: context.min_relevance_score,
            retrieval_timeout: Duration::from_secs(retrieval.timeout_secs),
        }
    }

    /// Build the window for `query` over the turns already in `session`
    pub async fn assemble(&self, session: &Session, query: &str) -> ContextWindow {
        let history = self.select_history(session);
        let (passages, retrieval_degraded) = match &self.retriever {
            Some(retriever) => self.fetch_passages(retriever.as_ref(), query).await,
            None => (Vec::new(), false),
        };

        debug!(
            "Assembled context for {}: {} history turns, {} passages",
            session.session_id,
            history.len(),
            passages.len()
        );

        ContextWindow {
            session_id: session.session_id.clone(),
            query: query.to_string(),
            history,
            passages,
            retrieval_degraded,
        }
    }

    /// Most recent turns within the turn and character budgets, oldest first
    pub fn select_history(&self, session: &Session) -> Vec<Turn> {
        let recent = session.recent_turns(self.max_history_turns);
        if self.max_history_chars == 0 {
            return recent.to_vec();
        }

        let mut total: usize = recent.iter().map(|t| t.text.chars().count()).sum();
        let mut start = 0;
        while start < recent.len() && total > self.max_history_chars {
            total -= recent[start].text.chars().count();
            start += 1;
        }
        recent[start..].to_vec()
    }

    async fn fetch_passages(&self, retriever: &dyn Retriever, query: &str) -> (Vec<Passage>, bool) {
        let candidates = match tokio::time::timeout(
            self.retrieval_timeout,
            retriever.retrieve(query, self.retrieval_k),
        )
        .await
        {
            Ok(Ok(candidates)) => candidates,
            Ok(Err(e)) => {
                let err = Error::Retrieval(e.to_string());
                warn!("{}; continuing with history only", err);
                return (Vec::new(), true);
            }
            Err(_) => {
                warn!(
                    "Retrieval timed out after {}s; continuing with history only",
                    self.retrieval_timeout.as_secs()
                );
                return (Vec::new(), true);
            }
        };

        if candidates.is_empty() {
            info!("Retrieval returned no passages; using a general response");
            return (Vec::new(), true);
        }

        let fetched = candidates.len();
        let passages = select_passages(candidates, self.min_relevance_score, self.context_k);
        info!(
            "Kept {} of {} retrieved passages",
            passages.len(),
            fetched
        );
        (passages, false)
    }
}

/// Relevance cut-off for a candidate set: `max(floor, mean - 0.5 * stddev)`
pub fn dynamic_threshold(scores: &[f32], floor: f32) -> f32 {
    if scores.is_empty() {
        return floor;
    }
    let n = scores.len() as f32;
    let mean = scores.iter().sum::<f32>() / n;
    let variance = scores.iter().map(|s| (s - mean).powi(2)).sum::<f32>() / n;
    floor.max(mean - 0.5 * variance.sqrt())
}

/// Dedupe by source id (first wins), drop passages under the dynamic
/// threshold, then keep the first `context_k`
pub fn select_passages(candidates: Vec<Passage>, floor: f32, context_k: usize) -> Vec<Passage> {
    let mut seen = HashSet::new();
    let unique: Vec<Passage> = candidates
        .into_iter()
        .filter(|p| seen.insert(p.source_id.clone()))
        .collect();

    let scores: Vec<f32> = unique.iter().map(|p| p.score).collect();
    let threshold = dynamic_threshold(&scores, floor);
    debug!("Relevance threshold {:.3} over {} candidates", threshold, scores.len());

    unique
        .into_iter()
        .filter(|p| p.score >= threshold)
        .take(context_k)
        .collect()
}
