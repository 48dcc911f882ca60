//! Per-question entry point.
//!
//! [`Assistant::process_user_question`] runs the whole pipeline for one
//! question and always returns display text: failures become a string that
//! starts with [`ERROR_PREFIX`] instead of an error value.

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use crate::citations::{format_answer, CitationPolicy};
use crate::prompt::{compose_prompt_with_history, ConversationHistory, PromptRules};
use crate::retrieval::{RetrievalError, RetrievalResult, RetrievalService};
use crate::students::StudentRecord;

/// Marker that begins every failed answer.
pub const ERROR_PREFIX: &str = "Error:";

/// The question-answering pipeline bound to one retrieval service.
#[derive(Clone)]
pub struct Assistant {
    service: Arc<dyn RetrievalService>,
    rules: PromptRules,
    policy: CitationPolicy,
}

impl std::fmt::Debug for Assistant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Assistant")
            .field("knowledge_base_id", &self.service.knowledge_base_id())
            .field("rules_version", &self.rules.version())
            .field("policy", &self.policy)
            .finish()
    }
}

impl Assistant {
    /// Build an assistant from its collaborators.
    pub fn new(service: Arc<dyn RetrievalService>, rules: PromptRules, policy: CitationPolicy) -> Self {
        Self {
            service,
            rules,
            policy,
        }
    }

    /// Rules in effect.
    pub fn rules(&self) -> &PromptRules {
        &self.rules
    }

    /// Send `prompt` to the knowledge base and apply the citation policy.
    ///
    /// `question` is the student's own text, used for the keyword fallback.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError`] if the service call fails.
    pub async fn ask(&self, prompt: &str, question: &str) -> Result<RetrievalResult, RetrievalError> {
        let response = self.service.retrieve_and_generate(prompt).await?;
        let citations = self.policy.finalize(&response.citation_uris, question);
        Ok(RetrievalResult {
            answer: response.answer_or_placeholder().to_owned(),
            citations,
        })
    }

    /// Answer one question for `record`. Never fails.
    pub async fn process_user_question(&self, record: &StudentRecord, question: &str) -> String {
        self.process_turn(record, question, &ConversationHistory::new())
            .await
    }

    /// Answer one question in the context of earlier turns. Never fails.
    pub async fn process_turn(
        &self,
        record: &StudentRecord,
        question: &str,
        history: &ConversationHistory,
    ) -> String {
        let started = Instant::now();
        let prompt = compose_prompt_with_history(&self.rules, record, question, history);

        match self.ask(&prompt, question).await {
            Ok(result) => {
                info!(
                    rules_version = %self.rules.version(),
                    prompt_bytes = prompt.len(),
                    history_turns = history.turns().len(),
                    citations = result.citations.len(),
                    elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                    "question answered"
                );
                format_answer(&result.answer, &result.citations, &self.policy)
            }
            Err(e) => {
                warn!(error = %e, "question failed");
                format!("{ERROR_PREFIX} {e}")
            }
        }
    }
}
