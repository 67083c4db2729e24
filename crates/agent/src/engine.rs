use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use loanbot_core::domain::conversation::{ConversationRecord, Message};
use loanbot_core::domain::loan::Loan;
use loanbot_db::repositories::{ConversationRepository, LoanRepository, RepositoryError};

use crate::extraction::Extractor;
use crate::reconcile::{reconcile, validate_collected};
use crate::schema::{field_names, missing_fields};

const CLARIFY_PROMPT: &str = "Can you clarify the last detail?";

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Outcome of one intake turn, in the shape the HTTP and CLI surfaces
/// hand back to callers.
#[derive(Clone, Debug, Serialize)]
pub struct TurnResult {
    pub session_id: String,
    pub next_question: Option<String>,
    pub pending_fields: Vec<String>,
    pub collected: Map<String, Value>,
    pub completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loan: Option<Loan>,
}

/// Per-session coordination. Turns for the same session run strictly one
/// at a time; turns for different sessions are independent.
#[derive(Default)]
struct SessionLocks {
    inner: std::sync::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl SessionLocks {
    fn lock_for(&self, session_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut table = match self.inner.lock() {
            Ok(table) => table,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(table.entry(session_id.to_string()).or_default())
    }

    /// Drops the table entry once no turn holds it. A waiter still queued
    /// on the mutex keeps its own clone, so the count stays above one and
    /// the entry survives until the last turn for the session finishes.
    fn release(&self, session_id: &str) {
        let mut table = match self.inner.lock() {
            Ok(table) => table,
            Err(poisoned) => poisoned.into_inner(),
        };
        if table.get(session_id).map(|entry| Arc::strong_count(entry) == 1).unwrap_or(false) {
            table.remove(session_id);
        }
    }

    #[cfg(test)]
    fn live_count(&self) -> usize {
        match self.inner.lock() {
            Ok(table) => table.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

/// Drives the slot-filling loop: extract, reconcile, validate, persist.
/// One engine instance serves every session; all mutable state lives in
/// the repositories.
pub struct IntakeEngine {
    extractor: Arc<dyn Extractor>,
    conversations: Arc<dyn ConversationRepository>,
    loans: Arc<dyn LoanRepository>,
    locks: SessionLocks,
}

impl IntakeEngine {
    pub fn new(
        extractor: Arc<dyn Extractor>,
        conversations: Arc<dyn ConversationRepository>,
        loans: Arc<dyn LoanRepository>,
    ) -> Self {
        Self { extractor, conversations, loans, locks: SessionLocks::default() }
    }

    #[cfg(test)]
    fn live_session_locks(&self) -> usize {
        self.locks.live_count()
    }

    /// Advances one session by a single turn. Missing or blank inputs are
    /// normalized first: no session id starts a fresh session, a blank
    /// reply is treated as no reply.
    pub async fn execute_turn(
        &self,
        session_id: Option<&str>,
        user_reply: Option<&str>,
    ) -> Result<TurnResult, EngineError> {
        let session_id = match session_id.map(str::trim).filter(|id| !id.is_empty()) {
            Some(id) => id.to_string(),
            None => Uuid::new_v4().simple().to_string(),
        };
        let user_reply = user_reply.map(str::trim).filter(|reply| !reply.is_empty());

        let session_lock = self.locks.lock_for(&session_id);
        let result = {
            let _turn_guard = session_lock.lock().await;
            self.advance(&session_id, user_reply).await
        };
        drop(session_lock);
        self.locks.release(&session_id);
        result
    }

    async fn advance(
        &self,
        session_id: &str,
        user_reply: Option<&str>,
    ) -> Result<TurnResult, EngineError> {
        let mut record = match self.conversations.find(session_id).await? {
            Some(record) => record,
            None => {
                let record = ConversationRecord::new(session_id);
                self.conversations.create(&record).await?;
                record
            }
        };

        if record.completed {
            return self.replay_completed(record).await;
        }

        if let Some(reply) = user_reply {
            let message = Message::user(reply);
            self.conversations.append_message(session_id, &message).await?;
            record.history.push(message);
        }

        let extraction = self.extractor.extract(&record.history).await;
        debug!(
            event_name = "agent.turn.extracted",
            session_id = %session_id,
            action = ?extraction.action,
            "extraction complete"
        );

        let (mut collected, mut missing) = reconcile(&record.collected, &extraction, user_reply);

        if missing.is_empty() {
            match validate_collected(&collected) {
                Ok(payload) => {
                    let created = self.loans.create(&payload).await?;
                    // The saving turn emits no follow-up question and
                    // appends nothing to the transcript; the terminal
                    // write carries the final field set instead.
                    self.conversations.mark_completed(session_id, &collected, created.id).await?;
                    info!(
                        event_name = "agent.turn.completed",
                        session_id = %session_id,
                        loan_id = created.id,
                        "loan request finalized"
                    );
                    return Ok(TurnResult {
                        session_id: session_id.to_string(),
                        next_question: None,
                        pending_fields: Vec::new(),
                        collected,
                        completed: true,
                        loan: Some(created),
                    });
                }
                Err(invalid) => {
                    // Evict the offending values so the next question asks
                    // for them again rather than looping on bad data.
                    for field in &invalid {
                        collected.remove(field.name());
                    }
                    missing = missing_fields(&collected);
                    debug!(
                        event_name = "agent.turn.evicted",
                        session_id = %session_id,
                        fields = ?field_names(&invalid),
                        "invalid values evicted for re-ask"
                    );
                }
            }
        }

        let question = missing
            .first()
            .map(|field| field.prompt().to_string())
            .unwrap_or_else(|| CLARIFY_PROMPT.to_string());

        let assistant = Message::assistant(&question);
        self.conversations.save_progress(session_id, &collected, &assistant).await?;

        Ok(TurnResult {
            session_id: session_id.to_string(),
            next_question: Some(question),
            pending_fields: field_names(&missing),
            collected,
            completed: false,
            loan: None,
        })
    }

    /// Completed sessions replay their terminal state without touching the
    /// extractor or the stores, so repeated delivery of the final request
    /// is harmless.
    async fn replay_completed(&self, record: ConversationRecord) -> Result<TurnResult, EngineError> {
        let loan = match record.loan_id {
            Some(id) => self.loans.find_by_id(id).await?,
            None => None,
        };
        Ok(TurnResult {
            session_id: record.conversation_id,
            next_question: None,
            pending_fields: Vec::new(),
            collected: record.collected,
            completed: true,
            loan,
        })
    }
}
