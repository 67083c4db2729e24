use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use loanbot_core::domain::conversation::{ConversationRecord, Message};
use loanbot_core::domain::loan::{Loan, LoanCreate};

pub mod conversation;
pub mod loan;
pub mod memory;

pub use conversation::SqlConversationRepository;
pub use loan::SqlLoanRepository;
pub use memory::{InMemoryConversationRepository, InMemoryLoanRepository};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("conversation session `{0}` not found")]
    SessionNotFound(String),
}

/// Conversation state store. Each mutation is an atomic read-modify-write
/// on one session record; update operations fail with `SessionNotFound`
/// when the record referenced by an in-flight turn has disappeared.
#[async_trait]
pub trait ConversationRepository: Send + Sync {
    async fn find(&self, conversation_id: &str)
        -> Result<Option<ConversationRecord>, RepositoryError>;

    async fn create(&self, record: &ConversationRecord) -> Result<(), RepositoryError>;

    /// Appends one message to the session history.
    async fn append_message(
        &self,
        conversation_id: &str,
        message: &Message,
    ) -> Result<(), RepositoryError>;

    /// Replaces the collected fields and appends the assistant follow-up in
    /// one write.
    async fn save_progress(
        &self,
        conversation_id: &str,
        collected: &Map<String, Value>,
        assistant: &Message,
    ) -> Result<(), RepositoryError>;

    /// Stores the final collected fields, marks the session completed, and
    /// attaches the finalized loan id in one write. Terminal: callers must
    /// never mutate the session afterwards.
    async fn mark_completed(
        &self,
        conversation_id: &str,
        collected: &Map<String, Value>,
        loan_id: i64,
    ) -> Result<(), RepositoryError>;
}

/// Loan creation sink plus the read side used for replay and listing.
#[async_trait]
pub trait LoanRepository: Send + Sync {
    async fn create(&self, payload: &LoanCreate) -> Result<Loan, RepositoryError>;
    async fn find_by_id(&self, id: i64) -> Result<Option<Loan>, RepositoryError>;
    async fn list(&self) -> Result<Vec<Loan>, RepositoryError>;
}
