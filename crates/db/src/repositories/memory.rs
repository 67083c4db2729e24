use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use loanbot_core::domain::conversation::{ConversationRecord, Message};
use loanbot_core::domain::loan::{Loan, LoanCreate, LOAN_STATUS_PENDING};

use super::{ConversationRepository, LoanRepository, RepositoryError};

#[derive(Default)]
pub struct InMemoryConversationRepository {
    sessions: RwLock<HashMap<String, ConversationRecord>>,
}

#[async_trait::async_trait]
impl ConversationRepository for InMemoryConversationRepository {
    async fn find(
        &self,
        conversation_id: &str,
    ) -> Result<Option<ConversationRecord>, RepositoryError> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(conversation_id).cloned())
    }

    async fn create(&self, record: &ConversationRecord) -> Result<(), RepositoryError> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(record.conversation_id.clone(), record.clone());
        Ok(())
    }

    async fn append_message(
        &self,
        conversation_id: &str,
        message: &Message,
    ) -> Result<(), RepositoryError> {
        let mut sessions = self.sessions.write().await;
        let record = sessions
            .get_mut(conversation_id)
            .ok_or_else(|| RepositoryError::SessionNotFound(conversation_id.to_string()))?;
        record.history.push(message.clone());
        Ok(())
    }

    async fn save_progress(
        &self,
        conversation_id: &str,
        collected: &Map<String, Value>,
        assistant: &Message,
    ) -> Result<(), RepositoryError> {
        let mut sessions = self.sessions.write().await;
        let record = sessions
            .get_mut(conversation_id)
            .ok_or_else(|| RepositoryError::SessionNotFound(conversation_id.to_string()))?;
        record.collected = collected.clone();
        record.history.push(assistant.clone());
        Ok(())
    }

    async fn mark_completed(
        &self,
        conversation_id: &str,
        collected: &Map<String, Value>,
        loan_id: i64,
    ) -> Result<(), RepositoryError> {
        let mut sessions = self.sessions.write().await;
        let record = sessions
            .get_mut(conversation_id)
            .ok_or_else(|| RepositoryError::SessionNotFound(conversation_id.to_string()))?;
        record.collected = collected.clone();
        record.completed = true;
        record.loan_id = Some(loan_id);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryLoanRepository {
    loans: RwLock<HashMap<i64, Loan>>,
    next_id: AtomicI64,
}

#[async_trait::async_trait]
impl LoanRepository for InMemoryLoanRepository {
    async fn create(&self, payload: &LoanCreate) -> Result<Loan, RepositoryError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let now = Utc::now();
        let loan = Loan {
            id,
            applicant_name: payload.applicant_name.clone(),
            applicant_email: payload.applicant_email.clone(),
            amount: payload.amount,
            purpose: payload.purpose.clone(),
            status: LOAN_STATUS_PENDING.to_string(),
            extra: payload.extra.clone().unwrap_or_else(|| Value::Object(Default::default())),
            created_at: now,
            updated_at: now,
        };

        let mut loans = self.loans.write().await;
        loans.insert(id, loan.clone());
        Ok(loan)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Loan>, RepositoryError> {
        let loans = self.loans.read().await;
        Ok(loans.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<Loan>, RepositoryError> {
        let loans = self.loans.read().await;
        let mut all: Vec<Loan> = loans.values().cloned().collect();
        all.sort_by_key(|loan| loan.id);
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use loanbot_core::domain::conversation::{ConversationRecord, Message};
    use loanbot_core::domain::loan::LoanCreate;

    use crate::repositories::{
        ConversationRepository, InMemoryConversationRepository, InMemoryLoanRepository,
        LoanRepository, RepositoryError,
    };

    #[tokio::test]
    async fn in_memory_conversation_repo_round_trip() {
        let repo = InMemoryConversationRepository::default();
        let record = ConversationRecord::new("sess-1");

        repo.create(&record).await.expect("create session");
        repo.append_message("sess-1", &Message::user("hello")).await.expect("append");

        let found = repo.find("sess-1").await.expect("find").expect("session exists");
        assert_eq!(found.history.len(), 1);
        assert!(!found.completed);
    }

    #[tokio::test]
    async fn in_memory_conversation_repo_surfaces_missing_session() {
        let repo = InMemoryConversationRepository::default();

        let error = repo
            .append_message("ghost", &Message::user("hello"))
            .await
            .expect_err("missing session should fail");
        assert!(matches!(error, RepositoryError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn in_memory_loan_repo_assigns_sequential_ids() {
        let repo = InMemoryLoanRepository::default();
        let payload = LoanCreate {
            applicant_name: "Alex".to_string(),
            applicant_email: "alex@example.com".to_string(),
            amount: 500.0,
            purpose: "car repair".to_string(),
            extra: None,
        };

        let first = repo.create(&payload).await.expect("create first");
        let second = repo.create(&payload).await.expect("create second");

        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert_eq!(repo.list().await.expect("list").len(), 2);
    }
}
