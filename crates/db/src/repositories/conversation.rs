use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::Row;

use loanbot_core::domain::conversation::{ConversationRecord, Message};

use super::{ConversationRepository, RepositoryError};
use crate::DbPool;

pub struct SqlConversationRepository {
    pool: DbPool,
}

impl SqlConversationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

/// Wire form of the history column, kept as `{"messages":[...]}` so the
/// column stays self-describing.
#[derive(Debug, Default, Serialize, Deserialize)]
struct HistoryDoc {
    messages: Vec<Message>,
}

fn decode_history(raw: &str) -> Result<Vec<Message>, RepositoryError> {
    let doc: HistoryDoc = serde_json::from_str(raw)
        .map_err(|e| RepositoryError::Decode(format!("session history is not valid JSON: {e}")))?;
    Ok(doc.messages)
}

fn encode_history(messages: &[Message]) -> Result<String, RepositoryError> {
    serde_json::to_string(&HistoryDoc { messages: messages.to_vec() })
        .map_err(|e| RepositoryError::Decode(e.to_string()))
}

fn decode_collected(raw: &str) -> Result<Map<String, Value>, RepositoryError> {
    serde_json::from_str(raw)
        .map_err(|e| RepositoryError::Decode(format!("partial_fields is not valid JSON: {e}")))
}

fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<ConversationRecord, RepositoryError> {
    let conversation_id: String =
        row.try_get("conversation_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let partial_fields: String =
        row.try_get("partial_fields").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let history: String =
        row.try_get("history").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let completed: bool =
        row.try_get("completed").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let loan_id: Option<i64> =
        row.try_get("loan_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(ConversationRecord {
        conversation_id,
        history: decode_history(&history)?,
        collected: decode_collected(&partial_fields)?,
        completed,
        loan_id,
    })
}

const SELECT_SESSION: &str = "SELECT conversation_id, partial_fields, history, completed, loan_id
     FROM loan_sessions WHERE conversation_id = ?";

#[async_trait::async_trait]
impl ConversationRepository for SqlConversationRepository {
    async fn find(
        &self,
        conversation_id: &str,
    ) -> Result<Option<ConversationRecord>, RepositoryError> {
        let row = sqlx::query(SELECT_SESSION)
            .bind(conversation_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_record(r)?)),
            None => Ok(None),
        }
    }

    async fn create(&self, record: &ConversationRecord) -> Result<(), RepositoryError> {
        let now = Utc::now().to_rfc3339();
        let partial_fields = serde_json::to_string(&record.collected)
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let history = encode_history(&record.history)?;

        sqlx::query(
            "INSERT INTO loan_sessions (conversation_id, partial_fields, history, completed,
                                        loan_id, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.conversation_id)
        .bind(&partial_fields)
        .bind(&history)
        .bind(record.completed)
        .bind(record.loan_id)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn append_message(
        &self,
        conversation_id: &str,
        message: &Message,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT history FROM loan_sessions WHERE conversation_id = ?")
            .bind(conversation_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| RepositoryError::SessionNotFound(conversation_id.to_string()))?;

        let history_raw: String =
            row.try_get("history").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let mut messages = decode_history(&history_raw)?;
        messages.push(message.clone());

        sqlx::query(
            "UPDATE loan_sessions SET history = ?, updated_at = ? WHERE conversation_id = ?",
        )
        .bind(encode_history(&messages)?)
        .bind(Utc::now().to_rfc3339())
        .bind(conversation_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn save_progress(
        &self,
        conversation_id: &str,
        collected: &Map<String, Value>,
        assistant: &Message,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT history FROM loan_sessions WHERE conversation_id = ?")
            .bind(conversation_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| RepositoryError::SessionNotFound(conversation_id.to_string()))?;

        let history_raw: String =
            row.try_get("history").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let mut messages = decode_history(&history_raw)?;
        messages.push(assistant.clone());

        let partial_fields =
            serde_json::to_string(collected).map_err(|e| RepositoryError::Decode(e.to_string()))?;

        sqlx::query(
            "UPDATE loan_sessions SET partial_fields = ?, history = ?, updated_at = ?
             WHERE conversation_id = ?",
        )
        .bind(&partial_fields)
        .bind(encode_history(&messages)?)
        .bind(Utc::now().to_rfc3339())
        .bind(conversation_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn mark_completed(
        &self,
        conversation_id: &str,
        collected: &Map<String, Value>,
        loan_id: i64,
    ) -> Result<(), RepositoryError> {
        let partial_fields =
            serde_json::to_string(collected).map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let result = sqlx::query(
            "UPDATE loan_sessions SET partial_fields = ?, completed = 1, loan_id = ?, updated_at = ?
             WHERE conversation_id = ?",
        )
        .bind(&partial_fields)
        .bind(loan_id)
        .bind(Utc::now().to_rfc3339())
        .bind(conversation_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::SessionNotFound(conversation_id.to_string()));
        }

        Ok(())
    }
}
