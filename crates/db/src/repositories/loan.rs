use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::Row;

use loanbot_core::domain::loan::{Loan, LoanCreate, LOAN_STATUS_PENDING};

use super::{LoanRepository, RepositoryError};
use crate::DbPool;

pub struct SqlLoanRepository {
    pool: DbPool,
}

impl SqlLoanRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn row_to_loan(row: &sqlx::sqlite::SqliteRow) -> Result<Loan, RepositoryError> {
    let id: i64 = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let applicant_name: String =
        row.try_get("applicant_name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let applicant_email: String =
        row.try_get("applicant_email").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let amount: f64 = row.try_get("amount").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let purpose: String =
        row.try_get("purpose").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let status: String =
        row.try_get("status").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let extra_raw: String =
        row.try_get("extra").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at_str: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let updated_at_str: String =
        row.try_get("updated_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let extra: Value = serde_json::from_str(&extra_raw)
        .map_err(|e| RepositoryError::Decode(format!("loan.extra is not valid JSON: {e}")))?;

    Ok(Loan {
        id,
        applicant_name,
        applicant_email,
        amount,
        purpose,
        status,
        extra,
        created_at: parse_timestamp(&created_at_str),
        updated_at: parse_timestamp(&updated_at_str),
    })
}

#[async_trait::async_trait]
impl LoanRepository for SqlLoanRepository {
    async fn create(&self, payload: &LoanCreate) -> Result<Loan, RepositoryError> {
        let now = Utc::now();
        let extra = payload.extra.clone().unwrap_or_else(|| Value::Object(Default::default()));
        let extra_raw = serde_json::to_string(&extra)
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;

        let result = sqlx::query(
            "INSERT INTO loans (applicant_name, applicant_email, amount, purpose, status,
                                extra, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&payload.applicant_name)
        .bind(&payload.applicant_email)
        .bind(payload.amount)
        .bind(&payload.purpose)
        .bind(LOAN_STATUS_PENDING)
        .bind(&extra_raw)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(Loan {
            id: result.last_insert_rowid(),
            applicant_name: payload.applicant_name.clone(),
            applicant_email: payload.applicant_email.clone(),
            amount: payload.amount,
            purpose: payload.purpose.clone(),
            status: LOAN_STATUS_PENDING.to_string(),
            extra,
            created_at: now,
            updated_at: now,
        })
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Loan>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, applicant_name, applicant_email, amount, purpose, status,
                    extra, created_at, updated_at
             FROM loans WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_loan(r)?)),
            None => Ok(None),
        }
    }

    async fn list(&self) -> Result<Vec<Loan>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, applicant_name, applicant_email, amount, purpose, status,
                    extra, created_at, updated_at
             FROM loans ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_loan).collect()
    }
}

#[cfg(test)]
mod tests {
    use loanbot_core::config::DatabaseConfig;
    use loanbot_core::domain::loan::LoanCreate;
    use serde_json::json;

    use super::SqlLoanRepository;
    use crate::repositories::LoanRepository;
    use crate::{connect, migrations};

    async fn repo() -> SqlLoanRepository {
        let database = DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            timeout_secs: 30,
        };
        let pool = connect(&database).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrate");
        SqlLoanRepository::new(pool)
    }

    fn payload() -> LoanCreate {
        LoanCreate {
            applicant_name: "Alex Customer".to_string(),
            applicant_email: "alex@example.com".to_string(),
            amount: 500.0,
            purpose: "car repair".to_string(),
            extra: Some(json!({"source": "agent-loop"})),
        }
    }

    #[tokio::test]
    async fn create_then_find_round_trips() {
        let repo = repo().await;

        let created = repo.create(&payload()).await.expect("create loan");
        assert_eq!(created.status, "pending");
        assert_eq!(created.extra, json!({"source": "agent-loop"}));

        let found = repo.find_by_id(created.id).await.expect("find loan").expect("loan exists");
        assert_eq!(found.applicant_name, "Alex Customer");
        assert_eq!(found.amount, 500.0);
    }

    #[tokio::test]
    async fn find_missing_loan_returns_none() {
        let repo = repo().await;
        assert!(repo.find_by_id(42).await.expect("query").is_none());
    }

    #[tokio::test]
    async fn list_returns_loans_in_insertion_order() {
        let repo = repo().await;

        let first = repo.create(&payload()).await.expect("create first");
        let mut second_payload = payload();
        second_payload.applicant_name = "Bea Customer".to_string();
        let second = repo.create(&second_payload).await.expect("create second");

        let loans = repo.list().await.expect("list loans");
        assert_eq!(
            loans.iter().map(|loan| loan.id).collect::<Vec<_>>(),
            vec![first.id, second.id]
        );
    }
}
