use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const LOAN_STATUS_PENDING: &str = "pending";

/// Payload for creating a loan record. Field-level validation happens in
/// the intake engine before this is ever constructed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LoanCreate {
    pub applicant_name: String,
    pub applicant_email: String,
    pub amount: f64,
    pub purpose: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Loan {
    pub id: i64,
    pub applicant_name: String,
    pub applicant_email: String,
    pub amount: f64,
    pub purpose: String,
    pub status: String,
    pub extra: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
