use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::error;

use loanbot_agent::schema::FIELD_ORDER;
use loanbot_agent::{EngineError, Field, IntakeEngine, TurnResult};
use loanbot_core::domain::loan::{Loan, LoanCreate};
use loanbot_db::repositories::{LoanRepository, RepositoryError};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<IntakeEngine>,
    pub loans: Arc<dyn LoanRepository>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/chat/next", post(chat_next))
        .route("/loans", post(create_loan).get(list_loans))
        .route("/loans/{id}", get(get_loan))
        .with_state(state)
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("loan `{0}` not found")]
    LoanNotFound(i64),
    #[error("invalid loan payload")]
    InvalidLoan { problems: Vec<String> },
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ApiError::Engine(source) => {
                error!(event_name = "api.chat.turn_failed", error = %source, "turn failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "conversation turn failed" }),
                )
            }
            ApiError::Repository(source) => {
                error!(event_name = "api.loans.storage_failed", error = %source, "storage failed");
                (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": "storage operation failed" }))
            }
            ApiError::LoanNotFound(id) => {
                (StatusCode::NOT_FOUND, json!({ "error": format!("loan `{id}` not found") }))
            }
            ApiError::InvalidLoan { problems } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({ "error": "invalid loan payload", "problems": problems }),
            ),
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub user_reply: Option<String>,
}

async fn chat_next(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<TurnResult>, ApiError> {
    let result = state
        .engine
        .execute_turn(request.session_id.as_deref(), request.user_reply.as_deref())
        .await?;
    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
pub struct LoanRequest {
    pub applicant_name: String,
    pub applicant_email: String,
    pub amount: f64,
    pub purpose: String,
    #[serde(default)]
    pub extra: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct LoanListResponse {
    pub loans: Vec<Loan>,
}

impl LoanRequest {
    /// Same bar as the conversational path: each field runs through the
    /// schema's per-field validation, so a value the dialogue would evict
    /// cannot slip in through the direct route either.
    fn validate(&self) -> Result<LoanCreate, Vec<String>> {
        let candidate: Map<String, Value> = [
            (Field::ApplicantName, json!(self.applicant_name.trim())),
            (Field::ApplicantEmail, json!(self.applicant_email.trim())),
            (Field::Amount, json!(self.amount)),
            (Field::Purpose, json!(self.purpose.trim())),
        ]
        .into_iter()
        .map(|(field, value)| (field.name().to_string(), value))
        .collect();
        let problems: Vec<String> = FIELD_ORDER
            .into_iter()
            .filter(|field| {
                !candidate
                    .get(field.name())
                    .map(|value| field.is_valid(value))
                    .unwrap_or(false)
            })
            .map(problem_for)
            .collect();
        if !problems.is_empty() {
            return Err(problems);
        }

        Ok(LoanCreate {
            applicant_name: self.applicant_name.trim().to_string(),
            applicant_email: self.applicant_email.trim().to_string(),
            amount: self.amount,
            purpose: self.purpose.trim().to_string(),
            extra: self.extra.clone(),
        })
    }
}

fn problem_for(field: Field) -> String {
    match field {
        Field::ApplicantName => "applicant_name must not be empty",
        Field::ApplicantEmail => "applicant_email must be an email address",
        Field::Amount => "amount must be greater than zero",
        Field::Purpose => "purpose must not be empty",
    }
    .to_string()
}

async fn create_loan(
    State(state): State<AppState>,
    Json(request): Json<LoanRequest>,
) -> Result<(StatusCode, Json<Loan>), ApiError> {
    let payload =
        request.validate().map_err(|problems| ApiError::InvalidLoan { problems })?;
    let loan = state.loans.create(&payload).await?;
    Ok((StatusCode::CREATED, Json(loan)))
}

async fn list_loans(State(state): State<AppState>) -> Result<Json<LoanListResponse>, ApiError> {
    let loans = state.loans.list().await?;
    Ok(Json(LoanListResponse { loans }))
}

async fn get_loan(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Loan>, ApiError> {
    let loan = state.loans.find_by_id(id).await?.ok_or(ApiError::LoanNotFound(id))?;
    Ok(Json(loan))
}
