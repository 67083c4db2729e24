use std::sync::Arc;

use serde::Serialize;

use loanbot_agent::{IntakeEngine, RuleBasedExtractor};
use loanbot_db::repositories::{InMemoryConversationRepository, InMemoryLoanRepository};

use crate::commands::CommandResult;

#[derive(Debug, Serialize)]
struct IntakeTurn {
    reply: Option<String>,
    question: Option<String>,
    pending_fields: Vec<String>,
}

#[derive(Debug, Serialize)]
struct IntakeReport {
    session_id: String,
    completed: bool,
    turns: Vec<IntakeTurn>,
    collected: serde_json::Map<String, serde_json::Value>,
    loan_amount: Option<f64>,
}

/// Offline intake run against the rule-based extractor and in-memory
/// stores. Each line of the input text is fed as one applicant reply, the
/// way an email body gets consumed turn by turn.
pub fn run(text: Option<&str>, max_turns: usize) -> CommandResult {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "intake",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let report = runtime.block_on(run_conversation(text, max_turns));
    match report {
        Ok(report) => match serde_json::to_string_pretty(&report) {
            Ok(rendered) => CommandResult { exit_code: 0, output: rendered },
            Err(error) => CommandResult::failure(
                "intake",
                "serialization",
                format!("failed to render intake report: {error}"),
                6,
            ),
        },
        Err(message) => CommandResult::failure("intake", "conversation", message, 5),
    }
}

async fn run_conversation(text: Option<&str>, max_turns: usize) -> Result<IntakeReport, String> {
    let engine = IntakeEngine::new(
        Arc::new(RuleBasedExtractor::new()),
        Arc::new(InMemoryConversationRepository::default()),
        Arc::new(InMemoryLoanRepository::default()),
    );

    let mut replies = text
        .unwrap_or_default()
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect::<Vec<_>>()
        .into_iter();

    let mut session_id: Option<String> = None;
    let mut turns = Vec::new();
    let mut last = None;

    for _ in 0..max_turns.max(1) {
        let reply = replies.next();
        let result = engine
            .execute_turn(session_id.as_deref(), reply.as_deref())
            .await
            .map_err(|error| format!("turn failed: {error}"))?;

        session_id = Some(result.session_id.clone());
        turns.push(IntakeTurn {
            reply,
            question: result.next_question.clone(),
            pending_fields: result.pending_fields.clone(),
        });

        let done = result.completed;
        last = Some(result);
        if done {
            break;
        }
        if replies.len() == 0 {
            break;
        }
    }

    let last = last.ok_or_else(|| "conversation produced no turns".to_string())?;
    Ok(IntakeReport {
        session_id: last.session_id,
        completed: last.completed,
        turns,
        collected: last.collected,
        loan_amount: last.loan.map(|loan| loan.amount),
    })
}
