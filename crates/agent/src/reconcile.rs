use serde_json::{json, Map, Value};

use loanbot_core::domain::loan::LoanCreate;

use crate::extraction::ExtractionResult;
use crate::schema::{missing_fields, Field, FIELD_ORDER};

/// Merge newly extracted values over the existing state. Right-biased and
/// capped to the known field names, so a confused model can never grow the
/// record with invented keys.
pub fn merge_collected(existing: &Map<String, Value>, incoming: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = existing.clone();
    for (key, value) in incoming {
        if Field::from_name(key).is_some() {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}

/// Combine existing state with an extraction result, then apply the
/// heuristic backstop: whenever fields remain missing and the user said
/// something, the reply is assigned to the highest-priority missing field
/// after per-field coercion. Returns the updated state and the fields
/// still missing.
pub fn reconcile(
    existing: &Map<String, Value>,
    extraction: &ExtractionResult,
    user_reply: Option<&str>,
) -> (Map<String, Value>, Vec<Field>) {
    let mut collected = merge_collected(existing, &extraction.collected);
    let mut missing = missing_fields(&collected);

    if let (Some(reply), Some(field)) = (user_reply, missing.first().copied()) {
        if let Some(value) = field.coerce(reply) {
            collected.insert(field.name().to_string(), value);
            missing = missing_fields(&collected);
        }
    }

    (collected, missing)
}

/// Validate a complete set of collected values into a loan request. On
/// failure the offending fields are returned so the caller can evict them
/// and re-ask.
pub fn validate_collected(collected: &Map<String, Value>) -> Result<LoanCreate, Vec<Field>> {
    let invalid: Vec<Field> = FIELD_ORDER
        .into_iter()
        .filter(|field| {
            !collected
                .get(field.name())
                .map(|value| field.is_valid(value))
                .unwrap_or(false)
        })
        .collect();
    if !invalid.is_empty() {
        return Err(invalid);
    }

    let amount = collected
        .get(Field::Amount.name())
        .and_then(crate::schema::amount_value)
        .ok_or_else(|| vec![Field::Amount])?;

    Ok(LoanCreate {
        applicant_name: text_value(collected, Field::ApplicantName),
        applicant_email: text_value(collected, Field::ApplicantEmail),
        amount,
        purpose: text_value(collected, Field::Purpose),
        extra: Some(json!({ "source": "agent-loop" })),
    })
}

fn text_value(collected: &Map<String, Value>, field: Field) -> String {
    match collected.get(field.name()) {
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}
