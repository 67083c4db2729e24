use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Number, Value};

/// The four required intake fields, in fixed priority order. Follow-up
/// questions are always asked for the first missing field in this order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Field {
    ApplicantName,
    ApplicantEmail,
    Amount,
    Purpose,
}

pub const FIELD_ORDER: [Field; 4] =
    [Field::ApplicantName, Field::ApplicantEmail, Field::Amount, Field::Purpose];

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}")
            .unwrap_or_else(|_| unreachable!("email pattern is a valid literal"))
    })
}

impl Field {
    pub const fn name(self) -> &'static str {
        match self {
            Self::ApplicantName => "applicant_name",
            Self::ApplicantEmail => "applicant_email",
            Self::Amount => "amount",
            Self::Purpose => "purpose",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        FIELD_ORDER.into_iter().find(|field| field.name() == name)
    }

    pub const fn prompt(self) -> &'static str {
        match self {
            Self::ApplicantName => "What is the applicant's full name?",
            Self::ApplicantEmail => "What's the best email for you?",
            Self::Amount => "How much are you looking to borrow?",
            Self::Purpose => "What will you use the funds for?",
        }
    }

    /// Coerces a raw user reply into a value for this slot. `None` means
    /// the reply could not be mapped and the slot stays unassigned.
    pub fn coerce(self, reply: &str) -> Option<Value> {
        match self {
            Self::Amount => parse_amount_text(reply).and_then(Number::from_f64).map(Value::Number),
            Self::ApplicantEmail => {
                // No match still assigns the raw reply: it fails validation
                // downstream and forces a re-ask instead of a stall.
                let value = email_pattern()
                    .find(reply)
                    .map(|found| found.as_str().to_string())
                    .unwrap_or_else(|| reply.to_string());
                Some(Value::String(value))
            }
            Self::ApplicantName | Self::Purpose => Some(Value::String(reply.to_string())),
        }
    }

    pub fn is_valid(self, value: &Value) -> bool {
        match self {
            Self::ApplicantName | Self::Purpose => {
                value.as_str().map(|text| !text.trim().is_empty()).unwrap_or(false)
            }
            Self::ApplicantEmail => {
                value.as_str().map(|text| email_pattern().is_match(text)).unwrap_or(false)
            }
            Self::Amount => amount_value(value).map(|amount| amount > 0.0).unwrap_or(false),
        }
    }
}

/// Numeric view of an amount slot. Externally supplied values may arrive
/// as JSON numbers or as numeric strings.
pub fn amount_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn parse_amount_text(reply: &str) -> Option<f64> {
    let cleaned: String = reply.chars().filter(|ch| *ch != ',' && *ch != '$').collect();
    cleaned.trim().parse::<f64>().ok()
}

/// Required fields absent from `collected`, in priority order. Presence is
/// key-based; validity is checked separately at finalization.
pub fn missing_fields(collected: &Map<String, Value>) -> Vec<Field> {
    FIELD_ORDER.into_iter().filter(|field| !collected.contains_key(field.name())).collect()
}

pub fn field_names(fields: &[Field]) -> Vec<String> {
    fields.iter().map(|field| field.name().to_string()).collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{missing_fields, Field, FIELD_ORDER};

    #[test]
    fn amount_coercion_strips_separators_and_currency() {
        let value = Field::Amount.coerce("$1,200.50").expect("amount should parse");
        assert_eq!(value, json!(1200.50));
    }

    #[test]
    fn amount_coercion_rejects_non_numbers() {
        assert!(Field::Amount.coerce("not a number").is_none());
    }

    #[test]
    fn email_coercion_extracts_address_from_prose() {
        let value = Field::ApplicantEmail
            .coerce("reach me at a.b@example.com thanks")
            .expect("email slot always assigns");
        assert_eq!(value, json!("a.b@example.com"));
    }

    #[test]
    fn email_coercion_falls_back_to_raw_reply() {
        let value = Field::ApplicantEmail.coerce("no address here").expect("assigns verbatim");
        assert_eq!(value, json!("no address here"));
        assert!(!Field::ApplicantEmail.is_valid(&value));
    }

    #[test]
    fn amount_validates_numeric_strings_but_not_prose() {
        assert!(Field::Amount.is_valid(&json!("500")));
        assert!(Field::Amount.is_valid(&json!(500.0)));
        assert!(!Field::Amount.is_valid(&json!("$500")));
        assert!(!Field::Amount.is_valid(&json!(0)));
        assert!(!Field::Amount.is_valid(&json!(-10)));
    }

    #[test]
    fn name_and_purpose_reject_blank_strings() {
        assert!(Field::ApplicantName.is_valid(&json!("Alex")));
        assert!(!Field::ApplicantName.is_valid(&json!("   ")));
        assert!(!Field::Purpose.is_valid(&json!(null)));
    }

    #[test]
    fn missing_fields_follow_priority_order() {
        let mut collected = serde_json::Map::new();
        collected.insert("applicant_email".to_string(), json!("a@b.co"));

        let missing = missing_fields(&collected);
        assert_eq!(missing, vec![Field::ApplicantName, Field::Amount, Field::Purpose]);

        let empty = serde_json::Map::new();
        assert_eq!(missing_fields(&empty), FIELD_ORDER.to_vec());
    }
}
