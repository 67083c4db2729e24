use async_trait::async_trait;
use serde_json::{Map, Value};

use loanbot_core::domain::conversation::{Message, Role};

use crate::extraction::{ExtractionResult, Extractor};
use crate::schema;

/// Deterministic, network-free extraction strategy.
///
/// The most recent user message is scanned; if its content is a JSON
/// object it is taken as directly supplied field values. This is an
/// intentional first-class strategy for offline and test deployments
/// (config `llm.provider = "rule_based"`), and also serves as the
/// availability backstop when the LLM endpoint is unreachable.
#[derive(Clone, Copy, Debug, Default)]
pub struct RuleBasedExtractor;

impl RuleBasedExtractor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Extractor for RuleBasedExtractor {
    async fn extract(&self, transcript: &[Message]) -> ExtractionResult {
        let collected = transcript
            .iter()
            .rev()
            .find(|message| message.role == Role::User)
            .and_then(|message| {
                serde_json::from_str::<Map<String, Value>>(message.content.trim()).ok()
            })
            .unwrap_or_default();

        let missing = schema::missing_fields(&collected);
        if missing.is_empty() {
            ExtractionResult::save(collected)
        } else {
            ExtractionResult::ask_for(missing, collected)
        }
    }
}

#[cfg(test)]
mod tests {
    use loanbot_core::domain::conversation::Message;
    use serde_json::json;

    use super::RuleBasedExtractor;
    use crate::extraction::{ExtractionAction, Extractor};

    #[tokio::test]
    async fn empty_transcript_asks_for_the_first_field() {
        let result = RuleBasedExtractor::new().extract(&[]).await;

        assert_eq!(result.action, ExtractionAction::Ask);
        assert_eq!(result.question.as_deref(), Some("What is the applicant's full name?"));
        assert_eq!(
            result.missing,
            vec!["applicant_name", "applicant_email", "amount", "purpose"]
        );
    }

    #[tokio::test]
    async fn plain_text_reply_collects_nothing() {
        let transcript =
            vec![Message::assistant("What is the applicant's full name?"), Message::user("Alex")];
        let result = RuleBasedExtractor::new().extract(&transcript).await;

        assert!(result.collected.is_empty());
        assert_eq!(result.action, ExtractionAction::Ask);
    }

    #[tokio::test]
    async fn inline_json_reply_is_taken_as_supplied_fields() {
        let transcript = vec![Message::user(
            r#"{"applicant_name":"Alex","applicant_email":"a@b.co","amount":500,"purpose":"car"}"#,
        )];
        let result = RuleBasedExtractor::new().extract(&transcript).await;

        assert_eq!(result.action, ExtractionAction::Save);
        assert!(result.missing.is_empty());
        assert_eq!(result.collected.get("amount"), Some(&json!(500)));
    }

    #[tokio::test]
    async fn partial_inline_json_asks_for_the_next_missing_field() {
        let transcript = vec![Message::user(r#"{"applicant_name":"Alex"}"#)];
        let result = RuleBasedExtractor::new().extract(&transcript).await;

        assert_eq!(result.action, ExtractionAction::Ask);
        assert_eq!(result.question.as_deref(), Some("What's the best email for you?"));
        assert_eq!(result.missing, vec!["applicant_email", "amount", "purpose"]);
    }

    #[tokio::test]
    async fn only_the_latest_user_message_is_scanned() {
        let transcript = vec![
            Message::user(r#"{"applicant_name":"Alex"}"#),
            Message::assistant("What's the best email for you?"),
            Message::user("just text"),
        ];
        let result = RuleBasedExtractor::new().extract(&transcript).await;

        assert!(result.collected.is_empty());
    }
}
