//! Intent classification.
//!
//! One completion call with a closed three-label vocabulary. Output outside
//! the vocabulary coerces to the conversational default, and quota
//! exhaustion degrades to the same default, so a throttled classifier never
//! fails the request on its own.

use crate::completion::{CompletionErrorKind, CompletionService};
use crate::error::EngineError;
use crate::models::QueryIntent;

/// Accessible objects shown as classification context, truncated at this
/// count with an "and N more" suffix.
const CONTEXT_OBJECT_LIMIT: usize = 10;

pub fn classification_prompt(message: &str, accessible_objects: &[String]) -> String {
    let listed = accessible_objects
        .iter()
        .take(CONTEXT_OBJECT_LIMIT)
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let more = if accessible_objects.len() > CONTEXT_OBJECT_LIMIT {
        format!(" and {} more", accessible_objects.len() - CONTEXT_OBJECT_LIMIT)
    } else {
        String::new()
    };

    format!(
        r#"You are an AI assistant that helps classify user questions.

Classify the following user message into exactly one of these categories:
- "conversational": greetings, jokes, casual questions about yourself or chit-chat.
- "database_query": asking about structured data from database tables or business-related information.
- "resume_query": asking about people, candidates, resumes, individual names, skills, work experience, job roles, certifications, technologies known, years of experience.

Message: "{message}"

Available database tables: {listed}{more}

Return only one word: "conversational", "database_query", or "resume_query"."#
    )
}

/// Classify a message into a [`QueryIntent`].
pub async fn classify_intent(
    completion: &dyn CompletionService,
    message: &str,
    accessible_objects: &[String],
) -> Result<QueryIntent, EngineError> {
    let prompt = classification_prompt(message, accessible_objects);
    match completion.complete(&prompt, 0.1, 20).await {
        Ok(text) => {
            let label = text.trim().to_lowercase();
            let intent = QueryIntent::from_label(&label).unwrap_or(QueryIntent::Conversational);
            tracing::info!(label = %label, intent = intent.as_label(), "classified message");
            Ok(intent)
        }
        Err(err) if err.kind == CompletionErrorKind::QuotaExceeded => {
            tracing::warn!("classification degraded to conversational: {}", err);
            Ok(QueryIntent::Conversational)
        }
        Err(err) => Err(EngineError::Other(anyhow::anyhow!(err))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_lists_objects() {
        let objects = vec!["Candidate".to_string(), "Employee".to_string()];
        let prompt = classification_prompt("show data", &objects);
        assert!(prompt.contains("Available database tables: Candidate, Employee\n"));
        assert!(!prompt.contains("more"));
    }

    #[test]
    fn test_prompt_truncates_to_ten_with_suffix() {
        let objects: Vec<String> = (0..14).map(|i| format!("Table{i}")).collect();
        let prompt = classification_prompt("show data", &objects);
        assert!(prompt.contains("Table9 and 4 more"));
        assert!(!prompt.contains("Table10"));
    }

    #[test]
    fn test_label_coercion() {
        assert_eq!(
            QueryIntent::from_label("database_query"),
            Some(QueryIntent::StructuredData)
        );
        assert_eq!(
            QueryIntent::from_label("resume_query"),
            Some(QueryIntent::DocumentSearch)
        );
        assert_eq!(QueryIntent::from_label("gibberish"), None);
    }
}
