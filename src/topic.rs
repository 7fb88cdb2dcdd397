//! Topic extraction.
//!
//! Asks the generation model to name the single medical topic in a free-text
//! question, or the literal absence marker when there is none. The result is
//! probabilistic: no retry and no validation against a topic vocabulary. A
//! hallucinated topic is still accepted and used as a fetch key.

use anyhow::Result;

use crate::llm::GenerationModel;

/// Literal marker the model is instructed to return when no medical topic
/// is recognizable. Matched case-insensitively after trimming.
pub const NO_TOPIC_MARKER: &str = "NONE";

fn extraction_prompt(question: &str) -> String {
    format!(
        "Identify the single medical condition or subject this question is about.\n\
         Reply with only the topic name, in a few words at most.\n\
         If the question has no recognizable medical topic, reply with exactly {}.\n\n\
         Question:\n{}\n\nTopic:",
        NO_TOPIC_MARKER, question
    )
}

/// Extract a medical topic from a question.
///
/// Returns `Ok(None)` when the model reports the absence marker; that is an
/// expected outcome, not an error.
pub async fn extract_topic(
    model: &dyn GenerationModel,
    question: &str,
) -> Result<Option<String>> {
    let response = model.complete(&extraction_prompt(question)).await?;
    let topic = response.trim();

    if topic.is_empty() || topic.eq_ignore_ascii_case(NO_TOPIC_MARKER) {
        return Ok(None);
    }

    Ok(Some(topic.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct ScriptedModel {
        responses: Mutex<Vec<String>>,
    }

    impl ScriptedModel {
        fn new(response: &str) -> Self {
            Self {
                responses: Mutex::new(vec![response.to_string()]),
            }
        }
    }

    #[async_trait]
    impl GenerationModel for ScriptedModel {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            Ok(self.responses.lock().unwrap().remove(0))
        }
    }

    #[tokio::test]
    async fn returns_trimmed_topic() {
        let model = ScriptedModel::new("  Diabetes \n");
        let topic = extract_topic(&model, "What are early signs of diabetes?")
            .await
            .unwrap();
        assert_eq!(topic.as_deref(), Some("Diabetes"));
    }

    #[tokio::test]
    async fn absence_marker_maps_to_none() {
        let model = ScriptedModel::new("NONE");
        assert!(extract_topic(&model, "What is the capital of France?")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn absence_marker_is_case_insensitive() {
        let model = ScriptedModel::new(" none ");
        assert!(extract_topic(&model, "hello").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn empty_response_maps_to_none() {
        let model = ScriptedModel::new("   ");
        assert!(extract_topic(&model, "hello").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unvalidated_topic_is_accepted() {
        // The extractor does not check against any vocabulary.
        let model = ScriptedModel::new("Quantum Foot Syndrome");
        let topic = extract_topic(&model, "?").await.unwrap();
        assert_eq!(topic.as_deref(), Some("Quantum Foot Syndrome"));
    }
}
