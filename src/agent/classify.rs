//! Task type inference for quick-post prompts

use tracing::debug;

use crate::llm::{complete_text, LlmProvider};
use crate::store::TaskType;

const CLASSIFY_MAX_CHARS: usize = 2000;

const EXTRACTION_KEYWORDS: [&str; 6] = ["extract", "json", "fields", "table", "columns", "key-value"];

/// Keyword fallback when no model answer is available
pub fn classify_by_keywords(text: &str) -> TaskType {
    let lowered = text.to_lowercase();
    if EXTRACTION_KEYWORDS.iter().any(|k| lowered.contains(k)) {
        TaskType::DataExtraction
    } else {
        TaskType::Summarization
    }
}

fn classification_prompt(text: &str) -> String {
    [
        "Classify the following task into one of these labels strictly: SUMMARIZATION or DATA_EXTRACTION.",
        "Return only the label. No extra words.",
        "---",
        text,
    ]
    .join("\n")
}

/// SUMMARIZATION or DATA_EXTRACTION for a free-form prompt
pub async fn classify_task_type(llm: Option<&dyn LlmProvider>, model: &str, prompt: &str) -> TaskType {
    let text: String = prompt.chars().take(CLASSIFY_MAX_CHARS).collect();

    if let Some(llm) = llm.filter(|_| !text.is_empty()) {
        match complete_text(llm, model, None, &classification_prompt(&text), 0.0).await {
            Ok(label) if label.to_uppercase() == "DATA_EXTRACTION" => return TaskType::DataExtraction,
            Ok(_) => return TaskType::Summarization,
            Err(e) => debug!(error = %e, "Classification call failed; using keywords"),
        }
    }

    classify_by_keywords(&text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::mocks::MockLlmProvider;

    #[test]
    fn test_keyword_fallback() {
        assert_eq!(classify_by_keywords("Extract the prices"), TaskType::DataExtraction);
        assert_eq!(classify_by_keywords("give me a KEY-VALUE list"), TaskType::DataExtraction);
        assert_eq!(classify_by_keywords("Summarize this article"), TaskType::Summarization);
        assert_eq!(classify_by_keywords(""), TaskType::Summarization);
    }

    #[tokio::test]
    async fn test_model_label_wins() {
        let provider = MockLlmProvider::with_responses(vec!["data_extraction".to_string()]);
        let result = classify_task_type(Some(&provider), "m", "Summarize the news").await;
        assert_eq!(result, TaskType::DataExtraction);

        let request = &provider.requests()[0];
        assert_eq!(request.temperature, Some(0.0));
        assert!(request.messages[0].content.ends_with("---\nSummarize the news"));
    }

    #[tokio::test]
    async fn test_unexpected_label_means_summarization() {
        let provider = MockLlmProvider::with_responses(vec!["CAPTIONS".to_string()]);
        let result = classify_task_type(Some(&provider), "m", "extract json fields").await;
        assert_eq!(result, TaskType::Summarization);
    }

    #[tokio::test]
    async fn test_failure_uses_keywords() {
        let provider = MockLlmProvider::failing();
        let result = classify_task_type(Some(&provider), "m", "Build a table of columns").await;
        assert_eq!(result, TaskType::DataExtraction);
    }

    #[tokio::test]
    async fn test_empty_prompt_skips_model() {
        let provider = MockLlmProvider::with_responses(vec!["DATA_EXTRACTION".to_string()]);
        let result = classify_task_type(Some(&provider), "m", "").await;
        assert_eq!(result, TaskType::Summarization);
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_prompt_is_capped() {
        let provider = MockLlmProvider::with_responses(vec!["SUMMARIZATION".to_string()]);
        let long = "a".repeat(5000);
        classify_task_type(Some(&provider), "m", &long).await;
        let content = &provider.requests()[0].messages[0].content;
        assert!(content.ends_with(&format!("---\n{}", "a".repeat(2000))));
        assert!(!content.contains(&"a".repeat(2001)));
    }
}
