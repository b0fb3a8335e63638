//! Prompt and instruction text for a task run

use tracing::{debug, warn};

use crate::llm::{complete_text, LlmProvider};
use crate::store::{Task, TaskType};

const INSTRUCTION_WRITER_SYSTEM: &str =
    "You write precise system instructions for an agent that must call tools in a strict order.";

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Persona, output format rules and the task fields that are set
pub fn build_prompt(task: &Task) -> String {
    let mut lines = vec![
        "You are AgenX, an autonomous AI agent that completes micro-tasks.".to_string(),
        "Follow output format rules:".to_string(),
        "- SUMMARIZATION: 3–5 sentence summary.".to_string(),
        "- CAPTIONS: 3–5 caption options, one per line.".to_string(),
        "- DATA_EXTRACTION: concise JSON with key fields.".to_string(),
        "Be concise. If a URL is provided you may summarize based on its content if available."
            .to_string(),
        String::new(),
        format!("TaskType: {}", task.task_type),
    ];
    if let Some(title) = present(&task.title) {
        lines.push(format!("Title: {title}"));
    }
    if let Some(description) = present(&task.description) {
        lines.push(format!("Description: {description}"));
    }
    if let Some(url) = present(&task.source_url) {
        lines.push(format!("SourceURL: {url}"));
    }
    if let Some(input) = present(&task.input_text) {
        lines.push(format!("InputText: {input}"));
    }
    lines.join("\n")
}

fn type_note(task_type: TaskType) -> &'static str {
    match task_type {
        TaskType::DataExtraction => {
            "Task type: DATA_EXTRACTION. Prefer structured bullets and key fields."
        }
        TaskType::Captions => "Task type: CAPTIONS. Produce short, human-friendly captions.",
        TaskType::Summarization => "Task type: SUMMARIZATION. Produce concise bullets.",
    }
}

/// Deterministic strict-order policy used when no model writes the instructions
pub fn build_dynamic_instructions(task: &Task) -> String {
    let mut order = Vec::with_capacity(5);
    if present(&task.source_url).is_some() {
        order.push("- If a sourceUrl exists, first call fetch_url_text({ url }) to ground on-page text.");
    }
    order.push("- Then call research_perplexity({ query }) for concise bullets.");
    order.push("- Then call research_tavily({ query }) to corroborate and get links.");
    order.push("- Optionally call x402_demo_call() once to demonstrate paid HTTP.");
    order.push("- Finally, synthesize bullets + a 1–2 line summary.");

    [
        "You are AgenX. Use tools in this strict order and keep answers concise.".to_string(),
        type_note(task.task_type).to_string(),
        "Policy (strict tool order):".to_string(),
        order.join("\n"),
        String::new(),
        build_prompt(task),
    ]
    .join("\n")
}

/// Numbered tool order handed to the instruction writer
fn tool_order_steps(has_url: bool) -> String {
    let mut steps = Vec::with_capacity(5);
    if has_url {
        steps.push("fetch_url_text({ url })");
    }
    steps.extend([
        "research_perplexity",
        "research_tavily",
        "optional x402_demo_call",
        "synthesize final answer (bullets + 1–2 lines)",
    ]);
    steps
        .iter()
        .enumerate()
        .map(|(i, step)| format!("{}) {step}", i + 1))
        .collect::<Vec<_>>()
        .join(" ")
}

fn instruction_request(task: &Task) -> String {
    [
        "Write concise instructions for AgenX based on this task. Enforce this strict tool order:"
            .to_string(),
        tool_order_steps(present(&task.source_url).is_some()),
        "Adapt tone to task.type (SUMMARIZATION, DATA_EXTRACTION, CAPTIONS). Keep under 12 lines. No extra commentary."
            .to_string(),
        String::new(),
        build_prompt(task),
    ]
    .join("\n")
}

/// Ask the model for run instructions, falling back to the fixed policy
pub async fn generate_instructions(llm: Option<&dyn LlmProvider>, model: &str, task: &Task) -> String {
    let Some(llm) = llm else {
        debug!(task_id = %task.id, "No LLM configured; using fixed instructions");
        return build_dynamic_instructions(task);
    };

    match complete_text(
        llm,
        model,
        Some(INSTRUCTION_WRITER_SYSTEM),
        &instruction_request(task),
        0.2,
    )
    .await
    {
        Ok(text) => text,
        Err(e) => {
            warn!(task_id = %task.id, error = %e, "Instruction generation failed; using fixed instructions");
            build_dynamic_instructions(task)
        }
    }
}

/// Trimmed text cut to `max` chars, with an ellipsis when cut
pub fn short_label(text: &str, max: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max {
        return trimmed.to_string();
    }
    let mut label: String = trimmed.chars().take(max).collect();
    label.push('…');
    label
}

/// Human label for notifications
pub fn task_label(task: &Task, max: usize) -> String {
    let full = present(&task.title)
        .or_else(|| present(&task.description))
        .or_else(|| present(&task.input_text))
        .map(str::to_string)
        .unwrap_or_else(|| format!("Task {}", task.id));
    short_label(&full, max)
}

/// Query sent to the research vendors
pub fn research_query(task: &Task) -> String {
    present(&task.description)
        .or_else(|| present(&task.input_text))
        .or_else(|| present(&task.title))
        .or_else(|| present(&task.source_url))
        .map(str::to_string)
        .unwrap_or_else(|| task.task_type.as_str().to_string())
}

#[cfg(test)]
pub(crate) fn sample_task(task_type: TaskType) -> Task {
    use crate::store::TaskStatus;
    let now = chrono::Utc::now();
    Task {
        id: uuid::Uuid::new_v4(),
        task_type,
        title: None,
        description: None,
        source_url: None,
        input_text: None,
        attachment_id: None,
        payout_amount: "0.1".to_string(),
        payout_currency: "SOL".to_string(),
        status: TaskStatus::Assigned,
        created_by_id: uuid::Uuid::new_v4(),
        assigned_agent_id: None,
        save_to_drive: false,
        result_text: None,
        result_drive_file_id: None,
        created_at: now,
        updated_at: now,
    }
}
