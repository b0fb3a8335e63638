//! Work behind the `config` and `run-task` subcommands

use tracing::info;
use uuid::Uuid;

use crate::agent::classify_by_keywords;
use crate::api::AppState;
use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::store::{NewTask, Store, Task, TaskPatch, TaskStatus};

/// Effective configuration as TOML when `show` is set
pub fn config_report(config: &AppConfig, show: bool) -> AppResult<Option<String>> {
    if !show {
        return Ok(None);
    }
    toml::to_string_pretty(config)
        .map(Some)
        .map_err(|e| AppError::internal_error(format!("Cannot render configuration: {e}")))
}

/// Create an ASSIGNED task from a free-form prompt and/or source URL
pub async fn seed_adhoc_task(
    store: &Store,
    prompt: Option<String>,
    url: Option<String>,
) -> AppResult<Task> {
    let task_type = classify_by_keywords(prompt.as_deref().unwrap_or(""));
    let new = NewTask {
        description: prompt.clone(),
        input_text: prompt,
        source_url: url,
        ..NewTask::posted(task_type, Uuid::new_v4())
    };
    let task = store.create_task(new, None).await;
    let task = store
        .update_task(task.id, TaskPatch::status(TaskStatus::Assigned))
        .await?;
    info!(task_id = %task.id, "Seeded ad-hoc task");
    Ok(task)
}

/// Run an existing task, or one seeded from `prompt`/`url` when either is given
pub async fn run_task(
    state: &AppState,
    id: Option<Uuid>,
    prompt: Option<String>,
    url: Option<String>,
) -> AppResult<Task> {
    let task_id = if prompt.is_some() || url.is_some() {
        seed_adhoc_task(&state.store, prompt, url).await?.id
    } else {
        id.ok_or_else(|| AppError::invalid_input("Provide a task id, --prompt or --url"))?
    };
    state.runner.run(task_id).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_seeded_task_is_assigned() {
        let store = Store::new();
        let task = seed_adhoc_task(&store, Some("Write captions for this clip".to_string()), None)
            .await
            .unwrap();
        assert_eq!(task.status, TaskStatus::Assigned);
        assert_eq!(task.input_text.as_deref(), Some("Write captions for this clip"));
        assert_eq!(task.source_url, None);
        assert_eq!(store.runnable_batch(5).await.len(), 1);
    }

    #[test]
    fn test_config_report() {
        let config = AppConfig::test_config();
        assert_eq!(config_report(&config, false).unwrap(), None);

        let shown = config_report(&config, true).unwrap().unwrap();
        assert!(shown.contains("[server]"));
        assert!(shown.contains("port = 3999"));
    }
}
