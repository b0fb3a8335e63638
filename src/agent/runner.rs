//! One full task run: status updates, fulfillment, notifications, payout

use serde_json::json;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

use super::instructions::{generate_instructions, research_query, task_label};
use super::payout::PayoutService;
use super::{AutonomousAgent, TaskPipeline};
use crate::config::{AgentMode, AgentSection};
use crate::error::{AppError, AppResult};
use crate::llm::{LlmProvider, LlmSettings};
use crate::notify::Notifier;
use crate::observability::{metrics, HealthMonitor};
use crate::store::{Store, Task, TaskPatch, TaskStatus, ToolKind};
use crate::task_span;
use crate::tools::ToolSystem;

pub struct TaskRunner {
    store: Arc<Store>,
    tools: Arc<ToolSystem>,
    llm: Option<Arc<dyn LlmProvider>>,
    settings: LlmSettings,
    agent: AgentSection,
    notifier: Arc<Notifier>,
    payout: PayoutService,
    health: Option<Arc<HealthMonitor>>,
    in_flight: Arc<Mutex<HashSet<Uuid>>>,
}

/// Marks a task as running in this process until dropped
pub struct RunClaim {
    in_flight: Arc<Mutex<HashSet<Uuid>>>,
    task_id: Uuid,
}

impl Drop for RunClaim {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.task_id);
    }
}

impl TaskRunner {
    pub fn new(
        store: Arc<Store>,
        tools: Arc<ToolSystem>,
        notifier: Arc<Notifier>,
        payout: PayoutService,
        agent: AgentSection,
    ) -> Self {
        Self {
            store,
            tools,
            llm: None,
            settings: LlmSettings::default(),
            agent,
            notifier,
            payout,
            health: None,
            in_flight: Arc::default(),
        }
    }

    pub fn with_llm(mut self, llm: Option<Arc<dyn LlmProvider>>, settings: LlmSettings) -> Self {
        self.llm = llm;
        self.settings = settings;
        self
    }

    pub fn with_health(mut self, health: Arc<HealthMonitor>) -> Self {
        self.health = Some(health);
        self
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Reserve `task_id` for one run; `None` while another run holds it
    pub fn claim(&self, task_id: Uuid) -> Option<RunClaim> {
        let inserted = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(task_id);
        inserted.then(|| RunClaim {
            in_flight: self.in_flight.clone(),
            task_id,
        })
    }

    /// Run a task to COMPLETED or FAILED
    ///
    /// A missing task is `NotFound` and a task already running is `Conflict`.
    /// Any other error leaves the task FAILED.
    pub async fn run(&self, task_id: Uuid) -> AppResult<Task> {
        let claim = self
            .claim(task_id)
            .ok_or_else(|| AppError::Conflict(format!("Task {task_id} is already running")))?;
        self.run_claimed(claim).await
    }

    async fn run_claimed(&self, claim: RunClaim) -> AppResult<Task> {
        let task_id = claim.task_id;
        let task = self
            .store
            .get_task(task_id)
            .await
            .ok_or_else(|| AppError::not_found(format!("Task {task_id}")))?;

        let span = task_span!(task_id = %task_id, task_type = %task.task_type);
        async {
            let started = Instant::now();
            metrics().task_run_started();

            let result = self.execute(task).await;
            if let Some(health) = &self.health {
                health.record_task_run();
            }

            match result {
                Ok(task) => {
                    if task.status == TaskStatus::Completed {
                        metrics().task_run_completed(started.elapsed());
                    } else {
                        metrics().task_run_failed(started.elapsed());
                    }
                    Ok(task)
                }
                Err(e) => {
                    metrics().task_run_failed(started.elapsed());
                    error!(error = %e, "Task run failed unexpectedly");
                    if let Err(mark) = self
                        .store
                        .update_task(task_id, TaskPatch::status(TaskStatus::Failed))
                        .await
                    {
                        warn!(error = %mark, "Could not mark task failed");
                    }
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn execute(&self, task: Task) -> AppResult<Task> {
        let name = &self.agent.name;
        let label = task_label(&task, self.agent.label_max_chars);
        info!(label = %label, "Task run start");

        self.store
            .update_task(task.id, TaskPatch::status(TaskStatus::InProgress))
            .await?;
        self.notifier
            .notify_user(task.created_by_id, &format!("{name}: \"{label}\" in progress…"))
            .await;

        let instructions =
            generate_instructions(self.llm.as_deref(), &self.settings.agent_model, &task).await;
        let content = self.fulfil(&task, &instructions).await;

        if self.agent.mode == AgentMode::Autonomous {
            self.run_demo_once(task.id).await;
        }

        let succeeded = !content.is_empty();
        let updated = self
            .store
            .update_task(
                task.id,
                TaskPatch {
                    status: Some(if succeeded {
                        TaskStatus::Completed
                    } else {
                        TaskStatus::Failed
                    }),
                    result_text: Some(succeeded.then(|| content.clone())),
                    ..Default::default()
                },
            )
            .await?;

        self.store
            .append_tool_run(
                task.id,
                ToolKind::Openai,
                json!({ "agent": self.mode_name(), "hadOutput": succeeded }),
                json!({ "content": content }),
                true,
            )
            .await;

        if succeeded {
            self.notifier
                .notify_user(task.created_by_id, &format!("{name}: \"{label}\" completed."))
                .await;
            self.payout.settle(&updated, &label).await;
        } else {
            self.notifier
                .notify_user(task.created_by_id, &format!("{name}: \"{label}\" failed."))
                .await;
        }

        info!(status = ?updated.status, "Task run end");
        Ok(updated)
    }

    /// Final content from the configured mode; empty on failure
    async fn fulfil(&self, task: &Task, instructions: &str) -> String {
        match self.agent.mode {
            AgentMode::Pipeline => {
                let pipeline =
                    TaskPipeline::new(self.tools.clone(), self.llm.clone(), &self.settings.model)
                        .with_x402_demo(self.agent.x402_demo);
                pipeline
                    .run(
                        task.id,
                        instructions,
                        task.source_url.as_deref(),
                        &research_query(task),
                    )
                    .await
                    .final_text
            }
            AgentMode::Autonomous => {
                let Some(llm) = self.llm.clone() else {
                    warn!("Autonomous mode needs an LLM; no output");
                    return String::new();
                };
                let agent = AutonomousAgent::new(llm, self.tools.clone(), &self.settings.agent_model)
                    .with_temperature(self.settings.temperature)
                    .with_max_iterations(self.agent.max_iterations);
                match agent.run(task.id, instructions).await {
                    Ok(content) => {
                        info!(has_output = !content.is_empty(), "Autonomous agent done");
                        content
                    }
                    Err(e) => {
                        error!(error = %e, "Agent error (non-fatal)");
                        String::new()
                    }
                }
            }
        }
    }

    /// Paid demo call after an autonomous run, so spend is logged either way
    async fn run_demo_once(&self, task_id: Uuid) {
        if !self.agent.x402_demo || !self.tools.has_tool("x402_demo_call") {
            return;
        }
        if let Err(e) = self
            .tools
            .execute_for_task(task_id, "x402_demo_call", &json!({}))
            .await
        {
            warn!(error = %e, "x402 demo call failed");
        }
    }

    fn mode_name(&self) -> &'static str {
        match self.agent.mode {
            AgentMode::Pipeline => "pipeline",
            AgentMode::Autonomous => "autonomous",
        }
    }

    /// Queue up to `limit` runnable tasks, each on its own tokio task.
    /// Tasks still running from an earlier tick are skipped.
    pub async fn run_batch(self: &Arc<Self>, limit: usize) -> usize {
        let batch = self.store.runnable_batch(limit).await;
        let mut queued = 0;
        for task in &batch {
            let task_id = task.id;
            let Some(claim) = self.claim(task_id) else {
                debug!(%task_id, "Task already running; not queued");
                continue;
            };
            let runner = Arc::clone(self);
            tokio::spawn(async move {
                if let Err(e) = runner.run_claimed(claim).await {
                    warn!(%task_id, error = %e, "Scheduled task run failed");
                }
            });
            queued += 1;
        }
        info!(queued, "Agent tick");
        queued
    }
}
