use super::models::*;
use super::StoreError;
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    agents: HashMap<Uuid, AgentProfile>,
    settings: HashMap<Uuid, UserSetting>,
    tasks: HashMap<Uuid, Task>,
    payments: HashMap<Uuid, Payment>,
    tool_runs: Vec<ToolRun>,
    documents: HashMap<Uuid, Document>,
}

/// In-memory marketplace store
#[derive(Default)]
pub struct Store {
    tables: RwLock<Tables>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    // Users

    /// Create a user; emails are unique after trimming and lowercasing
    pub async fn create_user(
        &self,
        email: &str,
        password_hash: String,
        name: Option<String>,
    ) -> Result<User, StoreError> {
        let email = email.trim().to_lowercase();
        let mut tables = self.tables.write().await;
        if tables.users.values().any(|u| u.email == email) {
            return Err(StoreError::Conflict(format!("email {email}")));
        }
        let user = User {
            id: Uuid::new_v4(),
            email,
            name,
            password_hash,
            role: "USER".to_string(),
            created_at: Utc::now(),
        };
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    pub async fn find_user_by_email(&self, email: &str) -> Option<User> {
        let email = email.trim().to_lowercase();
        let tables = self.tables.read().await;
        tables.users.values().find(|u| u.email == email).cloned()
    }

    pub async fn find_user(&self, id: Uuid) -> Option<User> {
        self.tables.read().await.users.get(&id).cloned()
    }

    // Agents

    /// Agent profile for a user, created ACTIVE on first use
    pub async fn get_or_create_agent(&self, user_id: Uuid) -> AgentProfile {
        let mut tables = self.tables.write().await;
        if let Some(agent) = tables.agents.values().find(|a| a.user_id == user_id) {
            return agent.clone();
        }
        let agent = AgentProfile {
            id: Uuid::new_v4(),
            user_id,
            status: "ACTIVE".to_string(),
            created_at: Utc::now(),
        };
        tables.agents.insert(agent.id, agent.clone());
        agent
    }

    pub async fn get_agent(&self, id: Uuid) -> Option<AgentProfile> {
        self.tables.read().await.agents.get(&id).cloned()
    }

    // Settings

    pub async fn get_setting(&self, user_id: Uuid) -> Option<UserSetting> {
        self.tables.read().await.settings.get(&user_id).cloned()
    }

    pub async fn upsert_discord_channel(
        &self,
        user_id: Uuid,
        channel_id: Option<String>,
    ) -> UserSetting {
        let mut tables = self.tables.write().await;
        let setting = tables.settings.entry(user_id).or_insert_with(|| UserSetting {
            user_id,
            discord_channel_id: None,
        });
        setting.discord_channel_id = channel_id;
        setting.clone()
    }

    // Tasks

    /// Create a task, optionally with its initial payment row
    pub async fn create_task(
        &self,
        new: NewTask,
        initial_payment: Option<NewPayment>,
    ) -> Task {
        let now = Utc::now();
        let task = Task {
            id: Uuid::new_v4(),
            task_type: new.task_type,
            title: new.title,
            description: new.description,
            source_url: new.source_url,
            input_text: new.input_text,
            attachment_id: new.attachment_id,
            payout_amount: new.payout_amount,
            payout_currency: new.payout_currency,
            status: new.status,
            created_by_id: new.created_by_id,
            assigned_agent_id: None,
            save_to_drive: new.save_to_drive,
            result_text: None,
            result_drive_file_id: None,
            created_at: now,
            updated_at: now,
        };

        let mut tables = self.tables.write().await;
        tables.tasks.insert(task.id, task.clone());
        if let Some(payment) = initial_payment {
            let payment = build_payment(task.id, payment);
            tables.payments.insert(payment.id, payment);
        }
        debug!(task_id = %task.id, task_type = %task.task_type, "Task created");
        task
    }

    pub async fn get_task(&self, id: Uuid) -> Option<Task> {
        self.tables.read().await.tasks.get(&id).cloned()
    }

    /// Tasks created by a user, newest first
    pub async fn list_tasks_by_creator(&self, user_id: Uuid) -> Vec<Task> {
        let tables = self.tables.read().await;
        let mut tasks: Vec<Task> = tables
            .tasks
            .values()
            .filter(|t| t.created_by_id == user_id)
            .cloned()
            .collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        tasks
    }

    /// POSTED tasks, newest first
    pub async fn list_posted_tasks(&self) -> Vec<Task> {
        let tables = self.tables.read().await;
        let mut tasks: Vec<Task> = tables
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Posted)
            .cloned()
            .collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        tasks
    }

    /// Apply a partial update and bump `updated_at`
    pub async fn update_task(&self, id: Uuid, patch: TaskPatch) -> Result<Task, StoreError> {
        let mut tables = self.tables.write().await;
        let task = tables
            .tasks
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("Task {id}")))?;

        if let Some(status) = patch.status {
            task.status = status;
        }
        if let Some(agent_id) = patch.assigned_agent_id {
            task.assigned_agent_id = Some(agent_id);
        }
        if let Some(title) = patch.title {
            task.title = Some(title);
        }
        if let Some(description) = patch.description {
            task.description = Some(description);
        }
        if let Some(result_text) = patch.result_text {
            task.result_text = result_text;
        }
        if let Some(file_id) = patch.result_drive_file_id {
            task.result_drive_file_id = Some(file_id);
        }
        // Strictly increasing so runnable_batch ordering stays stable
        let now = Utc::now();
        task.updated_at = if now > task.updated_at {
            now
        } else {
            task.updated_at + chrono::Duration::microseconds(1)
        };
        Ok(task.clone())
    }

    /// Move a POSTED task to ASSIGNED under one write lock
    pub async fn claim_task(&self, id: Uuid, agent_id: Uuid) -> Result<Task, StoreError> {
        let mut tables = self.tables.write().await;
        let task = tables
            .tasks
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("Task {id}")))?;
        if task.status != TaskStatus::Posted {
            return Err(StoreError::Conflict(format!("Task {id} is {:?}", task.status)));
        }

        task.status = TaskStatus::Assigned;
        task.assigned_agent_id = Some(agent_id);
        let now = Utc::now();
        task.updated_at = if now > task.updated_at {
            now
        } else {
            task.updated_at + chrono::Duration::microseconds(1)
        };
        Ok(task.clone())
    }

    /// Delete a task with its payments and tool runs
    pub async fn delete_task(&self, id: Uuid) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if tables.tasks.remove(&id).is_none() {
            return Err(StoreError::NotFound(format!("Task {id}")));
        }
        tables.payments.retain(|_, p| p.task_id != id);
        tables.tool_runs.retain(|r| r.task_id != id);
        Ok(())
    }

    /// Oldest-updated ASSIGNED or IN_PROGRESS tasks, at most `limit`
    pub async fn runnable_batch(&self, limit: usize) -> Vec<Task> {
        let tables = self.tables.read().await;
        let mut tasks: Vec<Task> = tables
            .tasks
            .values()
            .filter(|t| t.status.is_runnable())
            .cloned()
            .collect();
        tasks.sort_by(|a, b| a.updated_at.cmp(&b.updated_at));
        tasks.truncate(limit);
        tasks
    }

    // Payments

    pub async fn create_payment(
        &self,
        task_id: Uuid,
        new: NewPayment,
    ) -> Result<Payment, StoreError> {
        let mut tables = self.tables.write().await;
        if !tables.tasks.contains_key(&task_id) {
            return Err(StoreError::NotFound(format!("Task {task_id}")));
        }
        let payment = build_payment(task_id, new);
        tables.payments.insert(payment.id, payment.clone());
        Ok(payment)
    }

    pub async fn update_payment(
        &self,
        id: Uuid,
        patch: PaymentPatch,
    ) -> Result<Payment, StoreError> {
        let mut tables = self.tables.write().await;
        let payment = tables
            .payments
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("Payment {id}")))?;

        macro_rules! apply {
            ($($field:ident),*) => {
                $(if let Some(value) = patch.$field { payment.$field = value.into(); })*
            };
        }
        apply!(amount, network);
        if let Some(status) = patch.status {
            payment.status = status;
        }
        if let Some(settled_at) = patch.settled_at {
            payment.settled_at = Some(settled_at);
        }
        apply!(
            mint,
            tx_hash,
            settlement_sig,
            payer_wallet_address,
            payee_wallet_address,
            challenge_id,
            callback_url,
            payment_request_url
        );
        Ok(payment.clone())
    }

    /// Payments for a task, oldest first
    pub async fn list_payments(&self, task_id: Uuid) -> Vec<Payment> {
        let tables = self.tables.read().await;
        let mut payments: Vec<Payment> = tables
            .payments
            .values()
            .filter(|p| p.task_id == task_id)
            .cloned()
            .collect();
        payments.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        payments
    }

    // Tool runs

    pub async fn append_tool_run(
        &self,
        task_id: Uuid,
        tool: ToolKind,
        input: Value,
        output: Value,
        success: bool,
    ) -> ToolRun {
        let run = ToolRun {
            id: Uuid::new_v4(),
            task_id,
            tool,
            input,
            output,
            success,
            created_at: Utc::now(),
        };
        self.tables.write().await.tool_runs.push(run.clone());
        run
    }

    /// Tool runs for a task in the order they were recorded
    pub async fn list_tool_runs(&self, task_id: Uuid) -> Vec<ToolRun> {
        let tables = self.tables.read().await;
        tables
            .tool_runs
            .iter()
            .filter(|r| r.task_id == task_id)
            .cloned()
            .collect()
    }

    // Documents

    pub async fn create_document(
        &self,
        user_id: &str,
        kind: DocumentKind,
        url: Option<String>,
        extracted_text: Option<String>,
    ) -> Document {
        let document = Document {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            kind,
            storage: "WEB".to_string(),
            url,
            extracted_text,
            created_at: Utc::now(),
        };
        self.tables
            .write()
            .await
            .documents
            .insert(document.id, document.clone());
        document
    }

    pub async fn get_document(&self, id: Uuid) -> Option<Document> {
        self.tables.read().await.documents.get(&id).cloned()
    }

    // Aggregates

    /// Task with payments, tool runs and the assigned agent
    pub async fn task_detail(&self, id: Uuid) -> Option<TaskDetail> {
        let task = self.get_task(id).await?;
        let payments = self.list_payments(id).await;
        let tool_runs = self.list_tool_runs(id).await;
        let assigned_agent = match task.assigned_agent_id {
            Some(agent_id) => self.get_agent(agent_id).await,
            None => None,
        };
        Some(TaskDetail {
            task,
            payments,
            tool_runs,
            assigned_agent,
        })
    }

    pub async fn tasks_with_payments(&self, user_id: Uuid) -> Vec<TaskWithPayments> {
        let tasks = self.list_tasks_by_creator(user_id).await;
        let mut out = Vec::with_capacity(tasks.len());
        for task in tasks {
            let payments = self.list_payments(task.id).await;
            out.push(TaskWithPayments { task, payments });
        }
        out
    }
}

fn build_payment(task_id: Uuid, new: NewPayment) -> Payment {
    Payment {
        id: Uuid::new_v4(),
        task_id,
        payer_user_id: new.payer_user_id,
        amount: new.amount,
        currency: new.currency,
        network: new.network,
        mint: new.mint,
        status: new.status,
        tx_hash: new.tx_hash,
        settlement_sig: None,
        payer_wallet_address: None,
        payee_wallet_address: None,
        challenge_id: None,
        callback_url: None,
        payment_request_url: None,
        settled_at: None,
        created_at: Utc::now(),
    }
}
