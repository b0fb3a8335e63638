//! Marketplace records
//!
//! Field names serialize in camelCase because the HTTP API returns these
//! records directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Kind of work a task asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    Summarization,
    Captions,
    DataExtraction,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Summarization => "SUMMARIZATION",
            TaskType::Captions => "CAPTIONS",
            TaskType::DataExtraction => "DATA_EXTRACTION",
        }
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Posted,
    Assigned,
    InProgress,
    Completed,
    Paid,
    Failed,
}

impl TaskStatus {
    /// Statuses the scheduled tick picks up
    pub fn is_runnable(&self) -> bool {
        matches!(self, TaskStatus::Assigned | TaskStatus::InProgress)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    pub title: Option<String>,
    pub description: Option<String>,
    pub source_url: Option<String>,
    pub input_text: Option<String>,
    pub attachment_id: Option<String>,
    /// Decimal amount kept as text to avoid float rounding
    pub payout_amount: String,
    pub payout_currency: String,
    pub status: TaskStatus,
    pub created_by_id: Uuid,
    pub assigned_agent_id: Option<Uuid>,
    pub save_to_drive: bool,
    pub result_text: Option<String>,
    pub result_drive_file_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields accepted when creating a task
#[derive(Debug, Clone)]
pub struct NewTask {
    pub task_type: TaskType,
    pub title: Option<String>,
    pub description: Option<String>,
    pub source_url: Option<String>,
    pub input_text: Option<String>,
    pub attachment_id: Option<String>,
    pub payout_amount: String,
    pub payout_currency: String,
    pub status: TaskStatus,
    pub created_by_id: Uuid,
    pub save_to_drive: bool,
}

impl NewTask {
    /// A POSTED task with the default SOL payout
    pub fn posted(task_type: TaskType, created_by_id: Uuid) -> Self {
        Self {
            task_type,
            title: None,
            description: None,
            source_url: None,
            input_text: None,
            attachment_id: None,
            payout_amount: "0.1".to_string(),
            payout_currency: "SOL".to_string(),
            status: TaskStatus::Posted,
            created_by_id,
            save_to_drive: false,
        }
    }
}

/// Partial task update; `None` leaves a field untouched
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub status: Option<TaskStatus>,
    pub assigned_agent_id: Option<Uuid>,
    pub title: Option<String>,
    pub description: Option<String>,
    /// `Some(None)` clears the result
    pub result_text: Option<Option<String>>,
    pub result_drive_file_id: Option<String>,
}

impl TaskPatch {
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Success,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: Uuid,
    pub task_id: Uuid,
    pub payer_user_id: Uuid,
    pub amount: String,
    pub currency: String,
    pub network: String,
    pub mint: Option<String>,
    pub status: PaymentStatus,
    pub tx_hash: Option<String>,
    pub settlement_sig: Option<String>,
    pub payer_wallet_address: Option<String>,
    pub payee_wallet_address: Option<String>,
    pub challenge_id: Option<String>,
    pub callback_url: Option<String>,
    pub payment_request_url: Option<String>,
    pub settled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub payer_user_id: Uuid,
    pub amount: String,
    pub currency: String,
    pub network: String,
    pub mint: Option<String>,
    pub status: PaymentStatus,
    pub tx_hash: Option<String>,
}

/// Partial payment update; `None` leaves a field untouched
#[derive(Debug, Clone, Default)]
pub struct PaymentPatch {
    pub amount: Option<String>,
    pub mint: Option<String>,
    pub network: Option<String>,
    pub status: Option<PaymentStatus>,
    pub tx_hash: Option<String>,
    pub settlement_sig: Option<String>,
    pub payer_wallet_address: Option<String>,
    pub payee_wallet_address: Option<String>,
    pub challenge_id: Option<String>,
    pub callback_url: Option<String>,
    pub payment_request_url: Option<String>,
    pub settled_at: Option<DateTime<Utc>>,
}

/// Which integration a tool run exercised
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ToolKind {
    DocParser,
    Perplexity,
    Tavily,
    Openai,
    Discord,
    Drive,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolRun {
    pub id: Uuid,
    pub task_id: Uuid,
    pub tool: ToolKind,
    pub input: Value,
    pub output: Value,
    pub success: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AgentProfile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserSetting {
    pub user_id: Uuid,
    pub discord_channel_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentKind {
    Text,
    Pdf,
    Csv,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: Uuid,
    pub user_id: String,
    pub kind: DocumentKind,
    pub storage: String,
    pub url: Option<String>,
    pub extracted_text: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Task with its related rows, as returned by the detail endpoint
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDetail {
    #[serde(flatten)]
    pub task: Task,
    pub payments: Vec<Payment>,
    pub tool_runs: Vec<ToolRun>,
    pub assigned_agent: Option<AgentProfile>,
}

/// Task with its payments, as returned by the owner listing
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskWithPayments {
    #[serde(flatten)]
    pub task: Task,
    pub payments: Vec<Payment>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_wire_names() {
        assert_eq!(
            serde_json::to_string(&TaskType::DataExtraction).unwrap(),
            "\"DATA_EXTRACTION\""
        );
        assert_eq!(
            serde_json::to_string(&TaskStatus::InProgress).unwrap(),
            "\"IN_PROGRESS\""
        );
        assert_eq!(
            serde_json::to_string(&ToolKind::DocParser).unwrap(),
            "\"DOC_PARSER\""
        );
        let parsed: TaskType = serde_json::from_str("\"CAPTIONS\"").unwrap();
        assert_eq!(parsed, TaskType::Captions);
    }

    #[test]
    fn test_runnable_statuses() {
        assert!(TaskStatus::Assigned.is_runnable());
        assert!(TaskStatus::InProgress.is_runnable());
        assert!(!TaskStatus::Posted.is_runnable());
        assert!(!TaskStatus::Completed.is_runnable());
        assert!(!TaskStatus::Failed.is_runnable());
    }

    #[test]
    fn test_password_hash_is_never_serialized() {
        let user = User {
            id: Uuid::new_v4(),
            email: "a@b.co".to_string(),
            name: None,
            password_hash: "$argon2id$secret".to_string(),
            role: "USER".to_string(),
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("argon2id"));
        assert!(json.contains("createdAt"));
    }
}
