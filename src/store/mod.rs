//! Marketplace persistence
//!
//! Records live in memory behind an async lock. The HTTP layer, the task
//! runner and the tool system all share one [`Store`] through an `Arc`.
//!
//! ```rust
//! use agenx::store::{NewTask, Store, TaskStatus, TaskType};
//! use uuid::Uuid;
//!
//! # tokio_test::block_on(async {
//! let store = Store::new();
//! let task = store
//!     .create_task(NewTask::posted(TaskType::Captions, Uuid::new_v4()), None)
//!     .await;
//! let claimed = store.claim_task(task.id, Uuid::new_v4()).await.unwrap();
//! assert_eq!(claimed.status, TaskStatus::Assigned);
//! # });
//! ```

pub mod memory;
pub mod models;

pub use memory::Store;
pub use models::*;

use thiserror::Error;

/// Store operation errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),
}
