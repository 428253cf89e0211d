mod in_memory;
mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::types::{ChatKind, ChatRecord, ChatRole, SymptomAnalysis, SymptomRecord};

pub use in_memory::InMemoryHealthStore;
pub use postgres::PostgresHealthStore;

/// Requested ordering for symptom reads. `NewestFirst` is a composite
/// filter-and-order query; document stores lacking the matching index reject
/// it with [`StoreError::QueryShape`], and callers may retry `Unordered`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymptomOrder {
    NewestFirst,
    Unordered,
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// The "precondition failed" class: the store cannot execute the
    /// filtered-and-ordered query as posed. Recoverable by re-issuing the
    /// filter-only form.
    #[error("store cannot satisfy the filtered and ordered query")]
    QueryShape,
    #[error("store request failed: {0}")]
    Unavailable(#[from] anyhow::Error),
}

/// Per-user record collections in the external document store. Records are
/// written once and never updated or deleted through this interface.
#[async_trait]
pub trait HealthStore: Send + Sync {
    /// Persists one symptom-analysis session and returns the assigned id.
    async fn save_symptom_record(
        &self,
        user_id: &str,
        symptoms_text: &str,
        analysis: &SymptomAnalysis,
        at: DateTime<Utc>,
    ) -> Result<String, StoreError>;

    /// Persists one chat message and returns the assigned id.
    async fn save_chat_message(
        &self,
        user_id: &str,
        kind: ChatKind,
        role: ChatRole,
        message: &str,
        at: DateTime<Utc>,
    ) -> Result<String, StoreError>;

    /// All symptom records for a user. Return order is only meaningful for
    /// `SymptomOrder::NewestFirst`; unordered results carry no guarantee.
    async fn symptom_records(
        &self,
        user_id: &str,
        order: SymptomOrder,
    ) -> Result<Vec<SymptomRecord>, StoreError>;

    /// All chat messages for a user, optionally restricted to one
    /// conversation kind. No return-order guarantee.
    async fn chat_messages(
        &self,
        user_id: &str,
        kind: Option<ChatKind>,
    ) -> Result<Vec<ChatRecord>, StoreError>;
}
