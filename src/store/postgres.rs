use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, postgres::PgPoolOptions};

use crate::types::{
    ChatKind, ChatRecord, ChatRole, RawTimestamp, SymptomAnalysis, SymptomRecord,
};

use super::{HealthStore, StoreError, SymptomOrder};

/// Postgres-backed store. Expects the `symptom_records` and `chat_messages`
/// tables with the columns referenced below; `conditions` is TEXT[].
#[derive(Debug, Clone)]
pub struct PostgresHealthStore {
    pool: PgPool,
}

impl PostgresHealthStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }
}

fn store_error(error: sqlx::Error) -> StoreError {
    StoreError::Unavailable(error.into())
}

fn role_from_str(raw: &str) -> ChatRole {
    if raw == "assistant" {
        ChatRole::Assistant
    } else {
        ChatRole::User
    }
}

fn kind_from_str(raw: &str) -> ChatKind {
    if raw == "mental" {
        ChatKind::Mental
    } else {
        ChatKind::Chat
    }
}

type SymptomRow = (
    i64,
    String,
    String,
    Option<String>,
    String,
    Option<String>,
    Vec<String>,
    DateTime<Utc>,
);

fn symptom_from_row(row: SymptomRow) -> SymptomRecord {
    let (id, user_id, symptoms_text, risk_level, advice, urgency, conditions, created_at) = row;
    SymptomRecord {
        id: id.to_string(),
        user_id,
        symptoms_text,
        analysis: SymptomAnalysis {
            risk_level,
            advice,
            urgency,
            conditions,
        },
        created_at: Some(RawTimestamp::from(created_at)),
    }
}

#[async_trait]
impl HealthStore for PostgresHealthStore {
    async fn save_symptom_record(
        &self,
        user_id: &str,
        symptoms_text: &str,
        analysis: &SymptomAnalysis,
        at: DateTime<Utc>,
    ) -> Result<String, StoreError> {
        let (id,) = sqlx::query_as::<_, (i64,)>(
            "INSERT INTO symptom_records (user_id, symptoms_text, risk_level, advice, urgency, conditions, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING id",
        )
        .bind(user_id)
        .bind(symptoms_text)
        .bind(&analysis.risk_level)
        .bind(&analysis.advice)
        .bind(&analysis.urgency)
        .bind(&analysis.conditions)
        .bind(at)
        .fetch_one(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(id.to_string())
    }

    async fn save_chat_message(
        &self,
        user_id: &str,
        kind: ChatKind,
        role: ChatRole,
        message: &str,
        at: DateTime<Utc>,
    ) -> Result<String, StoreError> {
        let (id,) = sqlx::query_as::<_, (i64,)>(
            "INSERT INTO chat_messages (user_id, kind, role, message, created_at)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING id",
        )
        .bind(user_id)
        .bind(kind.as_str())
        .bind(role.as_str())
        .bind(message)
        .bind(at)
        .fetch_one(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(id.to_string())
    }

    async fn symptom_records(
        &self,
        user_id: &str,
        order: SymptomOrder,
    ) -> Result<Vec<SymptomRecord>, StoreError> {
        // Postgres can always satisfy filter+order, so QueryShape never
        // arises here; the class exists for index-constrained backends.
        let sql = match order {
            SymptomOrder::NewestFirst => {
                "SELECT id, user_id, symptoms_text, risk_level, advice, urgency, conditions, created_at
                 FROM symptom_records
                 WHERE user_id = $1
                 ORDER BY created_at DESC"
            }
            SymptomOrder::Unordered => {
                "SELECT id, user_id, symptoms_text, risk_level, advice, urgency, conditions, created_at
                 FROM symptom_records
                 WHERE user_id = $1"
            }
        };

        let records = sqlx::query_as::<_, SymptomRow>(sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?
            .into_iter()
            .map(symptom_from_row)
            .collect();

        Ok(records)
    }

    async fn chat_messages(
        &self,
        user_id: &str,
        kind: Option<ChatKind>,
    ) -> Result<Vec<ChatRecord>, StoreError> {
        let rows = match kind {
            Some(kind) => {
                sqlx::query_as::<_, (i64, String, String, String, String, DateTime<Utc>)>(
                    "SELECT id, user_id, kind, role, message, created_at
                     FROM chat_messages
                     WHERE user_id = $1 AND kind = $2",
                )
                .bind(user_id)
                .bind(kind.as_str())
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as::<_, (i64, String, String, String, String, DateTime<Utc>)>(
                    "SELECT id, user_id, kind, role, message, created_at
                     FROM chat_messages
                     WHERE user_id = $1",
                )
                .bind(user_id)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(store_error)?;

        let records = rows
            .into_iter()
            .map(|(id, user_id, kind, role, message, created_at)| ChatRecord {
                id: id.to_string(),
                user_id,
                kind: kind_from_str(&kind),
                role: role_from_str(&role),
                message,
                created_at: Some(RawTimestamp::from(created_at)),
            })
            .collect();

        Ok(records)
    }
}
