use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::types::{
    ChatKind, ChatRecord, ChatRole, RawTimestamp, SymptomAnalysis, SymptomRecord,
};

use super::{HealthStore, StoreError, SymptomOrder};

/// Process-local store used when no DATABASE_URL is configured, and as the
/// backing store in tests.
#[derive(Debug)]
pub struct InMemoryHealthStore {
    symptoms: Arc<RwLock<HashMap<String, Vec<SymptomRecord>>>>,
    chats: Arc<RwLock<HashMap<String, Vec<ChatRecord>>>>,
    doc_seq: AtomicU64,
}

impl Default for InMemoryHealthStore {
    fn default() -> Self {
        Self {
            symptoms: Arc::new(RwLock::new(HashMap::new())),
            chats: Arc::new(RwLock::new(HashMap::new())),
            doc_seq: AtomicU64::new(1),
        }
    }
}

impl InMemoryHealthStore {
    fn next_id(&self) -> String {
        format!("doc-{}", self.doc_seq.fetch_add(1, Ordering::Relaxed))
    }
}

#[async_trait]
impl HealthStore for InMemoryHealthStore {
    async fn save_symptom_record(
        &self,
        user_id: &str,
        symptoms_text: &str,
        analysis: &SymptomAnalysis,
        at: DateTime<Utc>,
    ) -> Result<String, StoreError> {
        let id = self.next_id();
        let record = SymptomRecord {
            id: id.clone(),
            user_id: user_id.to_owned(),
            symptoms_text: symptoms_text.to_owned(),
            analysis: analysis.clone(),
            created_at: Some(RawTimestamp::from(at)),
        };
        self.symptoms
            .write()
            .await
            .entry(user_id.to_owned())
            .or_default()
            .push(record);
        Ok(id)
    }

    async fn save_chat_message(
        &self,
        user_id: &str,
        kind: ChatKind,
        role: ChatRole,
        message: &str,
        at: DateTime<Utc>,
    ) -> Result<String, StoreError> {
        let id = self.next_id();
        let record = ChatRecord {
            id: id.clone(),
            user_id: user_id.to_owned(),
            kind,
            role,
            message: message.to_owned(),
            created_at: Some(RawTimestamp::from(at)),
        };
        self.chats
            .write()
            .await
            .entry(user_id.to_owned())
            .or_default()
            .push(record);
        Ok(id)
    }

    async fn symptom_records(
        &self,
        user_id: &str,
        order: SymptomOrder,
    ) -> Result<Vec<SymptomRecord>, StoreError> {
        let mut records = self
            .symptoms
            .read()
            .await
            .get(user_id)
            .cloned()
            .unwrap_or_default();
        if order == SymptomOrder::NewestFirst {
            records.sort_by_key(|record| {
                std::cmp::Reverse(record.created_at.as_ref().and_then(RawTimestamp::resolve))
            });
        }
        Ok(records)
    }

    async fn chat_messages(
        &self,
        user_id: &str,
        kind: Option<ChatKind>,
    ) -> Result<Vec<ChatRecord>, StoreError> {
        let records = self
            .chats
            .read()
            .await
            .get(user_id)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|record| kind.is_none_or(|wanted| record.kind == wanted))
            .collect();
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn assigns_ids_and_isolates_users() {
        let store = InMemoryHealthStore::default();
        let analysis = SymptomAnalysis {
            risk_level: Some("low".to_owned()),
            advice: "rest".to_owned(),
            urgency: None,
            conditions: vec!["Common Cold".to_owned()],
        };

        let first = store
            .save_symptom_record("alice", "sore throat", &analysis, Utc::now())
            .await
            .unwrap();
        let second = store
            .save_symptom_record("bob", "headache", &analysis, Utc::now())
            .await
            .unwrap();
        assert_ne!(first, second);

        let alice = store
            .symptom_records("alice", SymptomOrder::Unordered)
            .await
            .unwrap();
        assert_eq!(alice.len(), 1);
        assert_eq!(alice[0].symptoms_text, "sore throat");
    }

    #[tokio::test]
    async fn newest_first_orders_by_creation_time() {
        let store = InMemoryHealthStore::default();
        let analysis = SymptomAnalysis {
            risk_level: None,
            advice: String::new(),
            urgency: None,
            conditions: Vec::new(),
        };
        let now = Utc::now();

        store
            .save_symptom_record("u", "older", &analysis, now - chrono::Duration::days(2))
            .await
            .unwrap();
        store
            .save_symptom_record("u", "newer", &analysis, now)
            .await
            .unwrap();

        let records = store
            .symptom_records("u", SymptomOrder::NewestFirst)
            .await
            .unwrap();
        assert_eq!(records[0].symptoms_text, "newer");
        assert_eq!(records[1].symptoms_text, "older");
    }

    #[tokio::test]
    async fn chat_messages_filter_by_kind() {
        let store = InMemoryHealthStore::default();
        let now = Utc::now();
        store
            .save_chat_message("u", ChatKind::Chat, ChatRole::User, "hi", now)
            .await
            .unwrap();
        store
            .save_chat_message("u", ChatKind::Mental, ChatRole::User, "anxious", now)
            .await
            .unwrap();

        let all = store.chat_messages("u", None).await.unwrap();
        assert_eq!(all.len(), 2);

        let mental = store.chat_messages("u", Some(ChatKind::Mental)).await.unwrap();
        assert_eq!(mental.len(), 1);
        assert_eq!(mental[0].message, "anxious");
    }
}
