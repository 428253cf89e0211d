use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    model::{ModelProvider, ModelRequest},
    safety::SafetyPolicy,
    store::HealthStore,
    types::{ChatKind, ChatRole, RawTimestamp},
};

const CONTEXT_WINDOW: usize = 8;

const GENERAL_CONTEXT: &str = "You are HealthMate, a friendly health assistant. Give practical \
general-health guidance, keep replies concise, and recommend seeing a professional for anything \
serious. Never present yourself as a doctor.";

const MENTAL_CONTEXT: &str = "You are a compassionate mental health support bot. Be brief, warm, \
non-judgmental, and avoid medical diagnoses. Offer grounding or breathing tips when appropriate. \
Keep responses under 70 words.";

const CRISIS_NOTE: &str = "If you are in crisis or thinking about harming yourself, please reach \
out right now: call or text 988 (Suicide & Crisis Lifeline) or your local emergency number.";

#[derive(Debug, Clone)]
pub struct ChatCtx {
    pub user_id: Option<String>,
    pub kind: ChatKind,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub text: String,
    pub safety_flags: Vec<String>,
}

/// Conversation flow shared by the general and mental-health surfaces:
/// persist the user message, rebuild recent context, call the model,
/// persist the reply.
pub struct ChatService {
    model: Arc<dyn ModelProvider>,
    store: Arc<dyn HealthStore>,
    safety: SafetyPolicy,
}

impl ChatService {
    pub fn new(
        model: Arc<dyn ModelProvider>,
        store: Arc<dyn HealthStore>,
        safety: SafetyPolicy,
    ) -> Self {
        Self {
            model,
            store,
            safety,
        }
    }

    pub async fn handle_message(&self, ctx: ChatCtx) -> anyhow::Result<ChatReply> {
        if let Some(user_id) = &ctx.user_id {
            self.store
                .save_chat_message(user_id, ctx.kind, ChatRole::User, &ctx.content, ctx.timestamp)
                .await?;
        }

        let safety_flags = self.safety.screen(&ctx.content);

        let recent = match &ctx.user_id {
            Some(user_id) => {
                let mut history = self.store.chat_messages(user_id, Some(ctx.kind)).await?;
                // The store gives no return-order guarantee; re-derive from
                // timestamps before windowing.
                history.sort_by_key(|record| {
                    record.created_at.as_ref().and_then(RawTimestamp::resolve)
                });
                history
                    .iter()
                    .rev()
                    .take(CONTEXT_WINDOW)
                    .rev()
                    .map(|record| format!("{}: {}", record.role.as_str(), record.message))
                    .collect()
            }
            None => Vec::new(),
        };

        let system_prompt = build_system_prompt(ctx.kind, &recent);
        let mut text = self
            .model
            .complete(ModelRequest {
                system_prompt,
                user_prompt: ctx.content.clone(),
            })
            .await?;

        if ctx.kind == ChatKind::Mental && !safety_flags.is_empty() {
            text = format!("{CRISIS_NOTE}\n\n{text}");
        }

        if let Some(user_id) = &ctx.user_id {
            // Same injected clock as the user message, so the exchange is
            // deterministic and consistently ordered.
            self.store
                .save_chat_message(user_id, ctx.kind, ChatRole::Assistant, &text, ctx.timestamp)
                .await?;
        }

        Ok(ChatReply { text, safety_flags })
    }
}

fn build_system_prompt(kind: ChatKind, recent: &[String]) -> String {
    let mut sections = vec![
        match kind {
            ChatKind::Chat => GENERAL_CONTEXT,
            ChatKind::Mental => MENTAL_CONTEXT,
        }
        .to_owned(),
    ];

    if !recent.is_empty() {
        sections.push(format!("Recent conversation:\n{}", recent.join("\n")));
    }

    sections.join("\n\n")
}
