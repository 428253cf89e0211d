use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Timestamp as it appears in stored documents: either an epoch-seconds
/// wrapper or an ISO-8601 string. [`RawTimestamp::resolve`] is the single
/// normalization point; no other code inspects the raw forms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawTimestamp {
    Epoch { seconds: i64 },
    Iso(String),
}

impl RawTimestamp {
    /// Returns `None` for out-of-range epochs and unparseable strings; such
    /// records are excluded from time-based aggregates but still counted in
    /// totals.
    pub fn resolve(&self) -> Option<DateTime<Utc>> {
        match self {
            RawTimestamp::Epoch { seconds } => DateTime::<Utc>::from_timestamp(*seconds, 0),
            RawTimestamp::Iso(raw) => DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|parsed| parsed.with_timezone(&Utc)),
        }
    }
}

impl From<DateTime<Utc>> for RawTimestamp {
    fn from(instant: DateTime<Utc>) -> Self {
        RawTimestamp::Iso(instant.to_rfc3339())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Case-insensitive; anything else is unclassified.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "low" => Some(RiskLevel::Low),
            "medium" => Some(RiskLevel::Medium),
            "high" => Some(RiskLevel::High),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

/// The two conversation surfaces. Both feed the same analytics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    #[default]
    Chat,
    Mental,
}

impl ChatKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChatKind::Chat => "chat",
            ChatKind::Mental => "mental",
        }
    }
}

/// Structured result attached to a symptom record. The store is not
/// schema-enforced, so the risk level stays a raw string here and is
/// classified at aggregation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymptomAnalysis {
    #[serde(default)]
    pub risk_level: Option<String>,
    #[serde(default)]
    pub advice: String,
    #[serde(default)]
    pub urgency: Option<String>,
    #[serde(default)]
    pub conditions: Vec<String>,
}

/// One submitted symptom-analysis session. Created once, immutable after.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymptomRecord {
    pub id: String,
    pub user_id: String,
    pub symptoms_text: String,
    pub analysis: SymptomAnalysis,
    #[serde(default)]
    pub created_at: Option<RawTimestamp>,
}

/// One message in a conversation thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRecord {
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub kind: ChatKind,
    pub role: ChatRole,
    pub message: String,
    #[serde(default)]
    pub created_at: Option<RawTimestamp>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskDistribution {
    pub low: u32,
    pub medium: u32,
    pub high: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyActivity {
    pub symptoms: u32,
    pub chats: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionCount {
    pub condition: String,
    pub count: u32,
}

/// One calendar-day bucket of the trailing 7-day timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineDay {
    pub day: String,
    pub date: String,
    pub symptoms: u32,
    pub chats: u32,
}

/// Ephemeral aggregate over a user's records; recomputed on every call,
/// never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSnapshot {
    pub total_sessions: usize,
    pub total_chats: usize,
    pub total_interactions: usize,
    pub risk_distribution: RiskDistribution,
    pub weekly_activity: WeeklyActivity,
    pub top_conditions: Vec<ConditionCount>,
    pub activity_timeline: Vec<TimelineDay>,
    pub recent_symptoms: Vec<SymptomRecord>,
    pub has_data: bool,
}
