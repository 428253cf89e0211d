use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    model::{ModelProvider, ModelRequest},
    store::HealthStore,
    types::SymptomAnalysis,
};

const SYSTEM_PROMPT: &str = "You are a medical triage assistant. Analyze the user's symptoms \
and respond with ONLY a JSON object, no prose and no markdown fences, shaped as: \
{\"riskLevel\": \"Low\"|\"Medium\"|\"High\", \"advice\": string, \"urgency\": string, \
\"conditions\": [string, ...]}. Advice must be practical and short. Never diagnose; \
list at most four plausible conditions.";

/// Structured triage result returned to the caller and persisted per user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymptomAssessment {
    pub risk_level: String,
    pub advice: String,
    #[serde(default)]
    pub urgency: String,
    #[serde(default)]
    pub conditions: Vec<String>,
}

pub struct SymptomAnalyzer {
    model: Arc<dyn ModelProvider>,
    store: Arc<dyn HealthStore>,
}

impl SymptomAnalyzer {
    pub fn new(model: Arc<dyn ModelProvider>, store: Arc<dyn HealthStore>) -> Self {
        Self { model, store }
    }

    /// Analyzes free-form symptom text. Model failures and unparseable
    /// replies degrade to keyword triage instead of erroring; only the
    /// persistence write can fail.
    pub async fn analyze(
        &self,
        user_id: Option<&str>,
        symptoms: &str,
    ) -> anyhow::Result<SymptomAssessment> {
        let assessment = match self
            .model
            .complete(ModelRequest {
                system_prompt: SYSTEM_PROMPT.to_owned(),
                user_prompt: symptoms.to_owned(),
            })
            .await
        {
            Ok(raw) => parse_assessment(&raw).unwrap_or_else(|error| {
                warn!(%error, "unparseable model assessment; using keyword triage");
                keyword_triage(symptoms)
            }),
            Err(error) => {
                warn!(%error, "symptom model call failed; using keyword triage");
                keyword_triage(symptoms)
            }
        };

        if let Some(user_id) = user_id {
            let analysis = SymptomAnalysis {
                risk_level: Some(assessment.risk_level.clone()),
                advice: assessment.advice.clone(),
                urgency: Some(assessment.urgency.clone()),
                conditions: assessment.conditions.clone(),
            };
            self.store
                .save_symptom_record(user_id, symptoms, &analysis, Utc::now())
                .await?;
        }

        Ok(assessment)
    }
}

/// Tolerates markdown fences and surrounding prose by extracting the
/// outermost JSON object.
fn parse_assessment(raw: &str) -> anyhow::Result<SymptomAssessment> {
    let start = raw
        .find('{')
        .ok_or_else(|| anyhow::anyhow!("no JSON object in model reply"))?;
    let end = raw
        .rfind('}')
        .ok_or_else(|| anyhow::anyhow!("unterminated JSON object in model reply"))?;
    let body = raw
        .get(start..=end)
        .ok_or_else(|| anyhow::anyhow!("unbalanced JSON object in model reply"))?;
    Ok(serde_json::from_str(body)?)
}

/// Last-resort triage mirroring the product's original heuristics: chest,
/// pain, or breathing complaints escalate to High; a high fever to Medium.
fn keyword_triage(symptoms: &str) -> SymptomAssessment {
    let lower = symptoms.to_lowercase();
    let (risk_level, advice) = if lower.contains("chest")
        || lower.contains("pain")
        || lower.contains("breath")
    {
        (
            "High",
            "Please visit a doctor immediately. This could be serious.",
        )
    } else if lower.contains("fever") && lower.contains("high") {
        ("Medium", "Monitor your symptoms closely. Hydrate and rest.")
    } else {
        ("Low", "Likely a minor issue. Get some rest.")
    };

    SymptomAssessment {
        risk_level: risk_level.to_owned(),
        advice: advice.to_owned(),
        urgency: "Consult a healthcare professional".to_owned(),
        conditions: vec![
            "Common Cold".to_owned(),
            "Flu".to_owned(),
            "Fatigue".to_owned(),
        ],
    }
}
