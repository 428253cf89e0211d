use async_trait::async_trait;

use super::{ModelProvider, ModelRequest};

/// Keyless stand-in used when no GEMINI_API_KEY is configured. Callers that
/// need structured output treat its replies as unparseable and fall back.
#[derive(Debug, Default)]
pub struct MockModelProvider;

#[async_trait]
impl ModelProvider for MockModelProvider {
    async fn complete(&self, request: ModelRequest) -> anyhow::Result<String> {
        Ok(format!(
            "HealthMate mock reply.\n\nSystem: {}\n\nUser: {}",
            request.system_prompt, request.user_prompt
        ))
    }
}
