//! Typed front door for the `generate_text` capability.

use calbot_core::{Capability, FallbackOrchestrator};

use crate::providers::{GenerateTextRequest, GenerateTextResponse};
use crate::RuntimeError;

#[derive(Debug, Clone)]
pub struct TextGenerator {
    orchestrator: FallbackOrchestrator,
}

impl TextGenerator {
    pub fn new(orchestrator: FallbackOrchestrator) -> Self {
        Self { orchestrator }
    }

    /// Generate text, trying `preferred` first when it is available.
    pub async fn generate(
        &self,
        request: &GenerateTextRequest,
        preferred: Option<&str>,
    ) -> Result<GenerateTextResponse, RuntimeError> {
        let payload = request.to_payload().map_err(RuntimeError::Encode)?;

        let invocation = self
            .orchestrator
            .invoke_with_fallback(&Capability::generate_text(), &payload, preferred)
            .await?;

        if invocation.attempted.len() > 1 {
            tracing::info!(
                provider = %invocation.provider,
                attempted = ?invocation.attempted,
                "Text generated after fallback"
            );
        }

        serde_json::from_value(invocation.response).map_err(|source| RuntimeError::Decode {
            provider: invocation.provider,
            source,
        })
    }
}
