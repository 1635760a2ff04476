use std::fmt;

use tracing::info;

use crate::api::{ContentGenerator, ContentPart};
use crate::cancel::CancelToken;
use crate::error::{PipelineError, Result};

/// Shared look-and-feel for one video run. Never reused across runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleGuide(String);

impl StyleGuide {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StyleGuide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub struct StyleGuideSynthesizer;

impl StyleGuideSynthesizer {
    pub fn request_text(visual_prompts: &[String]) -> Result<String> {
        let script = serde_json::to_string(visual_prompts)?;
        Ok(format!(
            "Based on the following script scenes, create a \"master style guide\" for a video director. \
This guide should define the overall visual identity, including camera style (e.g., handheld, static, cinematic), \
color grading (e.g., vibrant, muted, high-contrast), pacing (e.g., fast-paced, slow and deliberate), \
and mood (e.g., dramatic, upbeat, mysterious). This guide will ensure all generated video clips feel consistent. \
Script: {}",
            script
        ))
    }

    pub async fn synthesize(
        generator: &dyn ContentGenerator,
        visual_prompts: &[String],
        cancel: &CancelToken,
    ) -> Result<StyleGuide> {
        if visual_prompts.is_empty() {
            return Err(PipelineError::invalid_argument(
                "style guide needs at least one scene",
            ));
        }

        info!("Creating master style guide from {} scenes...", visual_prompts.len());
        let request = Self::request_text(visual_prompts)?;
        let text = cancel
            .run(generator.generate_text(None, &[ContentPart::text(request)]))
            .await?;

        Ok(StyleGuide::new(text.trim()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Call, MockGenerator};

    #[tokio::test]
    async fn one_call_with_every_prompt() {
        let generator = MockGenerator::new().with_text_reply("Muted tones, slow dolly moves.");
        let prompts = vec!["a harbor at dawn".to_string(), "gulls over water".to_string()];

        let guide = StyleGuideSynthesizer::synthesize(&generator, &prompts, &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(guide.as_str(), "Muted tones, slow dolly moves.");
        let calls = generator.calls();
        assert_eq!(calls.len(), 1);
        match &calls[0] {
            Call::Text { system, content } => {
                assert!(system.is_none());
                assert!(content.contains("[\"a harbor at dawn\",\"gulls over water\"]"));
                assert!(content.contains("color grading"));
            }
            other => panic!("unexpected call: {:?}", other),
        }
    }

    #[tokio::test]
    async fn failure_yields_no_guide() {
        let generator = MockGenerator::new().failing_text();
        let result = StyleGuideSynthesizer::synthesize(
            &generator,
            &["x".to_string()],
            &CancelToken::new(),
        )
        .await;
        assert!(matches!(result, Err(PipelineError::Generation(_))));
    }
}
