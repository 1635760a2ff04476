use crate::api::ContentPart;
use crate::error::{PipelineError, Result};

use super::InputModality;

/// Source material a script is generated from.
#[derive(Debug, Clone)]
pub enum ScriptSource {
    Video { bytes: Vec<u8>, mime_type: String },
    Image { bytes: Vec<u8>, mime_type: String },
    Url(String),
    Text(String),
}

#[derive(Debug, Clone)]
pub struct ScriptInput {
    pub source: ScriptSource,
    pub additional_instructions: String,
}

impl ScriptInput {
    pub fn new(source: ScriptSource) -> Self {
        Self {
            source,
            additional_instructions: String::new(),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::new(ScriptSource::Text(text.into()))
    }

    pub fn url(url: impl Into<String>) -> Self {
        Self::new(ScriptSource::Url(url.into()))
    }

    pub fn video(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self::new(ScriptSource::Video {
            bytes,
            mime_type: mime_type.into(),
        })
    }

    pub fn image(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self::new(ScriptSource::Image {
            bytes,
            mime_type: mime_type.into(),
        })
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.additional_instructions = instructions.into();
        self
    }

    pub fn modality(&self) -> InputModality {
        match self.source {
            ScriptSource::Video { .. } => InputModality::Video,
            ScriptSource::Image { .. } => InputModality::Image,
            ScriptSource::Url(_) => InputModality::Url,
            ScriptSource::Text(_) => InputModality::Text,
        }
    }

    /// Rejects empty media, URLs or text before any request is made.
    pub fn validate(&self) -> Result<()> {
        let missing = match &self.source {
            ScriptSource::Video { bytes, .. } | ScriptSource::Image { bytes, .. } => bytes.is_empty(),
            ScriptSource::Url(url) => url.trim().is_empty(),
            ScriptSource::Text(text) => text.trim().is_empty(),
        };

        if missing {
            return Err(PipelineError::invalid_argument(format!(
                "no {} input provided",
                self.modality()
            )));
        }
        Ok(())
    }

    /// Parts for script generation: the modality prompt, then the inlined media.
    pub fn script_parts(&self) -> Vec<ContentPart> {
        let extra = &self.additional_instructions;
        let prompt = match &self.source {
            ScriptSource::Video { .. } => {
                format!("Analise este vídeo e siga as instruções adicionais: {}", extra)
            }
            ScriptSource::Image { .. } => {
                format!("Analise esta imagem e siga as instruções adicionais: {}", extra)
            }
            ScriptSource::Url(url) => format!(
                "Analise o conteúdo desta URL: {}\n\nInstruções adicionais: {}",
                url, extra
            ),
            ScriptSource::Text(text) => format!(
                "Siga estas instruções: {}\n\nInstruções adicionais: {}",
                text, extra
            ),
        };

        self.with_media(prompt)
    }

    /// Parts for the concept-art prompt derivation.
    pub fn concept_parts(&self) -> Vec<ContentPart> {
        let prompt = match &self.source {
            ScriptSource::Video { .. } => "Analyze this video.".to_string(),
            ScriptSource::Image { .. } => "Analyze this image.".to_string(),
            ScriptSource::Url(url) => format!("Analyze the content of this URL: {}", url),
            ScriptSource::Text(text) => text.clone(),
        };

        self.with_media(prompt)
    }

    fn with_media(&self, prompt: String) -> Vec<ContentPart> {
        let mut parts = vec![ContentPart::text(prompt)];
        match &self.source {
            ScriptSource::Video { bytes, mime_type } | ScriptSource::Image { bytes, mime_type } => {
                parts.push(ContentPart::inline(mime_type.clone(), bytes.clone()));
            }
            ScriptSource::Url(_) | ScriptSource::Text(_) => {}
        }
        parts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_inputs_are_invalid() {
        assert!(ScriptInput::text("   ").validate().is_err());
        assert!(ScriptInput::url("").validate().is_err());
        assert!(ScriptInput::video(vec![], "video/mp4").validate().is_err());
        assert!(ScriptInput::text("a fox at dawn").validate().is_ok());
    }

    #[test]
    fn video_parts_inline_the_media() {
        let input = ScriptInput::video(vec![1, 2, 3], "video/mp4").with_instructions("keep it short");
        let parts = input.script_parts();

        assert_eq!(parts.len(), 2);
        assert_eq!(
            parts[0],
            ContentPart::text("Analise este vídeo e siga as instruções adicionais: keep it short")
        );
        assert_eq!(parts[1], ContentPart::inline("video/mp4", vec![1, 2, 3]));
    }

    #[test]
    fn url_parts_are_text_only() {
        let parts = ScriptInput::url("https://example.com").concept_parts();
        assert_eq!(
            parts,
            vec![ContentPart::text("Analyze the content of this URL: https://example.com")]
        );
    }
}
