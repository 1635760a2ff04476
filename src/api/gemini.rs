use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::audio::{pcm_to_wav, TTS_CHANNELS, TTS_SAMPLE_RATE};
use crate::config::GeminiConfig;
use crate::error::{PipelineError, Result};

use super::{
    ContentGenerator, ContentPart, ImageData, VideoJobHandle, VideoJobParams, VideoJobStatus,
};

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Gemini REST client: text, structured JSON, Imagen, Veo and TTS.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    config: GeminiConfig,
    client: Client,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<WireContent>,
    contents: Vec<WireContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<Value>,
}

#[derive(Debug, Serialize)]
struct WireContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<WirePart>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WirePart {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<WireBlob>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireBlob {
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponsePart {
    text: Option<String>,
    inline_data: Option<ResponseBlob>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponseBlob {
    #[allow(dead_code)]
    mime_type: Option<String>,
    data: String,
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Prediction {
    bytes_base64_encoded: Option<String>,
    mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OperationResponse {
    name: String,
    #[serde(default)]
    done: bool,
    response: Option<OperationResult>,
    error: Option<OperationError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationResult {
    generate_video_response: Option<GenerateVideoResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateVideoResponse {
    #[serde(default)]
    generated_samples: Vec<GeneratedSample>,
}

#[derive(Debug, Deserialize)]
struct GeneratedSample {
    video: Option<VideoRef>,
}

#[derive(Debug, Deserialize)]
struct VideoRef {
    uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OperationError {
    message: String,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(PipelineError::invalid_argument("Gemini API key is empty"));
        }

        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self { config, client })
    }

    fn model_url(&self, model: &str, method: &str) -> String {
        format!("{}/models/{}:{}", self.config.base_url, model, method)
    }

    async fn post_json<T: serde::de::DeserializeOwned>(&self, url: &str, body: &impl Serialize) -> Result<T> {
        let response = self
            .client
            .post(url)
            .header(API_KEY_HEADER, &self.config.api_key)
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            return Err(PipelineError::generation(format!(
                "Gemini API error (HTTP {}): {}",
                status, error_text
            )));
        }

        let text = response.text().await?;
        serde_json::from_str(&text)
            .map_err(|e| PipelineError::parse(format!("unexpected Gemini response: {}", e)))
    }

    async fn generate_content(&self, model: &str, request: GenerateContentRequest) -> Result<Vec<ResponsePart>> {
        let url = self.model_url(model, "generateContent");
        let response: GenerateContentResponse = self.post_json(&url, &request).await?;

        response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts)
            .filter(|parts| !parts.is_empty())
            .ok_or_else(|| PipelineError::generation("Gemini returned no candidates"))
    }

    /// Fetches a finished video; the result link needs the API key too.
    pub async fn download(&self, uri: &str) -> Result<Vec<u8>> {
        info!("Downloading video from: {}", uri);
        let response = self
            .client
            .get(uri)
            .header(API_KEY_HEADER, &self.config.api_key)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(PipelineError::generation(format!(
                "video download failed (HTTP {})",
                response.status()
            )));
        }
        Ok(response.bytes().await?.to_vec())
    }
}

fn wire_parts(parts: &[ContentPart]) -> Vec<WirePart> {
    parts
        .iter()
        .map(|part| match part {
            ContentPart::Text(text) => WirePart {
                text: Some(text.clone()),
                inline_data: None,
            },
            ContentPart::InlineData { mime_type, data } => WirePart {
                text: None,
                inline_data: Some(WireBlob {
                    mime_type: mime_type.clone(),
                    data: BASE64.encode(data),
                }),
            },
        })
        .collect()
}

fn user_content(parts: &[ContentPart]) -> Vec<WireContent> {
    vec![WireContent {
        role: Some("user"),
        parts: wire_parts(parts),
    }]
}

fn system_content(instruction: Option<&str>) -> Option<WireContent> {
    instruction.map(|text| WireContent {
        role: None,
        parts: vec![WirePart {
            text: Some(text.to_string()),
            inline_data: None,
        }],
    })
}

fn joined_text(parts: Vec<ResponsePart>) -> String {
    parts.into_iter().filter_map(|p| p.text).collect::<Vec<_>>().join("")
}

/// Drops a surrounding markdown code fence, if the model added one.
pub(crate) fn strip_code_fence(text: &str) -> &str {
    text.trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

#[async_trait]
impl ContentGenerator for GeminiClient {
    async fn generate_structured(
        &self,
        system_instruction: &str,
        parts: &[ContentPart],
        schema: &Value,
    ) -> Result<Value> {
        let request = GenerateContentRequest {
            system_instruction: system_content(Some(system_instruction)),
            contents: user_content(parts),
            generation_config: Some(json!({
                "responseMimeType": "application/json",
                "responseSchema": schema,
            })),
        };

        let text = joined_text(self.generate_content(&self.config.text_model, request).await?);
        debug!("Structured response: {}", text);

        serde_json::from_str(strip_code_fence(&text))
            .map_err(|e| PipelineError::parse(format!("response is not valid JSON: {}", e)))
    }

    async fn generate_text(
        &self,
        system_instruction: Option<&str>,
        parts: &[ContentPart],
    ) -> Result<String> {
        let request = GenerateContentRequest {
            system_instruction: system_content(system_instruction),
            contents: user_content(parts),
            generation_config: None,
        };

        let text = joined_text(self.generate_content(&self.config.text_model, request).await?);
        if text.trim().is_empty() {
            return Err(PipelineError::generation("Gemini returned an empty text response"));
        }
        Ok(text)
    }

    async fn generate_image(
        &self,
        prompt: &str,
        aspect_ratio: &str,
        count: u32,
    ) -> Result<Vec<ImageData>> {
        info!("Generating image for prompt: {}", prompt);

        let url = self.model_url(&self.config.image_model, "predict");
        let body = json!({
            "instances": [{ "prompt": prompt }],
            "parameters": {
                "sampleCount": count,
                "aspectRatio": aspect_ratio,
                "outputMimeType": "image/jpeg",
            }
        });

        let response: PredictResponse = self.post_json(&url, &body).await?;
        let images = response
            .predictions
            .into_iter()
            .filter_map(|p| {
                let encoded = p.bytes_base64_encoded?;
                Some((encoded, p.mime_type.unwrap_or_else(|| "image/jpeg".to_string())))
            })
            .map(|(encoded, mime_type)| {
                BASE64
                    .decode(encoded)
                    .map(|bytes| ImageData { mime_type, bytes })
                    .map_err(|e| PipelineError::parse(format!("invalid image payload: {}", e)))
            })
            .collect::<Result<Vec<_>>>()?;

        if images.is_empty() {
            return Err(PipelineError::generation("Image generation returned no images"));
        }
        Ok(images)
    }

    async fn synthesize_speech(&self, text: &str, voice: &str) -> Result<Vec<u8>> {
        info!("Generating speech for text: {}", text);

        let request = GenerateContentRequest {
            system_instruction: None,
            contents: user_content(&[ContentPart::text(text)]),
            generation_config: Some(json!({
                "responseModalities": ["AUDIO"],
                "speechConfig": {
                    "voiceConfig": { "prebuiltVoiceConfig": { "voiceName": voice } }
                }
            })),
        };

        let parts = self.generate_content(&self.config.speech_model, request).await?;
        let blob = parts
            .into_iter()
            .find_map(|p| p.inline_data)
            .ok_or_else(|| PipelineError::generation("speech response carried no audio"))?;

        let pcm = BASE64
            .decode(blob.data)
            .map_err(|e| PipelineError::parse(format!("invalid audio payload: {}", e)))?;

        pcm_to_wav(&pcm, TTS_SAMPLE_RATE, TTS_CHANNELS)
    }

    async fn submit_video_job(
        &self,
        prompt: &str,
        params: &VideoJobParams,
    ) -> Result<VideoJobHandle> {
        let url = self.model_url(&self.config.video_model, "predictLongRunning");
        let body = json!({
            "instances": [{ "prompt": prompt }],
            "parameters": {
                "aspectRatio": params.aspect_ratio,
                "sampleCount": params.number_of_videos,
            }
        });

        let operation: OperationResponse = self.post_json(&url, &body).await?;
        info!("Video generation job submitted: {}", operation.name);
        Ok(VideoJobHandle(operation.name))
    }

    async fn poll_video_job(&self, handle: &VideoJobHandle) -> Result<VideoJobStatus> {
        let url = format!("{}/{}", self.config.base_url, handle.0);
        let response = self
            .client
            .get(&url)
            .header(API_KEY_HEADER, &self.config.api_key)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            return Err(PipelineError::generation(format!(
                "failed to get job status (HTTP {}): {}",
                status, error_text
            )));
        }

        let text = response.text().await?;
        let operation: OperationResponse = serde_json::from_str(&text)
            .map_err(|e| PipelineError::parse(format!("failed to parse job status: {}", e)))?;

        let result_uri = operation
            .response
            .and_then(|r| r.generate_video_response)
            .and_then(|r| r.generated_samples.into_iter().next())
            .and_then(|s| s.video)
            .and_then(|v| v.uri);

        Ok(VideoJobStatus {
            done: operation.done,
            result_uri,
            error: operation.error.map(|e| e.message),
        })
    }
}
