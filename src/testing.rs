//! Recording test doubles for the external capabilities.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::api::{
    ContentGenerator, ContentPart, ImageData, MediaProcessor, VideoJobHandle, VideoJobParams,
    VideoJobStatus,
};
use crate::cancel::CancelToken;
use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Structured { system: String, content: String },
    Text { system: Option<String>, content: String },
    Image { prompt: String },
    Speech { text: String },
    SubmitVideo { prompt: String },
    PollVideo { handle: String },
}

#[derive(Default)]
pub struct MockGenerator {
    calls: Mutex<Vec<Call>>,
    structured: Mutex<VecDeque<Result<Value>>>,
    text_reply: Option<String>,
    fail_text: bool,
    /// Any call whose content contains one of these fails.
    fail_on: Vec<String>,
    /// Video jobs whose prompt contains one of these finish without a link.
    no_video_on: Vec<String>,
    /// Polls before a job reports done.
    polls_before_done: u32,
    never_finish: bool,
    jobs: Mutex<HashMap<String, (String, u32)>>,
    cancel_on: Mutex<Option<(String, CancelToken)>>,
}

impl MockGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_structured(self, reply: Result<Value>) -> Self {
        self.structured.lock().push_back(reply);
        self
    }

    pub fn with_text_reply(mut self, reply: impl Into<String>) -> Self {
        self.text_reply = Some(reply.into());
        self
    }

    pub fn failing_text(mut self) -> Self {
        self.fail_text = true;
        self
    }

    pub fn fail_on(mut self, marker: impl Into<String>) -> Self {
        self.fail_on.push(marker.into());
        self
    }

    pub fn no_video_on(mut self, marker: impl Into<String>) -> Self {
        self.no_video_on.push(marker.into());
        self
    }

    pub fn with_polls_before_done(mut self, polls: u32) -> Self {
        self.polls_before_done = polls;
        self
    }

    pub fn never_finishing(mut self) -> Self {
        self.never_finish = true;
        self
    }

    /// Fires `token` when a call's content contains `marker`, then answers normally.
    pub fn cancel_on(&self, marker: impl Into<String>, token: CancelToken) {
        *self.cancel_on.lock() = Some((marker.into(), token));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().iter().filter(|c| pred(*c)).count()
    }

    fn record(&self, call: Call, content: &str) -> Result<()> {
        self.calls.lock().push(call);

        if let Some((marker, token)) = &*self.cancel_on.lock() {
            if content.contains(marker.as_str()) {
                token.cancel();
            }
        }
        if self.fail_on.iter().any(|m| content.contains(m.as_str())) {
            return Err(PipelineError::generation(format!("mock failure for: {}", content)));
        }
        Ok(())
    }
}

fn flatten(parts: &[ContentPart]) -> String {
    parts
        .iter()
        .map(|p| match p {
            ContentPart::Text(text) => text.clone(),
            ContentPart::InlineData { mime_type, data } => format!("<{} {} bytes>", mime_type, data.len()),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl ContentGenerator for MockGenerator {
    async fn generate_structured(
        &self,
        system_instruction: &str,
        parts: &[ContentPart],
        _schema: &Value,
    ) -> Result<Value> {
        let content = flatten(parts);
        self.record(
            Call::Structured {
                system: system_instruction.to_string(),
                content: content.clone(),
            },
            &content,
        )?;

        self.structured
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(PipelineError::generation("no structured reply queued")))
    }

    async fn generate_text(
        &self,
        system_instruction: Option<&str>,
        parts: &[ContentPart],
    ) -> Result<String> {
        let content = flatten(parts);
        self.record(
            Call::Text {
                system: system_instruction.map(str::to_string),
                content: content.clone(),
            },
            &content,
        )?;

        if self.fail_text {
            return Err(PipelineError::generation("text generation unavailable"));
        }
        Ok(self
            .text_reply
            .clone()
            .unwrap_or_else(|| format!("Cinematic take on {}", content)))
    }

    async fn generate_image(&self, prompt: &str, _aspect_ratio: &str, count: u32) -> Result<Vec<ImageData>> {
        self.record(Call::Image { prompt: prompt.to_string() }, prompt)?;
        Ok((0..count)
            .map(|_| ImageData {
                mime_type: "image/jpeg".to_string(),
                bytes: prompt.as_bytes().to_vec(),
            })
            .collect())
    }

    async fn synthesize_speech(&self, text: &str, _voice: &str) -> Result<Vec<u8>> {
        self.record(Call::Speech { text: text.to_string() }, text)?;
        Ok(text.as_bytes().to_vec())
    }

    async fn submit_video_job(&self, prompt: &str, _params: &VideoJobParams) -> Result<VideoJobHandle> {
        self.record(Call::SubmitVideo { prompt: prompt.to_string() }, prompt)?;

        let mut jobs = self.jobs.lock();
        let handle = format!("job-{}", jobs.len() + 1);
        jobs.insert(handle.clone(), (prompt.to_string(), 0));
        Ok(VideoJobHandle(handle))
    }

    async fn poll_video_job(&self, handle: &VideoJobHandle) -> Result<VideoJobStatus> {
        self.record(Call::PollVideo { handle: handle.0.clone() }, &handle.0)?;

        let mut jobs = self.jobs.lock();
        let (prompt, polls) = jobs
            .get_mut(&handle.0)
            .ok_or_else(|| PipelineError::generation(format!("unknown job {}", handle.0)))?;
        *polls += 1;

        if self.never_finish || *polls <= self.polls_before_done {
            return Ok(VideoJobStatus::pending());
        }
        if self.no_video_on.iter().any(|m| prompt.contains(m.as_str())) {
            return Ok(VideoJobStatus {
                done: true,
                result_uri: None,
                error: None,
            });
        }
        Ok(VideoJobStatus::finished(format!("https://videos.example/{}.mp4", handle.0)))
    }
}

#[derive(Default)]
pub struct MockProcessor {
    loaded: Mutex<bool>,
    pub files: Mutex<HashMap<String, Vec<u8>>>,
    pub executed: Mutex<Vec<Vec<String>>>,
    pub fail_execute: bool,
}

impl MockProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail_execute: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl MediaProcessor for MockProcessor {
    async fn load_runtime(&self) -> Result<()> {
        *self.loaded.lock() = true;
        Ok(())
    }

    async fn write_input(&self, name: &str, bytes: &[u8]) -> Result<()> {
        self.files.lock().insert(name.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn execute(&self, args: &[String]) -> Result<()> {
        if !*self.loaded.lock() {
            return Err(PipelineError::media("runtime not loaded"));
        }
        self.executed.lock().push(args.to_vec());
        if self.fail_execute {
            return Err(PipelineError::media("ffmpeg exited with status 1"));
        }
        if let Some(output) = args.last() {
            self.files.lock().insert(output.clone(), b"merged".to_vec());
        }
        Ok(())
    }

    async fn read_output(&self, name: &str) -> Result<Vec<u8>> {
        self.files
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| PipelineError::media(format!("no output named {}", name)))
    }
}
