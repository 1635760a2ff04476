use std::time::Duration;

use tracing::{debug, info};

use crate::api::{ContentGenerator, VideoJobHandle, VideoJobStatus};
use crate::cancel::CancelToken;
use crate::config::PollConfig;
use crate::error::{PipelineError, Result};

/// Waits for an asynchronous video job: sleep, poll, repeat.
#[derive(Debug, Clone)]
pub struct VideoJobPoller {
    config: PollConfig,
}

impl VideoJobPoller {
    pub fn new(config: PollConfig) -> Self {
        Self { config }
    }

    pub fn next_interval(&self, current: Duration) -> Duration {
        if self.config.backoff_factor <= 1.0 {
            return current;
        }
        current
            .mul_f64(self.config.backoff_factor)
            .min(self.config.max_interval)
    }

    /// Polls until the job reports done. A job that finishes with an error is a
    /// generation failure; running out of attempts is a timeout.
    pub async fn wait(
        &self,
        generator: &dyn ContentGenerator,
        handle: &VideoJobHandle,
        cancel: &CancelToken,
    ) -> Result<VideoJobStatus> {
        let mut interval = self.config.interval;
        let mut attempts = 0u32;

        loop {
            if let Some(max) = self.config.max_attempts {
                if attempts >= max {
                    return Err(PipelineError::Timeout { attempts });
                }
            }

            cancel
                .run(async {
                    tokio::time::sleep(interval).await;
                    Ok(())
                })
                .await?;

            attempts += 1;
            let status = cancel.run(generator.poll_video_job(handle)).await?;
            debug!("Job {} status: done={} (poll {})", handle.0, status.done, attempts);

            if let Some(error) = status.error {
                return Err(PipelineError::generation(format!(
                    "video job {} failed: {}",
                    handle.0, error
                )));
            }
            if status.done {
                info!("Video job {} finished after {} polls", handle.0, attempts);
                return Ok(status);
            }

            interval = self.next_interval(interval);
        }
    }
}
