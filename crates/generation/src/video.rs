/// Animation of a logo still: job submission, polling, download.
///
/// The poll loop waits a fixed interval between status checks. Every wait,
/// status check and the final download race the caller's cancellation token,
/// and the loop as a whole is bounded by an optional deadline measured from
/// job submission.

use crate::artifacts::{ImageArtifact, VideoArtifact, DEFAULT_VIDEO_MIME};
use crate::backends::{BackendConfig, MediaFetcher, VideoBackend, VideoOperation, VideoRequest};
use crate::error::{GenerationError, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Settings for animation jobs
#[derive(Debug, Clone)]
pub struct VideoSettings {
    pub model: String,
    pub resolution: String,
    pub aspect_ratio: String,
    pub poll_interval: Duration,
    /// `None` polls until the provider reports completion
    pub timeout: Option<Duration>,
}

impl From<&BackendConfig> for VideoSettings {
    fn from(config: &BackendConfig) -> Self {
        Self {
            model: config.video_model.clone(),
            resolution: config.video_resolution.clone(),
            aspect_ratio: config.video_aspect_ratio.clone(),
            poll_interval: config.poll_interval(),
            timeout: config.video_timeout(),
        }
    }
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self::from(&BackendConfig::default())
    }
}

#[derive(Clone)]
pub struct VideoClient {
    backend: Arc<dyn VideoBackend>,
    fetcher: Arc<dyn MediaFetcher>,
    settings: VideoSettings,
}

impl VideoClient {
    pub fn new(
        backend: Arc<dyn VideoBackend>,
        fetcher: Arc<dyn MediaFetcher>,
        settings: VideoSettings,
    ) -> Self {
        Self {
            backend,
            fetcher,
            settings,
        }
    }

    pub fn settings(&self) -> &VideoSettings {
        &self.settings
    }

    /// Animate `image` following `prompt`. The prompt is sent as given;
    /// substituting a default for a blank prompt is up to the caller.
    pub async fn generate_video(
        &self,
        image: &ImageArtifact,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<VideoArtifact> {
        let request = VideoRequest {
            model: self.settings.model.clone(),
            prompt: prompt.to_string(),
            image: image.clone(),
            number_of_videos: 1,
            resolution: self.settings.resolution.clone(),
            aspect_ratio: self.settings.aspect_ratio.clone(),
        };

        let operation = guarded(cancel, None, self.backend.submit_video(&request)).await?;
        info!(
            "Video job {} submitted to {} ({})",
            operation.name,
            self.backend.name(),
            request.model
        );

        let operation = self.wait_for_completion(operation, cancel).await?;
        let uri = completed_uri(operation)?;
        self.download(&uri, cancel).await
    }

    async fn wait_for_completion(
        &self,
        mut operation: VideoOperation,
        cancel: &CancellationToken,
    ) -> Result<VideoOperation> {
        let deadline = self
            .settings
            .timeout
            .map(|timeout| (Instant::now() + timeout, timeout));
        let mut polls: u32 = 0;

        while !operation.done {
            let interval = self.settings.poll_interval;
            guarded(cancel, deadline, async {
                sleep(interval).await;
                Ok(())
            })
            .await?;

            polls += 1;
            operation = guarded(cancel, deadline, self.backend.poll_video(&operation)).await?;
            debug!(
                "Video job {} poll #{}: done={}",
                operation.name, polls, operation.done
            );
        }

        info!("Video job {} finished after {} polls", operation.name, polls);
        Ok(operation)
    }

    async fn download(&self, uri: &str, cancel: &CancellationToken) -> Result<VideoArtifact> {
        let media = guarded(cancel, None, self.fetcher.fetch(uri)).await?;
        if !media.is_success() {
            let reason = if media.status_text.trim().is_empty() {
                media.status.to_string()
            } else {
                media.status_text.clone()
            };
            warn!("Video download failed with status {}", media.status);
            return Err(GenerationError::download(format!(
                "Failed to download video: {reason}"
            )));
        }
        if media.body.is_empty() {
            return Err(GenerationError::download(
                "Failed to download video: empty response body",
            ));
        }

        let mime_type = media
            .content_type
            .as_deref()
            .and_then(|value| value.split(';').next())
            .map(str::trim)
            .filter(|value| value.starts_with("video/"))
            .unwrap_or(DEFAULT_VIDEO_MIME)
            .to_string();
        info!("Downloaded video ({} bytes, {})", media.body.len(), mime_type);
        Ok(VideoArtifact::new(media.body, mime_type, uri))
    }
}

/// Result reference of a finished job, or the failure it finished with.
fn completed_uri(operation: VideoOperation) -> Result<String> {
    if let Some(error) = operation.error {
        return Err(GenerationError::from_remote(error.code, &error.message));
    }
    operation.video_uri.ok_or_else(|| {
        GenerationError::generation("Video generation completed but no URI returned.")
    })
}

/// Run `fut` unless the token fires or the deadline passes first.
async fn guarded<T>(
    cancel: &CancellationToken,
    deadline: Option<(Instant, Duration)>,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    let expiry = async {
        match deadline {
            Some((at, _)) => sleep_until(at).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(GenerationError::Cancelled),
        _ = expiry => Err(GenerationError::TimedOut(
            deadline.map(|(_, timeout)| timeout).unwrap_or_default(),
        )),
        result = fut => result,
    }
}
