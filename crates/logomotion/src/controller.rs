/// Workflow controller
///
/// Sequences the logo pipeline as an explicit state machine:
///
/// ```text
/// Idle ──request_image──▶ GeneratingImage ──ok──▶ ImageReady ──request_video──▶ GeneratingVideo
///                              │                     ▲   ▲                          │      │
///                              └──err──▶ Error       │   └──────────err─────────────┘      ok
///                                                    │                                     ▼
///                     provide_image_directly (any) ──┘                                VideoReady
/// ```
///
/// The record is guarded by a mutex that is never held across an await.
/// Every image change bumps an epoch; a generation whose starting epoch is
/// no longer current when it finishes is discarded, so a video is only ever
/// stored next to the image it was made from. A request that is dropped
/// before it settles releases the workflow from its guard's `Drop`.

use crate::config::LogomotionConfig;
use crate::credential::{CredentialError, CredentialFlow, CredentialGate};
use crate::retry::with_auth_retry;
use crate::state::{WorkflowSnapshot, WorkflowState};
use generation::prompts::animation_prompt_or_default;
use generation::{
    ApiKeySource, BackendFactory, CancellationToken, GenerationError, ImageArtifact, ImageClient,
    ImageSettings, VideoArtifact, VideoClient, VideoSettings,
};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub const IMAGE_FAILURE_FALLBACK: &str = "Failed to generate logo. Please try again.";
pub const VIDEO_FAILURE_FALLBACK: &str =
    "Failed to animate logo. Note: Video generation takes time.";

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("a generation is already in progress ({0})")]
    Busy(WorkflowState),

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error("no video to export")]
    NoVideo,

    #[error(transparent)]
    Export(#[from] anyhow::Error),
}

/// How a request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// The request ran; the workflow settled in this state.
    Completed(WorkflowState),
    /// No usable credential; the selection prompt is raised.
    CredentialRequired,
    /// Animation requested with no image; nothing happened.
    NoImage,
    /// Animation requested from a state that doesn't accept it.
    NotReady(WorkflowState),
    /// A newer image replaced this request's input; its result was dropped.
    Superseded,
}

struct WorkflowRecord {
    state: WorkflowState,
    image: Option<ImageArtifact>,
    video: Option<VideoArtifact>,
    error: Option<String>,
    credential_prompt: bool,
    /// A request is between its busy check and its completion.
    in_flight: bool,
    epoch: u64,
    cancel: CancellationToken,
}

impl WorkflowRecord {
    fn snapshot(&self) -> WorkflowSnapshot {
        WorkflowSnapshot {
            state: self.state,
            image: self.image.clone(),
            video: self.video.clone(),
            error: self.error.clone(),
            credential_prompt: self.credential_prompt,
            in_flight: self.in_flight,
        }
    }

    fn transition(&mut self, to: WorkflowState) {
        if self.state != to {
            info!("Workflow {} -> {}", self.state, to);
        }
        self.state = to;
    }

    fn busy_state(&self) -> Option<WorkflowState> {
        if self.in_flight || self.state.is_generating() {
            Some(self.state)
        } else {
            None
        }
    }

    /// Start a request: mark it in flight and hand out a fresh token.
    fn begin(&mut self) -> (u64, CancellationToken) {
        self.in_flight = true;
        self.error = None;
        self.cancel = CancellationToken::new();
        (self.epoch, self.cancel.clone())
    }

    /// Where the workflow rests given what it currently holds.
    fn resting_state(&self) -> WorkflowState {
        match (&self.image, &self.video) {
            (_, Some(_)) => WorkflowState::VideoReady,
            (Some(_), None) => WorkflowState::ImageReady,
            (None, None) => WorkflowState::Idle,
        }
    }

    fn set_image(&mut self, image: ImageArtifact) {
        self.image = Some(image);
        self.video = None;
        self.error = None;
        self.epoch += 1;
        self.transition(WorkflowState::ImageReady);
    }
}

/// Holds the workflow for one request. Settling records the outcome;
/// dropping it unsettled (the caller's future was cancelled) clears the
/// in-flight mark and backs out of a `Generating*` state it entered.
struct InFlight<'a> {
    controller: &'a WorkflowController,
    epoch: u64,
    cancel: CancellationToken,
    settled: bool,
}

impl<'a> InFlight<'a> {
    fn new(controller: &'a WorkflowController, (epoch, cancel): (u64, CancellationToken)) -> Self {
        Self {
            controller,
            epoch,
            cancel,
            settled: false,
        }
    }

    fn settle<R>(mut self, f: impl FnOnce(&mut WorkflowRecord) -> R) -> R {
        self.settled = true;
        self.controller.update(|record| {
            record.in_flight = false;
            f(record)
        })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        self.cancel.cancel();
        let epoch = self.epoch;
        self.controller.update(|record| {
            record.in_flight = false;
            if record.epoch == epoch && record.state.is_generating() {
                warn!("{} abandoned before it finished", record.state);
                let to = record.resting_state();
                record.transition(to);
            }
        });
    }
}

pub struct WorkflowController {
    gate: CredentialGate,
    images: ImageClient,
    videos: VideoClient,
    export_file_name: String,
    record: Mutex<WorkflowRecord>,
    updates: watch::Sender<WorkflowSnapshot>,
}

impl WorkflowController {
    pub fn new(gate: CredentialGate, images: ImageClient, videos: VideoClient) -> Self {
        let record = WorkflowRecord {
            state: WorkflowState::Idle,
            image: None,
            video: None,
            error: None,
            credential_prompt: false,
            in_flight: false,
            epoch: 0,
            cancel: CancellationToken::new(),
        };
        let (updates, _) = watch::channel(record.snapshot());
        Self {
            gate,
            images,
            videos,
            export_file_name: LogomotionConfig::default().export_file_name,
            record: Mutex::new(record),
            updates,
        }
    }

    /// Build backends and clients from configuration.
    pub fn from_config(
        config: &LogomotionConfig,
        flow: Option<Arc<dyn CredentialFlow>>,
        keys: Arc<dyn ApiKeySource>,
    ) -> Result<Self, GenerationError> {
        let backends = BackendFactory::create(&config.backend, keys.clone())?;
        info!("Using {} generation backend", config.backend.backend_type);
        let gate = CredentialGate::new(flow, keys).with_policy(config.selector_policy);
        let images = ImageClient::new(backends.image, ImageSettings::from(&config.backend));
        let videos = VideoClient::new(
            backends.video,
            backends.fetcher,
            VideoSettings::from(&config.backend),
        );
        Ok(Self::new(gate, images, videos).with_export_file_name(&config.export_file_name))
    }

    pub fn with_export_file_name(mut self, name: &str) -> Self {
        self.export_file_name = name.to_string();
        self
    }

    pub fn snapshot(&self) -> WorkflowSnapshot {
        self.record.lock().snapshot()
    }

    pub fn state(&self) -> WorkflowState {
        self.record.lock().state
    }

    /// Receiver that sees every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<WorkflowSnapshot> {
        self.updates.subscribe()
    }

    fn update<R>(&self, f: impl FnOnce(&mut WorkflowRecord) -> R) -> R {
        let (result, snapshot) = {
            let mut record = self.record.lock();
            let result = f(&mut record);
            (result, record.snapshot())
        };
        self.updates.send_replace(snapshot);
        result
    }

    /// Generate a logo still from a description.
    pub async fn request_image_generation(
        &self,
        prompt: &str,
    ) -> Result<RequestOutcome, WorkflowError> {
        let begun = self.update(|record| match record.busy_state() {
            Some(state) => Err(WorkflowError::Busy(state)),
            None => Ok(record.begin()),
        })?;
        let request = InFlight::new(self, begun);
        let epoch = request.epoch;

        if !self.gate.ensure_credential().await {
            return Ok(self.credential_missing(request));
        }

        let started = self.update(|record| {
            if record.epoch != epoch {
                return false;
            }
            record.video = None;
            record.credential_prompt = false;
            record.transition(WorkflowState::GeneratingImage);
            true
        });
        if !started {
            return Ok(request.settle(|_| RequestOutcome::Superseded));
        }

        let images = &self.images;
        let result = tokio::select! {
            biased;
            _ = request.cancel.cancelled() => Err(GenerationError::Cancelled),
            result = with_auth_retry(self.gate.flow(), move || images.generate_image(prompt)) => result,
        };

        Ok(request.settle(|record| {
            if record.epoch != epoch {
                debug!("Discarding image result for a replaced input");
                return RequestOutcome::Superseded;
            }
            match result {
                Ok(image) => record.set_image(image),
                Err(err) => {
                    warn!("Logo generation failed ({}): {}", err.kind(), err);
                    record.error = Some(failure_message(&err, IMAGE_FAILURE_FALLBACK));
                    record.transition(WorkflowState::Error);
                }
            }
            RequestOutcome::Completed(record.state)
        }))
    }

    /// Store an uploaded image. Allowed from any state; an in-flight
    /// generation is cancelled and its result dropped.
    pub fn provide_image_directly(&self, image: ImageArtifact) -> WorkflowState {
        self.update(|record| {
            if record.in_flight {
                info!("Upload replaces the input of an in-flight generation");
                record.cancel.cancel();
            }
            record.set_image(image);
            record.state
        })
    }

    /// Animate the current image. A blank prompt uses the default
    /// cinematic reveal.
    pub async fn request_video_generation(
        &self,
        prompt: &str,
    ) -> Result<RequestOutcome, WorkflowError> {
        let prompt = animation_prompt_or_default(prompt);
        let begun = self.update(|record| {
            if record.image.is_none() {
                return Ok(None);
            }
            if let Some(state) = record.busy_state() {
                return Err(WorkflowError::Busy(state));
            }
            if !record.state.accepts_video_request() {
                return Ok(Some(Err(record.state)));
            }
            Ok(Some(Ok(record.begin())))
        })?;
        let request = match begun {
            None => {
                debug!("Animation requested without an image; ignoring");
                return Ok(RequestOutcome::NoImage);
            }
            Some(Err(state)) => return Ok(RequestOutcome::NotReady(state)),
            Some(Ok(started)) => InFlight::new(self, started),
        };
        let epoch = request.epoch;

        if !self.gate.ensure_credential().await {
            return Ok(self.credential_missing(request));
        }

        let image = self.update(|record| {
            if record.epoch != epoch {
                return None;
            }
            let image = record.image.clone()?;
            record.credential_prompt = false;
            record.transition(WorkflowState::GeneratingVideo);
            Some(image)
        });
        let Some(image) = image else {
            return Ok(request.settle(|_| RequestOutcome::Superseded));
        };

        let videos = &self.videos;
        let image_ref = &image;
        let cancel_ref = &request.cancel;
        let result = with_auth_retry(self.gate.flow(), move || {
            videos.generate_video(image_ref, prompt, cancel_ref)
        })
        .await;

        Ok(request.settle(|record| {
            if record.epoch != epoch {
                debug!("Discarding video result for a replaced image");
                return RequestOutcome::Superseded;
            }
            match result {
                Ok(video) => {
                    record.video = Some(video);
                    record.transition(WorkflowState::VideoReady);
                }
                Err(err) => {
                    warn!("Logo animation failed ({}): {}", err.kind(), err);
                    record.error = Some(failure_message(&err, VIDEO_FAILURE_FALLBACK));
                    record.transition(WorkflowState::ImageReady);
                }
            }
            RequestOutcome::Completed(record.state)
        }))
    }

    /// Open the key selector on behalf of the credential prompt.
    pub async fn select_credential(&self) -> Result<(), WorkflowError> {
        let flow = self.gate.flow().ok_or(CredentialError::Unavailable)?;
        if let Err(err) = flow.open_selector().await {
            warn!("Failed to open key selector: {}", err);
            return Err(err.into());
        }
        self.update(|record| record.credential_prompt = false);
        Ok(())
    }

    /// Cancel the in-flight generation, if any.
    pub fn cancel(&self) {
        let record = self.record.lock();
        if record.in_flight {
            info!("Cancelling {}", record.state);
            record.cancel.cancel();
        }
    }

    /// Write the current video into `dir`.
    pub fn export_video(&self, dir: &Path) -> Result<PathBuf, WorkflowError> {
        let video = self.record.lock().video.clone().ok_or(WorkflowError::NoVideo)?;
        let path = dir.join(&self.export_file_name);
        video.export(&path)?;
        info!("Exported video to {}", path.display());
        Ok(path)
    }

    fn credential_missing(&self, request: InFlight<'_>) -> RequestOutcome {
        info!("No usable credential; prompting for key selection");
        request.settle(|record| record.credential_prompt = true);
        RequestOutcome::CredentialRequired
    }
}

fn failure_message(err: &GenerationError, fallback: &str) -> String {
    let message = err.to_string();
    if message.trim().is_empty() {
        fallback.to_string()
    } else {
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_message_fallback() {
        assert_eq!(
            failure_message(&GenerationError::generation(""), IMAGE_FAILURE_FALLBACK),
            IMAGE_FAILURE_FALLBACK
        );
        assert_eq!(
            failure_message(
                &GenerationError::download("Failed to download video: Forbidden"),
                VIDEO_FAILURE_FALLBACK
            ),
            "Failed to download video: Forbidden"
        );
    }
}
