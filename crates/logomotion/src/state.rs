use generation::{ImageArtifact, VideoArtifact};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowState {
    #[default]
    Idle,
    GeneratingImage,
    ImageReady,
    GeneratingVideo,
    VideoReady,
    Error,
}

impl WorkflowState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowState::Idle => "IDLE",
            WorkflowState::GeneratingImage => "GENERATING_IMAGE",
            WorkflowState::ImageReady => "IMAGE_READY",
            WorkflowState::GeneratingVideo => "GENERATING_VIDEO",
            WorkflowState::VideoReady => "VIDEO_READY",
            WorkflowState::Error => "ERROR",
        }
    }

    /// A remote generation is in flight.
    pub fn is_generating(&self) -> bool {
        matches!(
            self,
            WorkflowState::GeneratingImage | WorkflowState::GeneratingVideo
        )
    }

    /// States from which an animation may be requested.
    pub fn accepts_video_request(&self) -> bool {
        matches!(self, WorkflowState::ImageReady | WorkflowState::VideoReady)
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Consistent copy of the workflow record for the presentation layer
#[derive(Debug, Clone, Default)]
pub struct WorkflowSnapshot {
    pub state: WorkflowState,
    pub image: Option<ImageArtifact>,
    pub video: Option<VideoArtifact>,
    pub error: Option<String>,
    /// The key selection prompt should be shown.
    pub credential_prompt: bool,
    /// A request holds the workflow, including while the credential gate
    /// is still deciding.
    pub in_flight: bool,
}

impl WorkflowSnapshot {
    /// New requests would be rejected as busy.
    pub fn is_busy(&self) -> bool {
        self.in_flight || self.state.is_generating()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_names_match_serialized_form() {
        for state in [
            WorkflowState::Idle,
            WorkflowState::GeneratingImage,
            WorkflowState::ImageReady,
            WorkflowState::GeneratingVideo,
            WorkflowState::VideoReady,
            WorkflowState::Error,
        ] {
            let json = serde_json::to_string(&state).unwrap();
            assert_eq!(json, format!("\"{}\"", state.as_str()));
        }
    }

    #[test]
    fn test_video_request_states() {
        assert!(WorkflowState::ImageReady.accepts_video_request());
        assert!(WorkflowState::VideoReady.accepts_video_request());
        assert!(!WorkflowState::Error.accepts_video_request());
        assert!(!WorkflowState::GeneratingVideo.accepts_video_request());
    }

    #[test]
    fn test_busy_while_in_flight() {
        let mut snapshot = WorkflowSnapshot {
            state: WorkflowState::ImageReady,
            ..WorkflowSnapshot::default()
        };
        assert!(!snapshot.is_busy());
        snapshot.in_flight = true;
        assert!(snapshot.is_busy());
        snapshot.in_flight = false;
        snapshot.state = WorkflowState::GeneratingVideo;
        assert!(snapshot.is_busy());
    }
}
