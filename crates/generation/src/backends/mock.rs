use super::{
    FetchedMedia, GeneratedImage, ImageBackend, ImageRequest, ImageResponse, MediaFetcher,
    VideoBackend, VideoOperation, VideoRequest,
};
use crate::error::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Minimal JPEG markers (SOI + EOI) served when no image is scripted.
pub const PLACEHOLDER_JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0xFF, 0xD9];
/// `ftyp` box header served when no download is scripted.
pub const PLACEHOLDER_MP4: &[u8] = &[
    0x00, 0x00, 0x00, 0x18, b'f', b't', b'y', b'p', b'm', b'p', b'4', b'2',
];

/// Scripted responses, consumed front to back. Once a queue is empty the
/// backend answers with a successful placeholder.
#[derive(Clone, Debug, Default)]
pub struct MockConfig {
    pub image_results: Vec<Result<ImageResponse>>,
    pub submit_results: Vec<Result<VideoOperation>>,
    pub poll_results: Vec<Result<VideoOperation>>,
    pub fetch_results: Vec<Result<FetchedMedia>>,
}

impl MockConfig {
    pub fn with_image(mut self, result: Result<ImageResponse>) -> Self {
        self.image_results.push(result);
        self
    }

    pub fn with_submit(mut self, result: Result<VideoOperation>) -> Self {
        self.submit_results.push(result);
        self
    }

    pub fn with_poll(mut self, result: Result<VideoOperation>) -> Self {
        self.poll_results.push(result);
        self
    }

    pub fn with_fetch(mut self, result: Result<FetchedMedia>) -> Self {
        self.fetch_results.push(result);
        self
    }
}

#[derive(Default)]
struct MockState {
    image_results: VecDeque<Result<ImageResponse>>,
    submit_results: VecDeque<Result<VideoOperation>>,
    poll_results: VecDeque<Result<VideoOperation>>,
    fetch_results: VecDeque<Result<FetchedMedia>>,
    image_requests: Vec<ImageRequest>,
    video_requests: Vec<VideoRequest>,
    polled: Vec<String>,
    fetched: Vec<String>,
    jobs_submitted: u64,
}

pub struct MockBackend {
    state: Mutex<MockState>,
}

impl MockBackend {
    pub fn new(config: MockConfig) -> Self {
        Self {
            state: Mutex::new(MockState {
                image_results: config.image_results.into(),
                submit_results: config.submit_results.into(),
                poll_results: config.poll_results.into(),
                fetch_results: config.fetch_results.into(),
                ..MockState::default()
            }),
        }
    }

    pub fn image_requests(&self) -> Vec<ImageRequest> {
        self.state.lock().image_requests.clone()
    }

    pub fn video_requests(&self) -> Vec<VideoRequest> {
        self.state.lock().video_requests.clone()
    }

    pub fn poll_count(&self) -> usize {
        self.state.lock().polled.len()
    }

    pub fn fetched_uris(&self) -> Vec<String> {
        self.state.lock().fetched.clone()
    }

    /// Image response carrying a single payload.
    pub fn single_image(bytes: impl Into<Vec<u8>>, mime_type: &str) -> ImageResponse {
        ImageResponse {
            images: vec![GeneratedImage {
                bytes: bytes.into(),
                mime_type: Some(mime_type.to_string()),
            }],
        }
    }
}

#[async_trait]
impl ImageBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate_images(&self, request: &ImageRequest) -> Result<ImageResponse> {
        let mut state = self.state.lock();
        state.image_requests.push(request.clone());
        state
            .image_results
            .pop_front()
            .unwrap_or_else(|| Ok(Self::single_image(PLACEHOLDER_JPEG, "image/jpeg")))
    }
}

#[async_trait]
impl VideoBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    async fn submit_video(&self, request: &VideoRequest) -> Result<VideoOperation> {
        let mut state = self.state.lock();
        state.video_requests.push(request.clone());
        state.jobs_submitted += 1;
        let fallback = VideoOperation::pending(format!("operations/mock-{}", state.jobs_submitted));
        state.submit_results.pop_front().unwrap_or(Ok(fallback))
    }

    async fn poll_video(&self, operation: &VideoOperation) -> Result<VideoOperation> {
        let mut state = self.state.lock();
        state.polled.push(operation.name.clone());
        state.poll_results.pop_front().unwrap_or_else(|| {
            Ok(VideoOperation::completed(
                operation.name.clone(),
                Some(format!("mock://video/{}", operation.name)),
            ))
        })
    }
}

#[async_trait]
impl MediaFetcher for MockBackend {
    async fn fetch(&self, uri: &str) -> Result<FetchedMedia> {
        let mut state = self.state.lock();
        state.fetched.push(uri.to_string());
        state.fetch_results.pop_front().unwrap_or_else(|| {
            Ok(FetchedMedia::ok(
                PLACEHOLDER_MP4.to_vec(),
                Some("video/mp4".to_string()),
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GenerationError;

    fn request() -> ImageRequest {
        ImageRequest {
            model: "m".to_string(),
            prompt: "p".to_string(),
            number_of_images: 1,
            output_mime_type: "image/jpeg".to_string(),
            aspect_ratio: "1:1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_scripted_then_fallback() {
        let backend = MockBackend::new(
            MockConfig::default().with_image(Err(GenerationError::transport("boom"))),
        );
        assert!(backend.generate_images(&request()).await.is_err());
        let fallback = backend.generate_images(&request()).await.unwrap();
        assert_eq!(fallback.images[0].bytes, PLACEHOLDER_JPEG);
        assert_eq!(backend.image_requests().len(), 2);
    }

    #[tokio::test]
    async fn test_default_poll_completes_job() {
        let backend = MockBackend::new(MockConfig::default());
        let op = backend
            .poll_video(&VideoOperation::pending("operations/a"))
            .await
            .unwrap();
        assert!(op.done);
        assert_eq!(op.video_uri.as_deref(), Some("mock://video/operations/a"));
        assert_eq!(backend.poll_count(), 1);
    }
}
