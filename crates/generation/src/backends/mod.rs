/// Generation backends abstraction
///
/// Provides the provider contract used by the image and video clients:
/// - Gemini REST API (Imagen stills, Veo animations)
/// - Scripted mock backend for tests and offline development

pub mod gemini;
pub mod mock;

use anyhow::Result as AnyResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub use gemini::GeminiBackend;
pub use mock::{MockBackend, MockConfig};

use crate::artifacts::ImageArtifact;
use crate::credentials::ApiKeySource;
use crate::error::Result;

pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_IMAGE_MODEL: &str = "imagen-4.0-generate-001";
pub const DEFAULT_VIDEO_MODEL: &str = "veo-3.1-fast-generate-preview";

/// Backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// Google Generative Language API
    Gemini,
    /// In-process scripted backend
    Mock,
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gemini => write!(f, "gemini"),
            Self::Mock => write!(f, "mock"),
        }
    }
}

/// Still image request as sent to the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRequest {
    pub model: String,
    pub prompt: String,
    pub number_of_images: u32,
    pub output_mime_type: String,
    pub aspect_ratio: String,
}

#[derive(Debug, Clone, Default)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ImageResponse {
    pub images: Vec<GeneratedImage>,
}

/// Animation job submission
#[derive(Debug, Clone)]
pub struct VideoRequest {
    pub model: String,
    pub prompt: String,
    pub image: ImageArtifact,
    pub number_of_videos: u32,
    pub resolution: String,
    pub aspect_ratio: String,
}

/// Error attached to a finished remote job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteError {
    pub code: Option<u16>,
    pub message: String,
}

/// Remote animation job as last reported by the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoOperation {
    /// Provider handle, e.g. `models/veo/operations/abc123`
    pub name: String,
    pub done: bool,
    /// Media reference, present once the job succeeded
    pub video_uri: Option<String>,
    pub error: Option<RemoteError>,
}

impl VideoOperation {
    pub fn pending(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            done: false,
            video_uri: None,
            error: None,
        }
    }

    pub fn completed(name: impl Into<String>, video_uri: Option<String>) -> Self {
        Self {
            name: name.into(),
            done: true,
            video_uri,
            error: None,
        }
    }

    pub fn failed(name: impl Into<String>, error: RemoteError) -> Self {
        Self {
            name: name.into(),
            done: true,
            video_uri: None,
            error: Some(error),
        }
    }
}

/// Result of an authenticated media download
#[derive(Debug, Clone)]
pub struct FetchedMedia {
    pub status: u16,
    pub status_text: String,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl FetchedMedia {
    pub fn ok(body: Vec<u8>, content_type: Option<String>) -> Self {
        Self {
            status: 200,
            status_text: "OK".to_string(),
            content_type,
            body,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Single-shot still image generation
#[async_trait]
pub trait ImageBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn generate_images(&self, request: &ImageRequest) -> Result<ImageResponse>;
}

/// Long-running animation jobs
#[async_trait]
pub trait VideoBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Submit a job; returns immediately with the provider handle.
    async fn submit_video(&self, request: &VideoRequest) -> Result<VideoOperation>;

    /// Refresh the job status.
    async fn poll_video(&self, operation: &VideoOperation) -> Result<VideoOperation>;
}

/// Authenticated download of finished media
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn fetch(&self, uri: &str) -> Result<FetchedMedia>;
}

/// Backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Backend type
    pub backend_type: BackendType,

    /// API base URL
    pub api_url: String,

    pub image_model: String,
    pub video_model: String,

    /// Media type requested for generated stills
    pub image_mime_type: String,
    pub image_aspect_ratio: String,

    pub video_resolution: String,
    pub video_aspect_ratio: String,

    /// Per-request HTTP timeout in seconds
    pub request_timeout_secs: Option<u64>,

    /// Delay between video job status checks
    pub poll_interval_secs: u64,

    /// Upper bound on the whole poll loop; `None` waits indefinitely
    pub video_timeout_secs: Option<u64>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self::new(BackendType::Gemini)
    }
}

impl BackendConfig {
    /// Create new backend config
    pub fn new(backend_type: BackendType) -> Self {
        Self {
            backend_type,
            api_url: GEMINI_API_BASE.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            video_model: DEFAULT_VIDEO_MODEL.to_string(),
            image_mime_type: "image/jpeg".to_string(),
            image_aspect_ratio: "1:1".to_string(),
            video_resolution: "720p".to_string(),
            video_aspect_ratio: "16:9".to_string(),
            request_timeout_secs: Some(120),
            poll_interval_secs: 5,
            video_timeout_secs: Some(15 * 60),
        }
    }

    /// With API endpoint
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    pub fn with_image_model(mut self, model: impl Into<String>) -> Self {
        self.image_model = model.into();
        self
    }

    pub fn with_video_model(mut self, model: impl Into<String>) -> Self {
        self.video_model = model.into();
        self
    }

    pub fn with_poll_interval(mut self, secs: u64) -> Self {
        self.poll_interval_secs = secs;
        self
    }

    /// With video deadline; `None` disables it
    pub fn with_video_timeout(mut self, secs: Option<u64>) -> Self {
        self.video_timeout_secs = secs;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn video_timeout(&self) -> Option<Duration> {
        self.video_timeout_secs.map(Duration::from_secs)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    /// Save configuration to JSON
    pub fn save(&self, path: &Path) -> AnyResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load configuration from JSON
    pub fn load(path: &Path) -> AnyResult<Self> {
        let json = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&json)?;
        Ok(config)
    }
}

/// The three provider roles, possibly served by one object
#[derive(Clone)]
pub struct Backends {
    pub image: Arc<dyn ImageBackend>,
    pub video: Arc<dyn VideoBackend>,
    pub fetcher: Arc<dyn MediaFetcher>,
}

impl Backends {
    /// Use one backend for every role.
    pub fn shared<B>(backend: Arc<B>) -> Self
    where
        B: ImageBackend + VideoBackend + MediaFetcher + 'static,
    {
        Self {
            image: backend.clone(),
            video: backend.clone(),
            fetcher: backend,
        }
    }
}

/// Backend factory for creating backend instances
pub struct BackendFactory;

impl BackendFactory {
    /// Create backends from config
    pub fn create(config: &BackendConfig, keys: Arc<dyn ApiKeySource>) -> Result<Backends> {
        match config.backend_type {
            BackendType::Gemini => {
                let backend = GeminiBackend::new(config, keys)?;
                Ok(Backends::shared(Arc::new(backend)))
            }
            BackendType::Mock => {
                let backend = MockBackend::new(MockConfig::default());
                Ok(Backends::shared(Arc::new(backend)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::StaticApiKey;

    #[test]
    fn test_backend_config_defaults() {
        let config = BackendConfig::new(BackendType::Gemini);
        assert_eq!(config.image_model, "imagen-4.0-generate-001");
        assert_eq!(config.video_model, "veo-3.1-fast-generate-preview");
        assert_eq!(config.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.image_aspect_ratio, "1:1");
        assert_eq!(config.video_aspect_ratio, "16:9");
    }

    #[test]
    fn test_backend_config_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backend.json");
        let config = BackendConfig::new(BackendType::Mock)
            .with_api_url("http://localhost:9000")
            .with_poll_interval(2)
            .with_video_timeout(None);
        config.save(&path).unwrap();

        let loaded = BackendConfig::load(&path).unwrap();
        assert_eq!(loaded.backend_type, BackendType::Mock);
        assert_eq!(loaded.api_url, "http://localhost:9000");
        assert_eq!(loaded.poll_interval_secs, 2);
        assert_eq!(loaded.video_timeout(), None);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: BackendConfig = serde_json::from_str(r#"{"backend_type":"mock"}"#).unwrap();
        assert_eq!(config.backend_type, BackendType::Mock);
        assert_eq!(config.video_resolution, "720p");
    }

    #[test]
    fn test_backend_type_display() {
        assert_eq!(BackendType::Gemini.to_string(), "gemini");
        assert_eq!(BackendType::Mock.to_string(), "mock");
    }

    #[test]
    fn test_factory_builds_both_backends() {
        let keys = Arc::new(StaticApiKey::new("test-key"));
        let gemini = BackendFactory::create(&BackendConfig::new(BackendType::Gemini), keys.clone())
            .unwrap();
        assert_eq!(gemini.image.name(), "gemini");
        let mock = BackendFactory::create(&BackendConfig::new(BackendType::Mock), keys).unwrap();
        assert_eq!(mock.video.name(), "mock");
    }
}
