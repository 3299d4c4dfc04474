/// Remote image and video generation for logo animation.
///
/// The image client issues one still-image request per call; the video
/// client submits a long-running job, polls it to completion and downloads
/// the result. Both talk to the provider through the traits in [`backends`].

pub mod artifacts;
pub mod backends;
pub mod credentials;
pub mod error;
pub mod image;
pub mod prompts;
pub mod video;

pub use artifacts::{ImageArtifact, VideoArtifact};
pub use backends::{
    BackendConfig, BackendFactory, BackendType, Backends, ImageBackend, MediaFetcher,
    VideoBackend, VideoOperation,
};
pub use credentials::{ApiKeySource, EnvApiKey, SharedApiKey, StaticApiKey};
pub use error::{GenerationError, Result};
pub use image::{ImageClient, ImageSettings};
pub use video::{VideoClient, VideoSettings};

pub use tokio_util::sync::CancellationToken;
