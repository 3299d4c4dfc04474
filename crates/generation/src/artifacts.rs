/// In-memory artifacts produced by the generation clients.
///
/// Both artifact types share their payload through an `Arc<[u8]>`, so cloning
/// a snapshot never copies image or video bytes and the payload can't be
/// mutated after construction.

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

/// Default media type of downloaded animations.
pub const DEFAULT_VIDEO_MIME: &str = "video/mp4";

/// Still image, either generated or uploaded
#[derive(Clone)]
pub struct ImageArtifact {
    data: Arc<[u8]>,
    mime_type: String,
    created_at: DateTime<Utc>,
}

impl ImageArtifact {
    pub fn new(data: impl Into<Arc<[u8]>>, mime_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            mime_type: mime_type.into(),
            created_at: Utc::now(),
        }
    }

    /// Build from a base64 payload as returned by the provider.
    pub fn from_base64(encoded: &str, mime_type: impl Into<String>) -> Result<Self> {
        let data = STANDARD
            .decode(encoded.trim())
            .context("image payload is not valid base64")?;
        Ok(Self::new(data, mime_type))
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.data)
    }

    /// `data:` URL suitable for an `<img>` source.
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.to_base64())
    }
}

impl PartialEq for ImageArtifact {
    fn eq(&self, other: &Self) -> bool {
        self.mime_type == other.mime_type && self.data == other.data
    }
}

impl fmt::Debug for ImageArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageArtifact")
            .field("mime_type", &self.mime_type)
            .field("bytes", &self.data.len())
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Downloaded animation, addressable by a session-local handle
#[derive(Clone)]
pub struct VideoArtifact {
    handle: Uuid,
    data: Arc<[u8]>,
    mime_type: String,
    source_uri: String,
    created_at: DateTime<Utc>,
}

impl VideoArtifact {
    pub fn new(
        data: impl Into<Arc<[u8]>>,
        mime_type: impl Into<String>,
        source_uri: impl Into<String>,
    ) -> Self {
        Self {
            handle: Uuid::new_v4(),
            data: data.into(),
            mime_type: mime_type.into(),
            source_uri: source_uri.into(),
            created_at: Utc::now(),
        }
    }

    pub fn handle(&self) -> Uuid {
        self.handle
    }

    /// Local reference a player can resolve against the session's media store.
    pub fn playable_url(&self) -> String {
        format!("blob:logomotion/{}", self.handle)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Remote URI the payload was downloaded from.
    pub fn source_uri(&self) -> &str {
        &self.source_uri
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Write the payload to `path`, creating parent directories as needed.
    pub fn export(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("create export directory {}", parent.display()))?;
            }
        }
        std::fs::write(path, &self.data)
            .with_context(|| format!("write video to {}", path.display()))?;
        Ok(())
    }
}

impl PartialEq for VideoArtifact {
    fn eq(&self, other: &Self) -> bool {
        self.handle == other.handle
    }
}

impl fmt::Debug for VideoArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VideoArtifact")
            .field("handle", &self.handle)
            .field("mime_type", &self.mime_type)
            .field("bytes", &self.data.len())
            .field("source_uri", &self.source_uri)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_data_url() {
        let image = ImageArtifact::new(vec![1u8, 2, 3], "image/png");
        assert_eq!(image.data_url(), "data:image/png;base64,AQID");
        assert_eq!(image.len(), 3);
    }

    #[test]
    fn test_image_from_base64() {
        let image = ImageArtifact::from_base64("AQID", "image/jpeg").unwrap();
        assert_eq!(image.data(), &[1, 2, 3]);
        assert_eq!(image.mime_type(), "image/jpeg");
        assert!(ImageArtifact::from_base64("not base64!", "image/jpeg").is_err());
    }

    #[test]
    fn test_video_handles_are_unique() {
        let a = VideoArtifact::new(vec![0u8; 4], DEFAULT_VIDEO_MIME, "https://x/vid");
        let b = VideoArtifact::new(vec![0u8; 4], DEFAULT_VIDEO_MIME, "https://x/vid");
        assert_ne!(a, b);
        assert!(a.playable_url().starts_with("blob:logomotion/"));
    }

    #[test]
    fn test_video_export() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("clip.mp4");
        let video = VideoArtifact::new(vec![7u8; 16], DEFAULT_VIDEO_MIME, "https://x/vid");
        video.export(&path).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), vec![7u8; 16]);
    }
}
