use crate::artifacts::ImageArtifact;
use crate::backends::{BackendConfig, ImageBackend, ImageRequest};
use crate::error::{GenerationError, Result};
use crate::prompts::logo_prompt;
use std::sync::Arc;
use tracing::{debug, info};

/// Settings for still image requests
#[derive(Debug, Clone)]
pub struct ImageSettings {
    pub model: String,
    pub output_mime_type: String,
    pub aspect_ratio: String,
}

impl From<&BackendConfig> for ImageSettings {
    fn from(config: &BackendConfig) -> Self {
        Self {
            model: config.image_model.clone(),
            output_mime_type: config.image_mime_type.clone(),
            aspect_ratio: config.image_aspect_ratio.clone(),
        }
    }
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self::from(&BackendConfig::default())
    }
}

/// Turns a logo description into a single still image.
#[derive(Clone)]
pub struct ImageClient {
    backend: Arc<dyn ImageBackend>,
    settings: ImageSettings,
}

impl ImageClient {
    pub fn new(backend: Arc<dyn ImageBackend>, settings: ImageSettings) -> Self {
        Self { backend, settings }
    }

    pub fn settings(&self) -> &ImageSettings {
        &self.settings
    }

    /// One remote request, no polling. The artifact is declared with the
    /// media type that was requested.
    pub async fn generate_image(&self, prompt: &str) -> Result<ImageArtifact> {
        let request = ImageRequest {
            model: self.settings.model.clone(),
            prompt: logo_prompt(prompt),
            number_of_images: 1,
            output_mime_type: self.settings.output_mime_type.clone(),
            aspect_ratio: self.settings.aspect_ratio.clone(),
        };
        debug!(
            "Requesting logo image from {} ({})",
            self.backend.name(),
            request.model
        );

        let response = self.backend.generate_images(&request).await?;
        let bytes = response
            .images
            .into_iter()
            .map(|image| image.bytes)
            .find(|bytes| !bytes.is_empty())
            .ok_or_else(|| GenerationError::generation("Failed to generate image"))?;

        info!("Logo image generated ({} bytes)", bytes.len());
        Ok(ImageArtifact::new(bytes, request.output_mime_type))
    }
}
