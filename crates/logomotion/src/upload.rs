/// Local image uploads, bypassing remote generation.

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use generation::ImageArtifact;
use image::ImageFormat;
use std::path::Path;

/// Read an image file, declaring its media type from the content and
/// falling back to the extension.
pub fn image_from_file(path: &Path) -> Result<ImageArtifact> {
    let bytes = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let from_extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(ImageFormat::from_extension);
    let format = image::guess_format(&bytes).ok().or(from_extension);
    let Some(format) = format else {
        bail!("{} is not a recognised image", path.display());
    };
    if bytes.is_empty() {
        bail!("{} is empty", path.display());
    }
    Ok(ImageArtifact::new(bytes, format.to_mime_type()))
}

/// Parse a `data:<mime>;base64,<payload>` URL as produced by a browser file
/// reader.
pub fn image_from_data_url(url: &str) -> Result<ImageArtifact> {
    let rest = url
        .trim()
        .strip_prefix("data:")
        .context("not a data URL")?;
    let (header, payload) = rest.split_once(',').context("data URL has no payload")?;
    let mime_type = header
        .strip_suffix(";base64")
        .context("data URL payload is not base64")?;
    if !mime_type.starts_with("image/") {
        bail!("data URL holds {mime_type}, not an image");
    }
    let bytes = STANDARD
        .decode(payload)
        .context("data URL payload is not valid base64")?;
    if bytes.is_empty() {
        bail!("data URL payload is empty");
    }
    Ok(ImageArtifact::new(bytes, mime_type))
}
