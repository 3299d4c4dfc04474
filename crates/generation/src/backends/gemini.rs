/// Gemini API backend integration
///
/// Imagen stills go through the synchronous `:predict` endpoint, Veo
/// animations through `:predictLongRunning` plus operation polling. The key
/// is read from the [`ApiKeySource`] for every request and sent in the
/// `x-goog-api-key` header, never in the query string.
use super::{
    BackendConfig, FetchedMedia, GeneratedImage, ImageBackend, ImageRequest, ImageResponse,
    MediaFetcher, RemoteError, VideoBackend, VideoOperation, VideoRequest,
};
use crate::error::{GenerationError, Result};
use crate::credentials::ApiKeySource;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Gemini API backend
pub struct GeminiBackend {
    api_url: String,
    keys: Arc<dyn ApiKeySource>,
    client: reqwest::Client,
}

impl GeminiBackend {
    /// Create new Gemini backend
    pub fn new(config: &BackendConfig, keys: Arc<dyn ApiKeySource>) -> Result<Self> {
        if config.api_url.trim().is_empty() {
            return Err(GenerationError::configuration("Gemini API URL is required."));
        }
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|err| GenerationError::configuration(format!("HTTP client setup failed: {err}")))?;

        Ok(Self {
            api_url: config.api_url.trim().trim_end_matches('/').to_string(),
            keys,
            client,
        })
    }

    fn model_endpoint(&self, model: &str, method: &str) -> String {
        format!("{}/v1beta/models/{}:{}", self.api_url, model.trim(), method)
    }

    fn operation_endpoint(&self, name: &str) -> String {
        format!("{}/v1beta/{}", self.api_url, name.trim_start_matches('/'))
    }

    fn api_key(&self) -> Result<String> {
        self.keys
            .api_key()
            .ok_or_else(|| GenerationError::configuration("Gemini API key is required."))
    }

    async fn post_json<T: Serialize + ?Sized>(&self, url: &str, body: &T) -> Result<String> {
        let response = self
            .client
            .post(url)
            .header(API_KEY_HEADER, self.api_key()?)
            .json(body)
            .send()
            .await?;
        read_body(response).await
    }

    async fn get_json(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .header(API_KEY_HEADER, self.api_key()?)
            .send()
            .await?;
        read_body(response).await
    }
}

async fn read_body(response: reqwest::Response) -> Result<String> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(classify_error_body(status.as_u16(), &body));
    }
    Ok(body)
}

/// Map a non-success response body onto the error taxonomy.
fn classify_error_body(status: u16, body: &str) -> GenerationError {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .and_then(|envelope| envelope.error.message)
        .filter(|message| !message.trim().is_empty())
        .unwrap_or_else(|| body.trim().to_string());
    GenerationError::from_remote(Some(status), &message)
}

#[async_trait]
impl ImageBackend for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate_images(&self, request: &ImageRequest) -> Result<ImageResponse> {
        let payload = PredictRequest {
            instances: vec![ImageInstance {
                prompt: &request.prompt,
            }],
            parameters: ImageParameters {
                sample_count: request.number_of_images,
                output_mime_type: &request.output_mime_type,
                aspect_ratio: &request.aspect_ratio,
            },
        };
        let url = self.model_endpoint(&request.model, "predict");
        debug!("Submitting Imagen request to {}", url);
        let body = self.post_json(&url, &payload).await?;
        parse_predictions(&body)
    }
}

fn parse_predictions(body: &str) -> Result<ImageResponse> {
    let parsed: PredictResponse = serde_json::from_str(body)?;
    let mut images = Vec::new();
    for prediction in parsed.predictions {
        let Some(encoded) = prediction.bytes_base64_encoded else {
            continue;
        };
        let bytes = STANDARD.decode(encoded.trim()).map_err(|err| {
            GenerationError::generation(format!("Image payload was not valid base64: {err}"))
        })?;
        images.push(GeneratedImage {
            bytes,
            mime_type: prediction.mime_type,
        });
    }
    Ok(ImageResponse { images })
}

#[async_trait]
impl VideoBackend for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn submit_video(&self, request: &VideoRequest) -> Result<VideoOperation> {
        let image_bytes = request.image.to_base64();
        let payload = PredictRequest {
            instances: vec![VideoInstance {
                prompt: &request.prompt,
                image: InlineImage {
                    bytes_base64_encoded: &image_bytes,
                    mime_type: request.image.mime_type(),
                },
            }],
            parameters: VideoParameters {
                sample_count: request.number_of_videos,
                resolution: &request.resolution,
                aspect_ratio: &request.aspect_ratio,
            },
        };
        let url = self.model_endpoint(&request.model, "predictLongRunning");
        debug!("Submitting Veo job to {}", url);
        let body = self.post_json(&url, &payload).await?;
        parse_operation(&body)
    }

    async fn poll_video(&self, operation: &VideoOperation) -> Result<VideoOperation> {
        let body = self.get_json(&self.operation_endpoint(&operation.name)).await?;
        let mut refreshed = parse_operation(&body)?;
        if refreshed.name.is_empty() {
            refreshed.name = operation.name.clone();
        }
        Ok(refreshed)
    }
}

fn parse_operation(body: &str) -> Result<VideoOperation> {
    let status: OperationStatus = serde_json::from_str(body)?;
    let video_uri = status
        .response
        .and_then(|r| r.generate_video_response)
        .and_then(|r| r.generated_samples)
        .and_then(|samples| samples.into_iter().next())
        .and_then(|sample| sample.video)
        .and_then(|video| video.uri)
        .filter(|uri| !uri.trim().is_empty());
    Ok(VideoOperation {
        name: status.name.unwrap_or_default(),
        done: status.done.unwrap_or(false),
        video_uri,
        error: status.error.map(|err| RemoteError {
            code: err.code.and_then(|code| u16::try_from(code).ok()),
            message: err.message.unwrap_or_default(),
        }),
    })
}

#[async_trait]
impl MediaFetcher for GeminiBackend {
    async fn fetch(&self, uri: &str) -> Result<FetchedMedia> {
        let response = self
            .client
            .get(uri)
            .header(API_KEY_HEADER, self.api_key()?)
            .send()
            .await?;
        let status = response.status();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = if status.is_success() {
            response.bytes().await?.to_vec()
        } else {
            Vec::new()
        };
        Ok(FetchedMedia {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or("").to_string(),
            content_type,
            body,
        })
    }
}

#[derive(Debug, Serialize)]
struct PredictRequest<I, P> {
    instances: Vec<I>,
    parameters: P,
}

#[derive(Debug, Serialize)]
struct ImageInstance<'a> {
    prompt: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageParameters<'a> {
    sample_count: u32,
    output_mime_type: &'a str,
    aspect_ratio: &'a str,
}

#[derive(Debug, Serialize)]
struct VideoInstance<'a> {
    prompt: &'a str,
    image: InlineImage<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineImage<'a> {
    bytes_base64_encoded: &'a str,
    mime_type: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VideoParameters<'a> {
    sample_count: u32,
    resolution: &'a str,
    aspect_ratio: &'a str,
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Prediction {
    #[serde(default)]
    bytes_base64_encoded: Option<String>,
    #[serde(default)]
    mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OperationStatus {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    done: Option<bool>,
    #[serde(default)]
    response: Option<OperationResponse>,
    #[serde(default)]
    error: Option<OperationError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationResponse {
    #[serde(default)]
    generate_video_response: Option<GenerateVideoResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateVideoResponse {
    #[serde(default)]
    generated_samples: Option<Vec<GeneratedSample>>,
}

#[derive(Debug, Deserialize)]
struct GeneratedSample {
    #[serde(default)]
    video: Option<RemoteVideo>,
}

#[derive(Debug, Deserialize)]
struct RemoteVideo {
    #[serde(default)]
    uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OperationError {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::ImageArtifact;
    use crate::backends::BackendType;
    use crate::credentials::{SharedApiKey, StaticApiKey};

    fn backend() -> GeminiBackend {
        let config = BackendConfig::new(BackendType::Gemini).with_api_url("https://example.test/");
        GeminiBackend::new(&config, Arc::new(StaticApiKey::new("k"))).unwrap()
    }

    #[test]
    fn test_endpoints() {
        let backend = backend();
        assert_eq!(
            backend.model_endpoint("imagen-4.0-generate-001", "predict"),
            "https://example.test/v1beta/models/imagen-4.0-generate-001:predict"
        );
        assert_eq!(
            backend.operation_endpoint("models/veo/operations/op1"),
            "https://example.test/v1beta/models/veo/operations/op1"
        );
    }

    #[test]
    fn test_image_payload_serialization() {
        let payload = PredictRequest {
            instances: vec![ImageInstance { prompt: "a fox" }],
            parameters: ImageParameters {
                sample_count: 1,
                output_mime_type: "image/jpeg",
                aspect_ratio: "1:1",
            },
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["instances"][0]["prompt"], "a fox");
        assert_eq!(json["parameters"]["sampleCount"], 1);
        assert_eq!(json["parameters"]["outputMimeType"], "image/jpeg");
        assert_eq!(json["parameters"]["aspectRatio"], "1:1");
    }

    #[test]
    fn test_video_payload_carries_image_mime() {
        let image = ImageArtifact::new(vec![1u8, 2, 3], "image/png");
        let encoded = image.to_base64();
        let payload = PredictRequest {
            instances: vec![VideoInstance {
                prompt: "spin it",
                image: InlineImage {
                    bytes_base64_encoded: &encoded,
                    mime_type: image.mime_type(),
                },
            }],
            parameters: VideoParameters {
                sample_count: 1,
                resolution: "720p",
                aspect_ratio: "16:9",
            },
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["instances"][0]["image"]["bytesBase64Encoded"], "AQID");
        assert_eq!(json["instances"][0]["image"]["mimeType"], "image/png");
        assert_eq!(json["parameters"]["resolution"], "720p");
    }

    #[test]
    fn test_parse_predictions_skips_empty_entries() {
        let body = r#"{"predictions":[{"mimeType":"image/jpeg"},{"bytesBase64Encoded":"AQID","mimeType":"image/jpeg"}]}"#;
        let response = parse_predictions(body).unwrap();
        assert_eq!(response.images.len(), 1);
        assert_eq!(response.images[0].bytes, vec![1, 2, 3]);

        let empty = parse_predictions("{}").unwrap();
        assert!(empty.images.is_empty());
    }

    #[test]
    fn test_parse_operation_states() {
        let pending = parse_operation(r#"{"name":"operations/op1"}"#).unwrap();
        assert_eq!(pending, VideoOperation::pending("operations/op1"));

        let done = parse_operation(
            r#"{"name":"operations/op1","done":true,"response":{"generateVideoResponse":{"generatedSamples":[{"video":{"uri":"https://x/vid?alt=media"}}]}}}"#,
        )
        .unwrap();
        assert!(done.done);
        assert_eq!(done.video_uri.as_deref(), Some("https://x/vid?alt=media"));

        let failed = parse_operation(
            r#"{"name":"operations/op1","done":true,"error":{"code":400,"message":"prompt blocked"}}"#,
        )
        .unwrap();
        assert_eq!(
            failed.error,
            Some(RemoteError {
                code: Some(400),
                message: "prompt blocked".to_string()
            })
        );
    }

    #[test]
    fn test_error_body_classification() {
        let auth = classify_error_body(
            404,
            r#"{"error":{"code":404,"message":"Requested entity was not found.","status":"NOT_FOUND"}}"#,
        );
        assert!(matches!(auth, GenerationError::Auth(_)));

        let plain = classify_error_body(503, "upstream unavailable");
        assert_eq!(
            plain,
            GenerationError::Transport("503: upstream unavailable".to_string())
        );
    }

    #[tokio::test]
    async fn test_missing_key_fails_before_request() {
        let config = BackendConfig::new(BackendType::Gemini);
        let backend = GeminiBackend::new(&config, Arc::new(SharedApiKey::new())).unwrap();
        let request = ImageRequest {
            model: config.image_model.clone(),
            prompt: "a fox".to_string(),
            number_of_images: 1,
            output_mime_type: "image/jpeg".to_string(),
            aspect_ratio: "1:1".to_string(),
        };
        let err = backend.generate_images(&request).await.unwrap_err();
        assert!(matches!(err, GenerationError::Configuration(_)));
    }
}
