use base64::{engine::general_purpose, Engine as _};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{info, warn};

use super::filename::{image_filename, sniff_mime, strip_html};
use crate::config::{ImageConfig, ImageQuality, KeySource};
use crate::error::{Error, Result};

/// Image produced for a single publish; never written to disk
#[derive(Clone)]
pub struct GeneratedImage {
    pub data: Vec<u8>,
    pub mime_type: String,
    pub suggested_filename: String,
    /// Prompt as rewritten by the model, when reported
    pub revised_prompt: Option<String>,
}

impl std::fmt::Debug for GeneratedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneratedImage")
            .field("bytes", &self.data.len())
            .field("mime_type", &self.mime_type)
            .field("suggested_filename", &self.suggested_filename)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct ImagesResponse {
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    b64_json: Option<String>,
    #[serde(default)]
    revised_prompt: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: Option<String>,
    #[serde(default, rename = "type")]
    error_type: Option<String>,
}

/// Check the shape of an API key without calling the API
pub fn validate_api_key_syntax(key: &str) -> std::result::Result<(), String> {
    if key.chars().any(char::is_whitespace) {
        return Err("API key contains whitespace".to_string());
    }
    if !key.starts_with("sk-") {
        return Err("API key does not start with 'sk-'".to_string());
    }
    if key.len() < 20 {
        return Err(format!("API key is too short ({} characters)", key.len()));
    }
    Ok(())
}

/// Client for an OpenAI-compatible `images/generations` endpoint
#[derive(Debug, Clone)]
pub struct ImageGenerator {
    client: Client,
    model: String,
    size: String,
    api_base: String,
    api_key: Option<SecretString>,
    key_source: Option<KeySource>,
    unavailable_reason: Option<String>,
}

impl ImageGenerator {
    /// Build from configuration, resolving the key from file and environment
    pub fn new(config: &ImageConfig) -> Result<Self> {
        match config.resolve_api_key() {
            Some((key, source)) => Self::with_api_key(config, Some(key), Some(source)),
            None => Self::with_api_key(config, None, None),
        }
    }

    pub fn with_api_key(
        config: &ImageConfig,
        api_key: Option<SecretString>,
        key_source: Option<KeySource>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("wordpress-mcp-rs/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Configuration(format!("HTTP client build failed: {}", e)))?;

        let unavailable_reason = match &api_key {
            None => Some(format!(
                "no image API key configured (set image.api_key, {} or {})",
                crate::config::CLIENT_API_KEY_VAR,
                crate::config::AMBIENT_API_KEY_VAR
            )),
            Some(key) => validate_api_key_syntax(key.expose_secret())
                .err()
                .map(|e| format!("image API key from {} is malformed: {}", key_source.map(|s| s.to_string()).unwrap_or_default(), e)),
        };

        match &unavailable_reason {
            Some(reason) => warn!("Image generation disabled: {}", reason),
            None => info!(
                "Image generation enabled (model {}, key from {})",
                config.model,
                key_source.map(|s| s.to_string()).unwrap_or_default()
            ),
        }

        Ok(Self {
            client,
            model: config.model.clone(),
            size: config.size.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key,
            key_source,
            unavailable_reason,
        })
    }

    pub fn is_available(&self) -> bool {
        self.unavailable_reason.is_none()
    }

    pub fn key_source(&self) -> Option<KeySource> {
        self.key_source
    }

    /// Prompt describing a featured image for the article
    pub fn build_prompt(title: &str, content: &str) -> String {
        let summary: String = strip_html(content).chars().take(300).collect();
        let mut prompt = format!(
            "Create a professional, high-quality featured image for an article titled \"{}\".",
            strip_html(title)
        );
        if !summary.is_empty() {
            prompt.push_str(&format!("\nThe article is about: {}", summary));
        }
        prompt.push_str(
            "\nThe image should be clean and modern, relevant to the topic, suitable for a blog header, \
             and must not contain any text overlays.\nStyle: modern professional illustration or photography.",
        );
        prompt
    }

    /// Generate one image for `prompt`
    pub async fn generate(&self, prompt: &str, quality: ImageQuality) -> Result<GeneratedImage> {
        let api_key = match (&self.unavailable_reason, &self.api_key) {
            (None, Some(key)) => key,
            (Some(reason), _) => return Err(Error::ImageGenerationUnavailable(reason.clone())),
            (None, None) => {
                return Err(Error::ImageGenerationUnavailable(
                    "no image API key configured".to_string(),
                ))
            }
        };

        let url = format!("{}/images/generations", self.api_base);
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "n": 1,
            "size": self.size,
            "quality": quality.as_str(),
        });

        info!(model = %self.model, quality = quality.as_str(), "Requesting image generation");
        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(transport_failure)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(api_failure(status, &text));
        }

        let parsed: ImagesResponse = response
            .json()
            .await
            .map_err(|e| Error::ImageGeneration(format!("unexpected response: {}", e)))?;
        let image = parsed
            .data
            .into_iter()
            .next()
            .ok_or_else(|| Error::ImageGeneration("response contained no image".to_string()))?;

        let (data, header_mime) = match (image.b64_json, image.url) {
            (Some(b64), _) => {
                let bytes = general_purpose::STANDARD
                    .decode(b64.trim())
                    .map_err(|e| Error::ImageGeneration(format!("invalid base64 image: {}", e)))?;
                (bytes, None)
            }
            (None, Some(image_url)) => self.download(&image_url).await?,
            (None, None) => {
                return Err(Error::ImageGeneration(
                    "response contained neither url nor b64_json".to_string(),
                ))
            }
        };

        if data.is_empty() {
            return Err(Error::ImageGeneration("image is empty".to_string()));
        }

        let mime_type = header_mime
            .filter(|m| m.starts_with("image/"))
            .or_else(|| sniff_mime(&data).map(str::to_string))
            .unwrap_or_else(|| "image/png".to_string());

        info!(bytes = data.len(), mime = %mime_type, "Image generated");
        Ok(GeneratedImage {
            suggested_filename: image_filename(prompt, &mime_type),
            data,
            mime_type,
            revised_prompt: image.revised_prompt,
        })
    }

    /// Generate a featured image for an article; the filename follows the title
    pub async fn generate_for_article(
        &self,
        title: &str,
        content: &str,
        prompt_override: Option<&str>,
        quality: ImageQuality,
    ) -> Result<GeneratedImage> {
        let prompt = match prompt_override.map(str::trim).filter(|p| !p.is_empty()) {
            Some(p) => p.to_string(),
            None => Self::build_prompt(title, content),
        };
        let mut image = self.generate(&prompt, quality).await?;
        image.suggested_filename = image_filename(title, &image.mime_type);
        Ok(image)
    }

    async fn download(&self, url: &str) -> Result<(Vec<u8>, Option<String>)> {
        let response = self.client.get(url).send().await.map_err(transport_failure)?;
        if !response.status().is_success() {
            return Err(Error::ImageGeneration(format!(
                "image download failed with HTTP {}",
                response.status().as_u16()
            )));
        }
        let mime = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or_default().trim().to_string());
        let bytes = response.bytes().await.map_err(transport_failure)?;
        Ok((bytes.to_vec(), mime))
    }

    /// Lightweight authenticated call used by diagnostics
    pub async fn check_reachable(&self) -> Result<()> {
        let key = match (&self.unavailable_reason, &self.api_key) {
            (None, Some(key)) => key,
            (Some(reason), _) => return Err(Error::ImageGenerationUnavailable(reason.clone())),
            (None, None) => {
                return Err(Error::ImageGenerationUnavailable(
                    "no image API key configured".to_string(),
                ))
            }
        };
        let response = self
            .client
            .get(format!("{}/models", self.api_base))
            .bearer_auth(key.expose_secret())
            .send()
            .await
            .map_err(transport_failure)?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let text = response.text().await.unwrap_or_default();
            Err(api_failure(status, &text))
        }
    }
}

fn transport_failure(err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::ImageGeneration(format!("image API request timed out: {}", err))
    } else {
        Error::ImageGeneration(format!("image API request failed: {}", err))
    }
}

fn api_failure(status: StatusCode, body: &str) -> Error {
    let parsed = serde_json::from_str::<ApiErrorEnvelope>(body).ok().map(|e| e.error);
    let message = parsed
        .as_ref()
        .map(|e| e.message.clone())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| body.chars().take(200).collect());
    let code = parsed
        .as_ref()
        .and_then(|e| e.code.clone().or_else(|| e.error_type.clone()))
        .unwrap_or_default();

    let reason = match status.as_u16() {
        401 => "invalid API key",
        402 => "account has no remaining credits",
        429 if code == "insufficient_quota" || code == "billing_hard_limit_reached" => {
            "account has no remaining credits"
        }
        429 => "rate limited",
        400 if code == "content_policy_violation" || message.contains("safety system") => {
            "request rejected by content policy"
        }
        _ => "request rejected",
    };
    Error::ImageGeneration(format!("{} (HTTP {}): {}", reason, status.as_u16(), message))
}
