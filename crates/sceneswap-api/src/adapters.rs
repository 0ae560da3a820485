//! Adapters bridging domain seams to concrete backends.
//!
//! The only adapter today is the remote transform provider, which speaks a
//! JSON image-generations API over reqwest.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::Deserialize;
use serde_json::json;

use sceneswap_domain::{ProviderError, SceneAsset, TransformOptions, TransformProvider};
use sceneswap_server::config::ProviderSettings;

/// Maximum length of a provider error body echoed into our own errors.
const MAX_ERROR_BODY: usize = 200;

/// Remote image-transformation provider.
///
/// Sends the scene asset and both reference photos (plus the optional
/// mask) base64-encoded in a single JSON request and expects a
/// `data[0].b64_json` payload back. When disabled, every call reports
/// [`ProviderError::Disabled`] without touching the network, which the
/// orchestrator turns into an echo of the source upload.
pub struct RemoteTransformProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    prompt: String,
    enabled: bool,
}

impl RemoteTransformProvider {
    /// Builds a provider from configuration.
    pub fn from_settings(settings: &ProviderSettings) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: settings.endpoint.clone(),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            prompt: settings.prompt.clone(),
            enabled: settings.enabled,
        })
    }

    /// Echo-mode provider: never calls out.
    pub fn disabled() -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: String::new(),
            api_key: None,
            model: String::new(),
            prompt: String::new(),
            enabled: false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GenerationResponse {
    #[serde(default)]
    data: Vec<GenerationImage>,
}

#[derive(Debug, Deserialize)]
struct GenerationImage {
    b64_json: Option<String>,
}

fn truncate(mut text: String, limit: usize) -> String {
    if text.len() > limit {
        let mut end = limit;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text.truncate(end);
    }
    text
}

#[async_trait]
impl TransformProvider for RemoteTransformProvider {
    async fn transform(
        &self,
        scene: &SceneAsset,
        primary: &[u8],
        secondary: &[u8],
        options: &TransformOptions,
    ) -> Result<Vec<u8>, ProviderError> {
        if !self.enabled {
            return Err(ProviderError::Disabled);
        }
        let Some(api_key) = &self.api_key else {
            return Err(ProviderError::Disabled);
        };

        // Input order matters to the provider: scene first, then the
        // reference photos, then the optional mask.
        let mut images = vec![
            BASE64.encode(&scene.image),
            BASE64.encode(primary),
            BASE64.encode(secondary),
        ];
        if let Some(mask) = &scene.mask {
            images.push(BASE64.encode(mask));
        }

        let body = json!({
            "model": self.model,
            "prompt": self.prompt,
            "size": options.output_size,
            "response_format": "b64_json",
            "image": images,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Request {
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = truncate(response.text().await.unwrap_or_default(), MAX_ERROR_BODY);
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: GenerationResponse =
            response.json().await.map_err(|e| ProviderError::Decode {
                message: e.to_string(),
            })?;

        let b64 = parsed
            .data
            .into_iter()
            .find_map(|image| image.b64_json)
            .filter(|payload| !payload.is_empty())
            .ok_or(ProviderError::EmptyPayload)?;

        BASE64
            .decode(b64.as_bytes())
            .map_err(|e| ProviderError::Decode {
                message: e.to_string(),
            })
    }
}
