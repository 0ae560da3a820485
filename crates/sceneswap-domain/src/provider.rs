//! Transform provider contract.
//!
//! The provider is an external collaborator; this module only fixes its
//! interface boundary. Implementations live at the API layer.

use async_trait::async_trait;
use thiserror::Error;

/// Scene-side input to a transform call.
#[derive(Debug, Clone)]
pub struct SceneAsset {
    /// The scene image bytes.
    pub image: Vec<u8>,
    /// Optional blend mask.
    pub mask: Option<Vec<u8>>,
}

impl SceneAsset {
    pub fn new(image: Vec<u8>) -> Self {
        Self { image, mask: None }
    }
}

/// Output options for a transform call.
#[derive(Debug, Clone)]
pub struct TransformOptions {
    /// Requested output size, e.g. `768x768`.
    pub output_size: String,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            output_size: "768x768".to_string(),
        }
    }
}

/// Errors from the transform provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider is not configured; no external call was made.
    #[error("transform provider disabled")]
    Disabled,

    /// Transport-level failure talking to the provider.
    #[error("transform request failed: {message}")]
    Request { message: String },

    /// The provider answered with a non-success status.
    #[error("transform rejected with status {status}: {message}")]
    Api { status: u16, message: String },

    /// A well-formed response without a usable payload. Soft failure: the
    /// caller substitutes a fallback image instead of failing the scene.
    #[error("transform response carried no image payload")]
    EmptyPayload,

    /// The payload could not be decoded.
    #[error("failed to decode transform payload: {message}")]
    Decode { message: String },
}

/// External image-transformation capability.
///
/// A call replaces the main person's face in the scene image with the
/// person from the two reference photos. Implementations must report a
/// well-formed response lacking a payload as [`ProviderError::EmptyPayload`]
/// rather than a hard error, and must not retry indefinitely — bounding
/// latency is the orchestrator's job.
#[async_trait]
pub trait TransformProvider: Send + Sync + 'static {
    async fn transform(
        &self,
        scene: &SceneAsset,
        primary: &[u8],
        secondary: &[u8],
        options: &TransformOptions,
    ) -> Result<Vec<u8>, ProviderError>;
}
