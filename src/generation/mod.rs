//! Image generation client
//!
//! Provides:
//! - Hugging Face inference client (one request per image)
//! - Failure classification with fixed user-facing messages
//! - Per-image seed drawing

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error};

use crate::images::ImageError;

/// Generation failures
///
/// `Display` is for logs. Users only ever see [`GenerationError::user_message`].
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("API Error {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("API request timed out")]
    Timeout,

    #[error("Network Error: {0}")]
    Network(String),

    #[error("Invalid image data: {0}")]
    InvalidImage(String),
}

impl GenerationError {
    /// Fixed message shown to the user for this failure kind
    pub fn user_message(&self) -> &'static str {
        match self {
            GenerationError::Upstream { .. } | GenerationError::InvalidImage(_) => {
                "Sorry, I couldn't generate the image. Please try again."
            }
            GenerationError::Timeout => "The request timed out. Please try again.",
            GenerationError::Network(_) => "Network error occurred. Please try again.",
        }
    }
}

impl From<ImageError> for GenerationError {
    fn from(e: ImageError) -> Self {
        GenerationError::InvalidImage(e.to_string())
    }
}

/// Anything that turns a prompt and a seed into raw image bytes
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, prompt: &str, seed: u32) -> Result<Vec<u8>, GenerationError>;
}

/// Draw a fresh seed over the whole `u32` range
pub fn random_seed() -> u32 {
    rand::random()
}

/// Inference request body
#[derive(Debug, Serialize)]
struct InferenceRequest<'a> {
    inputs: &'a str,
    options: InferenceOptions,
}

#[derive(Debug, Serialize)]
struct InferenceOptions {
    seed: u32,
}

/// Hugging Face inference API client
#[derive(Debug, Clone)]
pub struct HuggingFaceClient {
    /// HTTP client
    client: Client,
    /// Bearer token
    api_key: String,
    /// Model endpoint
    api_url: String,
}

impl HuggingFaceClient {
    /// Create a new client with the given per-request timeout
    pub fn new(
        api_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GenerationError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GenerationError::Network(e.to_string()))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            api_url: api_url.into(),
        })
    }
}

#[async_trait]
impl ImageGenerator for HuggingFaceClient {
    async fn generate(&self, prompt: &str, seed: u32) -> Result<Vec<u8>, GenerationError> {
        let request = InferenceRequest {
            inputs: prompt,
            options: InferenceOptions { seed },
        };

        debug!("Sending image generation request (seed {})", seed);

        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(classify)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            let err = GenerationError::Upstream { status, body };
            error!("{}", err);
            return Err(err);
        }

        let bytes = response.bytes().await.map_err(classify)?;
        debug!("Received {} bytes of image data", bytes.len());
        Ok(bytes.to_vec())
    }
}

/// Map a transport error to a failure kind and log it
fn classify(e: reqwest::Error) -> GenerationError {
    let err = if e.is_timeout() {
        GenerationError::Timeout
    } else {
        GenerationError::Network(e.to_string())
    };
    error!("{}", err);
    err
}
