//! Gemini text bridge: unary `generateContent` calls for reports and drafts.
//!
//! The live session handles conversation; this bridge is only used by tool
//! handlers that need a one-shot block of generated text grounded in the
//! board data the caller embeds into the prompt.

use crate::config::TowerConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

const GENERATE_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Backend that turns a prompt into text. Trait seam so tool handlers can be
/// tested with a canned generator.
#[async_trait::async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
    ) -> Result<String, Box<dyn std::error::Error + Send + Sync>>;
}

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Serialize, Deserialize, Default)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize, Default)]
struct Part {
    text: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Content,
}

/// Gemini `generateContent` client.
pub struct GeminiBridge {
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl GeminiBridge {
    /// Create a bridge from configuration. Returns `None` if no key is found.
    pub fn from_config(config: &TowerConfig) -> Option<Self> {
        let key = config.api_key()?;
        Some(Self::new(key).with_model(&config.text_model()))
    }

    /// Create a bridge with an explicit API key.
    pub fn new(api_key: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            api_key: api_key.trim().to_string(),
            model: crate::config::TEXT_MODEL.to_string(),
            client,
        }
    }

    /// Set the model (e.g. `gemini-2.5-flash`).
    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }
}

#[async_trait::async_trait]
impl TextGenerator for GeminiBridge {
    async fn generate(
        &self,
        prompt: &str,
    ) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            GENERATE_API_BASE, self.model, self.api_key
        );
        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
        };

        debug!("Generating text with {}", self.model);
        let res = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                warn!("Gemini request failed: {}", e);
                format!("Gemini request failed: {}", e)
            })?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            warn!("Gemini API error {}: {}", status, body);
            return Err(format!("Gemini API error {}: {}", status, body).into());
        }

        let parsed: GenerateResponse = res.json().await.map_err(|e| {
            warn!("Gemini response parse failed: {}", e);
            format!("Gemini response parse failed: {}", e)
        })?;

        let text = parsed
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.clone())
            .unwrap_or_default();

        Ok(text)
    }
}
