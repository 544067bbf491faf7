//! Tower configuration loaded from `user_config.toml` with `.env` fallbacks.
//!
//! The only hard-required value is the Gemini API key; everything else has a
//! sensible default. Keys in the toml file take priority over environment
//! variables so users can configure the tower without touching the shell.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Live conversation model (native audio, duplex).
pub const LIVE_MODEL: &str = "gemini-2.5-flash-native-audio-preview-09-2025";

/// Unary text model used for report and draft generation.
pub const TEXT_MODEL: &str = "gemini-2.5-flash";

/// Prebuilt voice used for synthesized speech.
pub const VOICE_NAME: &str = "Kore";

/// Microphone capture sample rate in Hz.
pub const INPUT_SAMPLE_RATE: u32 = 16_000;

/// Sample rate of synthesized audio arriving from the service, in Hz.
pub const OUTPUT_SAMPLE_RATE: u32 = 24_000;

/// Capture block size in samples (one outbound chunk per block).
pub const CAPTURE_BLOCK_SIZE: usize = 4096;

/// User-specific configuration stored in `user_config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TowerConfig {
    /// Gemini API key. Falls back to the `GEMINI_API_KEY` env var.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Override for the live conversation model.
    #[serde(default)]
    pub live_model: Option<String>,

    /// Override for the unary text-generation model.
    #[serde(default)]
    pub text_model: Option<String>,

    /// Override for the prebuilt voice name.
    #[serde(default)]
    pub voice: Option<String>,
}

impl TowerConfig {
    /// Default path for the user configuration file.
    pub fn default_path() -> PathBuf {
        PathBuf::from("user_config.toml")
    }

    /// Load configuration from the default path, or defaults if absent.
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        Self::load_from_path(&Self::default_path())
    }

    /// Load configuration from a specific path, or defaults if absent.
    pub fn load_from_path(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = fs::read_to_string(path)?;
            let config: TowerConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(TowerConfig::default())
        }
    }

    /// API key with fallback to the environment.
    /// Priority: user_config.toml > GEMINI_API_KEY env var.
    pub fn api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("GEMINI_API_KEY").ok())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    /// Live conversation model name.
    pub fn live_model(&self) -> String {
        self.live_model
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| LIVE_MODEL.to_string())
    }

    /// Text-generation model name.
    pub fn text_model(&self) -> String {
        self.text_model
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| TEXT_MODEL.to_string())
    }

    /// Voice name for synthesized speech.
    pub fn voice(&self) -> String {
        self.voice
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| VOICE_NAME.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_unset() {
        let config = TowerConfig::default();
        assert_eq!(config.live_model(), LIVE_MODEL);
        assert_eq!(config.text_model(), TEXT_MODEL);
        assert_eq!(config.voice(), "Kore");
    }

    #[test]
    fn toml_overrides_take_priority() {
        let config: TowerConfig = toml::from_str(
            r#"
            api_key = "test-key"
            voice = "Puck"
            "#,
        )
        .unwrap();
        assert_eq!(config.api_key(), Some("test-key".to_string()));
        assert_eq!(config.voice(), "Puck");
        assert_eq!(config.live_model(), LIVE_MODEL);
    }

    #[test]
    fn blank_overrides_fall_back() {
        let config = TowerConfig {
            voice: Some("  ".to_string()),
            ..Default::default()
        };
        assert_eq!(config.voice(), "Kore");
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = TowerConfig::load_from_path(Path::new("does_not_exist.toml")).unwrap();
        assert!(config.api_key.is_none());
    }
}
