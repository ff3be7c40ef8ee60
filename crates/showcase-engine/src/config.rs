use std::fmt;
use std::str::FromStr;

use anyhow::bail;

use crate::non_empty_env;

pub const DEFAULT_THRESHOLD: u32 = 80;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-3-pro-image-preview";
pub const DEFAULT_VISION_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

const API_KEY_VARS: [&str; 3] = ["GEMINI_API_KEY", "GOOGLE_API_KEY", "GOOGLE_AI_API_KEY"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProviderKind {
    #[default]
    Gemini,
    Dryrun,
}

impl ProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gemini => "gemini",
            Self::Dryrun => "dryrun",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "gemini" | "google" => Ok(Self::Gemini),
            "dryrun" | "dry-run" | "dry_run" => Ok(Self::Dryrun),
            other => bail!("unknown provider '{other}' (expected gemini or dryrun)"),
        }
    }
}

/// Runtime knobs for a showcase job, resolved from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub provider: ProviderKind,
    /// Exclusive lower bound a judged score must beat to be accepted.
    pub acceptance_threshold: u32,
    pub max_attempts: u32,
    pub image_model: String,
    pub vision_model: String,
    pub text_model: String,
    pub api_key: Option<String>,
    pub api_base: String,
    pub request_timeout_s: f64,
    pub transport_retries: usize,
    pub retry_backoff_s: f64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Gemini,
            acceptance_threshold: DEFAULT_THRESHOLD,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            vision_model: DEFAULT_VISION_MODEL.to_string(),
            text_model: DEFAULT_VISION_MODEL.to_string(),
            api_key: None,
            api_base: DEFAULT_API_BASE.to_string(),
            request_timeout_s: 90.0,
            transport_retries: 2,
            retry_backoff_s: 1.2,
        }
    }
}

impl EngineSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(non_empty_env)
    }

    /// Builds settings from any key lookup; unparsable values keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let number = |key: &str| lookup(key).and_then(|raw| raw.trim().parse::<f64>().ok());

        Self {
            provider: lookup("SHOWCASE_PROVIDER")
                .and_then(|raw| raw.parse().ok())
                .unwrap_or(defaults.provider),
            acceptance_threshold: number("VERIFICATION_THRESHOLD")
                .map(|value| value.round().clamp(0.0, 100.0) as u32)
                .unwrap_or(defaults.acceptance_threshold),
            max_attempts: number("MAX_REGEN_ATTEMPTS")
                .map(|value| value.round().max(1.0) as u32)
                .unwrap_or(defaults.max_attempts),
            image_model: lookup("SHOWCASE_IMAGE_MODEL").unwrap_or(defaults.image_model),
            vision_model: lookup("SHOWCASE_VISION_MODEL").unwrap_or(defaults.vision_model),
            text_model: lookup("SHOWCASE_TEXT_MODEL").unwrap_or(defaults.text_model),
            api_key: API_KEY_VARS.iter().find_map(|key| lookup(key)),
            api_base: lookup("GEMINI_API_BASE")
                .map(|value| value.trim_end_matches('/').to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or(defaults.api_base),
            request_timeout_s: number("SHOWCASE_REQUEST_TIMEOUT")
                .map(|value| value.clamp(15.0, 300.0))
                .unwrap_or(defaults.request_timeout_s),
            transport_retries: number("SHOWCASE_TRANSPORT_RETRIES")
                .map(|value| value.clamp(0.0, 4.0).round() as usize)
                .unwrap_or(defaults.transport_retries),
            retry_backoff_s: number("SHOWCASE_RETRY_BACKOFF")
                .map(|value| value.clamp(0.1, 10.0))
                .unwrap_or(defaults.retry_backoff_s),
        }
    }

    pub fn with_threshold(mut self, threshold: u32) -> Self {
        self.acceptance_threshold = threshold.min(100);
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_provider(mut self, provider: ProviderKind) -> Self {
        self.provider = provider;
        self
    }
}
