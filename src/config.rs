//! Configuration for capture, analysis and share-card rendering.
//!
//! All behaviour is controlled through [`LensConfig`], built via its
//! [`LensConfigBuilder`]. One struct for every knob makes it easy to share
//! the config between the session, the renderer and the CLI, and to log it
//! when a run behaves unexpectedly.

use crate::error::LensError;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Default label painted in the bottom-right corner of the share card.
pub const DEFAULT_BRAND_TEXT: &str = "BodyFatAI Analysis";

/// Configuration for a body-fat analysis session.
///
/// # Example
/// ```rust
/// use bodyfat_lens::LensConfig;
///
/// let config = LensConfig::builder()
///     .max_dimension(1024)
///     .api_timeout_secs(60)
///     .brand_text("My Gym")
///     .build()
///     .unwrap();
/// assert_eq!(config.jpeg_quality, 70);
/// ```
#[derive(Clone)]
pub struct LensConfig {
    /// Longest side, in pixels, a photo may have before upload. Default: 1024.
    ///
    /// Larger uploads fail on mobile networks long before the model benefits
    /// from the extra detail.
    pub max_dimension: u32,

    /// JPEG quality (1–100) for the upload payload. Default: 70.
    pub jpeg_quality: u8,

    /// Time the inference request may take before the attempt is abandoned.
    /// Default: 120 s.
    pub api_timeout_secs: u64,

    /// LLM model identifier. If None, `gemini-2.5-flash` for named providers.
    pub model: Option<String>,

    /// LLM provider name (e.g. "gemini", "openai", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.2.
    pub temperature: f32,

    /// Maximum tokens the model may generate. Default: 2048.
    pub max_tokens: usize,

    /// Custom analysis prompt. If None, uses the built-in prompt.
    pub system_prompt: Option<String>,

    /// Branding text on the share card. Default: [`DEFAULT_BRAND_TEXT`].
    pub brand_text: String,

    /// Quiet period after the last branding edit before the card is
    /// recomposed. Default: 500 ms.
    pub debounce_ms: u64,

    /// Interval until the next check-in reminder. Default: 14 days.
    pub reminder_interval_days: u32,

    /// Location of the reminder store. If None, the user data directory.
    pub store_path: Option<PathBuf>,

    /// TrueType font for card text. If None, well-known system fonts are tried.
    pub font_path: Option<PathBuf>,
}

impl Default for LensConfig {
    fn default() -> Self {
        Self {
            max_dimension: 1024,
            jpeg_quality: 70,
            api_timeout_secs: 120,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.2,
            max_tokens: 2048,
            system_prompt: None,
            brand_text: DEFAULT_BRAND_TEXT.to_string(),
            debounce_ms: 500,
            reminder_interval_days: 14,
            store_path: None,
            font_path: None,
        }
    }
}

impl fmt::Debug for LensConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LensConfig")
            .field("max_dimension", &self.max_dimension)
            .field("jpeg_quality", &self.jpeg_quality)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("brand_text", &self.brand_text)
            .field("debounce_ms", &self.debounce_ms)
            .field("reminder_interval_days", &self.reminder_interval_days)
            .field("store_path", &self.store_path)
            .field("font_path", &self.font_path)
            .finish()
    }
}

impl LensConfig {
    /// Create a new builder for `LensConfig`.
    pub fn builder() -> LensConfigBuilder {
        LensConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn reminder_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.reminder_interval_days) * 24 * 60 * 60)
    }
}

/// Builder for [`LensConfig`].
pub struct LensConfigBuilder {
    config: LensConfig,
}

impl fmt::Debug for LensConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LensConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl LensConfigBuilder {
    pub fn max_dimension(mut self, px: u32) -> Self {
        self.config.max_dimension = px.max(64);
        self
    }

    pub fn jpeg_quality(mut self, q: u8) -> Self {
        self.config.jpeg_quality = q.clamp(1, 100);
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn brand_text(mut self, text: impl Into<String>) -> Self {
        self.config.brand_text = text.into();
        self
    }

    pub fn debounce_ms(mut self, ms: u64) -> Self {
        self.config.debounce_ms = ms;
        self
    }

    pub fn reminder_interval_days(mut self, days: u32) -> Self {
        self.config.reminder_interval_days = days;
        self
    }

    pub fn store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.store_path = Some(path.into());
        self
    }

    pub fn font_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.font_path = Some(path.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<LensConfig, LensError> {
        let c = &self.config;
        if c.api_timeout_secs == 0 {
            return Err(LensError::InvalidConfig(
                "API timeout must be ≥ 1 second".into(),
            ));
        }
        if c.reminder_interval_days == 0 {
            return Err(LensError::InvalidConfig(
                "Reminder interval must be ≥ 1 day".into(),
            ));
        }
        if c.max_tokens == 0 {
            return Err(LensError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        Ok(self.config)
    }
}
