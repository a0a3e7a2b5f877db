//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across tasks.
//! Every section is `#[serde(default)]` so a partial `settings.toml` still
//! loads.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use super::AppPaths;

// ---------------------------------------------------------------------------
// Languages
// ---------------------------------------------------------------------------

/// A selectable interface / translation language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Language {
    /// Short code (not strictly ISO-639-1, e.g. `"jp"`, `"kz"`).
    pub code: &'static str,
    /// Native display name, which is also what the prompts are given.
    pub name: &'static str,
}

/// Languages offered for translation and as the preferred guide language.
pub const LANGUAGES: &[Language] = &[
    Language { code: "uz", name: "O'zbekcha" },
    Language { code: "en", name: "English" },
    Language { code: "ru", name: "Русский" },
    Language { code: "tr", name: "Türkçe" },
    Language { code: "ar", name: "العربية" },
    Language { code: "de", name: "Deutsch" },
    Language { code: "fr", name: "Français" },
    Language { code: "es", name: "Español" },
    Language { code: "it", name: "Italiano" },
    Language { code: "jp", name: "日本語" },
    Language { code: "cn", name: "中文" },
    Language { code: "kr", name: "한국어" },
    Language { code: "kz", name: "Қазақша" },
    Language { code: "tj", name: "Toҷикӣ" },
    Language { code: "kg", name: "Кыргызcha" },
];

impl Language {
    /// Look up a language by code or display name (case-insensitive).
    pub fn find(key: &str) -> Option<&'static Language> {
        LANGUAGES
            .iter()
            .find(|l| l.code.eq_ignore_ascii_case(key) || l.name.to_lowercase() == key.to_lowercase())
    }
}

// ---------------------------------------------------------------------------
// UserSettings
// ---------------------------------------------------------------------------

/// Colour theme preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

/// Per-user preferences, including the premium entitlement that gates the
/// live voice session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UserSettings {
    /// Language the guide answers in (display name, e.g. `"O'zbekcha"`).
    pub preferred_language: String,
    /// Premium entitlement. Live voice refuses to start without it.
    pub is_premium: bool,
    pub has_onboarded: bool,
    pub theme: Theme,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            preferred_language: "O'zbekcha".into(),
            is_premium: false,
            has_onboarded: false,
            theme: Theme::Light,
        }
    }
}

// ---------------------------------------------------------------------------
// GeminiConfig
// ---------------------------------------------------------------------------

/// Environment variables consulted (in order) before `gemini.api_key`.
pub const API_KEY_ENV_VARS: &[&str] = &["GEMINI_API_KEY", "API_KEY"];

/// Settings for the Gemini REST endpoints used by translation, speech,
/// discovery and guide chat.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    /// API key. `None` means "read it from the environment".
    pub api_key: Option<String>,
    /// Base URL of the REST API (no trailing slash).
    pub base_url: String,
    /// Model used for plain text generation (translation).
    pub text_model: String,
    /// Model used for search-grounded requests (discovery, guide chat).
    pub search_model: String,
    /// Text-to-speech model.
    pub tts_model: String,
    /// Prebuilt voice used for text-to-speech.
    pub tts_voice: String,
    /// Maximum seconds to wait for a REST response.
    pub timeout_secs: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://generativelanguage.googleapis.com".into(),
            text_model: "gemini-3-flash-preview".into(),
            search_model: "gemini-3-pro-preview".into(),
            tts_model: "gemini-2.5-flash-preview-tts".into(),
            tts_voice: "Kore".into(),
            timeout_secs: 60,
        }
    }
}

impl GeminiConfig {
    /// Resolve the API key from the process environment, falling back to the
    /// configured value.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.resolve_api_key_with(|name| std::env::var(name).ok())
    }

    /// Resolve the API key using `lookup` for environment access.
    pub fn resolve_api_key_with(&self, lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
        API_KEY_ENV_VARS
            .iter()
            .filter_map(|name| lookup(name))
            .chain(self.api_key.clone())
            .find(|key| !key.trim().is_empty())
    }
}

// ---------------------------------------------------------------------------
// LiveConfig
// ---------------------------------------------------------------------------

/// Settings for the duplex live voice session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    /// WebSocket endpoint of the bidirectional streaming API. The API key is
    /// appended as the `key` query parameter.
    pub ws_url: String,
    /// Native-audio model used for the live session.
    pub model: String,
    /// Prebuilt voice the model answers with.
    pub voice: String,
    /// System instruction sent when the session opens.
    pub system_instruction: String,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            ws_url: "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent".into(),
            model: "gemini-2.5-flash-native-audio-preview-09-2025".into(),
            voice: "Zephyr".into(),
            system_instruction: "Siz aqlli sayohat gidisiz. Foydalanuvchi bilan ovozli muloqot qiling. Maslahatlaringiz juda samimiy bo'lsin.".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// AudioConfig
// ---------------------------------------------------------------------------

/// Sample formats of the live audio pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Uplink PCM rate in Hz. The remote endpoint expects 16 000.
    pub input_sample_rate: u32,
    /// Rate of inbound PCM fragments in Hz. The remote endpoint sends 24 000.
    pub output_sample_rate: u32,
    /// Samples per uplink frame.
    pub block_size: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            input_sample_rate: 16_000,
            output_sample_rate: 24_000,
            block_size: 4096,
        }
    }
}

impl AudioConfig {
    /// Reject formats the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.input_sample_rate == 0 {
            bail!("audio.input_sample_rate must be greater than 0");
        }
        if self.output_sample_rate == 0 {
            bail!("audio.output_sample_rate must be greater than 0");
        }
        if self.block_size == 0 {
            bail!("audio.block_size must be greater than 0");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use guide_voice::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load().unwrap();
///
/// // Modify and save
/// // config.save().unwrap();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// User preferences and entitlement.
    pub settings: UserSettings,
    /// Gemini REST settings.
    pub gemini: GeminiConfig,
    /// Live voice session settings.
    pub live: LiveConfig,
    /// Audio pipeline formats.
    pub audio: AudioConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path.
    ///
    /// Fails on unparseable TOML and on audio formats the pipeline cannot
    /// run with.
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("invalid settings file {}", path.display()))?;
        config
            .audio
            .validate()
            .with_context(|| format!("invalid settings file {}", path.display()))?;
        Ok(config)
    }

    /// Load `path`, apply `edit` and write the result back.
    ///
    /// A file that fails to load is left untouched and the error returned.
    pub fn update_file(path: &std::path::Path, edit: impl FnOnce(&mut Self)) -> Result<Self> {
        let mut config = Self::load_from(path)?;
        edit(&mut config);
        config.save_to(path)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path.
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
