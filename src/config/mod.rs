//! Configuration module.
//!
//! Provides `AppConfig` (top-level settings), sub-configs for the Gemini REST
//! client, the live voice session and the audio pipeline, `AppPaths` for the
//! platform config directory, and TOML persistence via `AppConfig::load` /
//! `AppConfig::save`.

pub mod paths;
pub mod settings;

pub use paths::AppPaths;
pub use settings::{
    AppConfig, AudioConfig, GeminiConfig, Language, LiveConfig, Theme, UserSettings, LANGUAGES,
};
