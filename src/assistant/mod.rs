//! Travel-assistant features built on one-shot Gemini calls.
//!
//! * [`Assistant::translate_and_speak`]: translation plus a spoken rendition.
//! * [`Assistant::speak_text`]: text-to-speech, `None` on failure.
//! * [`Assistant::discover_places`]: landmarks with map and image links.
//! * [`Assistant::ask_guide`]: search-grounded travel guide answer.
//!
//! Every feature goes through the [`ContentGenerator`] seam, so tests drive
//! them with a scripted generator instead of the network.

pub mod guide;
pub mod places;
pub mod speech;
pub mod translate;

use std::sync::Arc;

use thiserror::Error;

use crate::config::GeminiConfig;
use crate::gemini::{ContentGenerator, GeminiError};

pub use guide::GuideReply;
pub use places::{Discovery, Place};
pub use translate::Translation;

/// Errors surfaced by assistant features.
#[derive(Debug, Error)]
pub enum AssistantError {
    #[error(transparent)]
    Gemini(#[from] GeminiError),

    #[error("speech response carried no audio")]
    NoAudio,
}

/// Entry point for the REST-backed features.
#[derive(Clone)]
pub struct Assistant {
    generator: Arc<dyn ContentGenerator>,
    config: GeminiConfig,
}

impl Assistant {
    pub fn new(generator: Arc<dyn ContentGenerator>, config: GeminiConfig) -> Self {
        Self { generator, config }
    }

    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }
}
