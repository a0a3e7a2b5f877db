//! Translation followed by a spoken rendition of the result.

use serde::Serialize;

use super::{Assistant, AssistantError};
use crate::gemini::GenerateContentRequest;

/// Shown in place of an empty translation.
pub const TRANSLATION_FALLBACK: &str = "Tarjima qilishda xatolik yuz berdi.";

/// A completed translation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Translation {
    pub original_text: String,
    pub translated_text: String,
    pub from_lang: String,
    pub to_lang: String,
    /// Base64 24 kHz PCM of `translated_text`; `None` when synthesis failed.
    #[serde(skip)]
    pub audio: Option<String>,
}

fn translation_prompt(text: &str, from: &str, to: &str) -> String {
    format!(
        "Translate this text from {from} to {to}. Be natural and accurate. \
         Output ONLY the translated text: \"{text}\""
    )
}

impl Assistant {
    /// Translate `text` between two languages (display names).
    pub async fn translate(&self, text: &str, from: &str, to: &str) -> Result<String, AssistantError> {
        let request = GenerateContentRequest::prompt(translation_prompt(text, from, to));
        let response = self
            .generator
            .generate(&self.config.text_model, &request)
            .await?;

        let translated = response.text().unwrap_or_default().trim().to_string();
        if translated.is_empty() {
            log::warn!("translate: empty translation from {from} to {to}");
            return Ok(TRANSLATION_FALLBACK.to_string());
        }
        Ok(translated)
    }

    /// Translate `text` and synthesize the translation.
    ///
    /// A translation failure is an error; a synthesis failure only leaves
    /// `audio` empty.
    pub async fn translate_and_speak(
        &self,
        text: &str,
        from: &str,
        to: &str,
    ) -> Result<Translation, AssistantError> {
        let translated_text = self.translate(text, from, to).await?;
        let audio = self.speak_text(&translated_text).await;

        Ok(Translation {
            original_text: text.to_string(),
            translated_text,
            from_lang: from.to_string(),
            to_lang: to.to_string(),
            audio,
        })
    }
}
