//! Search-grounded travel guide chat.

use serde::Serialize;

use super::{Assistant, AssistantError};
use crate::gemini::GenerateContentRequest;

/// Replies shorter than this many characters are read aloud.
pub const SPOKEN_REPLY_LIMIT: usize = 350;

/// Shown when the guide returns no text.
pub const GUIDE_FALLBACK: &str = "Kechirasiz, javob olishda muammo yuz berdi.";

fn guide_instruction(lang: &str) -> String {
    format!(
        "Siz dunyodagi eng aqlli va samimiy sayohat gidisiz. Foydalanuvchi bilan {lang} tilida \
         muloqot qiling. Google Search yordamida eng yangi ma'lumotlarni toping. Agar \
         foydalanuvchi biror davlat (masalan O'zbekiston) haqida so'rasa, o'sha joyning diqqatga \
         sazovor joylari, madaniyati va oshxonasi haqida batafsil ma'lumot bering."
    )
}

/// The guide's answer and the web sources it cited.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GuideReply {
    pub text: String,
    pub links: Vec<String>,
}

impl GuideReply {
    /// Short enough to synthesize.
    pub fn should_speak(&self) -> bool {
        self.text.chars().count() < SPOKEN_REPLY_LIMIT
    }

    /// Text followed by a "Manbalar" (sources) section when links exist.
    pub fn render(&self) -> String {
        if self.links.is_empty() {
            return self.text.clone();
        }
        format!("{}\n\nManbalar:\n{}", self.text, self.links.join("\n"))
    }
}

impl Assistant {
    /// Ask the travel guide a question, answered in `lang`.
    pub async fn ask_guide(&self, message: &str, lang: &str) -> Result<GuideReply, AssistantError> {
        let request = GenerateContentRequest::prompt(message)
            .with_system_instruction(guide_instruction(lang))
            .with_google_search();

        let response = self
            .generator
            .generate(&self.config.search_model, &request)
            .await?;

        let text = response
            .text()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| GUIDE_FALLBACK.to_string());

        Ok(GuideReply {
            text,
            links: response.grounding_links(),
        })
    }
}
