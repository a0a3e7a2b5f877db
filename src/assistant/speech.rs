//! Text-to-speech through the TTS model.

use super::{Assistant, AssistantError};
use crate::gemini::{Content, GenerateContentRequest, GenerationConfig};

impl Assistant {
    /// Synthesize `text` with the configured voice. Returns base64 16-bit
    /// PCM at 24 kHz.
    pub async fn synthesize(&self, text: &str) -> Result<String, AssistantError> {
        let request = GenerateContentRequest {
            contents: vec![Content::text(text)],
            ..Default::default()
        }
        .with_generation_config(GenerationConfig::audio(&self.config.tts_voice));

        let response = self
            .generator
            .generate(&self.config.tts_model, &request)
            .await?;

        response
            .inline_data()
            .map(str::to_string)
            .ok_or(AssistantError::NoAudio)
    }

    /// Like [`synthesize`](Self::synthesize) but never fails: errors are
    /// logged and reported as `None`.
    pub async fn speak_text(&self, text: &str) -> Option<String> {
        match self.synthesize(text).await {
            Ok(audio) => Some(audio),
            Err(e) => {
                log::warn!("speech: synthesis failed ({e}); continuing without audio");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::assistant::tests::{assistant, audio_reply, text_reply, ScriptedGenerator};
    use crate::gemini::GeminiError;

    #[tokio::test]
    async fn speak_text_returns_inline_audio() {
        let gen = ScriptedGenerator::new([audio_reply("AAAA")]);
        let a = assistant(gen.clone());

        assert_eq!(a.speak_text("Salom").await.as_deref(), Some("AAAA"));

        let calls = gen.calls();
        assert_eq!(calls[0].0, "gemini-2.5-flash-preview-tts");
        let body = &calls[0].1;
        assert_eq!(body["contents"][0]["parts"][0]["text"], "Salom");
        assert_eq!(body["generationConfig"]["responseModalities"][0], "AUDIO");
        assert_eq!(
            body["generationConfig"]["speechConfig"]["voiceConfig"]["prebuiltVoiceConfig"]
                ["voiceName"],
            "Kore"
        );
    }

    #[tokio::test]
    async fn speak_text_is_none_on_error() {
        let gen = ScriptedGenerator::new([Err(GeminiError::Timeout)]);
        assert_eq!(assistant(gen).speak_text("x").await, None);
    }

    #[tokio::test]
    async fn speak_text_is_none_without_audio() {
        let gen = ScriptedGenerator::new([text_reply("no audio here")]);
        assert_eq!(assistant(gen).speak_text("x").await, None);
    }
}
