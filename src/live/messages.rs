//! Live session wire messages.
//!
//! Outbound messages are externally tagged (`{"setup": {...}}`,
//! `{"realtimeInput": {...}}`). Inbound messages carry at most one of
//! `setupComplete`, `serverContent`, `goAway` or `toolCall`; unknown fields
//! are ignored.

use serde::{Deserialize, Serialize};

use crate::config::LiveConfig;
use crate::gemini::{Blob, Content, GenerationConfig, GroundingMetadata};

// ---------------------------------------------------------------------------
// Client → server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    Setup(Setup),
    RealtimeInput(RealtimeInput),
}

impl ClientMessage {
    /// One base64 PCM block tagged `audio/pcm;rate=<sample_rate>`.
    pub fn audio(data: String, sample_rate: u32) -> Self {
        ClientMessage::RealtimeInput(RealtimeInput {
            media_chunks: vec![Blob::new(format!("audio/pcm;rate={sample_rate}"), data)],
        })
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// First message on the socket: model, output modality, voice, instruction.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    pub model: String,
    pub generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
}

impl Setup {
    /// Audio responses in `voice`, steered by `system_instruction`.
    pub fn new(model: &str, voice: &str, system_instruction: &str) -> Self {
        let model = if model.starts_with("models/") {
            model.to_string()
        } else {
            format!("models/{model}")
        };
        let system_instruction =
            (!system_instruction.trim().is_empty()).then(|| Content::text(system_instruction));

        Self {
            model,
            generation_config: GenerationConfig::audio(voice),
            system_instruction,
        }
    }

    pub fn from_config(config: &LiveConfig) -> Self {
        Self::new(&config.model, &config.voice, &config.system_instruction)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    pub media_chunks: Vec<Blob>,
}

// ---------------------------------------------------------------------------
// Server → client
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    #[serde(default)]
    pub setup_complete: Option<serde_json::Value>,
    #[serde(default)]
    pub server_content: Option<ServerContent>,
    #[serde(default)]
    pub go_away: Option<GoAway>,
    #[serde(default)]
    pub tool_call: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    #[serde(default)]
    pub model_turn: Option<Content>,
    #[serde(default)]
    pub turn_complete: bool,
    #[serde(default)]
    pub interrupted: bool,
    #[serde(default)]
    pub grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoAway {
    #[serde(default)]
    pub time_left: Option<String>,
}

impl ServerMessage {
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub fn is_setup_complete(&self) -> bool {
        self.setup_complete.is_some()
    }

    /// Base64 audio payloads of the model turn, in part order.
    pub fn audio_fragments(&self) -> impl Iterator<Item = &str> {
        self.model_parts()
            .filter_map(|p| p.inline_data.as_ref())
            .filter(|b| b.mime_type.is_empty() || b.mime_type.starts_with("audio/"))
            .map(|b| b.data.as_str())
    }

    /// Text parts of the model turn, in part order.
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.model_parts().filter_map(|p| p.text.as_deref())
    }

    pub fn is_interrupted(&self) -> bool {
        self.server_content.as_ref().is_some_and(|c| c.interrupted)
    }

    pub fn is_turn_complete(&self) -> bool {
        self.server_content.as_ref().is_some_and(|c| c.turn_complete)
    }

    fn model_parts(&self) -> impl Iterator<Item = &crate::gemini::Part> {
        self.server_content
            .as_ref()
            .and_then(|c| c.model_turn.as_ref())
            .into_iter()
            .flat_map(|turn| turn.parts.iter())
    }
}
