//! Gemini REST access and the JSON types shared with the live session.
//!
//! * [`ContentGenerator`]: async trait for one-shot `generateContent` calls.
//! * [`GeminiClient`]: reqwest implementation configured from [`GeminiConfig`].
//! * [`types`]: request/response bodies in the Gemini wire format.
//!
//! [`GeminiConfig`]: crate::config::GeminiConfig

pub mod client;
pub mod types;

pub use client::{ContentGenerator, GeminiClient, GeminiError};
pub use types::{
    Blob, Content, GenerateContentRequest, GenerateContentResponse, GenerationConfig,
    GroundingMetadata, Part, SpeechConfig, Tool,
};
