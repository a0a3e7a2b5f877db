//! Travel-guide voice assistant backed by the Gemini API.
//!
//! # Modules
//!
//! * [`live`]: duplex voice session with lifecycle, uplink, event dispatch.
//! * [`playback`]: gapless fragment scheduler and the cpal output mixer.
//! * [`audio`]: microphone capture, resampling, PCM codec, framing.
//! * [`gemini`]: REST client and wire types shared with the live session.
//! * [`assistant`]: translation, speech, place discovery and guide chat.
//! * [`config`]: TOML settings and platform paths.

pub mod assistant;
pub mod audio;
pub mod config;
pub mod gemini;
pub mod live;
pub mod playback;
