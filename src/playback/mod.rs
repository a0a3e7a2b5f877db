//! Downlink playback: gapless scheduling of decoded fragments.
//!
//! # Architecture
//!
//! ```text
//! base64 fragment ─▶ PlaybackScheduler::enqueue_fragment
//!                      │  start = max(sink.current_time(), next_start_time)
//!                      │  next_start_time = start + duration
//!                      ▼
//!               dyn PlaybackSink ── MixerHandle ── Mixer ◀── cpal output callback
//!                                                   (clock = frames rendered / rate)
//! ```
//!
//! [`PlaybackScheduler`] is owned by exactly one live session; the
//! [`PlaybackSink`] (the output device) may be shared by many.

pub mod device;
pub mod mixer;
pub mod scheduler;

pub use device::{MixerHandle, OutputDevice, OutputError};
pub use mixer::Mixer;
pub use scheduler::{
    next_slot, play_clip, BufferHandle, PlaybackBuffer, PlaybackScheduler, PlaybackSink, Scheduled,
};
