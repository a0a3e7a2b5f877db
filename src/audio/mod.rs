//! Audio pipeline: microphone capture, mono/resample, fixed frames, PCM.
//!
//! # Pipeline
//!
//! ```text
//! Microphone → cpal callback → AudioChunk (mpsc) → to_mono → StreamResampler
//!           → BlockFramer (4096) → encode_pcm16 → base64 → live uplink
//!
//! inbound base64 → decode_pcm16 → f32 buffer → playback scheduler
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use guide_voice::audio::{AudioCapture, AudioChunk, CaptureStream, Microphone};
//!
//! let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<AudioChunk>();
//! let stream = AudioCapture::default().open(tx).unwrap(); // drop → stops stream
//! stream.resume().unwrap();
//!
//! while let Some(chunk) = rx.blocking_recv() {
//!     println!("received {} samples @ {}Hz", chunk.samples.len(), chunk.sample_rate);
//! }
//! ```

pub mod capture;
pub mod framer;
pub mod pcm;
pub mod resample;

pub use capture::{AudioCapture, AudioChunk, CaptureError, CaptureHandle, CaptureStream, Microphone};
pub use framer::BlockFramer;
pub use pcm::{decode_base64_pcm16, decode_pcm16, encode_base64_pcm16, encode_pcm16, DecodeError};
pub use resample::{resample_linear, to_mono, StreamResampler};
