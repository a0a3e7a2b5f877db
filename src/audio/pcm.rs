//! 16-bit PCM codec for the live session.
//!
//! Uplink: `f32` samples are scaled by 32768 and cast to `i16` (no dither,
//! no explicit clamp), written little-endian and base64 encoded.
//!
//! Downlink: base64 → little-endian `i16` → `f32` by dividing by 32768.
//!
//! ```rust
//! use guide_voice::audio::{decode_base64_pcm16, encode_base64_pcm16};
//!
//! let wire = encode_base64_pcm16(&[0.5, -0.5]);
//! let back = decode_base64_pcm16(&wire).unwrap();
//! assert_eq!(back, vec![0.5, -0.5]);
//! ```

use base64::prelude::*;
use thiserror::Error;

/// Scale between normalised floats and 16-bit integers.
pub const PCM16_SCALE: f32 = 32768.0;

/// Errors produced while decoding an inbound audio fragment.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("fragment is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("fragment has an odd byte length ({0}); expected 16-bit samples")]
    OddLength(usize),
}

/// Quantise one sample. Magnitudes at or beyond full scale saturate at the
/// `i16` rails through the float-to-int cast.
#[inline]
pub fn quantize(sample: f32) -> i16 {
    (sample * PCM16_SCALE) as i16
}

/// Encode `samples` as little-endian 16-bit PCM bytes.
pub fn encode_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &s in samples {
        bytes.extend_from_slice(&quantize(s).to_le_bytes());
    }
    bytes
}

/// Encode `samples` as base64 of little-endian 16-bit PCM.
pub fn encode_base64_pcm16(samples: &[f32]) -> String {
    BASE64_STANDARD.encode(encode_pcm16(samples))
}

/// Decode little-endian 16-bit PCM bytes to normalised floats.
pub fn decode_pcm16(bytes: &[u8]) -> Result<Vec<f32>, DecodeError> {
    if bytes.len() % 2 != 0 {
        return Err(DecodeError::OddLength(bytes.len()));
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / PCM16_SCALE)
        .collect())
}

/// Decode a base64 fragment of little-endian 16-bit PCM.
pub fn decode_base64_pcm16(data: &str) -> Result<Vec<f32>, DecodeError> {
    let bytes = BASE64_STANDARD.decode(data.trim())?;
    decode_pcm16(&bytes)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
