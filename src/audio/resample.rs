//! Audio resampling and channel mixing utilities.
//!
//! The live uplink wants **16 kHz mono** and the playback mixer may run at a
//! device rate other than the 24 kHz the model speaks. This module provides:
//!
//! 1. [`to_mono`]: downmix any number of interleaved channels to mono.
//! 2. [`StreamResampler`]: stateful, chunk-by-chunk resampling of a
//!    continuous capture stream (rubato `FftFixedIn`).
//! 3. [`resample_linear`]: one-shot linear interpolation for whole buffers
//!    (used when a decoded fragment must match the output device rate).

use rubato::{FftFixedIn, Resampler};
use thiserror::Error;

// ---------------------------------------------------------------------------
// to_mono
// ---------------------------------------------------------------------------

/// Mix interleaved multi-channel audio down to mono by averaging all channels.
///
/// The output length is `samples.len() / channels`.
///
/// * If `channels == 1` the input slice is returned as an owned `Vec`.
/// * If `channels == 0` an empty vector is returned.
///
/// # Example
///
/// ```rust
/// use guide_voice::audio::to_mono;
///
/// let stereo = vec![0.5_f32, -0.5, 0.2, -0.2]; // L R L R
/// let mono = to_mono(&stereo, 2);
/// assert_eq!(mono.len(), 2);
/// assert!((mono[0] - 0.0).abs() < 1e-6);
/// ```
pub fn to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.to_vec(),
        n => {
            let n = n as usize;
            samples
                .chunks_exact(n)
                .map(|frame| frame.iter().sum::<f32>() / n as f32)
                .collect()
        }
    }
}

// ---------------------------------------------------------------------------
// resample_linear
// ---------------------------------------------------------------------------

/// Resample `samples` from `source_rate` Hz to `target_rate` Hz using linear
/// interpolation.
///
/// * Equal rates return the input unchanged.
/// * Empty input returns an empty vector.
///
/// The output length is `ceil(samples.len() * target_rate / source_rate)`.
///
/// # Example
///
/// ```rust
/// use guide_voice::audio::resample_linear;
///
/// let hi = vec![0.5_f32; 480];
/// let lo = resample_linear(&hi, 48_000, 16_000);
/// assert_eq!(lo.len(), 160);
/// ```
pub fn resample_linear(samples: &[f32], source_rate: u32, target_rate: u32) -> Vec<f32> {
    if source_rate == target_rate || source_rate == 0 {
        return samples.to_vec();
    }

    if samples.is_empty() {
        return Vec::new();
    }

    let ratio = target_rate as f64 / source_rate as f64;
    let output_len = (samples.len() as f64 * ratio).ceil() as usize;
    let mut output = Vec::with_capacity(output_len);

    for i in 0..output_len {
        let src_pos = i as f64 / ratio;
        let idx = src_pos as usize;
        let frac = src_pos - idx as f64;

        let sample = if idx + 1 < samples.len() {
            samples[idx] * (1.0 - frac as f32) + samples[idx + 1] * frac as f32
        } else if idx < samples.len() {
            samples[idx]
        } else {
            0.0
        };

        output.push(sample);
    }

    output
}

// ---------------------------------------------------------------------------
// StreamResampler
// ---------------------------------------------------------------------------

/// Errors from the streaming resampler.
#[derive(Debug, Error)]
pub enum ResampleError {
    #[error("failed to construct resampler: {0}")]
    Construction(#[from] rubato::ResamplerConstructionError),

    #[error("resampling failed: {0}")]
    Process(#[from] rubato::ResampleError),
}

/// Input frames handed to rubato per call.
const RESAMPLER_CHUNK: usize = 1024;

/// Converts a continuous mono stream from one rate to another, carrying
/// leftover input between calls so that chunk boundaries from the device do
/// not matter.
///
/// The filter delay is trimmed from the start of the output, so output
/// sample `n` lines up with input time `n / target_rate`, and [`flush`]
/// drains the delayed tail. When both rates are equal the resampler is a
/// pass-through.
///
/// [`flush`]: StreamResampler::flush
pub struct StreamResampler {
    inner: Option<FftFixedIn<f32>>,
    pending: Vec<f32>,
    /// Leading output frames still to discard.
    skip: usize,
    /// Input frames accepted so far.
    consumed: u64,
    /// Output frames returned so far.
    produced: u64,
    source_rate: u32,
    target_rate: u32,
}

/// Drop up to `skip` leading frames of `frames`.
fn trim_delay<'a>(skip: &mut usize, frames: &'a [f32]) -> &'a [f32] {
    let n = (*skip).min(frames.len());
    *skip -= n;
    &frames[n..]
}

impl StreamResampler {
    pub fn new(source_rate: u32, target_rate: u32) -> Result<Self, ResampleError> {
        let inner = if source_rate == target_rate {
            None
        } else {
            Some(FftFixedIn::<f32>::new(
                source_rate as usize,
                target_rate as usize,
                RESAMPLER_CHUNK,
                2,
                1,
            )?)
        };
        let skip = inner.as_ref().map_or(0, |rs| rs.output_delay());

        Ok(Self {
            inner,
            pending: Vec::new(),
            skip,
            consumed: 0,
            produced: 0,
            source_rate,
            target_rate,
        })
    }

    /// Feed `input` (mono, `source_rate`) and return whatever output is ready.
    pub fn process(&mut self, input: &[f32]) -> Result<Vec<f32>, ResampleError> {
        let Some(inner) = self.inner.as_mut() else {
            return Ok(input.to_vec());
        };

        self.pending.extend_from_slice(input);
        self.consumed += input.len() as u64;

        let mut output = Vec::new();
        loop {
            let needed = inner.input_frames_next();
            if self.pending.len() < needed {
                break;
            }
            let chunk: Vec<f32> = self.pending.drain(..needed).collect();
            let mut frames = inner.process(&[chunk], None)?;
            if let Some(channel) = frames.pop() {
                output.extend_from_slice(trim_delay(&mut self.skip, &channel));
            }
        }

        self.produced += output.len() as u64;
        Ok(output)
    }

    /// Drain the stream: resample the buffered input, then push silence
    /// through until every input frame has come out. The returned tail brings
    /// the total output to `consumed * target_rate / source_rate`. Call once
    /// at stream end.
    pub fn flush(&mut self) -> Result<Vec<f32>, ResampleError> {
        let Some(inner) = self.inner.as_mut() else {
            return Ok(Vec::new());
        };

        let total = self.consumed * self.target_rate as u64 / self.source_rate as u64;
        let expected = total.saturating_sub(self.produced) as usize;

        let mut output = Vec::with_capacity(expected);
        let mut pending = std::mem::take(&mut self.pending);
        while output.len() < expected {
            let mut frames = if pending.is_empty() {
                inner.process_partial(None::<&[Vec<f32>]>, None)?
            } else {
                let input = [std::mem::take(&mut pending)];
                inner.process_partial(Some(&input[..]), None)?
            };
            if let Some(channel) = frames.pop() {
                output.extend_from_slice(trim_delay(&mut self.skip, &channel));
            }
        }

        output.truncate(expected);
        self.produced += output.len() as u64;
        Ok(output)
    }

    pub fn source_rate(&self) -> u32 {
        self.source_rate
    }

    pub fn target_rate(&self) -> u32 {
        self.target_rate
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
