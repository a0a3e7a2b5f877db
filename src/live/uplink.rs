//! Capture → wire conversion for the live session.
//!
//! ```text
//! AudioChunk (any rate, any channels)
//!   → to_mono → StreamResampler (→ 16 kHz) → BlockFramer (4096)
//!   → s * 32768 as i16, little-endian → base64 → realtimeInput message
//! ```
//!
//! The device callback only forwards raw chunks; all conversion happens here,
//! on the uplink task.

use std::sync::Arc;

use tokio::sync::mpsc;

use super::messages::ClientMessage;
use super::transport::LiveLink;
use crate::audio::resample::ResampleError;
use crate::audio::{encode_base64_pcm16, to_mono, AudioChunk, BlockFramer, StreamResampler};

/// Stateful converter from capture chunks to realtime-input messages.
pub struct Uplink {
    target_rate: u32,
    framer: BlockFramer,
    resampler: Option<StreamResampler>,
}

impl Uplink {
    /// Messages carry `block_size` samples at `target_rate`.
    pub fn new(target_rate: u32, block_size: usize) -> Self {
        Self {
            target_rate,
            framer: BlockFramer::new(block_size),
            resampler: None,
        }
    }

    /// Convert one capture chunk into zero or more full-block messages.
    pub fn process(&mut self, chunk: &AudioChunk) -> Result<Vec<ClientMessage>, ResampleError> {
        let mono = to_mono(&chunk.samples, chunk.channels);

        // Build the resampler on the first chunk; rebuild if the device rate
        // ever changes.
        let stale = self
            .resampler
            .as_ref()
            .map_or(true, |rs| rs.source_rate() != chunk.sample_rate);
        if stale {
            self.resampler = Some(StreamResampler::new(chunk.sample_rate, self.target_rate)?);
        }

        let samples = match self.resampler.as_mut() {
            Some(rs) => rs.process(&mono)?,
            None => mono,
        };

        Ok(self
            .framer
            .push(&samples)
            .iter()
            .map(|block| self.encode(block))
            .collect())
    }

    /// Flush everything still buffered. The last message may be short.
    pub fn finish(&mut self) -> Vec<ClientMessage> {
        let mut blocks = Vec::new();
        if let Some(rs) = self.resampler.as_mut() {
            match rs.flush() {
                Ok(tail) => blocks = self.framer.push(&tail),
                Err(e) => log::warn!("uplink: dropping resampler tail: {e}"),
            }
        }
        blocks.extend(self.framer.flush());
        blocks.iter().map(|block| self.encode(block)).collect()
    }

    fn encode(&self, block: &[f32]) -> ClientMessage {
        ClientMessage::audio(encode_base64_pcm16(block), self.target_rate)
    }

    /// Pump `chunks` into `link` until the capture channel closes or the link
    /// goes away. Returns the number of messages sent.
    pub async fn run(
        mut self,
        mut chunks: mpsc::UnboundedReceiver<AudioChunk>,
        link: Arc<dyn LiveLink>,
    ) -> usize {
        let mut sent = 0usize;

        while let Some(chunk) = chunks.recv().await {
            let messages = match self.process(&chunk) {
                Ok(messages) => messages,
                Err(e) => {
                    log::warn!("uplink: dropping {} samples: {e}", chunk.samples.len());
                    continue;
                }
            };
            for message in messages {
                if link.send(message).is_err() {
                    log::debug!("uplink: link closed after {sent} blocks");
                    return sent;
                }
                sent += 1;
            }
        }

        for message in self.finish() {
            if link.send(message).is_err() {
                break;
            }
            sent += 1;
        }

        log::debug!("uplink: capture ended after {sent} blocks");
        sent
    }
}
