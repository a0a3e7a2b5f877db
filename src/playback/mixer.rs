//! Sample-accurate software mixer behind the output device.
//!
//! The mixer owns the device clock: time is the number of frames rendered so
//! far divided by the device rate. A scheduled voice becomes audible on the
//! first frame at or after its start time and is dropped once its last sample
//! has been rendered. Overlapping voices are summed and clamped.

use super::scheduler::BufferHandle;

struct Voice {
    handle: BufferHandle,
    start_frame: u64,
    samples: Vec<f32>,
    cursor: usize,
}

impl Voice {
    fn finished(&self) -> bool {
        self.cursor >= self.samples.len()
    }
}

/// Mono voices mixed onto an interleaved output of any channel count.
pub struct Mixer {
    sample_rate: u32,
    frames_rendered: u64,
    voices: Vec<Voice>,
    next_handle: u64,
}

impl Mixer {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            frames_rendered: 0,
            voices: Vec::new(),
            next_handle: 0,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Device clock in seconds.
    pub fn current_time(&self) -> f64 {
        self.frames_rendered as f64 / self.sample_rate as f64
    }

    /// Add a voice that starts at `start_at` seconds. `samples` must already be
    /// at the mixer rate. Start times in the past play from the next frame.
    pub fn schedule(&mut self, samples: Vec<f32>, start_at: f64) -> BufferHandle {
        self.next_handle += 1;
        let handle = BufferHandle(self.next_handle);

        let requested = (start_at.max(0.0) * self.sample_rate as f64).round() as u64;
        self.voices.push(Voice {
            handle,
            start_frame: requested.max(self.frames_rendered),
            samples,
            cursor: 0,
        });
        handle
    }

    pub fn stop(&mut self, handle: BufferHandle) {
        self.voices.retain(|v| v.handle != handle);
    }

    pub fn stop_all(&mut self) {
        self.voices.clear();
    }

    pub fn is_active(&self, handle: BufferHandle) -> bool {
        self.voices.iter().any(|v| v.handle == handle && !v.finished())
    }

    /// `true` when nothing is queued or playing.
    pub fn is_idle(&self) -> bool {
        self.voices.iter().all(Voice::finished)
    }

    /// Fill `out` (interleaved, `channels` wide) and advance the clock.
    pub fn render(&mut self, out: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        let frames = out.len() / channels;

        for (i, frame) in out.chunks_exact_mut(channels).enumerate() {
            let now = self.frames_rendered + i as u64;
            let mut acc = 0.0_f32;
            for voice in &mut self.voices {
                if now >= voice.start_frame && !voice.finished() {
                    acc += voice.samples[voice.cursor];
                    voice.cursor += 1;
                }
            }
            frame.fill(acc.clamp(-1.0, 1.0));
        }
        // Trailing samples that do not make up a full frame.
        let tail = frames * channels;
        out[tail..].fill(0.0);

        self.frames_rendered += frames as u64;
        self.voices.retain(|v| !v.finished());
    }
}
