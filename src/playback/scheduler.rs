//! Playback scheduler and the output sink seam.
//!
//! The scheduler holds the playback cursor for one session. Every buffer is
//! placed at `max(device_time, next_start_time)` and the cursor then advances
//! by exactly the buffer's duration, so buffers play back to back in the
//! order they were enqueued whatever the arrival timing was. When the device
//! clock has overtaken the cursor (a pause in arrivals) the next buffer
//! starts right away instead of at a stale timestamp.

use std::collections::HashSet;
use std::sync::Arc;

use crate::audio::{decode_base64_pcm16, DecodeError};

// ---------------------------------------------------------------------------
// PlaybackBuffer
// ---------------------------------------------------------------------------

/// Mono `f32` samples at a known rate, ready to be scheduled.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl PlaybackBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Decode a base64 16-bit PCM fragment at `sample_rate`.
    pub fn from_base64_pcm16(data: &str, sample_rate: u32) -> Result<Self, DecodeError> {
        Ok(Self::new(decode_base64_pcm16(data)?, sample_rate))
    }

    /// Playing time in seconds.
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }
}

// ---------------------------------------------------------------------------
// PlaybackSink
// ---------------------------------------------------------------------------

/// Identifies one scheduled buffer on a sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferHandle(pub u64);

/// An output device with a running clock and a buffer-scheduling primitive.
pub trait PlaybackSink: Send + Sync {
    /// Seconds of audio the device has rendered so far. Monotonic.
    fn current_time(&self) -> f64;

    /// Queue `buffer` to start at device time `start_at`. A start time in the
    /// past means "now".
    fn schedule(&self, buffer: PlaybackBuffer, start_at: f64) -> BufferHandle;

    /// Silence a scheduled or playing buffer. Unknown handles are ignored.
    fn stop(&self, handle: BufferHandle);

    /// `true` while the buffer is waiting to start or still playing.
    fn is_active(&self, handle: BufferHandle) -> bool;
}

// ---------------------------------------------------------------------------
// Scheduling rule
// ---------------------------------------------------------------------------

/// Where the next buffer goes: returns `(start, new_next_start_time)`.
///
/// ```rust
/// use guide_voice::playback::next_slot;
///
/// // Device ahead of the cursor: start now.
/// assert_eq!(next_slot(10.0, 9.5, 2.0), (10.0, 12.0));
/// // Cursor ahead of the device: queue behind the previous buffer.
/// assert_eq!(next_slot(5.0, 7.0, 1.0), (7.0, 8.0));
/// ```
pub fn next_slot(device_time: f64, next_start_time: f64, duration: f64) -> (f64, f64) {
    let start = device_time.max(next_start_time);
    (start, start + duration)
}

/// Outcome of scheduling one buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scheduled {
    pub handle: BufferHandle,
    pub start_at: f64,
    pub duration: f64,
}

// ---------------------------------------------------------------------------
// PlaybackScheduler
// ---------------------------------------------------------------------------

/// Per-session playback cursor plus the set of buffers still in flight.
pub struct PlaybackScheduler {
    sink: Arc<dyn PlaybackSink>,
    sample_rate: u32,
    next_start_time: f64,
    live: HashSet<BufferHandle>,
}

impl PlaybackScheduler {
    /// `sample_rate` is the rate inbound fragments are encoded at.
    pub fn new(sink: Arc<dyn PlaybackSink>, sample_rate: u32) -> Self {
        Self {
            sink,
            sample_rate,
            next_start_time: 0.0,
            live: HashSet::new(),
        }
    }

    /// Decode a base64 fragment and schedule it. A malformed fragment leaves
    /// the cursor untouched.
    pub fn enqueue_fragment(&mut self, data: &str) -> Result<Scheduled, DecodeError> {
        let buffer = PlaybackBuffer::from_base64_pcm16(data, self.sample_rate)?;
        Ok(self.enqueue(buffer))
    }

    /// Schedule a decoded buffer right after the previous one.
    pub fn enqueue(&mut self, buffer: PlaybackBuffer) -> Scheduled {
        let duration = buffer.duration();
        let (start_at, next) = next_slot(self.sink.current_time(), self.next_start_time, duration);

        let handle = self.sink.schedule(buffer, start_at);
        self.next_start_time = next;

        self.prune();
        self.live.insert(handle);

        log::trace!("playback: buffer {handle:?} at {start_at:.3}s for {duration:.3}s");

        Scheduled {
            handle,
            start_at,
            duration,
        }
    }

    /// Stop every buffer still in flight and rewind the cursor so the next
    /// buffer starts immediately. Returns how many buffers were stopped.
    pub fn stop_all(&mut self) -> usize {
        let stopped = self.live.len();
        for handle in self.live.drain() {
            self.sink.stop(handle);
        }
        self.next_start_time = 0.0;
        stopped
    }

    /// End time of the last scheduled buffer on the device clock.
    pub fn next_start_time(&self) -> f64 {
        self.next_start_time
    }

    /// Number of buffers that have not finished playing.
    pub fn live_buffers(&mut self) -> usize {
        self.prune();
        self.live.len()
    }

    fn prune(&mut self) {
        let sink = &self.sink;
        self.live.retain(|&h| sink.is_active(h));
    }
}

// ---------------------------------------------------------------------------
// One-shot playback
// ---------------------------------------------------------------------------

/// Decode a base64 16-bit PCM clip and start it immediately on `sink`.
///
/// Used for synthesized speech outside the live session.
pub fn play_clip(
    sink: &dyn PlaybackSink,
    data: &str,
    sample_rate: u32,
) -> Result<Scheduled, DecodeError> {
    let buffer = PlaybackBuffer::from_base64_pcm16(data, sample_rate)?;
    let duration = buffer.duration();
    let start_at = sink.current_time();
    let handle = sink.schedule(buffer, start_at);
    Ok(Scheduled {
        handle,
        start_at,
        duration,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::audio::encode_base64_pcm16;
    use std::sync::Mutex;

    /// Sink with a hand-driven clock that records every schedule call.
    #[derive(Default)]
    pub(crate) struct FakeSink {
        inner: Mutex<FakeSinkState>,
    }

    #[derive(Default)]
    struct FakeSinkState {
        now: f64,
        next_handle: u64,
        scheduled: Vec<(BufferHandle, f64, f64)>,
        stopped: Vec<BufferHandle>,
    }

    impl FakeSink {
        pub(crate) fn at(now: f64) -> Arc<Self> {
            let sink = Self::default();
            sink.set_time(now);
            Arc::new(sink)
        }

        pub(crate) fn set_time(&self, now: f64) {
            self.inner.lock().unwrap().now = now;
        }

        /// `(start, duration)` of every scheduled buffer, in call order.
        pub(crate) fn starts(&self) -> Vec<(f64, f64)> {
            self.inner
                .lock()
                .unwrap()
                .scheduled
                .iter()
                .map(|&(_, s, d)| (s, d))
                .collect()
        }

        pub(crate) fn stopped(&self) -> Vec<BufferHandle> {
            self.inner.lock().unwrap().stopped.clone()
        }
    }

    impl PlaybackSink for FakeSink {
        fn current_time(&self) -> f64 {
            self.inner.lock().unwrap().now
        }

        fn schedule(&self, buffer: PlaybackBuffer, start_at: f64) -> BufferHandle {
            let mut st = self.inner.lock().unwrap();
            st.next_handle += 1;
            let handle = BufferHandle(st.next_handle);
            st.scheduled.push((handle, start_at, buffer.duration()));
            handle
        }

        fn stop(&self, handle: BufferHandle) {
            self.inner.lock().unwrap().stopped.push(handle);
        }

        fn is_active(&self, handle: BufferHandle) -> bool {
            let st = self.inner.lock().unwrap();
            !st.stopped.contains(&handle)
                && st
                    .scheduled
                    .iter()
                    .any(|&(h, s, d)| h == handle && s + d > st.now)
        }
    }

    fn buffer_of(secs: f64, rate: u32) -> PlaybackBuffer {
        PlaybackBuffer::new(vec![0.0; (secs * rate as f64).round() as usize], rate)
    }

    #[test]
    fn device_ahead_of_cursor_starts_now() {
        let sink = FakeSink::at(10.0);
        let mut sched = PlaybackScheduler::new(sink.clone(), 24_000);
        sched.next_start_time = 9.5;

        let s = sched.enqueue(buffer_of(2.0, 24_000));

        assert_eq!(s.start_at, 10.0);
        assert_eq!(sched.next_start_time(), 12.0);
    }

    #[test]
    fn cursor_ahead_of_device_queues_without_gap() {
        let sink = FakeSink::at(5.0);
        let mut sched = PlaybackScheduler::new(sink.clone(), 24_000);
        sched.next_start_time = 7.0;

        let s = sched.enqueue(buffer_of(1.0, 24_000));

        assert_eq!(s.start_at, 7.0);
        assert_eq!(sched.next_start_time(), 8.0);
    }

    #[test]
    fn starts_follow_the_recurrence_and_never_overlap() {
        let sink = FakeSink::at(0.0);
        let mut sched = PlaybackScheduler::new(sink.clone(), 24_000);

        // (device time at arrival, fragment duration)
        let arrivals = [
            (0.0, 0.5),
            (0.1, 0.25),
            (0.2, 1.0),
            (2.5, 0.5), // underrun: device passed the cursor
            (2.6, 0.0), // empty fragment
            (2.7, 0.75),
            (2.7, 0.125),
        ];

        let mut prev_end: Option<f64> = None;
        for &(t, d) in &arrivals {
            sink.set_time(t);
            let s = sched.enqueue(buffer_of(d, 24_000));

            let expected = match prev_end {
                Some(end) => t.max(end),
                None => t,
            };
            assert!((s.start_at - expected).abs() < 1e-9, "start {} != {expected}", s.start_at);
            if let Some(end) = prev_end {
                assert!(s.start_at >= end - 1e-9, "overlap at {t}");
            }
            prev_end = Some(s.start_at + s.duration);
        }

        let starts = sink.starts();
        assert!(starts.windows(2).all(|w| w[1].0 >= w[0].0));
        // The underrun restarted at the device clock.
        assert_eq!(starts[3].0, 2.5);
    }

    #[test]
    fn empty_fragment_does_not_move_the_cursor() {
        let sink = FakeSink::at(1.0);
        let mut sched = PlaybackScheduler::new(sink.clone(), 24_000);
        sched.enqueue(buffer_of(0.5, 24_000));
        let before = sched.next_start_time();

        let s = sched.enqueue_fragment("").expect("empty fragment decodes");

        assert_eq!(s.duration, 0.0);
        assert_eq!(s.start_at, before);
        assert_eq!(sched.next_start_time(), before);

        let next = sched.enqueue(buffer_of(0.25, 24_000));
        assert_eq!(next.start_at, before);
    }

    #[test]
    fn fragment_duration_uses_the_inbound_rate() {
        let sink = FakeSink::at(0.0);
        let mut sched = PlaybackScheduler::new(sink.clone(), 24_000);

        let s = sched
            .enqueue_fragment(&encode_base64_pcm16(&vec![0.1; 12_000]))
            .expect("decode");

        assert!((s.duration - 0.5).abs() < 1e-12);
        assert!((sched.next_start_time() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn malformed_fragment_leaves_state_untouched() {
        let sink = FakeSink::at(3.0);
        let mut sched = PlaybackScheduler::new(sink.clone(), 24_000);
        sched.enqueue(buffer_of(1.0, 24_000));

        assert!(sched.enqueue_fragment("%%%").is_err());
        assert_eq!(sched.next_start_time(), 4.0);
        assert_eq!(sink.starts().len(), 1);
    }

    #[test]
    fn finished_buffers_leave_the_live_set() {
        let sink = FakeSink::at(0.0);
        let mut sched = PlaybackScheduler::new(sink.clone(), 24_000);
        sched.enqueue(buffer_of(1.0, 24_000));
        sched.enqueue(buffer_of(1.0, 24_000));
        assert_eq!(sched.live_buffers(), 2);

        sink.set_time(1.5);
        assert_eq!(sched.live_buffers(), 1);

        sink.set_time(2.5);
        assert_eq!(sched.live_buffers(), 0);
    }

    #[test]
    fn stop_all_silences_in_flight_buffers_and_rewinds() {
        let sink = FakeSink::at(0.0);
        let mut sched = PlaybackScheduler::new(sink.clone(), 24_000);
        let a = sched.enqueue(buffer_of(1.0, 24_000));
        let b = sched.enqueue(buffer_of(1.0, 24_000));

        assert_eq!(sched.stop_all(), 2);
        let mut stopped = sink.stopped();
        stopped.sort();
        assert_eq!(stopped, vec![a.handle, b.handle]);

        sink.set_time(0.2);
        let c = sched.enqueue(buffer_of(0.5, 24_000));
        assert_eq!(c.start_at, 0.2);
    }

    #[test]
    fn play_clip_starts_at_device_time() {
        let sink = FakeSink::at(4.25);
        let s = play_clip(sink.as_ref(), &encode_base64_pcm16(&[0.0; 2400]), 24_000)
            .expect("decode");
        assert_eq!(s.start_at, 4.25);
        assert!((s.duration - 0.1).abs() < 1e-12);
    }
}
