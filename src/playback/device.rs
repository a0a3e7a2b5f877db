//! Output device via `cpal`.
//!
//! [`OutputDevice::open`] builds a cpal output stream on its own thread (the
//! stream is not `Send`) whose callback renders a shared [`Mixer`]. The
//! returned [`MixerHandle`] is the [`PlaybackSink`] the rest of the crate
//! schedules onto; it is cheap to clone and safe to share between tasks.
//!
//! The device is opened at the preferred rate when any mono or stereo
//! configuration supports it, otherwise at the device default. Buffers at a
//! different rate are resampled on the way in.

use std::sync::{mpsc as std_mpsc, Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SampleRate, SizedSample};
use thiserror::Error;

use super::mixer::Mixer;
use super::scheduler::{BufferHandle, PlaybackBuffer, PlaybackSink};
use crate::audio::resample_linear;

/// Errors that can occur while opening the speaker.
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("no output device found on the default audio host")]
    NoDevice,

    #[error("failed to query output configs: {0}")]
    SupportedConfigs(#[from] cpal::SupportedStreamConfigsError),

    #[error("failed to query default output config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("unsupported output sample format: {0}")]
    UnsupportedFormat(String),

    #[error("failed to build output stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start output stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("playback thread failed: {0}")]
    Thread(String),
}

// ---------------------------------------------------------------------------
// MixerHandle
// ---------------------------------------------------------------------------

/// Shared handle to the mixer rendered by the output callback.
#[derive(Clone)]
pub struct MixerHandle {
    mixer: Arc<Mutex<Mixer>>,
}

impl MixerHandle {
    pub fn new(mixer: Mixer) -> Self {
        Self {
            mixer: Arc::new(Mutex::new(mixer)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Mixer> {
        self.mixer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// `true` when nothing is queued or playing.
    pub fn is_idle(&self) -> bool {
        self.lock().is_idle()
    }

    pub fn sample_rate(&self) -> u32 {
        self.lock().sample_rate()
    }

    /// Silence everything.
    pub fn stop_all(&self) {
        self.lock().stop_all();
    }

    fn render(&self, out: &mut [f32], channels: usize) {
        self.lock().render(out, channels);
    }
}

impl PlaybackSink for MixerHandle {
    fn current_time(&self) -> f64 {
        self.lock().current_time()
    }

    fn schedule(&self, buffer: PlaybackBuffer, start_at: f64) -> BufferHandle {
        let mut mixer = self.lock();
        let samples = if buffer.sample_rate() == mixer.sample_rate() {
            buffer.into_samples()
        } else {
            resample_linear(buffer.samples(), buffer.sample_rate(), mixer.sample_rate())
        };
        mixer.schedule(samples, start_at)
    }

    fn stop(&self, handle: BufferHandle) {
        self.lock().stop(handle);
    }

    fn is_active(&self, handle: BufferHandle) -> bool {
        self.lock().is_active(handle)
    }
}

// ---------------------------------------------------------------------------
// OutputDevice
// ---------------------------------------------------------------------------

/// Owner of the playback thread. Dropping it stops the stream.
pub struct OutputDevice {
    mixer: MixerHandle,
    stop: std_mpsc::Sender<()>,
    thread: Option<JoinHandle<()>>,
    channels: u16,
}

impl OutputDevice {
    /// Open the default output device, preferring `preferred_rate`.
    pub fn open(preferred_rate: u32) -> Result<Self, OutputError> {
        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<(MixerHandle, u16), OutputError>>();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();

        let thread = std::thread::Builder::new()
            .name("audio-playback".into())
            .spawn(move || {
                let (stream, mixer, channels) = match build_stream(preferred_rate) {
                    Ok(built) => built,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(e.into()));
                    return;
                }
                let _ = ready_tx.send(Ok((mixer, channels)));

                // Block until the owner says stop or goes away.
                let _ = stop_rx.recv();
                drop(stream);
                log::debug!("playback: stream released");
            })
            .map_err(|e| OutputError::Thread(e.to_string()))?;

        let (mixer, channels) = ready_rx
            .recv()
            .map_err(|_| OutputError::Thread("playback thread exited during setup".into()))??;

        log::info!(
            "playback: speaker opened ({} Hz, {channels} ch)",
            mixer.sample_rate()
        );

        Ok(Self {
            mixer,
            stop: stop_tx,
            thread: Some(thread),
            channels,
        })
    }

    /// The sink to schedule buffers on.
    pub fn mixer(&self) -> MixerHandle {
        self.mixer.clone()
    }

    pub fn sample_rate(&self) -> u32 {
        self.mixer.sample_rate()
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }
}

impl Drop for OutputDevice {
    fn drop(&mut self) {
        let _ = self.stop.send(());
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

// ---------------------------------------------------------------------------
// Stream construction (runs on the playback thread)
// ---------------------------------------------------------------------------

fn pick_config(
    device: &cpal::Device,
    preferred_rate: u32,
) -> Result<cpal::SupportedStreamConfig, OutputError> {
    let rate = SampleRate(preferred_rate);
    let supports = |c: &cpal::SupportedStreamConfigRange, channels: u16| {
        c.channels() == channels && c.min_sample_rate() <= rate && c.max_sample_rate() >= rate
    };

    for channels in [1u16, 2] {
        if let Some(range) = device
            .supported_output_configs()?
            .find(|c| supports(c, channels))
        {
            return Ok(range.with_sample_rate(rate));
        }
    }

    Ok(device.default_output_config()?)
}

fn build_stream(preferred_rate: u32) -> Result<(cpal::Stream, MixerHandle, u16), OutputError> {
    let host = cpal::default_host();
    let device = host.default_output_device().ok_or(OutputError::NoDevice)?;
    let supported = pick_config(&device, preferred_rate)?;

    let sample_format = supported.sample_format();
    let channels = supported.channels();
    let config: cpal::StreamConfig = supported.into();
    let mixer = MixerHandle::new(Mixer::new(config.sample_rate.0));

    log::debug!(
        "playback: device {:?} at {} Hz, {channels} ch, {sample_format:?}",
        device.name().unwrap_or_default(),
        config.sample_rate.0
    );

    let stream = match sample_format {
        cpal::SampleFormat::F32 => build_typed::<f32>(&device, &config, mixer.clone())?,
        cpal::SampleFormat::I16 => build_typed::<i16>(&device, &config, mixer.clone())?,
        cpal::SampleFormat::U16 => build_typed::<u16>(&device, &config, mixer.clone())?,
        other => return Err(OutputError::UnsupportedFormat(format!("{other:?}"))),
    };

    Ok((stream, mixer, channels))
}

fn build_typed<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mixer: MixerHandle,
) -> Result<cpal::Stream, OutputError>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;
    let mut scratch: Vec<f32> = Vec::new();

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            scratch.resize(data.len(), 0.0);
            mixer.render(&mut scratch, channels);
            for (out, &s) in data.iter_mut().zip(&scratch) {
                *out = T::from_sample(s);
            }
        },
        |err: cpal::StreamError| {
            log::error!("cpal output stream error: {err}");
        },
        None,
    )?;
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_resamples_to_the_mixer_rate() {
        let handle = MixerHandle::new(Mixer::new(48_000));
        let h = handle.schedule(PlaybackBuffer::new(vec![0.5; 240], 24_000), 0.0);
        assert!(handle.is_active(h));

        // 240 samples at 24 kHz last 10 ms, i.e. 480 frames at 48 kHz.
        let mut out = vec![0.0; 479];
        handle.render(&mut out, 1);
        assert!(handle.is_active(h));
        let mut out = vec![0.0; 1];
        handle.render(&mut out, 1);
        assert!(!handle.is_active(h));
        assert!(handle.is_idle());
    }

    #[test]
    fn handle_clock_follows_rendering() {
        let handle = MixerHandle::new(Mixer::new(24_000));
        let mut out = vec![0.0; 2 * 12_000];
        handle.render(&mut out, 2);
        assert!((handle.current_time() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn stop_all_clears_pending_voices() {
        let handle = MixerHandle::new(Mixer::new(24_000));
        handle.schedule(PlaybackBuffer::new(vec![0.5; 100], 24_000), 1.0);
        assert!(!handle.is_idle());
        handle.stop_all();
        assert!(handle.is_idle());
    }

    #[test]
    fn output_device_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<OutputDevice>();
        assert_send::<MixerHandle>();
    }
}
