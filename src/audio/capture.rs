//! Microphone capture via `cpal`.
//!
//! [`AudioCapture`] implements [`Microphone`]: [`Microphone::open`] acquires
//! the input device and builds the cpal stream on a dedicated thread, then
//! hands back a [`CaptureHandle`]. Nothing is delivered until
//! [`CaptureStream::resume`] is called; from then on every hardware buffer is
//! forwarded as an [`AudioChunk`] over an unbounded tokio channel. Dropping
//! the handle stops and releases the device.
//!
//! `cpal::Stream` is not `Send` on every platform, so the stream never leaves
//! the thread that built it; the handle only talks to that thread through a
//! control channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc as std_mpsc, Arc};
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample};
use thiserror::Error;
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// AudioChunk
// ---------------------------------------------------------------------------

/// A single buffer of raw audio as delivered by the cpal callback.
///
/// Samples are interleaved `f32`, nominally in `[-1.0, 1.0]`.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Interleaved PCM samples.
    pub samples: Vec<f32>,
    /// Sample rate of this chunk in Hz (e.g. 44100, 48000, 16000).
    pub sample_rate: u32,
    /// Number of interleaved channels (1 = mono, 2 = stereo, …).
    pub channels: u16,
}

// ---------------------------------------------------------------------------
// CaptureError
// ---------------------------------------------------------------------------

/// Errors that can occur while acquiring or running the microphone.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no input device found on the default audio host")]
    NoDevice,

    #[error("input device `{0}` not found")]
    DeviceNotFound(String),

    #[error("failed to enumerate input devices: {0}")]
    Devices(#[from] cpal::DevicesError),

    #[error("failed to query default input config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("unsupported input sample format: {0}")]
    UnsupportedFormat(String),

    #[error("failed to build input stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("capture thread failed: {0}")]
    Thread(String),
}

// ---------------------------------------------------------------------------
// Seams
// ---------------------------------------------------------------------------

/// An opened, not-yet-delivering capture stream. Dropping it releases the
/// device.
pub trait CaptureStream: Send {
    /// Start delivering chunks to the channel given to [`Microphone::open`].
    fn resume(&self) -> Result<(), CaptureError>;
}

/// Source of microphone audio.
///
/// `open` is where access is requested; a refusal (no device, permission
/// denied by the OS, unusable configuration) surfaces as a [`CaptureError`].
pub trait Microphone: Send + Sync {
    fn open(&self, tx: mpsc::UnboundedSender<AudioChunk>)
        -> Result<Box<dyn CaptureStream>, CaptureError>;
}

// ---------------------------------------------------------------------------
// AudioCapture
// ---------------------------------------------------------------------------

/// Microphone backed by a cpal input device.
#[derive(Debug, Clone, Default)]
pub struct AudioCapture {
    /// Input device name; `None` selects the host default.
    device_name: Option<String>,
}

impl AudioCapture {
    /// Capture from the named input device instead of the default one.
    pub fn with_device(name: impl Into<String>) -> Self {
        Self {
            device_name: Some(name.into()),
        }
    }
}

impl Microphone for AudioCapture {
    fn open(
        &self,
        tx: mpsc::UnboundedSender<AudioChunk>,
    ) -> Result<Box<dyn CaptureStream>, CaptureError> {
        let handle = CaptureHandle::spawn(self.device_name.clone(), tx)?;
        Ok(Box::new(handle))
    }
}

// ---------------------------------------------------------------------------
// CaptureHandle
// ---------------------------------------------------------------------------

enum Control {
    Resume(std_mpsc::Sender<Result<(), CaptureError>>),
    Stop,
}

/// Owner of the capture thread. Dropping it stops the stream and joins the
/// thread.
pub struct CaptureHandle {
    control: std_mpsc::Sender<Control>,
    thread: Option<JoinHandle<()>>,
    sample_rate: u32,
    channels: u16,
}

impl CaptureHandle {
    fn spawn(
        device_name: Option<String>,
        tx: mpsc::UnboundedSender<AudioChunk>,
    ) -> Result<Self, CaptureError> {
        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<(u32, u16), CaptureError>>();
        let (control_tx, control_rx) = std_mpsc::channel::<Control>();

        let thread = std::thread::Builder::new()
            .name("audio-capture".into())
            .spawn(move || {
                let delivering = Arc::new(AtomicBool::new(false));
                let (stream, sample_rate, channels) =
                    match build_stream(device_name.as_deref(), tx, Arc::clone(&delivering)) {
                        Ok(built) => built,
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                            return;
                        }
                    };
                let _ = ready_tx.send(Ok((sample_rate, channels)));

                while let Ok(cmd) = control_rx.recv() {
                    match cmd {
                        Control::Resume(reply) => {
                            let result = stream.play().map_err(CaptureError::from);
                            if result.is_ok() {
                                delivering.store(true, Ordering::Release);
                            }
                            let _ = reply.send(result);
                        }
                        Control::Stop => break,
                    }
                }

                delivering.store(false, Ordering::Release);
                drop(stream);
                log::debug!("capture: stream released");
            })
            .map_err(|e| CaptureError::Thread(e.to_string()))?;

        let (sample_rate, channels) = ready_rx
            .recv()
            .map_err(|_| CaptureError::Thread("capture thread exited during setup".into()))??;

        log::info!("capture: microphone opened ({sample_rate} Hz, {channels} ch)");

        Ok(Self {
            control: control_tx,
            thread: Some(thread),
            sample_rate,
            channels,
        })
    }

    /// Native sample rate of the capture stream in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of interleaved channels in each [`AudioChunk`].
    pub fn channels(&self) -> u16 {
        self.channels
    }
}

impl CaptureStream for CaptureHandle {
    fn resume(&self) -> Result<(), CaptureError> {
        let (reply_tx, reply_rx) = std_mpsc::channel();
        self.control
            .send(Control::Resume(reply_tx))
            .map_err(|_| CaptureError::Thread("capture thread is gone".into()))?;
        reply_rx
            .recv()
            .map_err(|_| CaptureError::Thread("capture thread is gone".into()))?
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        let _ = self.control.send(Control::Stop);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

// ---------------------------------------------------------------------------
// Stream construction (runs on the capture thread)
// ---------------------------------------------------------------------------

fn find_device(name: Option<&str>) -> Result<cpal::Device, CaptureError> {
    let host = cpal::default_host();
    match name {
        None => host.default_input_device().ok_or(CaptureError::NoDevice),
        Some(wanted) => host
            .input_devices()?
            .find(|d| d.name().map(|n| n == wanted).unwrap_or(false))
            .ok_or_else(|| CaptureError::DeviceNotFound(wanted.to_string())),
    }
}

fn build_stream(
    device_name: Option<&str>,
    tx: mpsc::UnboundedSender<AudioChunk>,
    delivering: Arc<AtomicBool>,
) -> Result<(cpal::Stream, u32, u16), CaptureError> {
    let device = find_device(device_name)?;
    let supported = device.default_input_config()?;

    let sample_format = supported.sample_format();
    let channels = supported.channels();
    let sample_rate = supported.sample_rate().0;
    let config: cpal::StreamConfig = supported.into();

    let stream = match sample_format {
        cpal::SampleFormat::F32 => {
            build_typed::<f32>(&device, &config, tx, delivering, sample_rate, channels)?
        }
        cpal::SampleFormat::I16 => {
            build_typed::<i16>(&device, &config, tx, delivering, sample_rate, channels)?
        }
        cpal::SampleFormat::U16 => {
            build_typed::<u16>(&device, &config, tx, delivering, sample_rate, channels)?
        }
        other => return Err(CaptureError::UnsupportedFormat(format!("{other:?}"))),
    };

    // Some hosts start streams as soon as they are built.
    let _ = stream.pause();

    Ok((stream, sample_rate, channels))
}

fn build_typed<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    tx: mpsc::UnboundedSender<AudioChunk>,
    delivering: Arc<AtomicBool>,
    sample_rate: u32,
    channels: u16,
) -> Result<cpal::Stream, CaptureError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let stream = device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            if !delivering.load(Ordering::Acquire) {
                return;
            }
            let chunk = AudioChunk {
                samples: data.iter().map(|&s| f32::from_sample(s)).collect(),
                sample_rate,
                channels,
            };
            // Ignore send errors; the uplink may already be gone.
            let _ = tx.send(chunk);
        },
        |err: cpal::StreamError| {
            log::error!("cpal input stream error: {err}");
        },
        None,
    )?;
    Ok(stream)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
