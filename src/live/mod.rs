//! Real-time duplex voice session with the Gemini Live API.
//!
//! * [`LiveController`]: entitlement gate, start / stop, observable state.
//! * [`SessionState`]: `Idle → Connecting → Open → Closed / Errored`.
//! * [`Uplink`]: capture chunks → 16 kHz 16-bit PCM realtime-input messages.
//! * [`LiveConnector`] / [`LiveLink`]: transport seam; [`GeminiLiveConnector`]
//!   is the WebSocket implementation.
//! * [`messages`]: setup, realtime input and server message bodies.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use guide_voice::audio::AudioCapture;
//! use guide_voice::config::AppConfig;
//! use guide_voice::live::{GeminiLiveConnector, LiveController};
//! use guide_voice::playback::OutputDevice;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AppConfig::load()?;
//!     let speaker = OutputDevice::open(config.audio.output_sample_rate)?;
//!     let connector = GeminiLiveConnector::from_config(&config.live, &config.gemini)?;
//!
//!     let live = LiveController::new(
//!         Arc::new(connector),
//!         Arc::new(AudioCapture::default()),
//!         Arc::new(speaker.mixer()),
//!         &config,
//!     );
//!     live.start(config.settings.is_premium).await?;
//!     tokio::signal::ctrl_c().await?;
//!     live.stop().await;
//!     Ok(())
//! }
//! ```

mod error;
pub mod messages;
pub mod session;
pub mod state;
pub mod transport;
pub mod uplink;

pub use error::LiveError;
pub use messages::{ClientMessage, ServerMessage, Setup};
pub use session::{LiveController, LiveSession};
pub use state::{SessionEvent, SessionState};
pub use transport::{GeminiLiveConnector, LinkEvent, LiveConnector, LiveLink};
pub use uplink::Uplink;
