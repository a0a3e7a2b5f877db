//! Live session lifecycle.
//!
//! [`LiveController`] owns at most one [`LiveSession`] at a time. A session
//! holds everything that belongs to one connection: its state, the link, the
//! microphone and its tasks. Nothing about a session lives outside it, so a
//! new session always starts from a clean playback cursor.
//!
//! # Tasks
//!
//! ```text
//! cpal callback ──AudioChunk──▶ uplink task ──realtimeInput──▶ LiveLink
//!
//! transport ──LinkEvent──▶ dispatcher task ──▶ SessionState::apply
//!                                          └──▶ PlaybackScheduler ──▶ PlaybackSink
//! ```
//!
//! The dispatcher is the only consumer of link events and the only owner of
//! the session's [`PlaybackScheduler`], so fragments are decoded and
//! scheduled strictly in arrival order.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::error::LiveError;
use super::messages::{ServerMessage, Setup};
use super::state::{SessionEvent, SessionState};
use super::transport::{LinkEvent, LiveConnector, LiveLink};
use super::uplink::Uplink;
use crate::audio::{AudioChunk, CaptureError, CaptureStream, Microphone};
use crate::config::AppConfig;
use crate::playback::{PlaybackScheduler, PlaybackSink};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// LiveSession
// ---------------------------------------------------------------------------

/// One duplex connection. Shared between the controller and the session's
/// dispatcher task.
pub struct LiveSession {
    state: Mutex<SessionState>,
    link: Mutex<Option<Arc<dyn LiveLink>>>,
    capture: Mutex<Option<Box<dyn CaptureStream>>>,
    uplink: Mutex<Option<JoinHandle<usize>>>,
}

impl LiveSession {
    fn new() -> Self {
        Self {
            state: Mutex::new(SessionState::Idle),
            link: Mutex::new(None),
            capture: Mutex::new(None),
            uplink: Mutex::new(None),
        }
    }

    pub fn state(&self) -> SessionState {
        *lock(&self.state)
    }

    /// Apply one event to the state machine and return the new state.
    fn transition(&self, event: SessionEvent) -> SessionState {
        let mut state = lock(&self.state);
        let next = state.apply(event);
        if next != *state {
            log::info!("live: {} -> {next}", *state);
        }
        *state = next;
        next
    }

    /// Drop the capture stream, which stops the device and ends the uplink's
    /// chunk channel. Dropping joins the capture thread, so it runs on the
    /// blocking pool.
    async fn release_microphone(&self) {
        let capture = lock(&self.capture).take();
        let Some(capture) = capture else {
            return;
        };
        if let Err(e) = tokio::task::spawn_blocking(move || drop(capture)).await {
            log::warn!("live: releasing the microphone failed: {e}");
        }
        log::debug!("live: microphone released");
    }

    /// Start capture on the blocking pool; `resume` waits for the capture
    /// thread to answer.
    async fn resume_capture(&self) -> Result<(), CaptureError> {
        let capture = lock(&self.capture).take();
        let Some(capture) = capture else {
            return Ok(());
        };

        let (capture, result) = tokio::task::spawn_blocking(move || {
            let result = capture.resume();
            (capture, result)
        })
        .await
        .map_err(|e| CaptureError::Thread(e.to_string()))?;

        // stop() may have run while capture was starting. Checking under the
        // capture lock means either stop() sees the stream or we drop it.
        let orphan = {
            let mut slot = lock(&self.capture);
            if self.state().is_active() {
                *slot = Some(capture);
                None
            } else {
                Some(capture)
            }
        };
        if let Some(capture) = orphan {
            let _ = tokio::task::spawn_blocking(move || drop(capture)).await;
        }
        result
    }

    fn close_link(&self) {
        if let Some(link) = lock(&self.link).take() {
            link.close();
        }
    }
}

// ---------------------------------------------------------------------------
// LiveController
// ---------------------------------------------------------------------------

/// Starts and stops live sessions.
pub struct LiveController {
    connector: Arc<dyn LiveConnector>,
    microphone: Arc<dyn Microphone>,
    sink: Arc<dyn PlaybackSink>,
    setup: Setup,
    input_rate: u32,
    output_rate: u32,
    block_size: usize,
    current: Mutex<Option<Arc<LiveSession>>>,
}

impl LiveController {
    pub fn new(
        connector: Arc<dyn LiveConnector>,
        microphone: Arc<dyn Microphone>,
        sink: Arc<dyn PlaybackSink>,
        config: &AppConfig,
    ) -> Self {
        Self {
            connector,
            microphone,
            sink,
            setup: Setup::from_config(&config.live),
            input_rate: config.audio.input_sample_rate,
            output_rate: config.audio.output_sample_rate,
            block_size: config.audio.block_size,
            current: Mutex::new(None),
        }
    }

    /// State of the current session, `Idle` when none was ever started.
    pub fn state(&self) -> SessionState {
        lock(&self.current)
            .as_ref()
            .map_or(SessionState::Idle, |s| s.state())
    }

    /// The current session, if any.
    pub fn session(&self) -> Option<Arc<LiveSession>> {
        lock(&self.current).clone()
    }

    /// Open a live session.
    ///
    /// Checks entitlement, acquires the microphone, connects, then starts
    /// streaming. On failure nothing stays open: a refused microphone leaves
    /// the session `Idle`, a failed connect leaves it `Errored` with the
    /// microphone released.
    pub async fn start(&self, entitled: bool) -> Result<(), LiveError> {
        if !entitled {
            log::info!("live: not entitled, session not started");
            return Err(LiveError::NotEntitled);
        }
        if self.block_size == 0 {
            return Err(LiveError::InvalidAudio("block size must be greater than 0"));
        }
        if self.input_rate == 0 || self.output_rate == 0 {
            return Err(LiveError::InvalidAudio("sample rates must be greater than 0"));
        }

        let session = {
            let mut current = lock(&self.current);
            if current.as_ref().is_some_and(|s| s.state().is_active()) {
                return Err(LiveError::AlreadyActive);
            }
            let session = Arc::new(LiveSession::new());
            session.transition(SessionEvent::Start);
            *current = Some(Arc::clone(&session));
            session
        };

        // Microphone first: without it there is nothing to stream.
        let (chunk_tx, chunk_rx) = mpsc::unbounded_channel::<AudioChunk>();
        let capture = match self.microphone.open(chunk_tx) {
            Ok(capture) => capture,
            Err(e) => {
                log::warn!("live: microphone unavailable: {e}");
                session.transition(SessionEvent::MicrophoneDenied);
                return Err(LiveError::PermissionDenied(e));
            }
        };
        *lock(&session.capture) = Some(capture);

        let (event_tx, event_rx) = mpsc::unbounded_channel::<LinkEvent>();
        let link = match self.connector.connect(self.setup.clone(), event_tx).await {
            Ok(link) => link,
            Err(e) => {
                log::error!("live: {e}");
                session.release_microphone().await;
                session.transition(SessionEvent::Error);
                return Err(e);
            }
        };

        // Store the link before announcing Open so a concurrent stop() always
        // finds something to close. stop() may also have run while we were
        // connecting.
        *lock(&session.link) = Some(Arc::clone(&link));
        if session.transition(SessionEvent::Opened) != SessionState::Open {
            session.close_link();
            session.release_microphone().await;
            return Ok(());
        }

        let uplink = Uplink::new(self.input_rate, self.block_size);
        *lock(&session.uplink) = Some(tokio::spawn(uplink.run(chunk_rx, Arc::clone(&link))));

        let scheduler = PlaybackScheduler::new(Arc::clone(&self.sink), self.output_rate);
        tokio::spawn(dispatch(Arc::clone(&session), event_rx, scheduler));

        if let Err(e) = session.resume_capture().await {
            log::error!("live: capture failed to start: {e}");
            session.release_microphone().await;
            session.close_link();
            session.transition(SessionEvent::Error);
            return Err(LiveError::Capture(e));
        }

        Ok(())
    }

    /// Close the current session and release the microphone.
    ///
    /// Audio already scheduled keeps playing. Calling `stop` again, or with
    /// no session, does nothing.
    pub async fn stop(&self) {
        let Some(session) = self.session() else {
            return;
        };
        if !session.state().is_active() {
            return;
        }

        session.transition(SessionEvent::Closed);
        session.release_microphone().await;

        // Let the uplink flush its tail before the link goes.
        let uplink = lock(&session.uplink).take();
        if let Some(handle) = uplink {
            match handle.await {
                Ok(sent) => log::debug!("live: uplink sent {sent} blocks"),
                Err(e) => log::warn!("live: uplink task failed: {e}"),
            }
        }

        session.close_link();
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Single consumer of a session's link events.
async fn dispatch(
    session: Arc<LiveSession>,
    mut events: mpsc::UnboundedReceiver<LinkEvent>,
    mut scheduler: PlaybackScheduler,
) {
    while let Some(event) = events.recv().await {
        match event {
            LinkEvent::Opened => {
                session.transition(SessionEvent::Opened);
            }
            LinkEvent::Message(message) => handle_message(&message, &mut scheduler),
            LinkEvent::Malformed(e) => {
                log::warn!("live: ignoring unparseable server message: {e}");
            }
            LinkEvent::Closed(reason) => {
                log::info!(
                    "live: remote closed the session ({})",
                    reason.as_deref().unwrap_or("no reason")
                );
                session.transition(SessionEvent::Closed);
                session.release_microphone().await;
                session.close_link();
            }
            LinkEvent::Error(e) => {
                log::error!("live: transport error: {e}");
                session.transition(SessionEvent::Error);
                session.release_microphone().await;
                session.close_link();
            }
        }
    }
    log::debug!("live: dispatcher finished");
}

fn handle_message(message: &ServerMessage, scheduler: &mut PlaybackScheduler) {
    if message.is_interrupted() {
        let stopped = scheduler.stop_all();
        log::debug!("live: interrupted, stopped {stopped} buffers");
    }

    for fragment in message.audio_fragments() {
        if let Err(e) = scheduler.enqueue_fragment(fragment) {
            log::warn!("live: dropping audio fragment: {e}");
        }
    }

    for text in message.texts() {
        log::info!("live: model: {text}");
    }

    if message.is_turn_complete() {
        log::debug!("live: turn complete");
    }
    if let Some(go_away) = &message.go_away {
        log::warn!(
            "live: server going away (time left: {})",
            go_away.time_left.as_deref().unwrap_or("unknown")
        );
    }
    if message.tool_call.is_some() {
        log::debug!("live: ignoring tool call");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{OnceLock, Weak};
    use std::time::Duration;

    use async_trait::async_trait;
    use base64::prelude::*;

    use super::*;
    use crate::audio::{encode_base64_pcm16, CaptureError};
    use crate::live::messages::{ClientMessage, RealtimeInput};
    use crate::playback::scheduler::tests::FakeSink;

    // -----------------------------------------------------------------------
    // Test doubles
    // -----------------------------------------------------------------------

    /// Replays fixed chunks once resumed; records whether it was released.
    struct FakeMicrophone {
        deny: bool,
        chunks: Vec<AudioChunk>,
        opened: AtomicUsize,
        released: Arc<AtomicBool>,
    }

    impl FakeMicrophone {
        fn with_chunks(chunks: Vec<AudioChunk>) -> Arc<Self> {
            Arc::new(Self {
                deny: false,
                chunks,
                opened: AtomicUsize::new(0),
                released: Arc::new(AtomicBool::new(false)),
            })
        }

        fn denied() -> Arc<Self> {
            Arc::new(Self {
                deny: true,
                chunks: Vec::new(),
                opened: AtomicUsize::new(0),
                released: Arc::new(AtomicBool::new(false)),
            })
        }

        fn released(&self) -> bool {
            self.released.load(Ordering::SeqCst)
        }
    }

    impl Microphone for FakeMicrophone {
        fn open(
            &self,
            tx: mpsc::UnboundedSender<AudioChunk>,
        ) -> Result<Box<dyn CaptureStream>, CaptureError> {
            if self.deny {
                return Err(CaptureError::NoDevice);
            }
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeStream {
                tx: Mutex::new(Some(tx)),
                chunks: self.chunks.clone(),
                released: Arc::clone(&self.released),
            }))
        }
    }

    struct FakeStream {
        tx: Mutex<Option<mpsc::UnboundedSender<AudioChunk>>>,
        chunks: Vec<AudioChunk>,
        released: Arc<AtomicBool>,
    }

    impl CaptureStream for FakeStream {
        fn resume(&self) -> Result<(), CaptureError> {
            if let Some(tx) = lock(&self.tx).as_ref() {
                for chunk in &self.chunks {
                    let _ = tx.send(chunk.clone());
                }
            }
            Ok(())
        }
    }

    impl Drop for FakeStream {
        fn drop(&mut self) {
            self.released.store(true, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct FakeLink {
        sent: Mutex<Vec<ClientMessage>>,
        closed: AtomicBool,
    }

    impl FakeLink {
        fn sent(&self) -> Vec<ClientMessage> {
            lock(&self.sent).clone()
        }

        fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }
    }

    impl LiveLink for FakeLink {
        fn send(&self, message: ClientMessage) -> Result<(), LiveError> {
            if self.is_closed() {
                return Err(LiveError::LinkClosed);
            }
            lock(&self.sent).push(message);
            Ok(())
        }

        fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    /// Hands out one shared [`FakeLink`] and keeps the event sender so tests
    /// can play the server.
    #[derive(Default)]
    struct FakeConnector {
        fail: bool,
        link: Arc<FakeLink>,
        events: Mutex<Option<mpsc::UnboundedSender<LinkEvent>>>,
        setups: Mutex<Vec<Setup>>,
        /// When set, `connect` stops this controller just before it returns.
        stop_on_connect: OnceLock<Weak<LiveController>>,
    }

    impl FakeConnector {
        fn failing() -> Arc<Self> {
            Arc::new(Self {
                fail: true,
                ..Self::default()
            })
        }

        fn connects(&self) -> usize {
            lock(&self.setups).len()
        }

        fn push(&self, event: LinkEvent) {
            if let Some(tx) = lock(&self.events).as_ref() {
                tx.send(event).unwrap();
            }
        }
    }

    #[async_trait]
    impl LiveConnector for FakeConnector {
        async fn connect(
            &self,
            setup: Setup,
            events: mpsc::UnboundedSender<LinkEvent>,
        ) -> Result<Arc<dyn LiveLink>, LiveError> {
            lock(&self.setups).push(setup);
            if self.fail {
                return Err(LiveError::Connection("refused".into()));
            }
            events.send(LinkEvent::Opened).unwrap();
            *lock(&self.events) = Some(events);

            let controller = self.stop_on_connect.get().and_then(Weak::upgrade);
            if let Some(controller) = controller {
                controller.stop().await;
            }
            Ok(self.link.clone())
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn mono16k(samples: Vec<f32>) -> AudioChunk {
        AudioChunk {
            samples,
            sample_rate: 16_000,
            channels: 1,
        }
    }

    fn controller(
        connector: Arc<FakeConnector>,
        mic: Arc<FakeMicrophone>,
        sink: Arc<FakeSink>,
    ) -> LiveController {
        LiveController::new(connector, mic, sink, &AppConfig::default())
    }

    async fn eventually(what: &str, cond: impl Fn() -> bool) {
        for _ in 0..400 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("timed out waiting for {what}");
    }

    fn pcm_of(message: &ClientMessage) -> Vec<i16> {
        let ClientMessage::RealtimeInput(RealtimeInput { media_chunks }) = message else {
            panic!("expected realtime input, got {message:?}");
        };
        assert_eq!(media_chunks[0].mime_type, "audio/pcm;rate=16000");
        BASE64_STANDARD
            .decode(&media_chunks[0].data)
            .unwrap()
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect()
    }

    fn audio_event(samples: &[f32]) -> LinkEvent {
        let msg = ServerMessage::from_json(&format!(
            r#"{{"serverContent":{{"modelTurn":{{"parts":[
                {{"inlineData":{{"mimeType":"audio/pcm;rate=24000","data":"{}"}}}}
            ]}}}}}}"#,
            encode_base64_pcm16(samples)
        ))
        .unwrap();
        LinkEvent::Message(msg)
    }

    // -----------------------------------------------------------------------
    // Start
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn not_entitled_opens_nothing() {
        let connector = Arc::new(FakeConnector::default());
        let mic = FakeMicrophone::with_chunks(vec![]);
        let live = controller(connector.clone(), mic.clone(), FakeSink::at(0.0));

        assert!(matches!(live.start(false).await, Err(LiveError::NotEntitled)));
        assert_eq!(live.state(), SessionState::Idle);
        assert_eq!(mic.opened.load(Ordering::SeqCst), 0);
        assert_eq!(connector.connects(), 0);
    }

    #[tokio::test]
    async fn refused_microphone_sends_nothing_and_stays_idle() {
        let connector = Arc::new(FakeConnector::default());
        let live = controller(connector.clone(), FakeMicrophone::denied(), FakeSink::at(0.0));

        let result = live.start(true).await;

        assert!(matches!(result, Err(LiveError::PermissionDenied(_))));
        assert_eq!(live.state(), SessionState::Idle);
        assert_eq!(connector.connects(), 0);
        assert!(connector.link.sent().is_empty());
    }

    #[tokio::test]
    async fn failed_connect_is_errored_and_releases_the_microphone() {
        let mic = FakeMicrophone::with_chunks(vec![mono16k(vec![0.5; 4096])]);
        let connector = FakeConnector::failing();
        let live = controller(connector.clone(), mic.clone(), FakeSink::at(0.0));

        let result = live.start(true).await;

        assert!(matches!(result, Err(LiveError::Connection(_))));
        assert_eq!(live.state(), SessionState::Errored);
        assert!(mic.released());
        assert!(connector.link.sent().is_empty());
    }

    #[tokio::test]
    async fn setup_carries_model_voice_and_instruction() {
        let connector = Arc::new(FakeConnector::default());
        let live = controller(
            connector.clone(),
            FakeMicrophone::with_chunks(vec![]),
            FakeSink::at(0.0),
        );
        live.start(true).await.unwrap();

        let setup = lock(&connector.setups)[0].clone();
        let config = AppConfig::default();
        assert_eq!(setup.model, format!("models/{}", config.live.model));
        assert_eq!(setup.generation_config.response_modalities, vec!["AUDIO"]);
        let voice = &setup
            .generation_config
            .speech_config
            .as_ref()
            .unwrap()
            .voice_config
            .prebuilt_voice_config
            .voice_name;
        assert_eq!(voice, &config.live.voice);
        assert!(setup.system_instruction.is_some());
    }

    #[tokio::test]
    async fn second_start_while_open_is_rejected() {
        let connector = Arc::new(FakeConnector::default());
        let live = controller(
            connector.clone(),
            FakeMicrophone::with_chunks(vec![]),
            FakeSink::at(0.0),
        );

        live.start(true).await.unwrap();
        assert!(matches!(live.start(true).await, Err(LiveError::AlreadyActive)));
        assert_eq!(connector.connects(), 1);
        assert_eq!(live.state(), SessionState::Open);
    }

    #[tokio::test]
    async fn unusable_audio_settings_are_rejected_before_opening_anything() {
        let mut config = AppConfig::default();
        config.audio.block_size = 0;
        let connector = Arc::new(FakeConnector::default());
        let mic = FakeMicrophone::with_chunks(vec![]);
        let live = LiveController::new(connector.clone(), mic.clone(), FakeSink::at(0.0), &config);

        assert!(matches!(live.start(true).await, Err(LiveError::InvalidAudio(_))));
        assert_eq!(live.state(), SessionState::Idle);
        assert_eq!(mic.opened.load(Ordering::SeqCst), 0);
        assert_eq!(connector.connects(), 0);

        let mut config = AppConfig::default();
        config.audio.output_sample_rate = 0;
        let live = LiveController::new(connector.clone(), mic.clone(), FakeSink::at(0.0), &config);
        assert!(matches!(live.start(true).await, Err(LiveError::InvalidAudio(_))));
    }

    #[tokio::test]
    async fn stop_while_connecting_closes_the_new_link() {
        let connector = Arc::new(FakeConnector::default());
        let mic = FakeMicrophone::with_chunks(vec![mono16k(vec![0.5; 4096])]);
        let live = Arc::new(controller(connector.clone(), mic.clone(), FakeSink::at(0.0)));
        connector
            .stop_on_connect
            .set(Arc::downgrade(&live))
            .unwrap_or_else(|_| panic!("set once"));

        live.start(true).await.unwrap();

        assert_eq!(live.state(), SessionState::Closed);
        assert!(connector.link.is_closed());
        assert!(mic.released());
        assert!(connector.link.sent().is_empty());
        let session = live.session().unwrap();
        assert!(lock(&session.link).is_none());
        assert!(lock(&session.uplink).is_none());
    }

    // -----------------------------------------------------------------------
    // Uplink
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn sixteen_blocks_become_sixteen_ordered_messages() {
        let chunks: Vec<AudioChunk> = (0..16)
            .map(|i| {
                let mut samples = vec![0.5_f32; 4096];
                // Tag each block so ordering is visible on the wire.
                samples[0] = i as f32 / 32768.0;
                mono16k(samples)
            })
            .collect();
        let connector = Arc::new(FakeConnector::default());
        let live = controller(
            connector.clone(),
            FakeMicrophone::with_chunks(chunks),
            FakeSink::at(0.0),
        );

        live.start(true).await.unwrap();
        eventually("16 messages", || connector.link.sent().len() == 16).await;

        let sent = connector.link.sent();
        for (i, message) in sent.iter().enumerate() {
            let pcm = pcm_of(message);
            assert_eq!(pcm.len(), 4096);
            assert_eq!(pcm[0], i as i16);
            assert!(pcm[1..].iter().all(|&s| s == 16_384));
        }
    }

    #[tokio::test]
    async fn stop_flushes_the_tail_and_is_idempotent() {
        let mic = FakeMicrophone::with_chunks(vec![mono16k(vec![0.25; 4096 + 100])]);
        let connector = Arc::new(FakeConnector::default());
        let live = controller(connector.clone(), mic.clone(), FakeSink::at(0.0));

        live.start(true).await.unwrap();
        eventually("first block", || connector.link.sent().len() == 1).await;

        live.stop().await;
        assert_eq!(live.state(), SessionState::Closed);
        assert!(mic.released());
        assert!(connector.link.is_closed());

        let sent = connector.link.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(pcm_of(&sent[1]).len(), 100);

        live.stop().await;
        assert_eq!(live.state(), SessionState::Closed);
        assert_eq!(connector.link.sent().len(), 2);
    }

    #[tokio::test]
    async fn stop_without_a_session_is_a_no_op() {
        let live = controller(
            Arc::new(FakeConnector::default()),
            FakeMicrophone::with_chunks(vec![]),
            FakeSink::at(0.0),
        );
        live.stop().await;
        assert_eq!(live.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn restart_after_stop_opens_a_fresh_session() {
        let connector = Arc::new(FakeConnector::default());
        let live = controller(
            connector.clone(),
            FakeMicrophone::with_chunks(vec![]),
            FakeSink::at(0.0),
        );

        live.start(true).await.unwrap();
        let first = live.session().unwrap();
        live.stop().await;

        // The shared fake link stays closed; a fresh link is not needed to
        // observe the new session.
        live.start(true).await.unwrap();
        let second = live.session().unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(first.state(), SessionState::Closed);
        assert_eq!(second.state(), SessionState::Open);
        assert_eq!(connector.connects(), 2);
    }

    // -----------------------------------------------------------------------
    // Downlink
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn inbound_fragments_play_back_to_back() {
        let sink = FakeSink::at(1.0);
        let connector = Arc::new(FakeConnector::default());
        let live = controller(
            connector.clone(),
            FakeMicrophone::with_chunks(vec![]),
            sink.clone(),
        );
        live.start(true).await.unwrap();

        connector.push(audio_event(&vec![0.1; 12_000])); // 0.5 s at 24 kHz
        connector.push(audio_event(&vec![0.1; 2_400])); // 0.1 s
        eventually("two buffers", || sink.starts().len() == 2).await;

        let starts = sink.starts();
        assert_eq!(starts[0].0, 1.0);
        assert!((starts[0].1 - 0.5).abs() < 1e-12);
        assert!((starts[1].0 - 1.5).abs() < 1e-12);
    }

    #[tokio::test]
    async fn bad_fragment_is_dropped_and_the_session_continues() {
        let sink = FakeSink::at(0.0);
        let connector = Arc::new(FakeConnector::default());
        let live = controller(
            connector.clone(),
            FakeMicrophone::with_chunks(vec![]),
            sink.clone(),
        );
        live.start(true).await.unwrap();

        let odd = BASE64_STANDARD.encode([1u8, 2, 3]);
        connector.push(LinkEvent::Message(
            ServerMessage::from_json(&format!(
                r#"{{"serverContent":{{"modelTurn":{{"parts":[{{"inlineData":{{"mimeType":"audio/pcm","data":"{odd}"}}}}]}}}}}}"#
            ))
            .unwrap(),
        ));
        connector.push(LinkEvent::Malformed("expected value".into()));
        connector.push(audio_event(&[0.2; 240]));
        eventually("good fragment", || sink.starts().len() == 1).await;

        assert_eq!(live.state(), SessionState::Open);
        assert_eq!(sink.starts()[0].0, 0.0);
    }

    #[tokio::test]
    async fn interruption_stops_queued_playback() {
        let sink = FakeSink::at(0.0);
        let connector = Arc::new(FakeConnector::default());
        let live = controller(
            connector.clone(),
            FakeMicrophone::with_chunks(vec![]),
            sink.clone(),
        );
        live.start(true).await.unwrap();

        connector.push(audio_event(&vec![0.1; 24_000]));
        connector.push(LinkEvent::Message(
            ServerMessage::from_json(r#"{"serverContent":{"interrupted":true}}"#).unwrap(),
        ));
        eventually("stop", || sink.stopped().len() == 1).await;
        assert_eq!(live.state(), SessionState::Open);
    }

    // -----------------------------------------------------------------------
    // Remote end
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn remote_close_is_closed_not_an_error() {
        let mic = FakeMicrophone::with_chunks(vec![]);
        let connector = Arc::new(FakeConnector::default());
        let live = controller(connector.clone(), mic.clone(), FakeSink::at(0.0));
        live.start(true).await.unwrap();

        connector.push(LinkEvent::Closed(Some("bye".into())));
        eventually("closed", || live.state() == SessionState::Closed).await;
        assert!(mic.released());

        // A later error does not change a finished session.
        connector.push(LinkEvent::Error("late".into()));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(live.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn transport_error_is_errored() {
        let mic = FakeMicrophone::with_chunks(vec![]);
        let connector = Arc::new(FakeConnector::default());
        let live = controller(connector.clone(), mic.clone(), FakeSink::at(0.0));
        live.start(true).await.unwrap();

        connector.push(LinkEvent::Error("connection reset".into()));
        eventually("errored", || live.state() == SessionState::Errored).await;
        assert!(mic.released());
        assert!(connector.link.is_closed());
    }

    #[tokio::test]
    async fn playback_already_scheduled_survives_stop() {
        let sink = FakeSink::at(0.0);
        let connector = Arc::new(FakeConnector::default());
        let live = controller(
            connector.clone(),
            FakeMicrophone::with_chunks(vec![]),
            sink.clone(),
        );
        live.start(true).await.unwrap();

        connector.push(audio_event(&vec![0.1; 24_000]));
        eventually("scheduled", || sink.starts().len() == 1).await;

        live.stop().await;
        assert!(sink.stopped().is_empty());
    }
}
