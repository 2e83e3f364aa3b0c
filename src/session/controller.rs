//! Live session controller
//!
//! The orchestrating state machine for one duplex session. `start` opens the
//! connection with the chosen persona and spawns the routing task; capture
//! paths feed the outbound queue; inbound events flow into the transcript
//! accumulator and the playback scheduler; everything observable surfaces
//! through the [`EventSink`].
//!
//! # Readiness
//!
//! The outbound queue exists before the connection does. Frames produced
//! while Connecting are held in order and flushed once the endpoint
//! acknowledges setup, so early capture blocks are delayed, never dropped or
//! reordered. The vision timer's first tick is likewise gated on readiness.
//!
//! # Teardown
//!
//! `close` is safe in every state, including before the connection is
//! ready: the intent is recorded and honored as soon as the task observes
//! it. `close` resolves only after the connection task has fully wound
//! down, so callers can reconnect immediately without racing the old
//! session.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{client::IntoClientRequest, Message},
    MaybeTlsStream, WebSocketStream,
};
use tokio_util::sync::CancellationToken;

use super::events::{EventSink, SessionEvent};
use super::protocol::{
    ClientMessage, ServerMessage, LIVE_API_URL, OUTPUT_CHANNELS, OUTPUT_SAMPLE_RATE,
};
use super::LiveError;
use crate::capture::{CaptureError, FrameSource, MicrophoneCapture, VisionCapture};
use crate::codec::{decode_audio_frame, decode_base64};
use crate::persona::PersonaConfig;
use crate::playback::{OutputSink, PlaybackScheduler};
use crate::transcript::TranscriptAccumulator;

/// Connection timeout for the WebSocket handshake
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout waiting for the endpoint to acknowledge the setup frame
const SETUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Outbound frame queue depth; capture paths drop frames when it is full
const OUTBOUND_QUEUE: usize = 64;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type BoxedSink = Box<dyn OutputSink + Send>;

/// Lifecycle states of a controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Open,
    Closed,
}

enum ControlRequest {
    StopPlayback,
}

/// Controller for one live duplex session
pub struct LiveSessionController {
    persona: PersonaConfig,
    endpoint: String,
    events: Arc<dyn EventSink>,
    state: Arc<Mutex<SessionState>>,
    outbound_tx: mpsc::Sender<ClientMessage>,
    outbound_rx: Option<mpsc::Receiver<ClientMessage>>,
    control_tx: mpsc::UnboundedSender<ControlRequest>,
    control_rx: Option<mpsc::UnboundedReceiver<ControlRequest>>,
    ready_tx: Option<watch::Sender<bool>>,
    ready_rx: watch::Receiver<bool>,
    scheduler: Option<PlaybackScheduler<BoxedSink>>,
    cancel: CancellationToken,
    task: Option<tokio::task::JoinHandle<()>>,
    microphone: Arc<Mutex<Option<MicrophoneCapture>>>,
    vision: Option<VisionCapture>,
}

impl LiveSessionController {
    /// Create a controller for one session with the given persona
    ///
    /// `sink` renders scheduled model audio; `events` receives every
    /// session notification. Nothing connects until [`start`].
    ///
    /// [`start`]: LiveSessionController::start
    pub fn new(
        persona: PersonaConfig,
        sink: impl OutputSink + Send + 'static,
        events: Arc<dyn EventSink>,
    ) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE);
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = watch::channel(false);

        Self {
            persona,
            endpoint: LIVE_API_URL.to_string(),
            events,
            state: Arc::new(Mutex::new(SessionState::Idle)),
            outbound_tx,
            outbound_rx: Some(outbound_rx),
            control_tx,
            control_rx: Some(control_rx),
            ready_tx: Some(ready_tx),
            ready_rx,
            scheduler: Some(PlaybackScheduler::new(
                Box::new(sink) as BoxedSink
            )),
            cancel: CancellationToken::new(),
            task: None,
            microphone: Arc::new(Mutex::new(None)),
            vision: None,
        }
    }

    /// Override the live endpoint URL (self-hosted proxies, tests)
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap()
    }

    /// Open the connection and begin routing
    ///
    /// Returns immediately; connection progress surfaces as events
    /// (`Opened` on success, `Error` then `Closed` on failure). Must be
    /// called from within a tokio runtime.
    pub fn start(&mut self, api_key: &str) -> Result<(), LiveError> {
        if api_key.is_empty() {
            return Err(LiveError::MissingApiKey);
        }

        {
            let mut state = self.state.lock().unwrap();
            match *state {
                SessionState::Idle => *state = SessionState::Connecting,
                SessionState::Closed => return Err(LiveError::Closed),
                _ => return Err(LiveError::AlreadyStarted),
            }
        }

        let (Some(outbound_rx), Some(control_rx), Some(scheduler), Some(ready_tx)) = (
            self.outbound_rx.take(),
            self.control_rx.take(),
            self.scheduler.take(),
            self.ready_tx.take(),
        ) else {
            return Err(LiveError::AlreadyStarted);
        };

        let task = SessionTask {
            url: format!("{}?key={}", self.endpoint, api_key),
            setup: ClientMessage::setup(&self.persona),
            outbound_rx,
            control_rx,
            scheduler,
            events: self.events.clone(),
            state: self.state.clone(),
            cancel: self.cancel.clone(),
            ready_tx,
            microphone: self.microphone.clone(),
        };

        log::info!("Starting live session (voice {})", self.persona.voice.name());
        self.task = Some(tokio::spawn(task.run()));
        Ok(())
    }

    /// Start streaming the microphone into the session
    ///
    /// Device and permission failures surface here synchronously; the
    /// session state is unaffected by a failed acquisition. Acquiring while
    /// already capturing is rejected, never double-acquired.
    pub fn start_microphone(&self, device_name: Option<&str>) -> Result<(), LiveError> {
        if self.state() == SessionState::Closed {
            return Err(LiveError::Closed);
        }

        let mut slot = self.microphone.lock().unwrap();
        if slot.is_some() {
            return Err(CaptureError::AlreadyRunning.into());
        }

        *slot = Some(MicrophoneCapture::start(
            device_name,
            self.outbound_tx.clone(),
        )?);
        Ok(())
    }

    /// Stop the microphone and release the device. No-op when idle.
    pub fn stop_microphone(&self) {
        if let Some(mic) = self.microphone.lock().unwrap().take() {
            mic.stop();
        }
    }

    /// Begin sampling screen frames from `source`
    ///
    /// The first frame goes out only once the connection is ready; toggling
    /// vision on before `Opened` is the expected call order. Starting while
    /// already sampling is a no-op.
    pub fn start_vision(&mut self, source: Arc<dyn FrameSource>) -> Result<(), LiveError> {
        if self.state() == SessionState::Closed {
            return Err(LiveError::Closed);
        }

        if self.vision.as_ref().is_some_and(|v| v.is_running()) {
            return Ok(());
        }

        self.vision = Some(VisionCapture::start(
            source,
            self.outbound_tx.clone(),
            self.ready_rx.clone(),
        ));
        Ok(())
    }

    /// Stop sampling screen frames. No-op when idle.
    pub fn stop_vision(&mut self) {
        if let Some(vision) = self.vision.as_mut() {
            vision.stop();
        }
        self.vision = None;
    }

    /// Halt all in-flight model audio (barge-in)
    ///
    /// Safe to call at any point in the session's life.
    pub fn stop_playback(&self) {
        let _ = self.control_tx.send(ControlRequest::StopPlayback);
    }

    /// Queue a media frame from a custom upstream source
    ///
    /// Frames queued before the connection is ready are held in order and
    /// flushed on readiness. Fire-and-forget: when the queue is full the
    /// frame is dropped with a warning.
    pub fn send_media(&self, message: ClientMessage) {
        if self.outbound_tx.try_send(message).is_err() {
            log::warn!("Session outbound queue full, dropping frame");
        }
    }

    /// Close the session
    ///
    /// Releases the capture devices, shuts the connection down and waits
    /// for the routing task to finish. Terminal: the controller accepts no
    /// further operations. Safe to call before the connection is ready and
    /// safe to call twice.
    pub async fn close(&mut self) {
        // Capture paths are released even when the session already died on
        // its own; the state check below only guards the notification.
        self.stop_vision();
        self.stop_microphone();

        let previous = {
            let mut state = self.state.lock().unwrap();
            let previous = *state;
            *state = SessionState::Closed;
            previous
        };
        if previous == SessionState::Closed {
            return;
        }

        self.cancel.cancel();

        if let Some(task) = self.task.take() {
            let _ = task.await;
        } else {
            // Never started; nothing is winding down but the consumer still
            // observes the terminal notification.
            self.events.emit(SessionEvent::Closed);
        }
        log::info!("Live session closed");
    }
}

impl Drop for LiveSessionController {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Everything the routing task owns for the session's lifetime
struct SessionTask {
    url: String,
    setup: ClientMessage,
    outbound_rx: mpsc::Receiver<ClientMessage>,
    control_rx: mpsc::UnboundedReceiver<ControlRequest>,
    scheduler: PlaybackScheduler<BoxedSink>,
    events: Arc<dyn EventSink>,
    state: Arc<Mutex<SessionState>>,
    cancel: CancellationToken,
    ready_tx: watch::Sender<bool>,
    microphone: Arc<Mutex<Option<MicrophoneCapture>>>,
}

impl SessionTask {
    async fn run(self) {
        let SessionTask {
            url,
            setup,
            mut outbound_rx,
            mut control_rx,
            mut scheduler,
            events,
            state,
            cancel,
            ready_tx,
            microphone,
        } = self;

        let result = drive(
            &url,
            &setup,
            &mut outbound_rx,
            &mut control_rx,
            &mut scheduler,
            &events,
            &state,
            &cancel,
            &ready_tx,
        )
        .await;

        // Unified teardown for clean close, server close and faults.
        scheduler.stop_all();
        if let Some(mic) = microphone.lock().unwrap().take() {
            mic.stop();
        }
        *state.lock().unwrap() = SessionState::Closed;

        if let Err(message) = result {
            log::warn!("Live session failed: {}", message);
            events.emit(SessionEvent::Error(message));
        }
        events.emit(SessionEvent::Closed);
    }
}

#[allow(clippy::too_many_arguments)]
async fn drive(
    url: &str,
    setup: &ClientMessage,
    outbound_rx: &mut mpsc::Receiver<ClientMessage>,
    control_rx: &mut mpsc::UnboundedReceiver<ControlRequest>,
    scheduler: &mut PlaybackScheduler<BoxedSink>,
    events: &Arc<dyn EventSink>,
    state: &Arc<Mutex<SessionState>>,
    cancel: &CancellationToken,
    ready_tx: &watch::Sender<bool>,
) -> Result<(), String> {
    let request = url
        .into_client_request()
        .map_err(|e| format!("Bad endpoint: {}", e))?;

    // Connect, honoring a close issued before the handshake resolves.
    let ws: WsStream = tokio::select! {
        _ = cancel.cancelled() => return Ok(()),
        connected = timeout(CONNECTION_TIMEOUT, connect_async(request)) => {
            let (ws, _response) = connected
                .map_err(|_| "Connection timeout".to_string())?
                .map_err(|e| format!("Connection failed: {}", e))?;
            ws
        }
    };

    log::info!("WebSocket connected, sending setup...");
    let (mut ws_tx, mut ws_rx) = ws.split();

    let setup_json =
        serde_json::to_string(setup).map_err(|e| format!("Serialize setup: {}", e))?;
    ws_tx
        .send(Message::Text(setup_json))
        .await
        .map_err(|e| format!("Failed to send setup: {}", e))?;

    tokio::select! {
        _ = cancel.cancelled() => {
            let _ = ws_tx.close().await;
            return Ok(());
        }
        ack = timeout(SETUP_TIMEOUT, wait_setup_ack(&mut ws_rx)) => {
            ack.map_err(|_| "Setup acknowledgement timeout".to_string())??;
        }
    }

    {
        let mut state = state.lock().unwrap();
        if *state == SessionState::Closed {
            // close() raced the acknowledgement; honor the intent.
            let _ = ws_tx.close().await;
            return Ok(());
        }
        *state = SessionState::Open;
    }
    log::info!("Live session open");
    events.emit(SessionEvent::Opened);
    let _ = ready_tx.send(true);

    let mut accumulator = TranscriptAccumulator::new();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = ws_tx.close().await;
                return Ok(());
            }
            Some(control) = control_rx.recv() => match control {
                ControlRequest::StopPlayback => scheduler.stop_all(),
            },
            outbound = outbound_rx.recv() => {
                let Some(message) = outbound else { return Ok(()) };
                let json = match serde_json::to_string(&message) {
                    Ok(json) => json,
                    Err(e) => {
                        log::error!("Serialize outbound frame: {}", e);
                        continue;
                    }
                };
                ws_tx
                    .send(Message::Text(json))
                    .await
                    .map_err(|e| format!("Failed to send frame: {}", e))?;
            }
            inbound = ws_rx.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        route_server_text(&text, &mut accumulator, scheduler, events)?;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        log::info!("Connection closed by server");
                        return Ok(());
                    }
                    Some(Ok(_)) => {} // binary/ping/pong
                    Some(Err(e)) => return Err(format!("Connection error: {}", e)),
                }
            }
        }
    }
}

/// Consume messages until the endpoint acknowledges the setup frame
async fn wait_setup_ack(
    ws_rx: &mut futures_util::stream::SplitStream<WsStream>,
) -> Result<(), String> {
    while let Some(msg) = ws_rx.next().await {
        match msg {
            Ok(Message::Text(text)) => match serde_json::from_str::<ServerMessage>(&text) {
                Ok(message) if message.is_setup_complete() => return Ok(()),
                Ok(message) => {
                    if let Some(error) = message.error_message() {
                        return Err(error);
                    }
                    log::debug!("Ignoring message while waiting for setup acknowledgement");
                }
                Err(e) => log::warn!("Failed to parse message: {}", e),
            },
            Ok(Message::Close(_)) => {
                return Err("Connection closed before setup completed".to_string())
            }
            Ok(_) => {}
            Err(e) => return Err(format!("Connection error: {}", e)),
        }
    }
    Err("Stream ended before setup completed".to_string())
}

/// Route one inbound text frame
///
/// Malformed frames are logged and dropped; only a server-reported error is
/// fatal to the session.
fn route_server_text(
    text: &str,
    accumulator: &mut TranscriptAccumulator,
    scheduler: &mut PlaybackScheduler<BoxedSink>,
    events: &Arc<dyn EventSink>,
) -> Result<(), String> {
    let message: ServerMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            log::warn!("Dropping unparseable server message: {}", e);
            return Ok(());
        }
    };

    if let Some(error) = message.error_message() {
        return Err(error);
    }

    if let Some(fragment) = message.output_fragment() {
        accumulator.append_inbound(fragment);
    }
    if let Some(fragment) = message.input_fragment() {
        accumulator.append_outbound(fragment);
    }

    if message.is_interrupted() {
        scheduler.stop_all();
    }

    if let Some(data) = message.audio_data() {
        events.emit(SessionEvent::ModelStartedSpeaking);
        let decoded = decode_base64(data)
            .and_then(|bytes| decode_audio_frame(&bytes, OUTPUT_SAMPLE_RATE, OUTPUT_CHANNELS));
        match decoded {
            Ok(frame) => {
                scheduler.enqueue(frame);
            }
            Err(e) => log::warn!("Dropping undecodable audio chunk: {}", e),
        }
    }

    if message.is_turn_complete() {
        let turn = accumulator.take_turn();
        if let Some(user) = turn.user {
            events.emit(SessionEvent::UserFinishedSpeaking(user));
        }
        if let Some(model) = turn.model {
            events.emit(SessionEvent::ModelFinishedSpeaking(model));
        }
        events.emit(SessionEvent::TurnComplete);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::AudioFrame;
    use crate::persona::{PersonaConfig, Voice};
    use crate::playback::SegmentId;

    struct NullSink;

    impl OutputSink for NullSink {
        fn clock_now(&self) -> f64 {
            0.0
        }
        fn schedule(&mut self, _frame: AudioFrame, _start_at: f64) -> SegmentId {
            SegmentId(0)
        }
        fn halt(&mut self, _id: SegmentId) {}
        fn drain_finished(&mut self) -> Vec<SegmentId> {
            Vec::new()
        }
    }

    fn controller_with_events() -> (
        LiveSessionController,
        tokio::sync::mpsc::UnboundedReceiver<SessionEvent>,
    ) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let persona = PersonaConfig::for_voice(Voice::Kore, None);
        let controller = LiveSessionController::new(persona, NullSink, Arc::new(tx));
        (controller, rx)
    }

    #[tokio::test]
    async fn test_start_requires_api_key() {
        let (mut controller, _rx) = controller_with_events();
        assert!(matches!(
            controller.start(""),
            Err(LiveError::MissingApiKey)
        ));
        assert_eq!(controller.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_close_before_start_is_safe_and_terminal() {
        let (mut controller, mut rx) = controller_with_events();
        controller.close().await;

        assert_eq!(controller.state(), SessionState::Closed);
        assert_eq!(rx.try_recv().unwrap(), SessionEvent::Closed);

        // Closed controllers cannot be restarted
        assert!(matches!(controller.start("key"), Err(LiveError::Closed)));

        // Closing again is a no-op, no duplicate event
        controller.close().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let persona = PersonaConfig::for_voice(Voice::Kore, None);
        let mut controller = LiveSessionController::new(persona, NullSink, Arc::new(tx))
            .with_endpoint("ws://127.0.0.1:9");

        controller.start("key").unwrap();
        // The routing task has not run yet on this single-threaded runtime,
        // so the controller is still Connecting.
        assert!(matches!(
            controller.start("key"),
            Err(LiveError::AlreadyStarted)
        ));
        controller.close().await;
    }

    #[tokio::test]
    async fn test_connection_failure_emits_error_then_closed() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let persona = PersonaConfig::for_voice(Voice::Kore, None);
        // Nothing listens on this port; the connect fails fast.
        let mut controller = LiveSessionController::new(persona, NullSink, Arc::new(tx))
            .with_endpoint("ws://127.0.0.1:9");

        controller.start("key").unwrap();

        let event = tokio::time::timeout(Duration::from_secs(15), rx.recv())
            .await
            .expect("no event before timeout")
            .unwrap();
        assert!(matches!(event, SessionEvent::Error(_)));
        assert_eq!(rx.recv().await.unwrap(), SessionEvent::Closed);
        assert_eq!(controller.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn test_stop_microphone_when_idle_is_a_no_op() {
        let (controller, _rx) = controller_with_events();
        controller.stop_microphone();
        controller.stop_playback();
    }

    #[tokio::test]
    async fn test_microphone_is_never_double_acquired() {
        let (controller, _rx) = controller_with_events();
        *controller.microphone.lock().unwrap() = Some(MicrophoneCapture::dummy());

        assert!(matches!(
            controller.start_microphone(None),
            Err(LiveError::Capture(CaptureError::AlreadyRunning))
        ));

        // Releasing the device makes the slot available again
        controller.stop_microphone();
        assert!(controller.microphone.lock().unwrap().is_none());
    }

    #[test]
    fn test_route_drops_malformed_payloads() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let events: Arc<dyn EventSink> = Arc::new(tx);
        let mut accumulator = TranscriptAccumulator::new();
        let mut scheduler = PlaybackScheduler::new(Box::new(NullSink) as BoxedSink);

        route_server_text("not json at all", &mut accumulator, &mut scheduler, &events).unwrap();
        route_server_text("{\"unknown\": 1}", &mut accumulator, &mut scheduler, &events).unwrap();

        assert!(rx.try_recv().is_err());
        assert!(accumulator.is_empty());
    }

    #[test]
    fn test_route_flushes_user_before_model_on_turn_complete() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let events: Arc<dyn EventSink> = Arc::new(tx);
        let mut accumulator = TranscriptAccumulator::new();
        let mut scheduler = PlaybackScheduler::new(Box::new(NullSink) as BoxedSink);

        let frames = [
            r#"{"serverContent": {"inputTranscription": {"text": "oi"}}}"#,
            r#"{"serverContent": {"outputTranscription": {"text": "olá"}}}"#,
            r#"{"serverContent": {"turnComplete": true}}"#,
        ];
        for frame in frames {
            route_server_text(frame, &mut accumulator, &mut scheduler, &events).unwrap();
        }

        assert_eq!(
            rx.try_recv().unwrap(),
            SessionEvent::UserFinishedSpeaking("oi".to_string())
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            SessionEvent::ModelFinishedSpeaking("olá".to_string())
        );
        assert_eq!(rx.try_recv().unwrap(), SessionEvent::TurnComplete);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_route_server_error_is_fatal() {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let events: Arc<dyn EventSink> = Arc::new(tx);
        let mut accumulator = TranscriptAccumulator::new();
        let mut scheduler = PlaybackScheduler::new(Box::new(NullSink) as BoxedSink);

        let result = route_server_text(
            r#"{"error": {"code": 401, "message": "expired key"}}"#,
            &mut accumulator,
            &mut scheduler,
            &events,
        );
        assert_eq!(result.unwrap_err(), "expired key");
    }
}
