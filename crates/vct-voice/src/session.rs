//! The live session: wires capture, transport, playback, and tool dispatch
//! into one running conversation.
//!
//! Threading layout: the cpal stream lives on whatever thread created the
//! session and must be held alive; inbound audio is pumped on a dedicated
//! OS thread that owns the rodio sink (audio handles are not `Send`); tool
//! batches run on their own tokio task so long generations never stall
//! playback or interruption handling.

use crate::capture::{AudioCapture, CaptureConfig};
use crate::codec;
use crate::error::{TowerError, TowerResult};
use crate::events::{EmailDraft, EventSender, UiEvent};
use crate::playback::{MonotonicClock, NullSink, OutputSink, PlaybackScheduler, RodioSink};
use crate::tools::{standard_handlers, ToolDispatcher};
use crate::transport::{self, InboundEvent, SessionSetup, ToolInvocation, TransportHandle};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};
use vct_core::prompts;
use vct_core::shipments::ShipmentBoard;
use vct_core::{TextGenerator, TowerConfig};

/// Session lifecycle. Held in an atomic shared with the playback pump, so
/// transport death mid-conversation moves the session to `Closed` even
/// though the pump runs on its own thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Idle = 0,
    Connecting = 1,
    Live = 2,
    Closed = 3,
}

impl SessionState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => SessionState::Idle,
            1 => SessionState::Connecting,
            2 => SessionState::Live,
            _ => SessionState::Closed,
        }
    }
}

fn store_state(state: &AtomicU8, s: SessionState) {
    state.store(s as u8, Ordering::SeqCst);
}

/// Inbound pump, run on a dedicated thread that owns the audio sink.
///
/// Exits when the transport reports `Closed` or the stop signal fires. The
/// stop signal is deliberately independent of the socket task so `stop()`
/// never waits on another task getting scheduled.
fn pump_loop(
    mut inbound: mpsc::UnboundedReceiver<InboundEvent>,
    mut stop_rx: oneshot::Receiver<()>,
    state: Arc<AtomicU8>,
    events: EventSender,
    tool_tx: UnboundedSender<Vec<ToolInvocation>>,
) {
    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!("Playback runtime failed to start: {}", e);
            return;
        }
    };

    let sink: Box<dyn OutputSink> = match RodioSink::new() {
        Ok(s) => Box::new(s),
        Err(e) => {
            warn!("No audio output, running silent: {}", e);
            Box::new(NullSink::default())
        }
    };
    let mut scheduler = PlaybackScheduler::new(MonotonicClock::default(), sink);

    loop {
        let event = rt.block_on(async {
            tokio::select! {
                ev = inbound.recv() => ev,
                _ = &mut stop_rx => None,
            }
        });
        let Some(event) = event else { break };

        match event {
            InboundEvent::Audio(bytes) => match codec::decode_pcm16(&bytes, 1) {
                Ok(samples) => {
                    if let Err(e) =
                        scheduler.schedule(&samples, vct_core::config::OUTPUT_SAMPLE_RATE)
                    {
                        warn!("Dropping audio chunk: {}", e);
                    }
                }
                Err(e) => warn!("Dropping undecodable audio chunk: {}", e),
            },
            InboundEvent::Transcript(text) => {
                let _ = events.send(UiEvent::Transcript(text));
            }
            InboundEvent::ToolCalls(calls) => {
                if tool_tx.send(calls).is_err() {
                    warn!("Tool dispatcher gone, dropping calls");
                }
            }
            InboundEvent::Interrupted => {
                info!("⏹️ Barge-in, stopping playback");
                scheduler.interrupt();
            }
            InboundEvent::TurnComplete => {
                debug!("Model turn complete");
            }
            InboundEvent::Closed(err) => {
                scheduler.interrupt();
                store_state(&state, SessionState::Closed);
                let status = match err {
                    Some(e) => TowerError::Transport(e).to_string(),
                    None => "Disconnected.".to_string(),
                };
                let _ = events.send(UiEvent::Status(status));
                break;
            }
        }
    }
    debug!("Playback pump finished");
}

/// A running voice session. Dropping it (or calling `stop`) tears down
/// capture, the socket, and the playback thread.
pub struct LiveSession {
    state: Arc<AtomicU8>,
    events: EventSender,
    // Capture dies when the stream drops.
    _stream: Option<cpal::Stream>,
    transport: Option<TransportHandle>,
    pump_thread: Option<JoinHandle<()>>,
    pump_stop: Option<oneshot::Sender<()>>,
    tool_tx: Option<UnboundedSender<Vec<ToolInvocation>>>,
}

impl LiveSession {
    /// Connect, start the playback pump and tool dispatcher, then open the
    /// microphone. Fails fast if the key is missing, the connection is
    /// refused, or there is no input device.
    pub async fn start(
        config: &TowerConfig,
        board: Arc<ShipmentBoard>,
        generator: Arc<dyn TextGenerator>,
        events: EventSender,
    ) -> TowerResult<LiveSession> {
        let api_key = config
            .api_key()
            .ok_or_else(|| TowerError::Config("no API key configured".into()))?;

        let state = Arc::new(AtomicU8::new(SessionState::Idle as u8));
        store_state(&state, SessionState::Connecting);
        let _ = events.send(UiEvent::Status(
            "Connecting to Voice Control Tower...".to_string(),
        ));

        let draft: Arc<Mutex<Option<EmailDraft>>> = Arc::new(Mutex::new(None));
        let handlers = standard_handlers(
            Arc::clone(&board),
            generator,
            events.clone(),
            Arc::clone(&draft),
        );
        let declarations = handlers.iter().map(|h| h.declaration()).collect();

        let setup = SessionSetup {
            model: config.live_model(),
            voice: config.voice(),
            system_instruction: prompts::system_instructions(&board),
            tools: declarations,
        };

        let mut handle = match transport::connect(&api_key, setup).await {
            Ok(h) => h,
            Err(e) => {
                store_state(&state, SessionState::Closed);
                let _ = events.send(UiEvent::Status(format!("Connection failed: {}", e)));
                return Err(e);
            }
        };

        // Tool batches on their own task so slow generations never block
        // the audio pump.
        let mut dispatcher = ToolDispatcher::new(handle.outbound.clone());
        for h in handlers {
            dispatcher.register(h);
        }
        let (tool_tx, mut tool_rx) = mpsc::unbounded_channel::<Vec<ToolInvocation>>();
        tokio::spawn(async move {
            while let Some(batch) = tool_rx.recv().await {
                dispatcher.dispatch_batch(batch).await;
            }
            debug!("Tool dispatch task finished");
        });

        // Inbound pump on its own thread: the rodio sink is not Send, so
        // the thread that creates it must drain the channel.
        let inbound = std::mem::replace(&mut handle.inbound, mpsc::unbounded_channel().1);
        let (pump_stop_tx, pump_stop_rx) = oneshot::channel();
        let pump_state = Arc::clone(&state);
        let pump_events = events.clone();
        let pump_tool_tx = tool_tx.clone();
        let pump_thread = std::thread::spawn(move || {
            pump_loop(inbound, pump_stop_rx, pump_state, pump_events, pump_tool_tx)
        });

        let capture = AudioCapture::new(CaptureConfig::default());
        let stream = match capture.and_then(|c| c.start(handle.outbound.clone(), events.clone())) {
            Ok(s) => s,
            Err(e) => {
                let _ = events.send(UiEvent::Status(format!("Microphone error: {}", e)));
                handle.close();
                let _ = pump_stop_tx.send(());
                let _ = pump_thread.join();
                store_state(&state, SessionState::Closed);
                return Err(e);
            }
        };

        store_state(&state, SessionState::Live);
        info!("✅ Session live");
        let _ = events.send(UiEvent::Status(
            "Voice Control Tower Online. Listening...".to_string(),
        ));

        Ok(LiveSession {
            state,
            events,
            _stream: Some(stream),
            transport: Some(handle),
            pump_thread: Some(pump_thread),
            pump_stop: Some(pump_stop_tx),
            tool_tx: Some(tool_tx),
        })
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Tear the session down. Safe to call more than once.
    pub fn stop(&mut self) {
        // Order matters: kill capture first so no more audio hits the
        // socket, then close the socket, then release the pump directly
        // rather than waiting on the socket task to notice.
        self._stream = None;
        self.tool_tx = None;
        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }
        if let Some(stop) = self.pump_stop.take() {
            let _ = stop.send(());
        }
        if let Some(pump) = self.pump_thread.take() {
            let _ = pump.join();
        }
        let prev = self.state.swap(SessionState::Closed as u8, Ordering::SeqCst);
        if SessionState::from_u8(prev) != SessionState::Closed {
            info!("⏹️ Session ended");
            let _ = self
                .events
                .send(UiEvent::Status("Session ended.".to_string()));
        }
    }
}

impl Drop for LiveSession {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct PumpFixture {
        inbound: UnboundedSender<InboundEvent>,
        _stop_tx: oneshot::Sender<()>,
        _tool_rx: mpsc::UnboundedReceiver<Vec<ToolInvocation>>,
        state: Arc<AtomicU8>,
        events: mpsc::UnboundedReceiver<UiEvent>,
        thread: JoinHandle<()>,
    }

    fn spawn_pump() -> PumpFixture {
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = oneshot::channel();
        let (ev_tx, ev_rx) = mpsc::unbounded_channel();
        let (tool_tx, tool_rx) = mpsc::unbounded_channel();
        let state = Arc::new(AtomicU8::new(SessionState::Live as u8));
        let pump_state = Arc::clone(&state);
        let thread =
            std::thread::spawn(move || pump_loop(in_rx, stop_rx, pump_state, ev_tx, tool_tx));
        PumpFixture {
            inbound: in_tx,
            _stop_tx: stop_tx,
            _tool_rx: tool_rx,
            state,
            events: ev_rx,
            thread,
        }
    }

    #[test]
    fn transport_death_closes_session() {
        let mut fixture = spawn_pump();
        fixture
            .inbound
            .send(InboundEvent::Closed(Some("socket reset".to_string())))
            .unwrap();
        fixture.thread.join().unwrap();

        assert_eq!(
            SessionState::from_u8(fixture.state.load(Ordering::SeqCst)),
            SessionState::Closed
        );
        let mut reported = false;
        while let Ok(ev) = fixture.events.try_recv() {
            if matches!(&ev, UiEvent::Status(s) if s.contains("socket reset")) {
                reported = true;
            }
        }
        assert!(reported);
    }

    #[test]
    fn clean_disconnect_reports_status() {
        let mut fixture = spawn_pump();
        fixture.inbound.send(InboundEvent::Closed(None)).unwrap();
        fixture.thread.join().unwrap();

        assert_eq!(
            SessionState::from_u8(fixture.state.load(Ordering::SeqCst)),
            SessionState::Closed
        );
        let mut reported = false;
        while let Ok(ev) = fixture.events.try_recv() {
            if matches!(&ev, UiEvent::Status(s) if s == "Disconnected.") {
                reported = true;
            }
        }
        assert!(reported);
    }

    #[test]
    fn stop_signal_ends_pump_without_socket() {
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = oneshot::channel();
        let (ev_tx, _ev_rx) = mpsc::unbounded_channel();
        let (tool_tx, _tool_rx) = mpsc::unbounded_channel();
        let state = Arc::new(AtomicU8::new(SessionState::Live as u8));
        let pump_state = Arc::clone(&state);
        let thread =
            std::thread::spawn(move || pump_loop(in_rx, stop_rx, pump_state, ev_tx, tool_tx));

        // No Closed event ever arrives; the stop signal alone must end it.
        stop_tx.send(()).unwrap();
        thread.join().unwrap();
        drop(in_tx);
    }

    #[test]
    fn stop_is_idempotent() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut session = LiveSession {
            state: Arc::new(AtomicU8::new(SessionState::Live as u8)),
            events: tx,
            _stream: None,
            transport: None,
            pump_thread: None,
            pump_stop: None,
            tool_tx: None,
        };

        session.stop();
        session.stop();
        assert_eq!(session.state(), SessionState::Closed);

        let mut ended = 0;
        drop(session);
        while let Ok(ev) = rx.try_recv() {
            if matches!(&ev, UiEvent::Status(s) if s == "Session ended.") {
                ended += 1;
            }
        }
        assert_eq!(ended, 1);
    }
}
