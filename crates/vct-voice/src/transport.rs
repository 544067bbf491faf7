//! Duplex WebSocket transport to the Gemini Live API.
//!
//! One socket task owns the connection: it drains an outbound frame queue
//! (mic audio and tool results) and forwards parsed inbound events to the
//! session. The wire format is the BidiGenerateContent JSON protocol, all
//! camelCase.

use crate::codec;
use crate::error::{TowerError, TowerResult};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

const LIVE_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

// ---------------------------------------------------------------------------
// Outbound wire types
// ---------------------------------------------------------------------------

/// One chunk of base64 PCM16 audio on the wire.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaChunk {
    pub data: String,
    pub mime_type: String,
}

impl MediaChunk {
    /// Encode a block of mono float samples into a wire chunk.
    pub fn from_samples(samples: &[f32], sample_rate: u32) -> TowerResult<Self> {
        let bytes = codec::encode_pcm16(samples)?;
        Ok(Self {
            data: codec::transport_encode(&bytes),
            mime_type: format!("audio/pcm;rate={}", sample_rate),
        })
    }
}

/// A tool the model may call, in the service's declaration format.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ClientSetup {
    setup: SetupConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SetupConfig {
    model: String,
    generation_config: GenerationConfig,
    system_instruction: SystemInstruction,
    tools: Vec<ToolDeclarations>,
    input_audio_transcription: serde_json::Value,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_modalities: Vec<String>,
    speech_config: SpeechConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SpeechConfig {
    voice_config: VoiceConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceConfig {
    prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PrebuiltVoiceConfig {
    voice_name: String,
}

#[derive(Serialize)]
struct SystemInstruction {
    parts: Vec<TextPart>,
}

#[derive(Serialize)]
struct TextPart {
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolDeclarations {
    function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RealtimeInputMessage {
    realtime_input: RealtimeInput,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RealtimeInput {
    media_chunks: Vec<MediaChunk>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolResponseMessage {
    tool_response: ToolResponse,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolResponse {
    function_responses: Vec<FunctionResponse>,
}

/// Result of one tool invocation, correlated by the call's id.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionResponse {
    pub id: String,
    pub name: String,
    pub response: ResponsePayload,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponsePayload {
    pub result: String,
}

// ---------------------------------------------------------------------------
// Inbound wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerMessage {
    setup_complete: Option<serde_json::Value>,
    server_content: Option<ServerContent>,
    tool_call: Option<ToolCall>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerContent {
    model_turn: Option<ModelTurn>,
    input_transcription: Option<Transcription>,
    #[serde(default)]
    interrupted: bool,
    #[serde(default)]
    turn_complete: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelTurn {
    #[serde(default)]
    parts: Vec<ServerPart>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerPart {
    inline_data: Option<InlineData>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    data: String,
    #[allow(dead_code)]
    mime_type: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Transcription {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToolCall {
    #[serde(default)]
    function_calls: Vec<ToolInvocation>,
}

/// One tool call requested by the model.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ToolInvocation {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Session-facing frames
// ---------------------------------------------------------------------------

/// Frames the session pushes toward the service.
#[derive(Debug)]
pub enum OutboundFrame {
    Audio(MediaChunk),
    ToolResults(Vec<FunctionResponse>),
}

/// Events the socket task forwards to the session.
#[derive(Debug)]
pub enum InboundEvent {
    /// Raw PCM16 bytes of synthesized speech (24 kHz mono).
    Audio(Vec<u8>),
    /// Transcribed fragment of the user's speech.
    Transcript(String),
    /// The model requested tool invocations.
    ToolCalls(Vec<ToolInvocation>),
    /// The user barged in; drop queued playback.
    Interrupted,
    /// The model finished its turn.
    TurnComplete,
    /// The connection ended, with the error that killed it if any.
    Closed(Option<String>),
}

/// Turn one server JSON message into zero or more inbound events.
fn parse_server_message(raw: &str) -> Vec<InboundEvent> {
    let msg: ServerMessage = match serde_json::from_str(raw) {
        Ok(m) => m,
        Err(e) => {
            warn!("Unparseable server message: {}", e);
            return Vec::new();
        }
    };

    let mut events = Vec::new();

    if msg.setup_complete.is_some() {
        debug!("Live session setup complete");
    }

    if let Some(tool_call) = msg.tool_call {
        if !tool_call.function_calls.is_empty() {
            events.push(InboundEvent::ToolCalls(tool_call.function_calls));
        }
    }

    if let Some(content) = msg.server_content {
        if let Some(turn) = content.model_turn {
            for part in turn.parts {
                if let Some(inline) = part.inline_data {
                    match codec::transport_decode(&inline.data) {
                        Ok(bytes) => events.push(InboundEvent::Audio(bytes)),
                        Err(e) => warn!("Dropping undecodable audio part: {}", e),
                    }
                }
            }
        }
        if let Some(transcription) = content.input_transcription {
            if !transcription.text.is_empty() {
                events.push(InboundEvent::Transcript(transcription.text));
            }
        }
        if content.interrupted {
            events.push(InboundEvent::Interrupted);
        }
        if content.turn_complete {
            events.push(InboundEvent::TurnComplete);
        }
    }

    events
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// Everything needed to open a live session.
pub struct SessionSetup {
    pub model: String,
    pub voice: String,
    pub system_instruction: String,
    pub tools: Vec<FunctionDeclaration>,
}

/// Handle to a live connection: push frames out, pull events in.
#[derive(Debug)]
pub struct TransportHandle {
    pub outbound: mpsc::UnboundedSender<OutboundFrame>,
    pub inbound: mpsc::UnboundedReceiver<InboundEvent>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TransportHandle {
    /// Ask the socket task to close the connection. Idempotent.
    pub fn close(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

/// Connect to the live service and spawn the socket task.
///
/// The setup frame is sent before the handle is returned, so the caller can
/// start streaming audio immediately.
pub async fn connect(api_key: &str, setup: SessionSetup) -> TowerResult<TransportHandle> {
    if api_key.trim().is_empty() {
        return Err(TowerError::Config("API key is empty".into()));
    }

    let url = format!("{}?key={}", LIVE_ENDPOINT, api_key);
    info!("▶️ Connecting live session (model: {})", setup.model);

    let (mut ws, _) = connect_async(&url)
        .await
        .map_err(|e| TowerError::Connect(e.to_string()))?;

    let setup_frame = ClientSetup {
        setup: SetupConfig {
            model: format!("models/{}", setup.model),
            generation_config: GenerationConfig {
                response_modalities: vec!["AUDIO".to_string()],
                speech_config: SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: setup.voice,
                        },
                    },
                },
            },
            system_instruction: SystemInstruction {
                parts: vec![TextPart {
                    text: setup.system_instruction,
                }],
            },
            tools: vec![ToolDeclarations {
                function_declarations: setup.tools,
            }],
            input_audio_transcription: serde_json::json!({}),
        },
    };
    let setup_json = serde_json::to_string(&setup_frame)
        .map_err(|e| TowerError::Format(format!("setup serialization failed: {}", e)))?;
    ws.send(Message::Text(setup_json))
        .await
        .map_err(|e| TowerError::Connect(format!("setup frame rejected: {}", e)))?;

    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<OutboundFrame>();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<InboundEvent>();
    let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                frame = outbound_rx.recv() => {
                    let Some(frame) = frame else {
                        let _ = ws.close(None).await;
                        let _ = inbound_tx.send(InboundEvent::Closed(None));
                        break;
                    };
                    let json = match frame {
                        OutboundFrame::Audio(chunk) => {
                            serde_json::to_string(&RealtimeInputMessage {
                                realtime_input: RealtimeInput {
                                    media_chunks: vec![chunk],
                                },
                            })
                        }
                        OutboundFrame::ToolResults(responses) => {
                            serde_json::to_string(&ToolResponseMessage {
                                tool_response: ToolResponse {
                                    function_responses: responses,
                                },
                            })
                        }
                    };
                    match json {
                        Ok(text) => {
                            if let Err(e) = ws.send(Message::Text(text)).await {
                                error!("Send failed: {}", e);
                                let _ = inbound_tx.send(InboundEvent::Closed(Some(e.to_string())));
                                break;
                            }
                        }
                        Err(e) => warn!("Dropping unserializable frame: {}", e),
                    }
                }
                incoming = ws.next() => {
                    match incoming {
                        Some(Ok(Message::Text(text))) => {
                            for event in parse_server_message(&text) {
                                let _ = inbound_tx.send(event);
                            }
                        }
                        Some(Ok(Message::Binary(bytes))) => {
                            if let Ok(text) = String::from_utf8(bytes) {
                                for event in parse_server_message(&text) {
                                    let _ = inbound_tx.send(event);
                                }
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            let _ = inbound_tx.send(InboundEvent::Closed(None));
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            error!("Socket error: {}", e);
                            let _ = inbound_tx.send(InboundEvent::Closed(Some(e.to_string())));
                            break;
                        }
                    }
                }
                _ = &mut shutdown_rx => {
                    let _ = ws.close(None).await;
                    let _ = inbound_tx.send(InboundEvent::Closed(None));
                    break;
                }
            }
        }
        debug!("Socket task finished");
    });

    Ok(TransportHandle {
        outbound: outbound_tx,
        inbound: inbound_rx,
        shutdown: Some(shutdown_tx),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_parts_decode_in_order() {
        let raw = r#"{"serverContent":{"modelTurn":{"parts":[
            {"inlineData":{"data":"AAD/fw==","mimeType":"audio/pcm;rate=24000"}},
            {"inlineData":{"data":"AIA=","mimeType":"audio/pcm;rate=24000"}}
        ]}}}"#;
        let events = parse_server_message(raw);
        assert_eq!(events.len(), 2);
        match (&events[0], &events[1]) {
            (InboundEvent::Audio(a), InboundEvent::Audio(b)) => {
                assert_eq!(a, &vec![0x00, 0x00, 0xff, 0x7f]);
                assert_eq!(b, &vec![0x00, 0x80]);
            }
            other => panic!("unexpected events: {:?}", other),
        }
    }

    #[test]
    fn bad_audio_part_is_skipped() {
        let raw = r#"{"serverContent":{"modelTurn":{"parts":[
            {"inlineData":{"data":"!!!not base64!!!"}},
            {"inlineData":{"data":"AAA="}}
        ]}}}"#;
        let events = parse_server_message(raw);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], InboundEvent::Audio(_)));
    }

    #[test]
    fn tool_calls_come_before_audio() {
        let raw = r#"{
            "toolCall":{"functionCalls":[{"id":"c1","name":"generate_report","args":{"report_topic":"General"}}]},
            "serverContent":{"modelTurn":{"parts":[{"inlineData":{"data":"AAA="}}]}}
        }"#;
        let events = parse_server_message(raw);
        assert_eq!(events.len(), 2);
        match &events[0] {
            InboundEvent::ToolCalls(calls) => {
                assert_eq!(calls[0].id, "c1");
                assert_eq!(calls[0].name, "generate_report");
            }
            other => panic!("expected tool calls first, got {:?}", other),
        }
    }

    #[test]
    fn interruption_and_turn_complete_flags() {
        let events = parse_server_message(r#"{"serverContent":{"interrupted":true}}"#);
        assert!(matches!(events[..], [InboundEvent::Interrupted]));

        let events = parse_server_message(r#"{"serverContent":{"turnComplete":true}}"#);
        assert!(matches!(events[..], [InboundEvent::TurnComplete]));
    }

    #[test]
    fn transcription_text_is_forwarded() {
        let raw = r#"{"serverContent":{"inputTranscription":{"text":"status of shipment"}}}"#;
        let events = parse_server_message(raw);
        match &events[..] {
            [InboundEvent::Transcript(t)] => assert_eq!(t, "status of shipment"),
            other => panic!("unexpected events: {:?}", other),
        }
    }

    #[test]
    fn setup_complete_yields_no_events() {
        assert!(parse_server_message(r#"{"setupComplete":{}}"#).is_empty());
        assert!(parse_server_message("garbage").is_empty());
    }

    #[test]
    fn media_chunk_carries_rate_in_mime() {
        let chunk = MediaChunk::from_samples(&[0.0; 4], 16000).unwrap();
        assert_eq!(chunk.mime_type, "audio/pcm;rate=16000");
        assert!(!chunk.data.is_empty());
    }

    #[tokio::test]
    async fn empty_key_fails_before_io() {
        let setup = SessionSetup {
            model: "m".to_string(),
            voice: "Kore".to_string(),
            system_instruction: String::new(),
            tools: Vec::new(),
        };
        let err = connect("  ", setup).await.unwrap_err();
        assert!(matches!(err, TowerError::Config(_)));
    }
}
