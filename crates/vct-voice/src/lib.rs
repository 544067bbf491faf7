//! Live voice session for the Voice Control Tower.
//!
//! Pipeline: microphone capture (16 kHz mono PCM16 blocks) flows out over a
//! duplex WebSocket to the Gemini Live API; synthesized speech (24 kHz)
//! flows back through a gapless playback scheduler with barge-in support;
//! tool calls from the model are dispatched to handlers and their results
//! returned on the same socket.

pub mod capture;
pub mod codec;
pub mod error;
pub mod events;
pub mod playback;
pub mod session;
pub mod tools;
pub mod transport;

pub use error::{TowerError, TowerResult};
pub use events::{EmailDraft, UiEvent};
pub use session::{LiveSession, SessionState};
