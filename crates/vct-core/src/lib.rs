//! Voice Control Tower core: the logistics domain layer.
//!
//! Holds the shipment board (the dataset every conversation is grounded in),
//! the prompt builders for the live persona and for report/draft generation,
//! the unary Gemini text bridge, and configuration.

pub mod bridge;
pub mod config;
pub mod prompts;
pub mod shipments;

pub use bridge::{GeminiBridge, TextGenerator};
pub use config::TowerConfig;
pub use shipments::{Audience, BoardStats, Shipment, ShipmentBoard, ShipmentStatus};
