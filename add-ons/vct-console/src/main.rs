//! Voice Control Tower console: runs a live voice session in the terminal
//! and logs everything the session reports.

use anyhow::Context;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, trace};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use vct_core::{GeminiBridge, ShipmentBoard, TextGenerator, TowerConfig};
use vct_voice::{LiveSession, UiEvent};

fn log_event(event: &UiEvent) {
    match event {
        UiEvent::Status(s) => info!("📡 {}", s),
        UiEvent::VolumeLevel(level) => trace!("mic level: {:.3}", level),
        UiEvent::Transcript(text) => info!("🗣️ {}", text),
        UiEvent::ReportReady { topic, body } => {
            info!("📄 Report: {}\n{}", topic, body);
        }
        UiEvent::DraftReady {
            shipment_id,
            audience,
            recipient,
            body,
        } => {
            info!(
                "✉️ Draft for {} ({} -> {}):\n{}",
                shipment_id, audience, recipient, body
            );
        }
        UiEvent::SendCompleted {
            recipient,
            subject,
            body,
        } => {
            info!("✉️ Sent to {}: {}\n{}", recipient, subject, body);
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("Note: no .env file loaded ({})", e);
    }

    tracing_subscriber::registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(fmt::layer())
        .init();

    let config = TowerConfig::load()
        .map_err(|e| anyhow::anyhow!("failed to load configuration: {}", e))?;

    let board = Arc::new(ShipmentBoard::seed());
    let generator: Arc<dyn TextGenerator> = Arc::new(
        GeminiBridge::from_config(&config)
            .context("GEMINI_API_KEY is required (set it in user_config.toml or .env)")?,
    );

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let mut session = LiveSession::start(&config, board, generator, event_tx)
        .await
        .map_err(|e| anyhow::anyhow!("failed to start session: {}", e))?;

    info!("Press Ctrl+C to end the session");

    loop {
        tokio::select! {
            event = event_rx.recv() => {
                match event {
                    Some(ev) => log_event(&ev),
                    None => {
                        debug!("Event channel closed");
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down...");
                break;
            }
        }
    }

    session.stop();
    while let Ok(ev) = event_rx.try_recv() {
        log_event(&ev);
    }

    Ok(())
}
