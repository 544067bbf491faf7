//! Microphone capture: 16 kHz mono blocks accumulated in the device
//! callback, encoded and pushed onto the outbound queue.

use crate::codec;
use crate::error::TowerResult;
use crate::events::{EventSender, UiEvent};
use crate::transport::{MediaChunk, OutboundFrame};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleRate, Stream, StreamConfig};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

/// Capture parameters. Defaults match what the live service expects.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub block_size: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: vct_core::config::INPUT_SAMPLE_RATE,
            channels: 1,
            block_size: vct_core::config::CAPTURE_BLOCK_SIZE,
        }
    }
}

/// Microphone source. `start` consumes it and returns the live stream,
/// which must be kept alive by the caller for capture to continue.
pub struct AudioCapture {
    config: CaptureConfig,
    device: cpal::Device,
    stream_config: StreamConfig,
}

impl AudioCapture {
    pub fn new(config: CaptureConfig) -> TowerResult<Self> {
        let host = cpal::default_host();
        let device = host.default_input_device().ok_or_else(|| {
            crate::error::TowerError::AudioDevice("no input device available".into())
        })?;

        if let Ok(name) = device.name() {
            info!("🎤 Using input device: {}", name);
        }

        let stream_config = StreamConfig {
            channels: config.channels,
            sample_rate: SampleRate(config.sample_rate),
            buffer_size: BufferSize::Fixed(config.block_size as u32),
        };

        Ok(Self {
            config,
            device,
            stream_config,
        })
    }

    /// Build and start the input stream.
    ///
    /// Each full block becomes one outbound chunk; its RMS level goes to the
    /// UI. A closed outbound queue just drops blocks, since the session is
    /// winding down anyway.
    pub fn start(
        self,
        outbound: UnboundedSender<OutboundFrame>,
        events: EventSender,
    ) -> TowerResult<Stream> {
        let block_size = self.config.block_size;
        let sample_rate = self.config.sample_rate;
        let mut pending: Vec<f32> = Vec::with_capacity(block_size * 2);

        let stream = self.device.build_input_stream(
            &self.stream_config,
            move |data: &[f32], _| {
                pending.extend_from_slice(data);
                while pending.len() >= block_size {
                    let block: Vec<f32> = pending.drain(..block_size).collect();
                    let _ = events.send(UiEvent::VolumeLevel(codec::rms(&block)));
                    match MediaChunk::from_samples(&block, sample_rate) {
                        Ok(chunk) => {
                            if outbound.send(OutboundFrame::Audio(chunk)).is_err() {
                                warn!("Outbound queue closed, dropping capture block");
                            }
                        }
                        Err(e) => warn!("Dropping capture block: {}", e),
                    }
                }
            },
            |err| warn!("Input stream error: {}", err),
            None,
        )?;

        stream.play()?;
        info!("🎤 Capture started ({} Hz, {} sample blocks)", sample_rate, block_size);
        Ok(stream)
    }
}
