//! Gapless playback scheduler with barge-in interruption.
//!
//! Synthesized audio arrives in bursts of short chunks. Each chunk is
//! appended to the output sink immediately, and the scheduler tracks a
//! virtual `next_start` cursor so back-to-back chunks play seamlessly:
//! a chunk starts at `max(next_start, now)` and advances the cursor by
//! its duration. Interruption (the user barging in) stops everything and
//! resets the timeline to zero.
//!
//! The clock and sink are trait seams so the scheduling math is testable
//! without an audio device.

use crate::error::{TowerError, TowerResult};
use std::time::Instant;
use tracing::info;

/// Monotonic time source for the playback timeline, in seconds.
pub trait PlaybackClock: Send {
    fn now(&self) -> f64;
    /// Restart the timeline at zero.
    fn reset(&mut self);
}

/// Wall-clock backed by `Instant`, restartable on interruption.
pub struct MonotonicClock {
    epoch: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl PlaybackClock for MonotonicClock {
    fn now(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    fn reset(&mut self) {
        self.epoch = Instant::now();
    }
}

/// Hand-cranked clock for tests.
#[derive(Default)]
pub struct ManualClock {
    now: f64,
}

impl ManualClock {
    pub fn advance(&mut self, seconds: f64) {
        self.now += seconds;
    }
}

impl PlaybackClock for ManualClock {
    fn now(&self) -> f64 {
        self.now
    }

    fn reset(&mut self) {
        self.now = 0.0;
    }
}

/// Where decoded samples actually go.
pub trait OutputSink {
    fn append(&mut self, samples: &[f32], sample_rate: u32) -> TowerResult<()>;
    /// Stop everything queued and playing.
    fn clear(&mut self);
}

impl OutputSink for Box<dyn OutputSink> {
    fn append(&mut self, samples: &[f32], sample_rate: u32) -> TowerResult<()> {
        (**self).append(samples, sample_rate)
    }

    fn clear(&mut self) {
        (**self).clear()
    }
}

/// Speaker output via rodio. The `OutputStream` must stay alive for audio
/// to keep flowing, so it rides along in the struct.
pub struct RodioSink {
    _stream: rodio::OutputStream,
    _handle: rodio::OutputStreamHandle,
    sink: rodio::Sink,
}

impl RodioSink {
    pub fn new() -> TowerResult<Self> {
        let (stream, handle) = rodio::OutputStream::try_default()
            .map_err(|e| TowerError::AudioDevice(format!("no output device: {}", e)))?;
        let sink = rodio::Sink::try_new(&handle)
            .map_err(|e| TowerError::Playback(format!("failed to create sink: {}", e)))?;
        info!("🔊 Audio output ready");
        Ok(Self {
            _stream: stream,
            _handle: handle,
            sink,
        })
    }
}

impl OutputSink for RodioSink {
    fn append(&mut self, samples: &[f32], sample_rate: u32) -> TowerResult<()> {
        let buffer = rodio::buffer::SamplesBuffer::new(1, sample_rate, samples.to_vec());
        self.sink.append(buffer);
        Ok(())
    }

    fn clear(&mut self) {
        // stop() discards everything; a stopped Sink accepts new sources.
        self.sink.stop();
        self.sink.play();
    }
}

/// Sink that discards audio. Used in tests and when no output device exists.
#[derive(Default)]
pub struct NullSink {
    pub appended: usize,
    pub cleared: usize,
}

impl OutputSink for NullSink {
    fn append(&mut self, _samples: &[f32], _sample_rate: u32) -> TowerResult<()> {
        self.appended += 1;
        Ok(())
    }

    fn clear(&mut self) {
        self.cleared += 1;
    }
}

/// A scheduled chunk: when it starts and how long it runs, in seconds.
#[derive(Debug, Clone, Copy)]
pub struct PlaybackSource {
    pub start_at: f64,
    pub duration: f64,
}

impl PlaybackSource {
    fn end(&self) -> f64 {
        self.start_at + self.duration
    }
}

/// Schedules decoded chunks for gapless playback and handles barge-in.
pub struct PlaybackScheduler<C: PlaybackClock, S: OutputSink> {
    clock: C,
    sink: S,
    next_start: f64,
    active: Vec<PlaybackSource>,
}

impl<C: PlaybackClock, S: OutputSink> PlaybackScheduler<C, S> {
    pub fn new(clock: C, sink: S) -> Self {
        Self {
            clock,
            sink,
            next_start: 0.0,
            active: Vec::new(),
        }
    }

    /// Schedule a chunk of mono samples. Returns the start offset on the
    /// playback timeline.
    ///
    /// Chunks arriving while earlier ones still play are queued back to
    /// back; a chunk arriving after the timeline ran dry starts now.
    pub fn schedule(&mut self, samples: &[f32], sample_rate: u32) -> TowerResult<f64> {
        if sample_rate == 0 {
            return Err(TowerError::Format("sample rate must be non-zero".into()));
        }
        let now = self.clock.now();
        self.active.retain(|s| s.end() > now);

        let start_at = self.next_start.max(now);
        self.sink.append(samples, sample_rate)?;

        let duration = samples.len() as f64 / sample_rate as f64;
        self.next_start = start_at + duration;
        self.active.push(PlaybackSource { start_at, duration });
        Ok(start_at)
    }

    /// Barge-in: stop all playing and queued audio and reset the timeline,
    /// so the next chunk starts immediately at zero.
    pub fn interrupt(&mut self) {
        self.sink.clear();
        self.active.clear();
        self.next_start = 0.0;
        self.clock.reset();
    }

    pub fn active_sources(&self) -> usize {
        self.active.len()
    }

    pub fn next_start(&self) -> f64 {
        self.next_start
    }

    pub fn clock_mut(&mut self) -> &mut C {
        &mut self.clock
    }
}
