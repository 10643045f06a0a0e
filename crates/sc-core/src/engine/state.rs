//! Engine output state and DSP statistics.
//!
//! [`DeckProcessingState`] has a single writer (the audio engine) and is
//! read by the query API; all fields are POD atomics, so readers see at
//! worst a slightly stale value.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};

use super::input::PlaybackSource;
use crate::sync::AtomicF64;

/// Per-deck state owned by the audio engine.
pub struct DeckProcessingState {
    /// Current playback position (seconds)
    pub position: AtomicF64,
    /// Track start offset (copied from input on seek)
    pub position_offset: AtomicF64,
    /// Current smoothed pitch (playback speed)
    pub pitch: AtomicF64,
    /// Virtual motor speed (brakes toward zero when stopped)
    pub motor_speed: AtomicF64,
    /// Previous external speed, for instant MIDI response detection
    pub last_external_speed: AtomicF64,
    /// Smoothed crossfader; starts muted until the input thread writes
    pub fader_current: AtomicF64,
    /// Current output volume after all factors
    pub volume: AtomicF64,
    /// Previous-period touch state, for edge detection
    pub touched_prev: AtomicBool,
    pub is_recording: AtomicBool,
    pub has_loop: AtomicBool,
    /// Length of the recorded loop in seconds
    pub loop_length: AtomicF64,
    /// Source actually playing this period
    pub source: AtomicU8,
}

impl DeckProcessingState {
    pub fn new() -> Self {
        Self {
            position: AtomicF64::new(0.0),
            position_offset: AtomicF64::new(0.0),
            pitch: AtomicF64::new(0.0),
            motor_speed: AtomicF64::new(1.0),
            last_external_speed: AtomicF64::new(1.0),
            fader_current: AtomicF64::new(0.0),
            volume: AtomicF64::new(0.0),
            touched_prev: AtomicBool::new(false),
            is_recording: AtomicBool::new(false),
            has_loop: AtomicBool::new(false),
            loop_length: AtomicF64::new(0.0),
            source: AtomicU8::new(PlaybackSource::File as u8),
        }
    }

    /// Position relative to the track start offset.
    #[inline]
    pub fn elapsed(&self) -> f64 {
        self.position.load(Ordering::Relaxed) - self.position_offset.load(Ordering::Relaxed)
    }

    /// Is the deck audibly moving?
    pub fn is_active(&self) -> bool {
        self.pitch.load(Ordering::Relaxed).abs() > 0.01
    }

    pub fn source(&self) -> PlaybackSource {
        PlaybackSource::from_u8(self.source.load(Ordering::Relaxed))
    }

    /// Copy out a coherent-enough view for displays and tests.
    pub fn snapshot(&self) -> DeckSnapshot {
        DeckSnapshot {
            position: self.position.load(Ordering::Relaxed),
            position_offset: self.position_offset.load(Ordering::Relaxed),
            pitch: self.pitch.load(Ordering::Relaxed),
            motor_speed: self.motor_speed.load(Ordering::Relaxed),
            fader_current: self.fader_current.load(Ordering::Relaxed),
            volume: self.volume.load(Ordering::Relaxed),
            is_recording: self.is_recording.load(Ordering::Relaxed),
            has_loop: self.has_loop.load(Ordering::Relaxed),
            loop_length: self.loop_length.load(Ordering::Relaxed),
            source: self.source(),
        }
    }
}

impl Default for DeckProcessingState {
    fn default() -> Self {
        Self::new()
    }
}

/// Plain copy of a deck's processing state.
#[derive(Debug, Clone, Copy)]
pub struct DeckSnapshot {
    pub position: f64,
    pub position_offset: f64,
    pub pitch: f64,
    pub motor_speed: f64,
    pub fader_current: f64,
    pub volume: f64,
    pub is_recording: bool,
    pub has_loop: bool,
    pub loop_length: f64,
    pub source: PlaybackSource,
}

impl DeckSnapshot {
    pub fn elapsed(&self) -> f64 {
        self.position - self.position_offset
    }
}

/// DSP performance counters, written by the engine per period.
pub struct DspStats {
    /// Exponential moving average of load vs the period budget (percent)
    pub load_percent: AtomicF64,
    pub load_peak: AtomicF64,
    pub process_time_us: AtomicF64,
    pub budget_time_us: AtomicF64,
    pub xruns: AtomicU64,
}

impl DspStats {
    pub fn new() -> Self {
        Self {
            load_percent: AtomicF64::new(0.0),
            load_peak: AtomicF64::new(0.0),
            process_time_us: AtomicF64::new(0.0),
            budget_time_us: AtomicF64::new(0.0),
            xruns: AtomicU64::new(0),
        }
    }

    /// Fold one period's measurement into the running stats.
    pub fn update(&self, process_time_us: f64, budget_time_us: f64) {
        let load = if budget_time_us > 0.0 {
            (process_time_us / budget_time_us) * 100.0
        } else {
            0.0
        };
        self.process_time_us.store(process_time_us, Ordering::Relaxed);
        self.budget_time_us.store(budget_time_us, Ordering::Relaxed);
        let ema = 0.9 * self.load_percent.load(Ordering::Relaxed) + 0.1 * load;
        self.load_percent.store(ema, Ordering::Relaxed);
        if load > self.load_peak.load(Ordering::Relaxed) {
            self.load_peak.store(load, Ordering::Relaxed);
        }
        if load > 100.0 {
            self.xruns.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn reset_peak(&self) {
        self.load_peak.store(0.0, Ordering::Relaxed);
        self.xruns.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DspStatsSnapshot {
        DspStatsSnapshot {
            load_percent: self.load_percent.load(Ordering::Relaxed),
            load_peak: self.load_peak.load(Ordering::Relaxed),
            process_time_us: self.process_time_us.load(Ordering::Relaxed),
            budget_time_us: self.budget_time_us.load(Ordering::Relaxed),
            xruns: self.xruns.load(Ordering::Relaxed),
        }
    }
}

impl Default for DspStats {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DspStatsSnapshot {
    pub load_percent: f64,
    pub load_peak: f64,
    pub process_time_us: f64,
    pub budget_time_us: f64,
    pub xruns: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_subtracts_offset() {
        let s = DeckProcessingState::new();
        s.position.store(10.0, Ordering::Relaxed);
        s.position_offset.store(4.0, Ordering::Relaxed);
        assert_eq!(s.elapsed(), 6.0);
    }

    #[test]
    fn stats_count_xruns_over_budget() {
        let stats = DspStats::new();
        stats.update(50.0, 100.0);
        assert_eq!(stats.snapshot().xruns, 0);
        stats.update(150.0, 100.0);
        assert_eq!(stats.snapshot().xruns, 1);
        assert!(stats.snapshot().load_peak > 100.0);
        stats.reset_peak();
        assert_eq!(stats.snapshot().xruns, 0);
        assert_eq!(stats.snapshot().load_peak, 0.0);
    }
}
