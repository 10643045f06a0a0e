//! Per-deck input state: the handshake surface between the input thread
//! and the audio engine.
//!
//! Single writer (input thread), single reader (audio engine). Continuous
//! controls use relaxed atomics; one-shot requests (`seek_to`, record
//! start/stop, loop reset, beep) use acquire/release and are cleared by the
//! engine when consumed.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicI8, AtomicU8, Ordering};

use crate::sync::AtomicF64;

/// Which store a deck plays from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum PlaybackSource {
    #[default]
    File = 0,
    Loop = 1,
}

impl PlaybackSource {
    pub fn from_u8(v: u8) -> Self {
        if v == 1 {
            PlaybackSource::Loop
        } else {
            PlaybackSource::File
        }
    }
}

/// Feedback beep requests, routed from control events to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i8)]
pub enum BeepType {
    RecordingStart = 0,
    RecordingStop = 1,
    RecordingError = 2,
}

impl BeepType {
    fn from_i8(v: i8) -> Option<Self> {
        match v {
            0 => Some(BeepType::RecordingStart),
            1 => Some(BeepType::RecordingStop),
            2 => Some(BeepType::RecordingError),
            _ => None,
        }
    }
}

/// All input-thread-owned state for one deck.
pub struct DeckInput {
    // Encoder / platter
    pub encoder_angle: AtomicI32,
    pub encoder_offset: AtomicI32,
    /// Where the platter says playback should be (seconds)
    pub target_position: AtomicF64,
    pub touched: AtomicBool,

    // Transport
    pub stopped: AtomicBool,
    /// Seek request in seconds; -1 = none pending
    pub seek_to: AtomicF64,
    pub position_offset: AtomicF64,

    // Pitch, all multiplicative
    pub pitch_fader: AtomicF64,
    pub pitch_note: AtomicF64,
    pub pitch_bend: AtomicF64,

    // Volume
    pub volume_knob: AtomicF64,
    /// Crossfader for this deck after hysteresis and cut logic (0 or 1)
    pub crossfader: AtomicF64,

    // Source selection
    pub source: AtomicU8,

    // One-shot requests
    pub record_start: AtomicBool,
    pub record_stop: AtomicBool,
    pub loop_reset: AtomicBool,
    pub beep_request: AtomicI8,

    /// Beat-deck mode: no platter interaction, motor always engaged
    pub just_play: AtomicBool,
}

impl DeckInput {
    pub fn new() -> Self {
        Self {
            encoder_angle: AtomicI32::new(0),
            encoder_offset: AtomicI32::new(0),
            target_position: AtomicF64::new(0.0),
            touched: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            seek_to: AtomicF64::new(-1.0),
            position_offset: AtomicF64::new(0.0),
            pitch_fader: AtomicF64::new(1.0),
            pitch_note: AtomicF64::new(1.0),
            pitch_bend: AtomicF64::new(1.0),
            volume_knob: AtomicF64::new(1.0),
            crossfader: AtomicF64::new(0.0),
            source: AtomicU8::new(PlaybackSource::File as u8),
            record_start: AtomicBool::new(false),
            record_stop: AtomicBool::new(false),
            loop_reset: AtomicBool::new(false),
            beep_request: AtomicI8::new(-1),
            just_play: AtomicBool::new(false),
        }
    }

    /// Combined external pitch: fader x note x bend.
    #[inline]
    pub fn external_pitch(&self) -> f64 {
        self.pitch_fader.load(Ordering::Relaxed)
            * self.pitch_note.load(Ordering::Relaxed)
            * self.pitch_bend.load(Ordering::Relaxed)
    }

    /// Reset pitch modifiers to neutral.
    pub fn reset_pitch(&self) {
        self.pitch_fader.store(1.0, Ordering::Relaxed);
        self.pitch_note.store(1.0, Ordering::Relaxed);
        self.pitch_bend.store(1.0, Ordering::Relaxed);
    }

    pub fn source(&self) -> PlaybackSource {
        PlaybackSource::from_u8(self.source.load(Ordering::Relaxed))
    }

    pub fn set_source(&self, source: PlaybackSource) {
        self.source.store(source as u8, Ordering::Relaxed);
    }

    /// Request a seek. `position_offset` must be written first; the engine
    /// reads it after observing the seek.
    pub fn request_seek(&self, seconds: f64) {
        self.seek_to.store(seconds, Ordering::Release);
    }

    /// Engine side: consume a pending seek request.
    #[inline]
    pub fn take_seek(&self) -> Option<f64> {
        let v = self.seek_to.load(Ordering::Acquire);
        if v >= 0.0 {
            self.seek_to.swap(-1.0, Ordering::AcqRel);
            Some(v)
        } else {
            None
        }
    }

    pub fn request_beep(&self, beep: BeepType) {
        self.beep_request.store(beep as i8, Ordering::Release);
    }

    /// Engine side: consume a pending beep request.
    #[inline]
    pub fn take_beep(&self) -> Option<BeepType> {
        let v = self.beep_request.load(Ordering::Acquire);
        if v >= 0 {
            self.beep_request.swap(-1, Ordering::AcqRel);
            BeepType::from_i8(v)
        } else {
            None
        }
    }

    /// Engine side: consume a one-shot flag.
    #[inline]
    pub fn take_flag(flag: &AtomicBool) -> bool {
        flag.swap(false, Ordering::AcqRel)
    }
}

impl Default for DeckInput {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn external_pitch_is_multiplicative() {
        let input = DeckInput::new();
        input.pitch_fader.store(2.0, Ordering::Relaxed);
        input.pitch_note.store(0.5, Ordering::Relaxed);
        input.pitch_bend.store(1.5, Ordering::Relaxed);
        assert!((input.external_pitch() - 1.5).abs() < 1e-12);

        input.reset_pitch();
        assert_eq!(input.external_pitch(), 1.0);
    }

    #[test]
    fn seek_is_one_shot() {
        let input = DeckInput::new();
        assert!(input.take_seek().is_none());
        input.request_seek(2.5);
        assert_eq!(input.take_seek(), Some(2.5));
        assert!(input.take_seek().is_none());
    }

    #[test]
    fn beep_is_one_shot() {
        let input = DeckInput::new();
        input.request_beep(BeepType::RecordingError);
        assert_eq!(input.take_beep(), Some(BeepType::RecordingError));
        assert!(input.take_beep().is_none());
    }
}
