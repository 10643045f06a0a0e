//! Loop recorder: captures the audio input into memory for immediate
//! scratching.
//!
//! Workflow:
//! 1. First record defines the loop: writes are linear, the loop length is
//!    captured on stop.
//! 2. Subsequent records punch in: writes wrap modulo the locked length and
//!    never extend it.
//! 3. Reset erases the loop; the next record starts fresh.
//!
//! The backing [`Track`] is fully pre-allocated at init so the audio thread
//! never allocates.

use std::sync::Arc;

use crate::track::{Track, TrackError};

pub struct LoopBuffer {
    track: Arc<Track>,
    write_pos: usize,
    max_samples: usize,
    loop_length: usize,
    sample_rate: u32,
    recording: bool,
    length_locked: bool,
    max_reached: bool,
}

impl LoopBuffer {
    /// Pre-allocates `max_seconds` of stereo storage. Failure here is fatal
    /// at startup.
    pub fn new(sample_rate: u32, max_seconds: u32) -> Result<Self, TrackError> {
        let max_samples = sample_rate as usize * max_seconds as usize;
        let track = Track::acquire_for_recording(sample_rate, max_samples)?;
        log::info!(
            "loop buffer: pre-allocated {} samples ({:.1}s)",
            max_samples,
            max_seconds
        );
        Ok(Self {
            track,
            write_pos: 0,
            max_samples,
            loop_length: 0,
            sample_rate,
            recording: false,
            length_locked: false,
            max_reached: false,
        })
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn has_loop(&self) -> bool {
        self.length_locked && self.loop_length > 0
    }

    /// Current recording length in samples.
    pub fn length(&self) -> usize {
        if self.length_locked {
            self.loop_length
        } else {
            self.write_pos
        }
    }

    pub fn length_seconds(&self) -> f64 {
        self.length() as f64 / self.sample_rate as f64
    }

    /// Start recording. In the locked state this is a punch-in from the
    /// current write position; otherwise a fresh recording from zero.
    pub fn start(&mut self) -> bool {
        if self.recording {
            return false;
        }

        if self.length_locked {
            self.recording = true;
            self.max_reached = false;
            return true;
        }

        self.write_pos = 0;
        self.loop_length = 0;
        self.max_reached = false;
        self.recording = true;
        true
    }

    /// Stop recording. The first stop locks the loop length.
    pub fn stop(&mut self) {
        if !self.recording {
            return;
        }
        self.recording = false;

        if !self.length_locked && self.write_pos > 0 {
            self.loop_length = self.write_pos;
            self.length_locked = true;
            self.track.set_length(self.loop_length);
        }
    }

    /// Move the punch-in write position to `playback_position` seconds.
    /// No-op until a loop length is locked.
    pub fn set_position(&mut self, playback_position: f64) {
        if !self.length_locked || self.loop_length == 0 {
            return;
        }
        let pos = (playback_position.max(0.0) * self.sample_rate as f64).round() as usize;
        self.write_pos = pos % self.loop_length;
    }

    /// Append one stereo frame. Fresh recordings advance the track length
    /// as they go so a partial take is already scratchable.
    #[inline]
    pub fn write_frame(&mut self, left: i16, right: i16) {
        if !self.recording {
            return;
        }

        if self.length_locked {
            if self.loop_length == 0 {
                return;
            }
            let pos = self.write_pos % self.loop_length;
            self.track.write_sample(pos, left, right);
            self.write_pos = (self.write_pos + 1) % self.loop_length;
        } else {
            if self.write_pos >= self.max_samples {
                if !self.max_reached {
                    self.max_reached = true;
                }
                return;
            }
            self.track.write_sample(self.write_pos, left, right);
            self.write_pos += 1;
            self.track.set_length(self.write_pos);
        }
    }

    /// The recorded track, reference counted. None while nothing is stored.
    pub fn get_track(&self) -> Option<Arc<Track>> {
        if self.length() == 0 {
            return None;
        }
        Some(Arc::clone(&self.track))
    }

    /// Borrow the backing track without touching the refcount (RT-safe).
    #[inline]
    pub fn peek_track(&self) -> &Arc<Track> {
        &self.track
    }

    /// Erase the loop. Keeps the pre-allocated track.
    pub fn reset(&mut self) {
        self.recording = false;
        self.write_pos = 0;
        self.loop_length = 0;
        self.length_locked = false;
        self.max_reached = false;
        self.track.set_length(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capture(lb: &mut LoopBuffer, frames: usize, value: i16) {
        for _ in 0..frames {
            lb.write_frame(value, value);
        }
    }

    #[test]
    fn fresh_recording_locks_length_on_stop() {
        let mut lb = LoopBuffer::new(1_000, 4).unwrap();
        assert!(!lb.has_loop());

        assert!(lb.start());
        capture(&mut lb, 500, 3);
        assert_eq!(lb.peek_track().length(), 500);
        lb.stop();

        assert!(lb.has_loop());
        assert_eq!(lb.length(), 500);
        assert_eq!(lb.get_track().unwrap().length(), 500);
    }

    #[test]
    fn punch_in_wraps_and_keeps_length() {
        let mut lb = LoopBuffer::new(1_000, 4).unwrap();
        lb.start();
        capture(&mut lb, 1_000, 5);
        lb.stop();

        // Punch in at 0.5s, overwrite 600 frames: wraps past the end.
        lb.set_position(0.5);
        assert!(lb.start());
        capture(&mut lb, 600, -9);
        lb.stop();

        assert_eq!(lb.length(), 1_000);
        let t = lb.get_track().unwrap();
        assert_eq!(t.get_sample(499), (5, 5));
        assert_eq!(t.get_sample(500), (-9, -9));
        assert_eq!(t.get_sample(999), (-9, -9));
        assert_eq!(t.get_sample(0), (-9, -9));
        assert_eq!(t.get_sample(99), (-9, -9));
        assert_eq!(t.get_sample(100), (5, 5));
    }

    #[test]
    fn fresh_recording_caps_at_max() {
        let mut lb = LoopBuffer::new(1_000, 1).unwrap();
        lb.start();
        capture(&mut lb, 1_500, 1);
        assert_eq!(lb.length(), 1_000);
        lb.stop();
        assert_eq!(lb.length(), 1_000);
    }

    #[test]
    fn reset_returns_to_empty() {
        let mut lb = LoopBuffer::new(1_000, 4).unwrap();
        lb.start();
        capture(&mut lb, 100, 2);
        lb.stop();
        assert!(lb.has_loop());

        lb.reset();
        assert!(!lb.has_loop());
        assert!(lb.get_track().is_none());

        // Next start is a fresh recording again.
        lb.start();
        capture(&mut lb, 50, 4);
        lb.stop();
        assert_eq!(lb.length(), 50);
    }

    #[test]
    fn double_start_is_rejected() {
        let mut lb = LoopBuffer::new(1_000, 4).unwrap();
        assert!(lb.start());
        assert!(!lb.start());
    }
}
