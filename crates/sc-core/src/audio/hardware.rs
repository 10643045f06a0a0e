//! The abstract audio hardware port and the cross-thread engine handle.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::engine::{DeckInput, DeckProcessingState, DeckSnapshot, DspStats, DspStatsSnapshot};
use crate::player::Player;
use crate::track::Track;

use super::error::AudioResult;

/// Cheap, cloneable view of the engine for the input and main threads.
///
/// Everything here is lock-free: queries read the engine's published
/// atomics, control goes through one-shot request flags consumed by the
/// engine at period boundaries, and the loop tracks are the engine's
/// pre-allocated buffers shared at construction.
#[derive(Clone)]
pub struct EngineHandle {
    players: [Arc<Player>; 2],
    state: [Arc<DeckProcessingState>; 2],
    loop_tracks: [Arc<Track>; 2],
    stats: Arc<DspStats>,
    sample_rate: u32,
    has_capture: bool,
}

impl EngineHandle {
    pub fn new(
        players: [Arc<Player>; 2],
        state: [Arc<DeckProcessingState>; 2],
        loop_tracks: [Arc<Track>; 2],
        stats: Arc<DspStats>,
        sample_rate: u32,
        has_capture: bool,
    ) -> Self {
        Self {
            players,
            state,
            loop_tracks,
            stats,
            sample_rate,
            has_capture,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn has_capture(&self) -> bool {
        self.has_capture
    }

    pub fn player(&self, deck: usize) -> &Arc<Player> {
        &self.players[deck]
    }

    pub fn input(&self, deck: usize) -> &DeckInput {
        &self.players[deck].input
    }

    pub fn deck_state(&self, deck: usize) -> DeckSnapshot {
        self.state[deck].snapshot()
    }

    pub fn position(&self, deck: usize) -> f64 {
        self.state[deck].position.load(Ordering::Relaxed)
    }

    pub fn pitch(&self, deck: usize) -> f64 {
        self.state[deck].pitch.load(Ordering::Relaxed)
    }

    pub fn volume(&self, deck: usize) -> f64 {
        self.state[deck].volume.load(Ordering::Relaxed)
    }

    pub fn elapsed(&self, deck: usize) -> f64 {
        self.state[deck].elapsed()
    }

    pub fn is_recording(&self, deck: usize) -> bool {
        self.state[deck].is_recording.load(Ordering::Relaxed)
    }

    pub fn has_loop(&self, deck: usize) -> bool {
        self.state[deck].has_loop.load(Ordering::Relaxed)
    }

    pub fn loop_length(&self, deck: usize) -> f64 {
        self.state[deck].loop_length.load(Ordering::Relaxed)
    }

    /// Ask the engine to start recording on `deck`. Returns whether the
    /// request was accepted; the engine revalidates at consume time and
    /// signals failure with the error beep.
    pub fn start_recording(&self, deck: usize) -> bool {
        if deck > 1 || !self.has_capture {
            return false;
        }
        let other = 1 - deck;
        if self.is_recording(other) {
            return false;
        }
        self.players[deck]
            .input
            .record_start
            .store(true, Ordering::Release);
        true
    }

    pub fn stop_recording(&self, deck: usize) {
        if deck > 1 {
            return;
        }
        self.players[deck]
            .input
            .record_stop
            .store(true, Ordering::Release);
    }

    /// Seed a deck's starting position directly, bypassing the seek
    /// one-shot (whose -1 sentinel cannot carry negative positions). This
    /// is an init-time path: call it before the deck is audible, while
    /// the engine is not yet producing periods for it. The emergency
    /// fallback sample uses it to hold its start back a few seconds.
    pub fn preseed_position(&self, deck: usize, seconds: f64) {
        if deck > 1 {
            return;
        }
        let state = &self.state[deck];
        state.position.store(seconds, Ordering::Relaxed);
        state.position_offset.store(0.0, Ordering::Relaxed);
        self.players[deck]
            .input
            .target_position
            .store(seconds, Ordering::Relaxed);
    }

    /// Erase the deck's loop (consumed by the engine at the next period).
    pub fn reset_loop(&self, deck: usize) {
        if deck > 1 {
            return;
        }
        self.players[deck]
            .input
            .loop_reset
            .store(true, Ordering::Release);
    }

    /// A fresh reference to the loop track, or None while nothing is
    /// recorded.
    pub fn get_loop_track(&self, deck: usize) -> Option<Arc<Track>> {
        let t = &self.loop_tracks[deck];
        if t.length() > 0 {
            Some(Arc::clone(t))
        } else {
            None
        }
    }

    /// Borrow the loop track without touching the refcount (RT-safe).
    pub fn peek_loop_track(&self, deck: usize) -> &Arc<Track> {
        &self.loop_tracks[deck]
    }

    pub fn stats(&self) -> DspStatsSnapshot {
        self.stats.snapshot()
    }

    /// The full published state for one deck. CV post-processors and
    /// status displays read through this.
    pub fn processing_state(&self, deck: usize) -> &DeckProcessingState {
        &self.state[deck]
    }

    pub fn reset_peak(&self) {
        self.stats.reset_peak();
    }
}

/// Platform audio device port, driven by the rig.
pub trait AudioHardware {
    /// Descriptors to include in the rig's poll set. Callback-driven
    /// backends contribute none.
    fn pollfds(&self, _out: &mut Vec<libc::pollfd>) {}

    /// Service the device after poll reports activity.
    fn handle(&mut self) -> AudioResult<()> {
        Ok(())
    }

    fn sample_rate(&self) -> u32;

    fn start(&mut self) -> AudioResult<()>;

    fn stop(&mut self);

    fn has_capture(&self) -> bool;

    /// The cross-thread engine view.
    fn engine(&self) -> EngineHandle;

    // Recording control and query API, delegated to the engine handle

    fn start_recording(&self, deck: usize) -> bool {
        self.engine().start_recording(deck)
    }

    fn stop_recording(&self, deck: usize) {
        self.engine().stop_recording(deck);
    }

    fn is_recording(&self, deck: usize) -> bool {
        self.engine().is_recording(deck)
    }

    fn has_loop(&self, deck: usize) -> bool {
        self.engine().has_loop(deck)
    }

    fn reset_loop(&self, deck: usize) {
        self.engine().reset_loop(deck);
    }

    fn get_loop_track(&self, deck: usize) -> Option<Arc<Track>> {
        self.engine().get_loop_track(deck)
    }

    fn get_deck_state(&self, deck: usize) -> DeckSnapshot {
        self.engine().deck_state(deck)
    }

    fn get_position(&self, deck: usize) -> f64 {
        self.engine().position(deck)
    }

    fn get_pitch(&self, deck: usize) -> f64 {
        self.engine().pitch(deck)
    }

    fn get_volume(&self, deck: usize) -> f64 {
        self.engine().volume(deck)
    }
}
