//! The per-deck playback unit shared between the input thread and the
//! audio engine.

use std::path::PathBuf;
use std::sync::Arc;

use crate::engine::DeckInput;
use crate::sync::{Spinlock, SpinlockGuard};
use crate::track::Track;

/// Holds the deck's input surface and its current track.
///
/// The track pointer swap is the only place a lock exists on the audio
/// path; the engine takes it with `try_lock` and plays silence for the
/// period if it loses the race.
pub struct Player {
    pub input: DeckInput,
    /// Seconds per output sample
    pub sample_dt: f64,
    track: Spinlock<Arc<Track>>,
}

impl Player {
    pub fn new(sample_rate: u32, track: Arc<Track>, initial_volume: f64) -> Self {
        assert!(sample_rate > 0);
        let input = DeckInput::new();
        input
            .volume_knob
            .store(initial_volume, std::sync::atomic::Ordering::Relaxed);
        Self {
            input,
            sample_dt: 1.0 / sample_rate as f64,
            track: Spinlock::new(track),
        }
    }

    /// Swap in a new track. The lock is held only for the pointer swap;
    /// the old reference is dropped after release.
    pub fn set_track(&self, track: Arc<Track>) {
        let old = {
            let mut guard = self.track.lock();
            std::mem::replace(&mut *guard, track)
        };
        drop(old);
    }

    /// Audio-thread access: single attempt, never spins.
    #[inline]
    pub fn try_lock_track(&self) -> Option<SpinlockGuard<'_, Arc<Track>>> {
        self.track.try_lock()
    }

    /// A fresh reference to the current track.
    pub fn track(&self) -> Arc<Track> {
        Arc::clone(&self.track.lock())
    }

    /// Source path of the current track, for the cue sidecar.
    pub fn track_path(&self) -> Option<PathBuf> {
        self.track.lock().path().map(|p| p.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_track_swaps_reference() {
        let a = Track::acquire_empty(48_000);
        let b = Track::acquire_for_recording(48_000, 16).unwrap();
        b.set_length(16);

        let player = Player::new(48_000, Arc::clone(&a), 0.125);
        assert_eq!(player.track().length(), 0);

        player.set_track(Arc::clone(&b));
        assert_eq!(player.track().length(), 16);
        // Old track is released by the player (only our handle remains)
        assert_eq!(Arc::strong_count(&a), 1);
    }

    #[test]
    fn try_lock_fails_while_swapping() {
        let t = Track::acquire_empty(48_000);
        let player = Player::new(48_000, t, 1.0);
        let guard = player.try_lock_track().unwrap();
        assert!(player.try_lock_track().is_none());
        drop(guard);
        assert!(player.try_lock_track().is_some());
    }
}
