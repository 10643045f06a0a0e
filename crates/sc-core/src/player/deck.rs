//! Deck runtime: track loading, cue logic, punch-in, playlist navigation
//! and loop recall.
//!
//! A deck owns the control-thread side of one playback channel: the
//! shared [`Player`], the cue map, the playlist cursor and the encoder
//! rebase state. The audio engine only ever sees the player.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::audio::EngineHandle;
use crate::engine::PlaybackSource;
use crate::loader::TrackLoader;
use crate::track::Track;

use super::cues::Cues;
use super::player::Player;
use super::playlist::Playlist;

/// Playlist cursor. `file_idx == -1` means "at the recorded loop".
#[derive(Debug, Clone, Copy)]
pub struct NavigationState {
    pub folder_idx: usize,
    pub file_idx: i32,
    pub files_present: bool,
}

/// Rotary sensor bookkeeping, owned by the input thread.
#[derive(Debug, Clone, Copy)]
pub struct EncoderState {
    /// Accepted angle; 0xffff until the first reading
    pub angle: i32,
    /// Most recent raw reading
    pub angle_raw: i32,
    pub offset: i32,
}

pub struct Deck {
    pub deck_no: usize,
    pub player: Arc<Player>,
    pub cues: Cues,
    pub playlist: Option<Playlist>,
    pub nav: NavigationState,
    pub encoder: EncoderState,
    /// The deck's recalled loop, independent of the engine's recorder
    pub loop_track: Option<Arc<Track>>,
    punch: Option<f64>,
    loader: TrackLoader,
}

impl Deck {
    pub fn new(deck_no: usize, player: Arc<Player>, loader: TrackLoader) -> Self {
        Self {
            deck_no,
            player,
            cues: Cues::new(),
            playlist: None,
            nav: NavigationState {
                folder_idx: 0,
                file_idx: 0,
                files_present: false,
            },
            encoder: EncoderState {
                angle: 0xffff,
                angle_raw: 0xffff,
                offset: 0,
            },
            loop_track: None,
            punch: None,
            loader,
        }
    }

    /// Index a sample folder and load its first file.
    pub fn load_folder(&mut self, folder: &std::path::Path) {
        let playlist = Playlist::load(folder);
        if playlist.total_files() == 0 {
            log::warn!("deck {}: no files under {}", self.deck_no, folder.display());
            self.nav.files_present = false;
            return;
        }

        log::info!(
            "deck {}: folder {} indexed with {} files",
            self.deck_no,
            folder.display(),
            playlist.total_files()
        );
        self.nav.files_present = true;
        self.nav.folder_idx = 0;
        self.nav.file_idx = 0;

        if let Some(file) = playlist.get_file(0, 0) {
            if let Ok(track) = self.loader.import(&file.full_path) {
                self.player.set_track(Arc::clone(&track));
                self.cues.load_from_file(&file.full_path);
            }
        }
        self.playlist = Some(playlist);
    }

    /// Swap in a freshly imported track and reset the transport for it.
    fn load_track_internal(&mut self, track: Arc<Track>) {
        if let Some(old_path) = self.player.track_path() {
            self.cues.save_to_file(&old_path);
        }
        let new_path = track.path().map(|p| p.to_path_buf());
        self.player.set_track(track);

        let input = &self.player.input;
        input.position_offset.store(0.0, Ordering::Relaxed);
        input.target_position.store(0.0, Ordering::Relaxed);
        input.set_source(PlaybackSource::File);
        input.stopped.store(false, Ordering::Relaxed);
        input.request_seek(0.0);
        input.reset_pitch();
        // Force touch re-detection so the angle offset is rebased
        input.touched.store(false, Ordering::Relaxed);

        match new_path {
            Some(path) => self.cues.load_from_file(&path),
            None => self.cues.reset(),
        }

        if !input.just_play.load(Ordering::Relaxed) {
            self.encoder.offset = -self.encoder.angle;
        }
    }

    fn load_file(&mut self, folder: usize, file: usize) {
        let Some(playlist) = &self.playlist else {
            return;
        };
        let Some(entry) = playlist.get_file(folder, file) else {
            return;
        };
        let path = entry.full_path.clone();
        match self.loader.import(&path) {
            Ok(track) => self.load_track_internal(track),
            Err(e) => log::warn!("deck {}: import failed: {e}", self.deck_no),
        }
    }

    pub fn next_file(&mut self, engine: &EngineHandle) {
        let _ = engine;
        if !self.nav.files_present {
            return;
        }

        if self.nav.file_idx == -1 {
            // At the loop: return to the first file
            self.nav.file_idx = 0;
            self.player.input.set_source(PlaybackSource::File);
            self.load_file(self.nav.folder_idx, 0);
        } else if self
            .playlist
            .as_ref()
            .is_some_and(|p| p.has_next_file(self.nav.folder_idx, self.nav.file_idx as usize))
        {
            self.nav.file_idx += 1;
            self.load_file(self.nav.folder_idx, self.nav.file_idx as usize);
        }
    }

    pub fn prev_file(&mut self, engine: &EngineHandle) {
        if !self.nav.files_present {
            return;
        }

        match self.nav.file_idx {
            -1 => {
                // Already at the loop, stay there
            }
            0 => {
                // First file: drop into the loop if one is recorded
                if engine.has_loop(self.deck_no) {
                    self.goto_loop();
                }
            }
            _ => {
                self.nav.file_idx -= 1;
                self.player.input.set_source(PlaybackSource::File);
                self.load_file(self.nav.folder_idx, self.nav.file_idx as usize);
            }
        }
    }

    pub fn next_folder(&mut self) {
        if !self.nav.files_present {
            return;
        }
        let Some(playlist) = &self.playlist else {
            return;
        };
        if !playlist.has_next_folder(self.nav.folder_idx) {
            return;
        }
        self.nav.folder_idx += 1;
        // Folder changes do not pull the deck off a recorded loop
        if self.nav.file_idx != -1 {
            self.nav.file_idx = 0;
            self.load_file(self.nav.folder_idx, 0);
        }
    }

    pub fn prev_folder(&mut self) {
        if !self.nav.files_present {
            return;
        }
        let Some(playlist) = &self.playlist else {
            return;
        };
        if !playlist.has_prev_folder(self.nav.folder_idx) {
            return;
        }
        self.nav.folder_idx -= 1;
        if self.nav.file_idx != -1 {
            self.nav.file_idx = 0;
            self.load_file(self.nav.folder_idx, 0);
        }
    }

    pub fn random_file(&mut self) {
        if !self.nav.files_present {
            return;
        }
        let Some(playlist) = &self.playlist else {
            return;
        };
        let total = playlist.total_files();
        if total == 0 {
            return;
        }
        let pick = fastrand::usize(..total);
        let Some(entry) = playlist.get_file_at_index(pick) else {
            return;
        };
        log::debug!("deck {}: random file {pick}/{total}", self.deck_no);
        let path = entry.full_path.clone();
        // Random selection exits loop mode but does not move the folder
        // cursor; it does not fit folder navigation
        self.player.input.set_source(PlaybackSource::File);
        match self.loader.import(&path) {
            Ok(track) => self.load_track_internal(track),
            Err(e) => log::warn!("deck {}: import failed: {e}", self.deck_no),
        }
    }

    /// Set the cue if unset, else jump to it.
    pub fn cue(&mut self, label: u32, engine: &EngineHandle) {
        match self.cues.get(label) {
            None => {
                self.cues.set(label, engine.elapsed(self.deck_no));
                if let Some(path) = self.player.track_path() {
                    self.cues.save_to_file(&path);
                }
            }
            Some(position) => {
                // Shift the offset so elapsed lands on the cue
                let current = engine.position(self.deck_no);
                self.player
                    .input
                    .position_offset
                    .store(current - position, Ordering::Relaxed);
            }
        }
    }

    pub fn unset_cue(&mut self, label: u32) {
        self.cues.unset(label);
    }

    /// Jump to the cue, remembering where we came from.
    pub fn punch_in(&mut self, label: u32, engine: &EngineHandle) {
        let elapsed = engine.elapsed(self.deck_no);
        let Some(position) = self.cues.get(label) else {
            self.cues.set(label, elapsed);
            return;
        };

        let mut origin = elapsed;
        if let Some(punch) = self.punch {
            origin -= punch;
        }

        let current = engine.position(self.deck_no);
        self.player
            .input
            .position_offset
            .store(current - position, Ordering::Relaxed);
        self.punch = Some(position - origin);
    }

    /// Return to the pre-punch position.
    pub fn punch_out(&mut self, engine: &EngineHandle) {
        let Some(punch) = self.punch.take() else {
            return;
        };
        let elapsed = engine.elapsed(self.deck_no);
        let target = elapsed - punch;
        let current = engine.position(self.deck_no);
        self.player
            .input
            .position_offset
            .store(current - target, Ordering::Relaxed);
    }

    /// Toggle loop recording.
    pub fn record(&self, engine: &EngineHandle) {
        if engine.is_recording(self.deck_no) {
            self.player
                .input
                .record_stop
                .store(true, Ordering::Release);
        } else {
            self.player
                .input
                .record_start
                .store(true, Ordering::Release);
        }
    }

    pub fn has_loop_track(&self) -> bool {
        self.loop_track
            .as_ref()
            .is_some_and(|t| t.length() > 0)
    }

    /// Re-engage the stored loop as the player's track.
    pub fn recall_loop(&mut self) -> bool {
        let Some(track) = &self.loop_track else {
            return false;
        };
        if track.length() == 0 {
            return false;
        }

        self.player.set_track(Arc::clone(track));

        let input = &self.player.input;
        input.position_offset.store(0.0, Ordering::Relaxed);
        input.request_seek(0.0);
        input.stopped.store(false, Ordering::Relaxed);
        input.touched.store(false, Ordering::Relaxed);
        self.encoder.offset = -self.encoder.angle;
        true
    }

    /// Park the playlist cursor on the loop and play it.
    pub fn goto_loop(&mut self) {
        self.nav.file_idx = -1;

        let input = &self.player.input;
        input.set_source(PlaybackSource::Loop);
        input.position_offset.store(0.0, Ordering::Relaxed);
        input.target_position.store(0.0, Ordering::Relaxed);
        input.request_seek(0.0);
        input.stopped.store(false, Ordering::Relaxed);
        input.touched.store(false, Ordering::Relaxed);
        self.encoder.offset = -self.encoder.angle;

        log::debug!("deck {}: goto loop", self.deck_no);
    }

    /// Erase the loop and land on the folder's first file.
    pub fn erase_loop(&mut self, engine: &EngineHandle) {
        engine.reset_loop(self.deck_no);
        self.loop_track = None;
        self.player.input.set_source(PlaybackSource::File);
        self.nav.file_idx = 0;
        if self.nav.files_present {
            self.load_file(self.nav.folder_idx, 0);
        }
        log::debug!("deck {}: loop erased", self.deck_no);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{DeckProcessingState, DspStats};
    use std::path::PathBuf;

    const RATE: u32 = 48_000;

    fn engine_handle() -> EngineHandle {
        let players = [
            Arc::new(Player::new(RATE, Track::acquire_empty(RATE), 1.0)),
            Arc::new(Player::new(RATE, Track::acquire_empty(RATE), 1.0)),
        ];
        let state = [
            Arc::new(DeckProcessingState::new()),
            Arc::new(DeckProcessingState::new()),
        ];
        let loops = [
            Track::acquire_for_recording(RATE, 64).unwrap(),
            Track::acquire_for_recording(RATE, 64).unwrap(),
        ];
        EngineHandle::new(players, state, loops, Arc::new(DspStats::new()), RATE, true)
    }

    fn deck(engine: &EngineHandle) -> Deck {
        Deck::new(
            0,
            Arc::clone(engine.player(0)),
            TrackLoader::new(PathBuf::from("/bin/cat"), RATE),
        )
    }

    #[test]
    fn cue_sets_then_seeks() {
        let engine = engine_handle();
        let mut d = deck(&engine);

        // First press sets the cue at the current elapsed time
        engine.processing_state(0).position.store(3.0, Ordering::Relaxed);
        d.cue(7, &engine);
        assert_eq!(d.cues.get(7), Some(3.0));

        // Second press seeks: elapsed becomes the cue position
        engine.processing_state(0).position.store(10.0, Ordering::Relaxed);
        d.cue(7, &engine);
        let offset = d.player.input.position_offset.load(Ordering::Relaxed);
        assert_eq!(10.0 - offset, 3.0);
    }

    #[test]
    fn punch_in_and_out_restore_position() {
        let engine = engine_handle();
        let mut d = deck(&engine);
        d.cues.set(1, 2.0);

        engine.processing_state(0).position.store(8.0, Ordering::Relaxed);
        d.punch_in(1, &engine);
        // Offset now makes elapsed == 2.0
        let offset = d.player.input.position_offset.load(Ordering::Relaxed);
        assert_eq!(8.0 - offset, 2.0);

        // Play 0.5s inside the punch, then leave
        engine.processing_state(0).position.store(8.5, Ordering::Relaxed);
        engine
            .processing_state(0)
            .position_offset
            .store(offset, Ordering::Relaxed);
        d.punch_out(&engine);
        let offset = d.player.input.position_offset.load(Ordering::Relaxed);
        // Back at the origin plus the time spent punched in
        assert!((8.5 - offset - 8.5).abs() < 1e-9);
    }

    #[test]
    fn record_toggles_against_engine_state() {
        let engine = engine_handle();
        let d = deck(&engine);

        d.record(&engine);
        assert!(d.player.input.record_start.load(Ordering::Acquire));

        engine
            .processing_state(0)
            .is_recording
            .store(true, Ordering::Relaxed);
        d.record(&engine);
        assert!(d.player.input.record_stop.load(Ordering::Acquire));
    }

    #[test]
    fn goto_loop_parks_cursor_on_sentinel() {
        let engine = engine_handle();
        let mut d = deck(&engine);
        d.encoder.angle = 1000;
        d.goto_loop();
        assert_eq!(d.nav.file_idx, -1);
        assert_eq!(d.player.input.source(), PlaybackSource::Loop);
        assert_eq!(d.encoder.offset, -1000);
        assert_eq!(d.player.input.seek_to.load(Ordering::Acquire), 0.0);
    }

    #[test]
    fn recall_requires_stored_audio() {
        let engine = engine_handle();
        let mut d = deck(&engine);
        assert!(!d.recall_loop());

        let t = Track::acquire_for_recording(RATE, 32).unwrap();
        t.set_length(32);
        d.loop_track = Some(t);
        assert!(d.recall_loop());
        assert_eq!(d.player.track().length(), 32);
    }
}
