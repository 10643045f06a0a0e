//! The main-thread rig: device and importer polling, shutdown, and the
//! recording state machine's deck-side half.

use std::io;
use std::os::unix::io::RawFd;
use std::path::Path;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex};

use crate::audio::{AudioHardware, CpalHardware, EngineHandle};
use crate::config::{LoadedConfig, Settings};
use crate::control::MappingRegistry;
use crate::dsp::InterpolationMode;
use crate::loader::TrackLoader;
use crate::player::Deck;

/// Written by the signal handler, read once at rig init.
static QUIT_WRITE_FD: AtomicI32 = AtomicI32::new(-1);

extern "C" fn on_signal(_signum: libc::c_int) {
    let fd = QUIT_WRITE_FD.load(Ordering::Relaxed);
    if fd >= 0 {
        unsafe {
            libc::write(fd, b"q".as_ptr() as *const libc::c_void, 1);
        }
    }
}

/// The whole instrument: decks, audio hardware, loader.
pub struct Sc1000 {
    pub settings: Arc<Settings>,
    pub decks: [Arc<Mutex<Deck>>; 2],
    pub hardware: Box<dyn AudioHardware>,
    pub engine: EngineHandle,
    pub loader: TrackLoader,
    prev_recording: [bool; 2],
}

impl Sc1000 {
    /// Open the audio device, build the engine and the two decks. The
    /// mapping registry is handed back for the input thread.
    pub fn setup(
        config: LoadedConfig,
        mode: InterpolationMode,
    ) -> Result<(Self, MappingRegistry), crate::audio::AudioError> {
        let settings = Arc::new(config.settings);
        log::info!("SC1000 init (root: {})", settings.root_path.display());

        let hardware = CpalHardware::open(&settings, mode)?;
        let engine = hardware.engine();

        let loader = TrackLoader::new(settings.importer.clone(), engine.sample_rate());
        let decks = [
            Arc::new(Mutex::new(Deck::new(
                0,
                Arc::clone(engine.player(0)),
                loader.clone(),
            ))),
            Arc::new(Mutex::new(Deck::new(
                1,
                Arc::clone(engine.player(1)),
                loader.clone(),
            ))),
        ];

        // The beat deck plays free-running, no platter interaction
        engine
            .input(0)
            .just_play
            .store(true, Ordering::Relaxed);

        Ok((
            Self {
                settings,
                decks,
                hardware: Box::new(hardware),
                engine,
                loader,
                prev_recording: [false; 2],
            },
            config.registry,
        ))
    }

    /// Index the beats and samples folders. On the stock device the USB
    /// stick may still be settling at boot, so wait for it briefly.
    pub fn load_sample_folders(&self) {
        let root = &self.settings.root_path;
        let samples = root.join("samples");
        let beats = root.join("beats");

        if root == Path::new("/media/sda") && !samples.exists() {
            for _ in 0..12 {
                log::info!("waiting for USB stick...");
                if Path::new("/dev/sda1").exists() {
                    log::info!("found USB stick, mounting");
                    let _ = std::process::Command::new("/bin/mount")
                        .args(["/dev/sda1", "/media/sda"])
                        .status();
                    break;
                }
                std::thread::sleep(std::time::Duration::from_secs(1));
            }
        }

        self.decks[0].lock().unwrap().load_folder(&beats);
        self.decks[1].lock().unwrap().load_folder(&samples);

        let mut scratch = self.decks[1].lock().unwrap();
        if !scratch.nav.files_present {
            // Emergency sample baked into the firmware image
            if let Ok(track) = self.loader.import(Path::new("/var/scratchsentence.mp3")) {
                scratch.player.set_track(track);
                scratch
                    .cues
                    .load_from_file(Path::new("/var/scratchsentence.mp3"));
                // Hold the start back so the sample doesn't fire the
                // moment the motor spins up
                self.engine.preseed_position(1, -4.0);
            }
        }
    }

    /// Deck-side half of the recording state machine: when the engine
    /// reports a recording has ended, park the deck on the fresh loop.
    pub fn handle_deck_recording(&mut self) {
        for deck_no in 0..2 {
            let recording = self.engine.is_recording(deck_no);
            if self.prev_recording[deck_no] && !recording {
                let mut deck = self.decks[deck_no].lock().unwrap();
                deck.loop_track = self.engine.get_loop_track(deck_no);
                deck.nav.file_idx = -1;
                deck.player
                    .input
                    .set_source(crate::engine::PlaybackSource::Loop);
                log::debug!("deck {deck_no}: recording stopped, now at loop");
            }
            self.prev_recording[deck_no] = recording;
        }
    }
}

/// Poll loop over the quit pipe, the audio device descriptors and every
/// importing track.
pub struct Rig {
    quit_read: RawFd,
    quit_write: RawFd,
}

impl Rig {
    pub fn new() -> io::Result<Self> {
        let mut fds = [0 as RawFd; 2];
        if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
            return Err(io::Error::last_os_error());
        }
        QUIT_WRITE_FD.store(fds[1], Ordering::Relaxed);

        unsafe {
            libc::signal(
                libc::SIGINT,
                on_signal as extern "C" fn(libc::c_int) as libc::sighandler_t,
            );
            libc::signal(
                libc::SIGTERM,
                on_signal as extern "C" fn(libc::c_int) as libc::sighandler_t,
            );
        }

        Ok(Self {
            quit_read: fds[0],
            quit_write: fds[1],
        })
    }

    /// Ask the main loop to exit (safe from any thread).
    pub fn quit(&self) {
        unsafe {
            libc::write(self.quit_write, b"q".as_ptr() as *const libc::c_void, 1);
        }
    }

    /// Run until the quit pipe fires. Services importer descriptors, the
    /// audio device, and the recording handshake.
    pub fn main_loop(&mut self, sc: &mut Sc1000) -> io::Result<()> {
        log::info!("rig running");

        loop {
            let mut fds: Vec<libc::pollfd> = vec![libc::pollfd {
                fd: self.quit_read,
                events: libc::POLLIN,
                revents: 0,
            }];
            sc.hardware.pollfds(&mut fds);
            let audio_fds = fds.len();

            let importing = sc.loader.importing();
            let mut import_slots = Vec::with_capacity(importing.len());
            for track in &importing {
                if let Some(fd) = track.poll_fd() {
                    import_slots.push((fds.len(), Arc::clone(track)));
                    fds.push(libc::pollfd {
                        fd,
                        events: libc::POLLIN,
                        revents: 0,
                    });
                }
            }

            let n = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, 10) };
            if n < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err);
            }

            if fds[0].revents != 0 {
                log::info!("quit requested");
                return Ok(());
            }

            for (slot, track) in &import_slots {
                if fds[*slot].revents & (libc::POLLIN | libc::POLLHUP | libc::POLLERR) != 0 {
                    track.handle();
                }
            }

            if audio_fds > 1 && fds[1..audio_fds].iter().any(|p| p.revents != 0) {
                if let Err(e) = sc.hardware.handle() {
                    log::error!("audio device fault: {e}");
                }
            }

            sc.handle_deck_recording();
        }
    }
}

impl Drop for Rig {
    fn drop(&mut self) {
        QUIT_WRITE_FD.store(-1, Ordering::Relaxed);
        unsafe {
            libc::close(self.quit_read);
            libc::close(self.quit_write);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quit_wakes_main_loop() {
        let rig = Rig::new().unwrap();
        rig.quit();

        let mut pfd = libc::pollfd {
            fd: rig.quit_read,
            events: libc::POLLIN,
            revents: 0,
        };
        let n = unsafe { libc::poll(&mut pfd, 1, 100) };
        assert_eq!(n, 1);
        assert!(pfd.revents & libc::POLLIN != 0);
    }
}
