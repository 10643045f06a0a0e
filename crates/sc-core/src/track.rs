//! Block-addressed stereo PCM storage.
//!
//! A [`Track`] is an append-only store of interleaved signed 16-bit stereo
//! samples, organized as up to [`TRACK_MAX_BLOCKS`] blocks of
//! [`TRACK_BLOCK_SAMPLES`] samples each. Tracks are filled either by an
//! importer subprocess (decoded PCM on its stdout) or by the loop recorder,
//! and read by the audio thread through the interpolation kernels.
//!
//! Concurrency contract: there is exactly one writer at a time. Samples
//! below the published `length` are immutable for cross-thread readers;
//! `length` only ever grows (release store) until the track is dropped.
//! Punch-in recording does overwrite samples below `length`, but recording
//! and playback both run on the audio thread, so that never crosses a
//! thread boundary.

use std::cell::UnsafeCell;
use std::io::Read;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use thiserror::Error;

pub const TRACK_CHANNELS: usize = 2;
pub const TRACK_MAX_BLOCKS: usize = 64;
pub const TRACK_BLOCK_SAMPLES: usize = 2048 * 1024;

/// Read chunk size for importer stdout.
const IMPORT_READ_BYTES: usize = 32 * 1024;

#[derive(Debug, Error)]
pub enum TrackError {
    #[error("track capacity exceeded ({0} samples requested)")]
    TooLong(usize),
    #[error("failed to spawn importer {importer}: {source}")]
    Spawn {
        importer: String,
        source: std::io::Error,
    },
}

/// One block of interleaved stereo PCM.
struct TrackBlock {
    pcm: UnsafeCell<Box<[i16]>>,
}

// Safety: see the module-level concurrency contract. Writes go through
// `write_sample` on the single writer; concurrent readers stay below the
// published length.
unsafe impl Sync for TrackBlock {}
unsafe impl Send for TrackBlock {}

impl TrackBlock {
    fn new() -> Self {
        Self {
            pcm: UnsafeCell::new(vec![0i16; TRACK_BLOCK_SAMPLES * TRACK_CHANNELS].into_boxed_slice()),
        }
    }

    #[inline]
    fn pcm(&self) -> &[i16] {
        unsafe { &*self.pcm.get() }
    }

    #[inline]
    fn write(&self, offset: usize, left: i16, right: i16) {
        unsafe {
            let pcm = &mut *self.pcm.get();
            pcm[offset] = left;
            pcm[offset + 1] = right;
        }
    }
}

/// Importer subprocess state, touched only from the rig thread.
struct ImportJob {
    child: Child,
    stdout: ChildStdout,
    /// Partial frame carried between reads (a stereo frame is 4 bytes).
    carry: [u8; 4],
    carry_len: usize,
    overrun_logged: bool,
}

/// Reference-counted (via `Arc`) block-indexed stereo PCM store.
pub struct Track {
    rate: u32,
    path: Option<PathBuf>,
    length: AtomicUsize,
    blocks: AtomicUsize,
    block: Vec<OnceLock<TrackBlock>>,
    import: Mutex<Option<ImportJob>>,
    finished: AtomicBool,
}

impl Track {
    fn new(rate: u32, path: Option<PathBuf>) -> Self {
        Self {
            rate,
            path,
            length: AtomicUsize::new(0),
            blocks: AtomicUsize::new(0),
            block: (0..TRACK_MAX_BLOCKS).map(|_| OnceLock::new()).collect(),
            import: Mutex::new(None),
            finished: AtomicBool::new(false),
        }
    }

    /// An empty track. Decks hold one of these until a real load happens.
    pub fn acquire_empty(rate: u32) -> Arc<Self> {
        let t = Self::new(rate, None);
        t.finished.store(true, Ordering::Release);
        Arc::new(t)
    }

    /// A track with `samples` of zeroed space pre-allocated, for the loop
    /// recorder. Fails when the request exceeds the block table.
    pub fn acquire_for_recording(rate: u32, samples: usize) -> Result<Arc<Self>, TrackError> {
        let t = Self::new(rate, None);
        t.ensure_space(samples)?;
        t.finished.store(true, Ordering::Release);
        Ok(Arc::new(t))
    }

    /// Spawn `importer path` and return a track that fills up as the child
    /// delivers interleaved s16le stereo on stdout.
    pub fn acquire_by_import(importer: &Path, path: &Path, rate: u32) -> Result<Arc<Self>, TrackError> {
        let mut child = Command::new(importer)
            .arg(path)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| TrackError::Spawn {
                importer: importer.display().to_string(),
                source,
            })?;
        let stdout = child.stdout.take().expect("importer stdout was piped");

        log::info!("importing {} (pid {})", path.display(), child.id());

        let t = Self::new(rate, Some(path.to_path_buf()));
        *t.import.lock().unwrap() = Some(ImportJob {
            child,
            stdout,
            carry: [0; 4],
            carry_len: 0,
            overrun_logged: false,
        });
        Ok(Arc::new(t))
    }

    pub fn rate(&self) -> u32 {
        self.rate
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Published sample count. Acquire pairs with the writer's release in
    /// [`Track::set_length`].
    #[inline]
    pub fn length(&self) -> usize {
        self.length.load(Ordering::Acquire)
    }

    /// Advance the published length. Caller must have written all samples
    /// below `samples` first.
    #[inline]
    pub fn set_length(&self, samples: usize) {
        self.length.store(samples, Ordering::Release);
    }

    pub fn is_importing(&self) -> bool {
        !self.finished.load(Ordering::Acquire)
    }

    /// Allocate blocks so that `samples` samples are addressable.
    pub fn ensure_space(&self, samples: usize) -> Result<(), TrackError> {
        if samples == 0 {
            return Ok(());
        }
        let need = (samples - 1) / TRACK_BLOCK_SAMPLES + 1;
        if need > TRACK_MAX_BLOCKS {
            return Err(TrackError::TooLong(samples));
        }
        let have = self.blocks.load(Ordering::Acquire);
        for i in have..need {
            self.block[i].get_or_init(TrackBlock::new);
        }
        if need > have {
            self.blocks.store(need, Ordering::Release);
        }
        Ok(())
    }

    /// Stereo sample at index `s`. Returns silence for unallocated space.
    #[inline]
    pub fn get_sample(&self, s: usize) -> (i16, i16) {
        match self.block[s / TRACK_BLOCK_SAMPLES].get() {
            Some(b) => {
                let off = (s % TRACK_BLOCK_SAMPLES) * TRACK_CHANNELS;
                let pcm = b.pcm();
                (pcm[off], pcm[off + 1])
            }
            None => (0, 0),
        }
    }

    /// Write a stereo sample. Space must already be allocated; single
    /// writer only (see module contract).
    #[inline]
    pub fn write_sample(&self, s: usize, left: i16, right: i16) {
        if let Some(b) = self.block[s / TRACK_BLOCK_SAMPLES].get() {
            b.write((s % TRACK_BLOCK_SAMPLES) * TRACK_CHANNELS, left, right);
        }
    }

    /// Contiguous interleaved view of `count` samples starting at `start`,
    /// if the range lies within one allocated block. The interpolators use
    /// this as their direct-access fast path.
    #[inline]
    pub fn sample_window(&self, start: usize, count: usize) -> Option<&[i16]> {
        let end = start + count - 1;
        let block_idx = start / TRACK_BLOCK_SAMPLES;
        if end / TRACK_BLOCK_SAMPLES != block_idx {
            return None;
        }
        let b = self.block[block_idx].get()?;
        let off = (start % TRACK_BLOCK_SAMPLES) * TRACK_CHANNELS;
        Some(&b.pcm()[off..off + count * TRACK_CHANNELS])
    }

    /// File descriptor to poll while the importer is running.
    pub fn poll_fd(&self) -> Option<RawFd> {
        self.import
            .lock()
            .unwrap()
            .as_ref()
            .map(|job| job.stdout.as_raw_fd())
    }

    /// Drain available importer output into the block store. Returns true
    /// once the import has finished (successfully or not).
    pub fn handle(&self) -> bool {
        let mut guard = self.import.lock().unwrap();
        let Some(job) = guard.as_mut() else {
            return true;
        };

        let mut buf = [0u8; IMPORT_READ_BYTES];
        match job.stdout.read(&mut buf) {
            Ok(0) => {
                let status = job.child.wait();
                match status {
                    Ok(st) if st.success() => {
                        log::info!(
                            "import finished: {} samples ({:.1}s)",
                            self.length(),
                            self.length() as f64 / self.rate as f64
                        );
                    }
                    Ok(st) => log::warn!("importer exited with {st}; keeping partial track"),
                    Err(e) => log::warn!("importer wait failed: {e}"),
                }
                *guard = None;
                self.finished.store(true, Ordering::Release);
                true
            }
            Ok(n) => {
                self.consume_pcm(job, &buf[..n]);
                false
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => false,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => false,
            Err(e) => {
                log::warn!("importer read failed: {e}; keeping partial track");
                let _ = job.child.kill();
                let _ = job.child.wait();
                *guard = None;
                self.finished.store(true, Ordering::Release);
                true
            }
        }
    }

    fn consume_pcm(&self, job: &mut ImportJob, mut bytes: &[u8]) {
        let mut written = self.length.load(Ordering::Relaxed);

        // Complete a partial frame left over from the previous read.
        if job.carry_len > 0 {
            while job.carry_len < 4 && !bytes.is_empty() {
                job.carry[job.carry_len] = bytes[0];
                job.carry_len += 1;
                bytes = &bytes[1..];
            }
            if job.carry_len < 4 {
                return;
            }
            let carry = job.carry;
            if self.store_frame(written, &carry, job) {
                written += 1;
            }
            job.carry_len = 0;
        }

        let frames = bytes.len() / 4;
        if self.ensure_space(written + frames).is_err() {
            if !job.overrun_logged {
                job.overrun_logged = true;
                log::warn!("track full, discarding further importer output");
            }
        } else {
            for frame in bytes.chunks_exact(4) {
                let l = i16::from_le_bytes([frame[0], frame[1]]);
                let r = i16::from_le_bytes([frame[2], frame[3]]);
                self.write_sample(written, l, r);
                written += 1;
            }
        }

        let rest = &bytes[frames * 4..];
        job.carry[..rest.len()].copy_from_slice(rest);
        job.carry_len = rest.len();

        self.set_length(written);
    }

    fn store_frame(&self, at: usize, frame: &[u8; 4], job: &mut ImportJob) -> bool {
        if self.ensure_space(at + 1).is_err() {
            if !job.overrun_logged {
                job.overrun_logged = true;
                log::warn!("track full, discarding further importer output");
            }
            return false;
        }
        let l = i16::from_le_bytes([frame[0], frame[1]]);
        let r = i16::from_le_bytes([frame[2], frame[3]]);
        self.write_sample(at, l, r);
        true
    }
}

impl Drop for Track {
    fn drop(&mut self) {
        if let Some(mut job) = self.import.get_mut().unwrap().take() {
            let _ = job.child.kill();
            let _ = job.child.wait();
        }
    }
}

impl std::fmt::Debug for Track {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Track")
            .field("rate", &self.rate)
            .field("path", &self.path)
            .field("length", &self.length())
            .field("blocks", &self.blocks.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_index_maps_to_block_and_offset() {
        let t = Track::acquire_for_recording(48_000, TRACK_BLOCK_SAMPLES + 16).unwrap();
        t.write_sample(3, 100, -100);
        t.write_sample(TRACK_BLOCK_SAMPLES + 2, 7, 8);
        t.set_length(TRACK_BLOCK_SAMPLES + 16);

        assert_eq!(t.get_sample(3), (100, -100));
        assert_eq!(t.get_sample(TRACK_BLOCK_SAMPLES + 2), (7, 8));
        assert_eq!(t.get_sample(4), (0, 0));
    }

    #[test]
    fn window_is_contiguous_within_a_block_only() {
        let t = Track::acquire_for_recording(48_000, TRACK_BLOCK_SAMPLES * 2).unwrap();
        for s in 0..8 {
            t.write_sample(s, s as i16, -(s as i16));
        }
        let w = t.sample_window(2, 4).unwrap();
        assert_eq!(w, &[2, -2, 3, -3, 4, -4, 5, -5]);

        // Straddles the block boundary: no direct window.
        assert!(t.sample_window(TRACK_BLOCK_SAMPLES - 2, 4).is_none());
    }

    #[test]
    fn ensure_space_rejects_oversized_requests() {
        let t = Track::acquire_empty(48_000);
        assert!(t
            .ensure_space(TRACK_MAX_BLOCKS * TRACK_BLOCK_SAMPLES + 1)
            .is_err());
    }

    #[test]
    fn empty_track_reports_finished() {
        let t = Track::acquire_empty(48_000);
        assert!(!t.is_importing());
        assert_eq!(t.length(), 0);
    }
}
