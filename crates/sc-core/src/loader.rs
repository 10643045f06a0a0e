//! Track loading via the external importer.
//!
//! The importer subprocess decodes any source file to raw interleaved
//! s16le stereo on stdout; the rig polls each importing track's descriptor
//! and drains it into the block store. `TrackLoader` is the shared handle
//! the decks use to start imports and the rig uses to find live
//! descriptors.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::track::{Track, TrackError};

#[derive(Clone)]
pub struct TrackLoader {
    importer: PathBuf,
    sample_rate: u32,
    importing: Arc<Mutex<Vec<Arc<Track>>>>,
}

impl TrackLoader {
    pub fn new(importer: PathBuf, sample_rate: u32) -> Self {
        Self {
            importer,
            sample_rate,
            importing: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Spawn an import and register the track for rig polling.
    pub fn import(&self, path: &Path) -> Result<Arc<Track>, TrackError> {
        let track = Track::acquire_by_import(&self.importer, path, self.sample_rate)?;
        self.importing.lock().unwrap().push(Arc::clone(&track));
        Ok(track)
    }

    /// Tracks currently importing (finished ones are dropped from the
    /// registry here).
    pub fn importing(&self) -> Vec<Arc<Track>> {
        let mut guard = self.importing.lock().unwrap();
        guard.retain(|t| t.is_importing());
        guard.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn import_via_cat_fills_track() {
        // Use /bin/cat as the importer: the "decoded" output is the file
        // itself, which we fill with known little-endian frames.
        let src = std::env::temp_dir().join(format!("sc1000-import-{}.raw", std::process::id()));
        let mut pcm = Vec::new();
        for s in 0..1000i16 {
            pcm.extend_from_slice(&s.to_le_bytes());
            pcm.extend_from_slice(&(-s).to_le_bytes());
        }
        std::fs::write(&src, &pcm).unwrap();

        let loader = TrackLoader::new(PathBuf::from("/bin/cat"), 48_000);
        let track = loader.import(&src).unwrap();
        assert!(track.is_importing());
        assert_eq!(loader.importing().len(), 1);

        // Drain until the importer signals EOF
        let mut guard = 0;
        while !track.handle() {
            guard += 1;
            assert!(guard < 10_000, "import did not finish");
        }

        assert_eq!(track.length(), 1000);
        assert_eq!(track.get_sample(10), (10, -10));
        assert_eq!(track.get_sample(999), (999, -999));
        assert!(!track.is_importing());
        assert!(loader.importing().is_empty());

        let _ = std::fs::remove_file(src);
    }

    #[test]
    fn missing_importer_fails_to_spawn() {
        let loader = TrackLoader::new(PathBuf::from("/nonexistent/importer"), 48_000);
        assert!(loader.import(Path::new("/tmp/x.mp3")).is_err());
    }
}
