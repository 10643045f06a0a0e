//! Cue points, persisted in a plain-text sidecar next to the source file.
//!
//! The file format is one floating-point position per line, the line
//! number being the label; unset labels are written as a sentinel. This
//! stays bit-compatible with sidecars written by earlier firmware.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Sentinel written for unset labels.
pub const CUE_FILE_UNSET: f64 = -1.0;

/// Highest addressable cue label.
pub const MAX_CUE_LABEL: u32 = 511;

/// Replace the source file's extension with `.cue`. Files without an
/// extension get no sidecar.
fn cue_path(pathname: &Path) -> Option<PathBuf> {
    pathname.extension()?;
    Some(pathname.with_extension("cue"))
}

/// Sparse label -> position map.
#[derive(Debug, Default, Clone)]
pub struct Cues {
    positions: BTreeMap<u32, f64>,
}

impl Cues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, label: u32, position: f64) {
        if label <= MAX_CUE_LABEL {
            self.positions.insert(label, position);
        }
    }

    pub fn get(&self, label: u32) -> Option<f64> {
        self.positions.get(&label).copied()
    }

    pub fn unset(&mut self, label: u32) {
        self.positions.remove(&label);
    }

    pub fn is_set(&self, label: u32) -> bool {
        self.positions.contains_key(&label)
    }

    pub fn reset(&mut self) {
        self.positions.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Load the sidecar for `pathname`, replacing the current set. Absent
    /// or unreadable sidecars leave an empty set.
    pub fn load_from_file(&mut self, pathname: &Path) {
        self.positions.clear();
        let Some(path) = cue_path(pathname) else {
            return;
        };
        let Ok(file) = File::open(&path) else {
            return;
        };

        for (index, line) in BufReader::new(file).lines().enumerate() {
            let Ok(line) = line else {
                break;
            };
            if let Ok(position) = line.trim().parse::<f64>() {
                if position != CUE_FILE_UNSET {
                    self.set(index as u32, position);
                }
            }
        }
    }

    /// Write the sidecar for `pathname`. Nothing is written when no cue is
    /// set, or when cue 0 sits at 0.0 (likely uninitialized).
    pub fn save_to_file(&self, pathname: &Path) {
        if self.positions.is_empty() {
            return;
        }
        if self.get(0) == Some(0.0) {
            return;
        }
        let Some(path) = cue_path(pathname) else {
            return;
        };

        let file = match File::create(&path) {
            Ok(f) => f,
            Err(e) => {
                log::warn!("cannot write {}: {e}", path.display());
                return;
            }
        };

        log::debug!("saving cues: {}", path.display());

        let max_label = *self.positions.keys().next_back().unwrap();
        let mut out = BufWriter::new(file);
        for label in 0..=max_label {
            let position = self.get(label).unwrap_or(CUE_FILE_UNSET);
            if writeln!(out, "{position}").is_err() {
                return;
            }
        }

        match out.into_inner() {
            Ok(f) => {
                let _ = f.sync_all();
            }
            Err(e) => log::warn!("cue write failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_audio_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("sc1000-cues-{name}-{}.mp3", std::process::id()))
    }

    #[test]
    fn set_save_load_round_trip() {
        let path = temp_audio_path("roundtrip");
        let mut cues = Cues::new();
        cues.set(0, 1.5);
        cues.set(3, 12.25);
        cues.save_to_file(&path);

        let mut loaded = Cues::new();
        loaded.load_from_file(&path);
        assert_eq!(loaded.get(0), Some(1.5));
        assert_eq!(loaded.get(1), None);
        assert_eq!(loaded.get(2), None);
        assert_eq!(loaded.get(3), Some(12.25));

        let _ = std::fs::remove_file(path.with_extension("cue"));
    }

    #[test]
    fn empty_set_writes_nothing() {
        let path = temp_audio_path("empty");
        let cues = Cues::new();
        cues.save_to_file(&path);
        assert!(!path.with_extension("cue").exists());
    }

    #[test]
    fn zeroed_cue_zero_writes_nothing() {
        let path = temp_audio_path("zeroed");
        let mut cues = Cues::new();
        cues.set(0, 0.0);
        cues.set(1, 5.0);
        cues.save_to_file(&path);
        assert!(!path.with_extension("cue").exists());
    }

    #[test]
    fn labels_above_range_are_ignored() {
        let mut cues = Cues::new();
        cues.set(5000, 1.0);
        assert!(cues.is_empty());
    }

    #[test]
    fn extensionless_path_has_no_sidecar() {
        assert!(cue_path(Path::new("/tmp/noext")).is_none());
        assert_eq!(
            cue_path(Path::new("/a/b.mp3")),
            Some(PathBuf::from("/a/b.cue"))
        );
    }
}
