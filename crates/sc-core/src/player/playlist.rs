//! Sample folder index.
//!
//! A playlist is a flat vector of folders, each with a sorted vector of
//! audio files; navigation is index-based so the control side never chases
//! pointers. Audio files directly under the root form the first folder,
//! followed by one folder per subdirectory, sorted by name.

use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct ScFile {
    pub name: String,
    pub full_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct Folder {
    pub name: String,
    pub files: Vec<ScFile>,
}

#[derive(Debug, Default)]
pub struct Playlist {
    folders: Vec<Folder>,
}

const AUDIO_EXTENSIONS: &[&str] = &[
    "mp3", "wav", "flac", "ogg", "m4a", "aac", "aiff", "aif", "opus", "wma",
];

fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| AUDIO_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn scan_files(dir: &Path) -> Vec<ScFile> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<ScFile> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && is_audio_file(p))
        .map(|p| ScFile {
            name: p
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            full_path: p,
        })
        .collect();
    files.sort_by(|a, b| a.name.cmp(&b.name));
    files
}

impl Playlist {
    /// Index `root`: loose audio files first, then one folder per sorted
    /// subdirectory.
    pub fn load(root: &Path) -> Self {
        let mut folders = Vec::new();

        let loose = scan_files(root);
        if !loose.is_empty() {
            folders.push(Folder {
                name: root
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| ".".to_string()),
                files: loose,
            });
        }

        if let Ok(entries) = fs::read_dir(root) {
            let mut dirs: Vec<PathBuf> = entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.is_dir())
                .collect();
            dirs.sort();
            for dir in dirs {
                let files = scan_files(&dir);
                if !files.is_empty() {
                    folders.push(Folder {
                        name: dir
                            .file_name()
                            .map(|n| n.to_string_lossy().into_owned())
                            .unwrap_or_default(),
                        files,
                    });
                }
            }
        }

        Self { folders }
    }

    pub fn num_folders(&self) -> usize {
        self.folders.len()
    }

    pub fn total_files(&self) -> usize {
        self.folders.iter().map(|f| f.files.len()).sum()
    }

    pub fn get_file(&self, folder: usize, file: usize) -> Option<&ScFile> {
        self.folders.get(folder)?.files.get(file)
    }

    /// The nth file counting across all folders.
    pub fn get_file_at_index(&self, mut index: usize) -> Option<&ScFile> {
        for folder in &self.folders {
            if index < folder.files.len() {
                return Some(&folder.files[index]);
            }
            index -= folder.files.len();
        }
        None
    }

    pub fn has_next_file(&self, folder: usize, file: usize) -> bool {
        self.folders
            .get(folder)
            .is_some_and(|f| file + 1 < f.files.len())
    }

    pub fn has_next_folder(&self, folder: usize) -> bool {
        folder + 1 < self.folders.len()
    }

    pub fn has_prev_folder(&self, folder: usize) -> bool {
        folder > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_tree() -> PathBuf {
        let root = std::env::temp_dir().join(format!("sc1000-playlist-{}", std::process::id()));
        let _ = fs::remove_dir_all(&root);
        fs::create_dir_all(root.join("b-kicks")).unwrap();
        fs::create_dir_all(root.join("a-vocals")).unwrap();
        fs::write(root.join("loose.wav"), b"x").unwrap();
        fs::write(root.join("readme.txt"), b"x").unwrap();
        fs::write(root.join("a-vocals/ahh.mp3"), b"x").unwrap();
        fs::write(root.join("a-vocals/fresh.MP3"), b"x").unwrap();
        fs::write(root.join("b-kicks/kick.flac"), b"x").unwrap();
        root
    }

    #[test]
    fn indexes_folders_and_files_sorted() {
        let root = build_tree();
        let pl = Playlist::load(&root);

        assert_eq!(pl.num_folders(), 3);
        assert_eq!(pl.total_files(), 4);

        // Loose files first, then sorted subfolders
        assert_eq!(pl.get_file(0, 0).unwrap().name, "loose.wav");
        assert_eq!(pl.get_file(1, 0).unwrap().name, "ahh.mp3");
        assert_eq!(pl.get_file(1, 1).unwrap().name, "fresh.MP3");
        assert_eq!(pl.get_file(2, 0).unwrap().name, "kick.flac");

        assert!(pl.has_next_file(1, 0));
        assert!(!pl.has_next_file(1, 1));
        assert!(pl.has_next_folder(0));
        assert!(!pl.has_next_folder(2));
        assert!(!pl.has_prev_folder(0));

        assert_eq!(pl.get_file_at_index(3).unwrap().name, "kick.flac");
        assert!(pl.get_file_at_index(4).is_none());

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn missing_root_yields_empty_playlist() {
        let pl = Playlist::load(Path::new("/nonexistent/sc1000"));
        assert_eq!(pl.total_files(), 0);
    }
}
