use std::path::{Path, PathBuf};

/// Layout of the recorder's working directory.
///
/// Recordings go under `media/`; the status file sits next to it so `--status`
/// can find a running instance from the same directory.
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory recordings are written to.
    pub fn media_dir(&self) -> PathBuf {
        self.root.join("media")
    }

    /// Path to the status file.
    pub fn status(&self) -> PathBuf {
        self.root.join("recorder.status")
    }

    /// Create the root and media directories if missing.
    /// Returns Ok(true) if the media directory was created, Ok(false) if it already existed.
    pub fn init(&self) -> std::io::Result<bool> {
        let media = self.media_dir();
        let created = !media.exists();
        std::fs::create_dir_all(&media)?;
        Ok(created)
    }
}
