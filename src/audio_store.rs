// Transient audio store
//
// Each upload is written to a uniquely named file in the staging directory and
// removed again when its `StagedAudio` handle is released or dropped.

use log::{debug, error, info};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Suffix used when the declared filename carries no usable extension
pub const DEFAULT_SUFFIX: &str = ".bin";

/// Longest extension accepted from a client filename
const MAX_EXTENSION_LEN: usize = 16;

/// Derives the staged file suffix from the declared filename
///
/// Returns `.ext` when the filename has a non-empty alphanumeric extension and
/// [`DEFAULT_SUFFIX`] otherwise. Only the extension of the client filename is
/// ever used, never its directory components.
pub fn suffix_for(filename: Option<&str>) -> String {
    filename
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| {
            !ext.is_empty()
                && ext.len() <= MAX_EXTENSION_LEN
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
        })
        .map(|ext| format!(".{}", ext))
        .unwrap_or_else(|| DEFAULT_SUFFIX.to_string())
}

/// Removes a staged file
///
/// A file that no longer exists is not an error. Any other failure is logged
/// and swallowed: releasing must never change the outcome of a request.
pub fn release_path(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!("Released staged audio: {}", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("Staged audio already removed: {}", path.display())
        }
        Err(e) => error!("Failed to remove staged audio {}: {}", path.display(), e),
    }
}

/// Removes a partially written file from async code
async fn discard_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Discarded partial upload: {}", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => error!("Failed to remove partial upload {}: {}", path.display(), e),
    }
}

/// Staging area for uploaded audio
#[derive(Clone, Debug)]
pub struct AudioStore {
    dir: PathBuf,
}

impl AudioStore {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the staged files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes `payload` to a new uniquely named file
    ///
    /// A failed write removes the partial file before the error is returned,
    /// so nothing is left behind on disk.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if the directory cannot be created or
    /// the payload cannot be fully written.
    pub async fn stage(&self, payload: &[u8], filename: Option<&str>) -> io::Result<StagedAudio> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let suffix = suffix_for(filename);
        let path = self
            .dir
            .join(format!("stt_{}{}", Uuid::new_v4(), suffix));

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;

        let written = match file.write_all(payload).await {
            Ok(()) => file.flush().await,
            Err(e) => Err(e),
        };
        drop(file);
        if let Err(e) = written {
            discard_partial(&path).await;
            return Err(e);
        }

        let staged = StagedAudio {
            path,
            suffix,
            released: false,
        };

        info!(
            "Staged {} bytes of audio at {}",
            payload.len(),
            staged.path.display()
        );
        Ok(staged)
    }
}

/// One staged upload, exclusively owned by the request that created it
///
/// The file is removed exactly once: by [`StagedAudio::release`] or, failing
/// that, when the handle is dropped.
#[derive(Debug)]
pub struct StagedAudio {
    path: PathBuf,
    suffix: String,
    released: bool,
}

impl StagedAudio {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Suffix (including the leading dot) chosen for the staged file
    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// Removes the staged file now
    pub fn release(mut self) {
        self.release_once();
    }

    fn release_once(&mut self) {
        if !self.released {
            self.released = true;
            release_path(&self.path);
        }
    }
}

impl Drop for StagedAudio {
    fn drop(&mut self) {
        self.release_once();
    }
}
