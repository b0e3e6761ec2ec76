//! Local storage for generated images.
//!
//! A [`GeneratedAsset`] owns its file: the file is removed when the handle is
//! dropped, so every exit path after delivery (success, send error, panic
//! unwinding) cleans up after itself.

use std::path::{Path, PathBuf};

use chrono::Utc;
use uuid::Uuid;

/// Directory that generated images are written to.
#[derive(Debug, Clone)]
pub struct AssetStore {
    dir: PathBuf,
}

impl AssetStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Write `bytes` to a fresh, uniquely named file.
    ///
    /// Names are `<YYYYmmdd_HHMMSS>_<uuid>.png`; the random suffix keeps two
    /// assets created within the same second apart.
    pub async fn persist(&self, bytes: &[u8]) -> std::io::Result<GeneratedAsset> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let file_name = format!(
            "{}_{}.png",
            Utc::now().format("%Y%m%d_%H%M%S"),
            Uuid::new_v4().simple()
        );
        let path = self.dir.join(file_name);

        tokio::fs::write(&path, bytes).await?;
        tracing::debug!(path = %path.display(), size = bytes.len(), "Asset persisted");

        Ok(GeneratedAsset { path })
    }
}

/// Handle to a locally persisted image; the file lives as long as the handle.
#[derive(Debug)]
pub struct GeneratedAsset {
    path: PathBuf,
}

impl GeneratedAsset {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image.png".to_string())
    }

    pub async fn read(&self) -> std::io::Result<Vec<u8>> {
        tokio::fs::read(&self.path).await
    }
}

impl Drop for GeneratedAsset {
    fn drop(&mut self) {
        // Blocking, but a single unlink of a small file; async cleanup could
        // not guarantee removal before the handle is gone.
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "Asset removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to remove asset"
            ),
        }
    }
}
