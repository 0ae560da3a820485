//! Ephemeral request-owned upload assets.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::warn;

/// A spooled upload owned exclusively by one request.
///
/// The backing file is removed when the asset drops, which covers every
/// exit path — success, rejection, and panic unwind — exactly once.
/// Removal failure is logged and never surfaces into the request outcome.
#[derive(Debug)]
pub struct EphemeralAsset {
    file: Option<NamedTempFile>,
    path: PathBuf,
}

impl EphemeralAsset {
    /// Spools `bytes` into a fresh temp file.
    pub fn from_bytes(bytes: &[u8]) -> std::io::Result<Self> {
        let mut file = NamedTempFile::new()?;
        file.write_all(bytes)?;
        file.flush()?;
        let path = file.path().to_path_buf();
        Ok(Self {
            file: Some(file),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the spooled bytes back.
    pub async fn read(&self) -> std::io::Result<Vec<u8>> {
        tokio::fs::read(&self.path).await
    }
}

impl Drop for EphemeralAsset {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            if let Err(e) = file.close() {
                warn!(error = %e, "failed to remove ephemeral upload");
            }
        }
    }
}

/// The two ephemeral user-supplied inputs of one transform request.
#[derive(Debug)]
pub struct SwapJob {
    pub primary: EphemeralAsset,
    pub secondary: EphemeralAsset,
}

impl SwapJob {
    pub fn new(primary: EphemeralAsset, secondary: EphemeralAsset) -> Self {
        Self { primary, secondary }
    }
}
