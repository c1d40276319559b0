//! Local copy of an uploaded video
//!
//! The file lives only for the duration of one ingestion. It is removed by
//! [`TransientVideo::cleanup`] or, failing that, when the value is dropped.

use std::io;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tracing::debug;

pub struct TransientVideo {
    file: NamedTempFile,
    extension: String,
}

impl TransientVideo {
    /// Create an empty temp file in `dir` (system temp dir when `None`).
    ///
    /// The extension is taken from `original_name`, defaulting to `mp4`.
    pub fn create(dir: Option<&Path>, original_name: Option<&str>) -> io::Result<Self> {
        let extension = original_name
            .map(Path::new)
            .and_then(Path::extension)
            .and_then(|e| e.to_str())
            .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
            .map_or_else(|| "mp4".to_string(), str::to_ascii_lowercase);

        let suffix = format!(".{extension}");
        let mut builder = tempfile::Builder::new();
        builder.prefix("upload-").suffix(&suffix);
        let file = match dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        debug!("Created transient video {}", file.path().display());

        Ok(Self { file, extension })
    }

    /// Write `bytes` into a new transient file
    pub async fn from_bytes(
        dir: Option<&Path>,
        original_name: Option<&str>,
        bytes: &[u8],
    ) -> io::Result<Self> {
        let video = Self::create(dir, original_name)?;
        let mut writer = video.writer()?;
        writer.write_all(bytes).await?;
        writer.flush().await?;
        Ok(video)
    }

    /// Independent write handle for streaming the upload into the file
    pub fn writer(&self) -> io::Result<tokio::fs::File> {
        Ok(tokio::fs::File::from_std(self.file.reopen()?))
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Lowercase extension without the dot
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Delete the file now and surface any error
    pub fn cleanup(self) -> io::Result<PathBuf> {
        let path = self.file.path().to_path_buf();
        self.file.close()?;
        debug!("Removed transient video {}", path.display());
        Ok(path)
    }
}

impl AsRef<Path> for TransientVideo {
    fn as_ref(&self) -> &Path {
        self.path()
    }
}
