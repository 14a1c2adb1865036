use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::sink::{Ack, Sink, SinkKind, Submission, WriteError};

/// Append-only file sink that serialises records as JSON lines.
///
/// Each call to [`write`](Sink::write) produces exactly one
/// newline-terminated JSON object. Earlier lines are never rewritten. A local
/// file has no notion of an invalid credential, so every completed append is
/// an acknowledgement.
pub struct FileSink {
    path: PathBuf,
    file: tokio::fs::File,
}

impl FileSink {
    /// Open (or create) the log file at `path` in append mode.
    ///
    /// Parent directories are created automatically if they do not exist.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, WriteError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(WriteError::CreateDir)?;
            }
        }

        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(WriteError::OpenFile)?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Sink for FileSink {
    fn kind(&self) -> SinkKind {
        SinkKind::File
    }

    async fn write(&mut self, submission: &Submission) -> Result<Ack, WriteError> {
        let mut line = serde_json::to_vec(&submission.record)?;
        line.push(b'\n');

        self.file
            .write_all(&line)
            .await
            .map_err(WriteError::Write)?;
        // tokio hands the bytes to a background write; wait for it to land.
        self.file.flush().await.map_err(WriteError::Write)?;

        Ok(Ack {
            sink: SinkKind::File,
            status: None,
        })
    }

    async fn flush(&mut self) -> Result<(), WriteError> {
        self.file.flush().await.map_err(WriteError::Flush)
    }

    async fn close(&mut self) -> Result<(), WriteError> {
        self.file.flush().await.map_err(WriteError::Flush)?;
        self.file.sync_all().await.map_err(WriteError::Flush)
    }
}
