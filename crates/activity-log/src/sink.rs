use async_trait::async_trait;
use credential_vault::Credential;

use crate::entry::EventRecord;

/// A record together with the identity it is submitted under.
///
/// File sinks ignore the credential; the HTTP sink turns it into an
/// `Authorization` header.
#[derive(Debug, Clone)]
pub struct Submission {
    pub record: EventRecord,
    pub credential: Credential,
}

impl Submission {
    pub fn new(record: EventRecord, credential: Credential) -> Self {
        Self { record, credential }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    File,
    Http,
}

/// Confirmation that a sink durably accepted one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    pub sink: SinkKind,
    /// HTTP status for remote sinks.
    pub status: Option<u16>,
}

/// Errors raised while opening or writing to a [`Sink`].
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("failed to create parent directories: {0}")]
    CreateDir(std::io::Error),

    #[error("failed to open activity log file: {0}")]
    OpenFile(std::io::Error),

    #[error("failed to serialize event record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write to activity log: {0}")]
    Write(std::io::Error),

    #[error("failed to flush activity log: {0}")]
    Flush(std::io::Error),

    #[error("failed to build HTTP client: {0}")]
    Client(String),

    /// No response at all: connection refused, DNS failure, timeout.
    #[error("logging endpoint unreachable: {0}")]
    Unreachable(String),

    /// The server answered, but not with `201 Created`.
    #[error("logging endpoint rejected the record with status {status}")]
    Rejected { status: u16 },
}

impl WriteError {
    /// Short label used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            WriteError::CreateDir(_) | WriteError::OpenFile(_) => "open",
            WriteError::Serialize(_) => "serialize",
            WriteError::Write(_) | WriteError::Flush(_) => "filesystem",
            WriteError::Client(_) => "client",
            WriteError::Unreachable(_) => "unreachable",
            WriteError::Rejected { .. } => "rejected",
        }
    }

    /// Whether another attempt at the same record could succeed.
    ///
    /// A rejection is the server's verdict on the record and is final.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            WriteError::Unreachable(_) | WriteError::Write(_) | WriteError::Flush(_)
        )
    }
}

/// A durable destination for event records.
///
/// Callers must not issue a second `write` before the previous one has
/// returned; the drain loop guarantees this, the sink does not check it.
#[async_trait]
pub trait Sink: Send {
    fn kind(&self) -> SinkKind;

    /// Commit one record.
    async fn write(&mut self, submission: &Submission) -> Result<Ack, WriteError>;

    /// Push buffered output to the storage medium.
    async fn flush(&mut self) -> Result<(), WriteError> {
        Ok(())
    }

    /// Release the underlying handle. Called once, at shutdown.
    async fn close(&mut self) -> Result<(), WriteError> {
        self.flush().await
    }
}
