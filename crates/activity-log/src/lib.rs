//! Strictly serialized delivery of browser activity records.
//!
//! Producers append [`EventRecord`]s through a cloneable [`LogQueue`]. A
//! single background [`DrainLoop`] owns the queue and hands records to one
//! [`Sink`] at a time, in submission order, never starting a write before the
//! previous one has completed. Two sinks are provided:
//!
//! * [`FileSink`] appends one JSON object per line to a local file.
//! * [`HttpSink`] POSTs each record to a logging server, authenticated with
//!   the submitter's credential.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use activity_log::{DrainConfig, DrainLoop, EventKind, EventRecord, FileSink, TabSnapshot};
//! use credential_vault::Credential;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let sink = FileSink::open("/home/me/.firefox_history.log").await?;
//! let (queue, handle) = DrainLoop::start(Box::new(sink), DrainConfig::default());
//!
//! let tab = TabSnapshot::new("1", 0, "Example", "https://example.com/");
//! let credential = Credential::new("Search Task Logger", "alice", "key");
//! let receipt = queue.submit(
//!     EventRecord::capture("alice", EventKind::TabOpened, &tab),
//!     credential,
//! );
//! receipt.wait().await?;
//! handle.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod drain;
pub mod entry;
pub mod http;
pub mod queue;
pub mod sink;
pub mod writer;

// Re-export primary public types at the crate root for convenience.
pub use drain::{DrainConfig, DrainHandle, DrainLoop, DrainStats};
pub use entry::{EventKind, EventRecord, TabSnapshot};
pub use http::HttpSink;
pub use queue::{EventQueue, LogQueue, QueuedRecord, Receipt, SubmissionError};
pub use sink::{Ack, Sink, SinkKind, Submission, WriteError};
pub use writer::FileSink;
