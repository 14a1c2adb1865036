//! Credential-gated browser activity logging.
//!
//! A [`LoggerSession`] receives browser events, makes sure a credential for
//! its realm is on file, and queues one record per event on an
//! [`activity_log::LogQueue`]. When no credential exists the
//! [`AcquisitionFlow`] asks the user for one through a [`PromptUi`] and
//! checks it with a [`CredentialValidator`]. The stock [`PipelineValidator`]
//! sends a "Testing API key" record through the same queue, so a credential
//! is valid exactly when the sink accepts a write made with it.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use activity_log::{DrainConfig, DrainLoop, EventKind, FileSink, TabSnapshot};
//! use credential_vault::MemoryCredentialStore;
//! use logger_session::{BrowserEvent, LoggerSession, PromptUi};
//!
//! # async fn example(prompt: Arc<dyn PromptUi>) -> Result<(), Box<dyn std::error::Error>> {
//! let sink = FileSink::open(".firefox_history.log").await?;
//! let (queue, drain) = DrainLoop::start(Box::new(sink), DrainConfig::default());
//!
//! let session = LoggerSession::new(
//!     "Search Task Logger",
//!     Arc::new(MemoryCredentialStore::new()),
//!     queue,
//!     prompt,
//! );
//! session.set_logging(true).await;
//!
//! let tab = TabSnapshot::new("1", 0, "Example", "https://example.com/");
//! session.log_event(BrowserEvent::now(EventKind::TabOpened, tab)).await;
//!
//! drop(session);
//! drain.finished().await;
//! # Ok(())
//! # }
//! ```

pub mod acquisition;
pub mod focus;
pub mod prompt;
pub mod session;
pub mod validator;

#[cfg(test)]
mod testing;

// Re-export primary public types at the crate root for convenience.
pub use acquisition::{AbandonReason, AcquisitionFlow, AcquisitionOutcome, AcquisitionState};
pub use focus::FocusTracker;
pub use prompt::{CredentialReply, LoginMethodReply, PromptKind, PromptUi};
pub use session::{BrowserEvent, LogDisposition, LoggerSession, LoginResult};
pub use validator::{CredentialValidator, PipelineValidator};
