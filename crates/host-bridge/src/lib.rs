//! Localhost WebSocket bridge between the browser extension and the logger.
//!
//! The extension owns the browser side: it forwards window and tab events,
//! the logging toggle and ratings, and renders the credential and
//! login-method panels. This crate owns the daemon side of that
//! conversation.
//!
//! # Architecture
//!
//! ```text
//! Extension  <--WS-->  Bridge  -->  [worker]  -->  LoggerSession  -->  LogQueue
//!                        |                              |
//!                        +------ replies ------>  BridgePrompt
//! ```
//!
//! The bridge validates the `Origin` header of each upgrade request, so only
//! extension pages and local tools can connect. The most recent connection
//! is the one prompts are shown on.

pub mod listener;
pub mod origin;
pub mod prompt;
pub mod protocol;

// Re-export the primary public types at the crate root for convenience.
pub use listener::{Bridge, BridgeConfig};
pub use origin::{OriginPolicy, OriginRejection, DEFAULT_ALLOWLIST};
pub use prompt::BridgePrompt;
pub use protocol::{ExtensionMessage, HostMessage};
