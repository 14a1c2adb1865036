//! Realm-scoped credential storage for the tab-logger project.
//!
//! A credential vault groups entries by *realm*: the key under which one
//! application keeps its identity among everything else stored in the same
//! vault. Each realm holds at most one active [`Credential`]; replacing it is
//! a single atomic step, so a concurrent reader always observes either the
//! previous credential or the new one.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use credential_vault::{Credential, CredentialStore, FileCredentialStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = FileCredentialStore::new("/var/lib/tab-logger/credentials.json");
//! let realm = "Search Task Logger";
//!
//! store
//!     .replace(realm, Credential::new(realm, "alice", "api-key"))
//!     .await?;
//! assert!(store.find(realm).await?.is_some());
//! # Ok(())
//! # }
//! ```

pub mod credential;
pub mod file;
pub mod memory;
pub mod store;

pub use credential::Credential;
pub use file::FileCredentialStore;
pub use memory::MemoryCredentialStore;
pub use store::{CredentialStore, StoreError};
