use async_trait::async_trait;

use crate::credential::Credential;

/// Errors raised by a [`CredentialStore`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to read credential vault: {0}")]
    Read(std::io::Error),

    #[error("credential vault is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("failed to write credential vault: {0}")]
    Write(std::io::Error),

    #[error("failed to commit credential vault: {0}")]
    Commit(std::io::Error),

    #[error("credential realm mismatch: expected '{expected}', got '{got}'")]
    RealmMismatch { expected: String, got: String },
}

/// Realm-scoped credential storage.
///
/// Implementations must make [`replace`](Self::replace) atomic: a concurrent
/// [`find`](Self::find) observes either the previous credential or the new
/// one, never an empty realm that was not empty before. A failed replace
/// leaves the previous state untouched.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Look up the active credential for `realm`.
    async fn find(&self, realm: &str) -> Result<Option<Credential>, StoreError>;

    /// Drop every credential stored for `realm` and store `credential` in
    /// their place, as one step.
    async fn replace(&self, realm: &str, credential: Credential) -> Result<(), StoreError>;

    /// Remove every credential stored for `realm`. Clearing an empty realm
    /// succeeds.
    async fn clear(&self, realm: &str) -> Result<(), StoreError>;
}

/// Reject a credential whose realm does not match the realm it is filed
/// under.
pub(crate) fn check_realm(realm: &str, credential: &Credential) -> Result<(), StoreError> {
    if credential.realm != realm {
        return Err(StoreError::RealmMismatch {
            expected: realm.to_string(),
            got: credential.realm.clone(),
        });
    }
    Ok(())
}
