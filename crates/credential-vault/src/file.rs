use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::credential::Credential;
use crate::store::{check_realm, CredentialStore, StoreError};

/// On-disk vault layout. Several realms may share one file.
#[derive(Debug, Default, Serialize, Deserialize)]
struct VaultFile {
    #[serde(default)]
    realms: BTreeMap<String, Vec<StoredEntry>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredEntry {
    username: String,
    secret: String,
}

/// Credential store backed by a single JSON vault file.
///
/// Every mutation rewrites the whole vault into a temporary file next to it,
/// syncs it, and renames it over the original. Readers never take a lock: the
/// rename is what makes [`replace`](CredentialStore::replace) atomic.
/// Writers are serialized so two mutations cannot lose each other's realms.
pub struct FileCredentialStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<VaultFile, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(VaultFile::default()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(VaultFile::default()),
            Err(err) => Err(StoreError::Read(err)),
        }
    }

    /// Write `vault` to a sibling temp file and rename it into place.
    async fn commit(&self, vault: &VaultFile) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(vault)?;

        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        tokio::fs::create_dir_all(&parent)
            .await
            .map_err(StoreError::Write)?;

        let tmp = parent.join(format!(".vault.{}.tmp", uuid::Uuid::new_v4().simple()));

        let result = write_synced(&tmp, &json).await;
        let result = match result {
            Ok(()) => tokio::fs::rename(&tmp, &self.path)
                .await
                .map_err(StoreError::Commit),
            Err(err) => Err(err),
        };

        if result.is_err() {
            let _ = tokio::fs::remove_file(&tmp).await;
        }
        result
    }
}

async fn write_synced(path: &Path, contents: &[u8]) -> Result<(), StoreError> {
    let mut opts = tokio::fs::OpenOptions::new();
    opts.create_new(true).write(true);
    #[cfg(unix)]
    {
        opts.mode(0o600);
    }

    let mut file = opts.open(path).await.map_err(StoreError::Write)?;
    file.write_all(contents).await.map_err(StoreError::Write)?;
    file.flush().await.map_err(StoreError::Write)?;
    file.sync_all().await.map_err(StoreError::Commit)?;
    Ok(())
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn find(&self, realm: &str) -> Result<Option<Credential>, StoreError> {
        let vault = self.load().await?;
        Ok(vault
            .realms
            .get(realm)
            .and_then(|entries| entries.first())
            .map(|entry| Credential::new(realm, &entry.username, &entry.secret)))
    }

    async fn replace(&self, realm: &str, credential: Credential) -> Result<(), StoreError> {
        check_realm(realm, &credential)?;

        let _guard = self.write_lock.lock().await;
        let mut vault = self.load().await?;
        let previous = vault.realms.insert(
            realm.to_string(),
            vec![StoredEntry {
                username: credential.username.clone(),
                secret: credential.secret,
            }],
        );
        self.commit(&vault).await?;

        tracing::debug!(
            realm,
            username = %credential.username,
            replaced = previous.map(|p| p.len()).unwrap_or(0),
            "credential replaced"
        );
        Ok(())
    }

    async fn clear(&self, realm: &str) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut vault = self.load().await?;
        if vault.realms.remove(realm).is_none() {
            return Ok(());
        }
        self.commit(&vault).await?;
        tracing::debug!(realm, "credentials cleared");
        Ok(())
    }
}
