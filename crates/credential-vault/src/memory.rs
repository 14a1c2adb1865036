use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::credential::Credential;
use crate::store::{check_realm, CredentialStore, StoreError};

/// In-process credential store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    realms: RwLock<HashMap<String, Credential>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store that already holds `credential` under its realm.
    pub fn with_credential(credential: Credential) -> Self {
        let mut realms = HashMap::new();
        realms.insert(credential.realm.clone(), credential);
        Self {
            realms: RwLock::new(realms),
        }
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn find(&self, realm: &str) -> Result<Option<Credential>, StoreError> {
        Ok(self.realms.read().await.get(realm).cloned())
    }

    async fn replace(&self, realm: &str, credential: Credential) -> Result<(), StoreError> {
        check_realm(realm, &credential)?;
        self.realms
            .write()
            .await
            .insert(realm.to_string(), credential);
        Ok(())
    }

    async fn clear(&self, realm: &str) -> Result<(), StoreError> {
        self.realms.write().await.remove(realm);
        Ok(())
    }
}
