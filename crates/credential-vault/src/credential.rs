use std::fmt;

use serde::{Deserialize, Serialize};

/// An identity for one realm: a username and the secret (API key) that the
/// remote endpoint expects alongside it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub realm: String,
    pub username: String,
    pub secret: String,
}

impl Credential {
    pub fn new(
        realm: impl Into<String>,
        username: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            realm: realm.into(),
            username: username.into(),
            secret: secret.into(),
        }
    }

    /// Value for an `Authorization` header: `ApiKey <username>:<secret>`.
    pub fn authorization(&self) -> String {
        format!("ApiKey {}:{}", self.username, self.secret)
    }
}

// The secret never shows up in logs.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("realm", &self.realm)
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .finish()
    }
}
