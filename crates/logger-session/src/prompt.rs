use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// The panels the session can ask the browser to display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptKind {
    Credential,
    LoginMethod,
}

/// The single terminal event of one credential panel display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialReply {
    Submitted { username: String, secret: String },
    /// The user pressed cancel.
    Cancelled,
    /// The panel went away without submit or cancel, e.g. focus moved
    /// elsewhere.
    Dismissed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginMethodReply {
    /// Keep the credential already on file.
    Existing,
    /// Enter a new one.
    New,
    Dismissed,
}

/// Browser-side UI collaborator.
///
/// Each `ask_*` call shows a panel, waits for exactly one terminal reply and
/// returns it. Implementations must resolve to `Dismissed` rather than hang
/// when the UI disappears.
#[async_trait]
pub trait PromptUi: Send + Sync {
    /// Show the credential panel. With `retry` set, the panel is redisplayed
    /// with an error indicator instead.
    async fn ask_credential(&self, retry: bool) -> CredentialReply;

    async fn ask_login_method(&self) -> LoginMethodReply;

    async fn hide(&self, prompt: PromptKind);
}
