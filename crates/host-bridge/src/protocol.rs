//! JSON frames exchanged with the browser extension.
//!
//! Every frame is a text message carrying one object tagged by `type`.
//!
//! ```text
//! extension -> host   {"type":"tab","event":"open","tab":{"id":12,"index":0,"title":"..","url":".."}}
//!                     {"type":"credential","reply":{"submit":{"username":"alice","api_key":".."}}}
//! host -> extension   {"type":"show","prompt":"credential"}
//!                     {"type":"badge","text":"√","color":"green"}
//! ```

use activity_log::{EventKind, TabSnapshot};
use logger_session::{CredentialReply, LoginMethodReply, LoginResult, PromptKind};
use serde::{Deserialize, Deserializer, Serialize};

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// A frame sent by the extension.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExtensionMessage {
    Window {
        event: WindowEvent,
        #[serde(default)]
        tab: TabFrame,
    },
    Tab {
        event: TabEvent,
        #[serde(default)]
        tab: TabFrame,
    },
    /// The logging toggle button changed state.
    Toggle { checked: bool },
    /// A helpfulness rating for the given page.
    Rating {
        rating: i64,
        #[serde(default)]
        tab: TabFrame,
    },
    Reauthenticate,
    /// Terminal answer from the credential panel.
    Credential { reply: CredentialAnswer },
    /// Terminal answer from the login-method panel.
    LoginMethod { choice: LoginChoice },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowEvent {
    Activate,
    Deactivate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TabEvent {
    Open,
    Close,
    Ready,
    Load,
    Pageshow,
    Activate,
    Deactivate,
}

impl From<WindowEvent> for EventKind {
    fn from(event: WindowEvent) -> Self {
        match event {
            WindowEvent::Activate => EventKind::WindowActivated,
            WindowEvent::Deactivate => EventKind::WindowDeactivated,
        }
    }
}

impl From<TabEvent> for EventKind {
    fn from(event: TabEvent) -> Self {
        match event {
            TabEvent::Open => EventKind::TabOpened,
            TabEvent::Close => EventKind::TabClosed,
            TabEvent::Ready => EventKind::TabReady,
            TabEvent::Load => EventKind::TabLoad,
            TabEvent::Pageshow => EventKind::TabPageShow,
            TabEvent::Activate => EventKind::TabActivated,
            TabEvent::Deactivate => EventKind::TabDeactivated,
        }
    }
}

/// Tab as the browser describes it. Chromium uses numeric ids, Firefox
/// string ids; both are kept as strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TabFrame {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
}

impl From<TabFrame> for TabSnapshot {
    fn from(tab: TabFrame) -> Self {
        TabSnapshot::new(tab.id, tab.index, tab.title, tab.url)
    }
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(i64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(id) => id,
        Id::Number(id) => id.to_string(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialAnswer {
    Submit { username: String, api_key: String },
    Cancel,
    Dismiss,
}

impl From<CredentialAnswer> for CredentialReply {
    fn from(answer: CredentialAnswer) -> Self {
        match answer {
            CredentialAnswer::Submit { username, api_key } => CredentialReply::Submitted {
                username,
                secret: api_key,
            },
            CredentialAnswer::Cancel => CredentialReply::Cancelled,
            CredentialAnswer::Dismiss => CredentialReply::Dismissed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginChoice {
    Existing,
    New,
    Dismiss,
}

impl From<LoginChoice> for LoginMethodReply {
    fn from(choice: LoginChoice) -> Self {
        match choice {
            LoginChoice::Existing => LoginMethodReply::Existing,
            LoginChoice::New => LoginMethodReply::New,
            LoginChoice::Dismiss => LoginMethodReply::Dismissed,
        }
    }
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// A frame sent to the extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostMessage {
    Show {
        prompt: PromptKind,
    },
    /// Redisplay a panel with an error indicator.
    Retry {
        prompt: PromptKind,
    },
    Hide {
        prompt: PromptKind,
    },
    /// Toolbar badge; an empty `text` clears it.
    Badge {
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        color: Option<String>,
    },
    /// Force the logging toggle into a state.
    Toggle {
        checked: bool,
    },
}

impl HostMessage {
    fn badge(text: &str, color: Option<&str>) -> Self {
        HostMessage::Badge {
            text: text.to_string(),
            color: color.map(str::to_string),
        }
    }

    /// Frames reflecting a toggle or re-authentication outcome. `None` means
    /// logging was switched off.
    pub fn for_login(result: Option<LoginResult>) -> Vec<HostMessage> {
        match result {
            None => vec![Self::badge("", None)],
            Some(LoginResult::Success) => vec![
                Self::badge("√", Some("green")),
                HostMessage::Toggle { checked: true },
            ],
            Some(LoginResult::Failure) => vec![
                HostMessage::Toggle { checked: false },
                Self::badge("X", Some("red")),
            ],
            Some(LoginResult::Abandoned) => vec![
                HostMessage::Toggle { checked: false },
                Self::badge("", None),
            ],
        }
    }
}
