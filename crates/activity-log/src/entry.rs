use std::borrow::Cow;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What the browser reported about a tab at the moment an event fired.
///
/// Captured eagerly by the event handler, because the tab may change or be
/// destroyed (e.g. on close) before the record is written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabSnapshot {
    /// Opaque browser tab identifier.
    #[serde(default)]
    pub tab_id: String,
    /// Position of the tab within its window.
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
}

impl TabSnapshot {
    pub fn new(
        tab_id: impl Into<String>,
        index: u32,
        title: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            tab_id: tab_id.into(),
            index,
            title: title.into(),
            url: url.into(),
        }
    }
}

/// The kind of activity being recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    WindowActivated,
    WindowDeactivated,
    TabOpened,
    TabClosed,
    TabReady,
    TabLoad,
    TabPageShow,
    TabActivated,
    TabDeactivated,
    /// A helpfulness rating the user gave the current page.
    Rating(u8),
    /// Synthetic record sent to probe whether a credential is accepted.
    CredentialTest,
}

impl EventKind {
    /// The `event_type` string written to storage.
    pub fn message(&self) -> Cow<'static, str> {
        let text = match self {
            EventKind::WindowActivated => "Window activated",
            EventKind::WindowDeactivated => "Window deactivated",
            EventKind::TabOpened => "Tab opened",
            EventKind::TabClosed => "Tab closed",
            EventKind::TabReady => "Tab content loaded (ready)",
            EventKind::TabLoad => "Tab content loaded (load)",
            EventKind::TabPageShow => "Tab content loaded (pageshow)",
            EventKind::TabActivated => "Tab activated",
            EventKind::TabDeactivated => "Tab deactivated",
            EventKind::CredentialTest => "Testing API key",
            EventKind::Rating(rating) => return Cow::Owned(format!("Rating: {rating}")),
        };
        Cow::Borrowed(text)
    }

    /// Whether the record is part of the credential handshake rather than
    /// ordinary browsing activity.
    pub fn is_credential_test(&self) -> bool {
        matches!(self, EventKind::CredentialTest)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

/// One line of the activity log.
///
/// Immutable once built: every field is fixed at construction and only
/// exposed through accessors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    user: String,
    #[serde(with = "iso8601")]
    timestamp: DateTime<Utc>,
    event_type: String,
    tab_id: String,
    tab_index: u32,
    tab_title: String,
    tab_url: String,
}

impl EventRecord {
    /// Build a record for an event that happened at `at`.
    pub fn new(
        user: impl Into<String>,
        kind: EventKind,
        tab: &TabSnapshot,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            user: user.into(),
            timestamp: at,
            event_type: kind.message().into_owned(),
            tab_id: tab.tab_id.clone(),
            tab_index: tab.index,
            tab_title: tab.title.clone(),
            tab_url: tab.url.clone(),
        }
    }

    /// Build a record stamped with the current time.
    pub fn capture(user: impl Into<String>, kind: EventKind, tab: &TabSnapshot) -> Self {
        Self::new(user, kind, tab, Utc::now())
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// The timestamp as written to storage, e.g. `2024-05-01T12:00:00.123Z`.
    pub fn timestamp_iso(&self) -> String {
        iso8601::format(&self.timestamp)
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn tab_id(&self) -> &str {
        &self.tab_id
    }

    pub fn tab_index(&self) -> u32 {
        self.tab_index
    }

    pub fn tab_title(&self) -> &str {
        &self.tab_title
    }

    pub fn tab_url(&self) -> &str {
        &self.tab_url
    }
}

/// Millisecond-precision UTC timestamps with a `Z` suffix.
mod iso8601 {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn format(at: &DateTime<Utc>) -> String {
        at.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    pub fn serialize<S: Serializer>(at: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(at))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}
