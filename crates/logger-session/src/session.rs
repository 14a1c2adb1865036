use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use activity_log::{EventKind, EventRecord, LogQueue, TabSnapshot};
use chrono::{DateTime, Utc};
use credential_vault::{Credential, CredentialStore};

use crate::acquisition::{AbandonReason, AcquisitionFlow, AcquisitionOutcome};
use crate::focus::FocusTracker;
use crate::prompt::PromptUi;
use crate::validator::{CredentialValidator, PipelineValidator};

/// A browser event, captured at the moment it was received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserEvent {
    pub kind: EventKind,
    pub tab: TabSnapshot,
    pub at: DateTime<Utc>,
}

impl BrowserEvent {
    pub fn new(kind: EventKind, tab: TabSnapshot, at: DateTime<Utc>) -> Self {
        Self { kind, tab, at }
    }

    /// Stamp the event with the current time.
    pub fn now(kind: EventKind, tab: TabSnapshot) -> Self {
        Self::new(kind, tab, Utc::now())
    }
}

/// What happened to one browser event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogDisposition {
    Queued,
    LoggingDisabled,
    /// No credential on file and the login the event started did not
    /// produce one. Logging is switched off again.
    NoCredential(LoginResult),
    /// The event carried an out-of-range value and was not logged.
    Ignored,
}

impl LogDisposition {
    /// The login result the toolbar should reflect, if this event ran one.
    pub fn login(&self) -> Option<LoginResult> {
        match self {
            LogDisposition::NoCredential(result) => Some(*result),
            _ => None,
        }
    }
}

/// Result of switching logging on, as shown on the toolbar badge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginResult {
    Success,
    /// Explicit cancel, or the credential could not be stored.
    Failure,
    /// The prompt was dismissed without an answer.
    Abandoned,
}

impl From<&AcquisitionOutcome> for LoginResult {
    fn from(outcome: &AcquisitionOutcome) -> Self {
        match outcome {
            AcquisitionOutcome::Accepted(_) => LoginResult::Success,
            AcquisitionOutcome::Abandoned(AbandonReason::Dismissed) => LoginResult::Abandoned,
            AcquisitionOutcome::Abandoned(AbandonReason::Cancelled)
            | AcquisitionOutcome::Failed { .. } => LoginResult::Failure,
        }
    }
}

/// Entry point for browser events.
///
/// Resolves the active credential (running the acquisition flow when there
/// is none), turns the event into an [`EventRecord`] and queues it for the
/// drain loop. Logging starts switched off.
pub struct LoggerSession {
    realm: String,
    store: Arc<dyn CredentialStore>,
    queue: LogQueue,
    focus: Arc<FocusTracker>,
    acquisition: AcquisitionFlow,
    logging_enabled: AtomicBool,
}

impl LoggerSession {
    /// Build a session whose credentials are validated through `queue`.
    pub fn new(
        realm: impl Into<String>,
        store: Arc<dyn CredentialStore>,
        queue: LogQueue,
        prompt: Arc<dyn PromptUi>,
    ) -> Self {
        let focus = Arc::new(FocusTracker::new());
        let validator = Arc::new(PipelineValidator::new(queue.clone(), Arc::clone(&focus)));
        Self::assemble(realm.into(), store, queue, prompt, validator, focus)
    }

    pub fn with_validator(
        realm: impl Into<String>,
        store: Arc<dyn CredentialStore>,
        queue: LogQueue,
        prompt: Arc<dyn PromptUi>,
        validator: Arc<dyn CredentialValidator>,
    ) -> Self {
        let focus = Arc::new(FocusTracker::new());
        Self::assemble(realm.into(), store, queue, prompt, validator, focus)
    }

    fn assemble(
        realm: String,
        store: Arc<dyn CredentialStore>,
        queue: LogQueue,
        prompt: Arc<dyn PromptUi>,
        validator: Arc<dyn CredentialValidator>,
        focus: Arc<FocusTracker>,
    ) -> Self {
        let acquisition =
            AcquisitionFlow::new(realm.clone(), Arc::clone(&store), validator, prompt);
        Self {
            realm,
            store,
            queue,
            focus,
            acquisition,
            logging_enabled: AtomicBool::new(false),
        }
    }

    pub fn realm(&self) -> &str {
        &self.realm
    }

    pub fn focus(&self) -> &FocusTracker {
        &self.focus
    }

    pub fn is_logging_enabled(&self) -> bool {
        self.logging_enabled.load(Ordering::SeqCst)
    }

    /// Log one browser event.
    pub async fn log_event(&self, event: BrowserEvent) -> LogDisposition {
        self.focus.observe(event.kind, &event.tab);

        if !self.is_logging_enabled() {
            tracing::trace!(event_type = %event.kind, "logging disabled; event skipped");
            return LogDisposition::LoggingDisabled;
        }

        let credential = match self.active_credential().await {
            Ok(credential) => credential,
            Err(result) => {
                tracing::debug!(event_type = %event.kind, ?result, "no credential; event skipped");
                return LogDisposition::NoCredential(result);
            }
        };

        let record = EventRecord::new(&credential.username, event.kind, &event.tab, event.at);
        tracing::debug!(
            user = %credential.username,
            event_type = %event.kind,
            tab_id = %event.tab.tab_id,
            "queueing event"
        );
        self.queue.enqueue(record, credential);
        LogDisposition::Queued
    }

    /// Log a page helpfulness rating between 1 and 5.
    pub async fn rate(&self, rating: i64, tab: TabSnapshot, at: DateTime<Utc>) -> LogDisposition {
        let rating = match u8::try_from(rating) {
            Ok(rating @ 1..=5) => rating,
            _ => {
                tracing::warn!(rating, "rating out of range; ignored");
                return LogDisposition::Ignored;
            }
        };
        self.log_event(BrowserEvent::new(EventKind::Rating(rating), tab, at))
            .await
    }

    /// Handle the logging toggle. Switching on asks for a credential, or
    /// offers to keep the one on file; the returned result decides whether
    /// logging actually ends up enabled. Switching off returns `None`.
    pub async fn set_logging(&self, checked: bool) -> Option<LoginResult> {
        if !checked {
            self.logging_enabled.store(false, Ordering::SeqCst);
            tracing::info!(realm = %self.realm, "logging disabled");
            return None;
        }

        let outcome = match self.stored_credential().await {
            Some(existing) => self.acquisition.choose_login_method(existing).await,
            None => self.acquisition.acquire().await,
        };
        Some(self.apply(&outcome))
    }

    /// Ask for a new credential even when one is already on file.
    pub async fn reauthenticate(&self) -> LoginResult {
        let outcome = self.acquisition.acquire().await;
        self.apply(&outcome)
    }

    fn apply(&self, outcome: &AcquisitionOutcome) -> LoginResult {
        let result = LoginResult::from(outcome);
        let enabled = result == LoginResult::Success;
        self.logging_enabled.store(enabled, Ordering::SeqCst);
        tracing::info!(realm = %self.realm, ?result, enabled, "login finished");
        result
    }

    /// The stored credential, or one acquired on the spot. A login that
    /// does not end in a credential disables logging.
    async fn active_credential(&self) -> Result<Credential, LoginResult> {
        if let Some(credential) = self.stored_credential().await {
            return Ok(credential);
        }
        let outcome = self.acquisition.acquire().await;
        let result = self.apply(&outcome);
        match outcome {
            AcquisitionOutcome::Accepted(credential) => Ok(credential),
            _ => Err(result),
        }
    }

    /// A failing lookup counts as "no credential".
    async fn stored_credential(&self) -> Option<Credential> {
        match self.store.find(&self.realm).await {
            Ok(found) => found,
            Err(err) => {
                tracing::warn!(realm = %self.realm, %err, "credential lookup failed");
                None
            }
        }
    }
}
