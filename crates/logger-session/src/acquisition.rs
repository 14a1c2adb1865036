use std::sync::{Arc, Mutex};

use credential_vault::{Credential, CredentialStore};
use tokio::sync::broadcast;

use crate::prompt::{CredentialReply, LoginMethodReply, PromptKind, PromptUi};
use crate::validator::CredentialValidator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbandonReason {
    /// The user explicitly cancelled.
    Cancelled,
    /// The panel was dismissed without an answer.
    Dismissed,
}

/// How one credential acquisition ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquisitionOutcome {
    /// Validated and stored.
    Accepted(Credential),
    Abandoned(AbandonReason),
    /// Validated, but the store refused to persist it.
    Failed { reason: String },
}

/// States of the acquisition state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquisitionState {
    Idle,
    /// The credential panel is up; `retry` means it carries an error
    /// indicator from the previous attempt.
    AwaitingInput { retry: bool },
    Validating(Credential),
    Done(AcquisitionOutcome),
}

/// Obtains a credential from the user, validates it, and stores it.
///
/// At most one flow runs at a time. A caller arriving while one is running
/// waits for that flow's outcome instead of opening a second panel.
pub struct AcquisitionFlow {
    realm: String,
    store: Arc<dyn CredentialStore>,
    validator: Arc<dyn CredentialValidator>,
    prompt: Arc<dyn PromptUi>,
    inflight: Mutex<Option<broadcast::Sender<AcquisitionOutcome>>>,
}

/// Clears the in-flight slot if the leading flow is dropped mid-way, so
/// waiters see a closed channel instead of hanging.
struct InflightGuard<'a> {
    slot: &'a Mutex<Option<broadcast::Sender<AcquisitionOutcome>>>,
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.slot.lock() {
            slot.take();
        }
    }
}

enum Role {
    Leader,
    Follower(broadcast::Receiver<AcquisitionOutcome>),
}

impl AcquisitionFlow {
    pub fn new(
        realm: impl Into<String>,
        store: Arc<dyn CredentialStore>,
        validator: Arc<dyn CredentialValidator>,
        prompt: Arc<dyn PromptUi>,
    ) -> Self {
        Self {
            realm: realm.into(),
            store,
            validator,
            prompt,
            inflight: Mutex::new(None),
        }
    }

    /// Run the flow, or join the one already running.
    pub async fn acquire(&self) -> AcquisitionOutcome {
        match self.claim() {
            Role::Follower(mut rx) => {
                tracing::debug!(realm = %self.realm, "joining credential acquisition in progress");
                rx.recv()
                    .await
                    .unwrap_or(AcquisitionOutcome::Abandoned(AbandonReason::Dismissed))
            }
            Role::Leader => {
                let guard = InflightGuard {
                    slot: &self.inflight,
                };
                let outcome = self.run().await;

                let sender = self.inflight.lock().ok().and_then(|mut slot| slot.take());
                drop(guard);
                if let Some(sender) = sender {
                    // No receivers is fine.
                    let _ = sender.send(outcome.clone());
                }
                outcome
            }
        }
    }

    /// Ask whether to keep `existing` or enter a new credential.
    pub async fn choose_login_method(&self, existing: Credential) -> AcquisitionOutcome {
        match self.prompt.ask_login_method().await {
            LoginMethodReply::Existing => {
                self.prompt.hide(PromptKind::LoginMethod).await;
                tracing::info!(username = %existing.username, "continuing with stored credential");
                AcquisitionOutcome::Accepted(existing)
            }
            LoginMethodReply::New => {
                self.prompt.hide(PromptKind::LoginMethod).await;
                self.acquire().await
            }
            LoginMethodReply::Dismissed => {
                AcquisitionOutcome::Abandoned(AbandonReason::Dismissed)
            }
        }
    }

    fn claim(&self) -> Role {
        let mut slot = match self.inflight.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        match slot.as_ref() {
            Some(sender) => Role::Follower(sender.subscribe()),
            None => {
                let (sender, _) = broadcast::channel(1);
                *slot = Some(sender);
                Role::Leader
            }
        }
    }

    async fn run(&self) -> AcquisitionOutcome {
        let mut state = AcquisitionState::Idle;
        loop {
            state = self.step(state).await;
            if let AcquisitionState::Done(outcome) = state {
                tracing::info!(realm = %self.realm, ?outcome, "credential acquisition finished");
                return outcome;
            }
        }
    }

    /// Advance the state machine by one transition.
    pub async fn step(&self, state: AcquisitionState) -> AcquisitionState {
        match state {
            AcquisitionState::Idle => AcquisitionState::AwaitingInput { retry: false },
            AcquisitionState::AwaitingInput { retry } => self.await_input(retry).await,
            AcquisitionState::Validating(candidate) => self.validate(candidate).await,
            done @ AcquisitionState::Done(_) => done,
        }
    }

    async fn await_input(&self, retry: bool) -> AcquisitionState {
        match self.prompt.ask_credential(retry).await {
            CredentialReply::Submitted { username, secret } => {
                let username = username.trim();
                let secret = secret.trim();
                if username.is_empty() || secret.is_empty() {
                    tracing::debug!("empty credential submitted; asking again");
                    return AcquisitionState::AwaitingInput { retry: true };
                }
                AcquisitionState::Validating(Credential::new(&self.realm, username, secret))
            }
            CredentialReply::Cancelled => {
                self.prompt.hide(PromptKind::Credential).await;
                AcquisitionState::Done(AcquisitionOutcome::Abandoned(AbandonReason::Cancelled))
            }
            CredentialReply::Dismissed => {
                AcquisitionState::Done(AcquisitionOutcome::Abandoned(AbandonReason::Dismissed))
            }
        }
    }

    async fn validate(&self, candidate: Credential) -> AcquisitionState {
        match self.validator.validate(&candidate).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::info!(username = %candidate.username, "credential invalid; asking again");
                return AcquisitionState::AwaitingInput { retry: true };
            }
            Err(err) => {
                tracing::warn!(
                    username = %candidate.username,
                    %err,
                    "could not validate credential; asking again"
                );
                return AcquisitionState::AwaitingInput { retry: true };
            }
        }

        let outcome = match self.store.replace(&self.realm, candidate.clone()).await {
            Ok(()) => AcquisitionOutcome::Accepted(candidate),
            Err(err) => {
                tracing::error!(realm = %self.realm, %err, "failed to store credential");
                AcquisitionOutcome::Failed {
                    reason: err.to_string(),
                }
            }
        };
        self.prompt.hide(PromptKind::Credential).await;
        AcquisitionState::Done(outcome)
    }
}
