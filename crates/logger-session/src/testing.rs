//! Test doubles shared by the unit tests of this crate.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use activity_log::SubmissionError;
use async_trait::async_trait;
use credential_vault::Credential;
use tokio::sync::Semaphore;

use crate::prompt::{CredentialReply, LoginMethodReply, PromptKind, PromptUi};
use crate::validator::CredentialValidator;

/// Replays scripted replies and records every interaction. Once a script
/// runs out it answers `Dismissed`, like a browser with nothing attached.
#[derive(Default)]
pub(crate) struct ScriptedPrompt {
    credentials: Mutex<VecDeque<CredentialReply>>,
    login_methods: Mutex<VecDeque<LoginMethodReply>>,
    calls: Mutex<Vec<String>>,
    gate: Option<Semaphore>,
}

impl ScriptedPrompt {
    pub(crate) fn with_credentials(replies: Vec<CredentialReply>) -> Self {
        Self::default().and_credentials(replies)
    }

    pub(crate) fn with_login_methods(replies: Vec<LoginMethodReply>) -> Self {
        Self {
            login_methods: Mutex::new(replies.into()),
            ..Self::default()
        }
    }

    pub(crate) fn and_credentials(self, replies: Vec<CredentialReply>) -> Self {
        Self {
            credentials: Mutex::new(replies.into()),
            ..self
        }
    }

    /// Hold every credential reply until [`open_gate`](Self::open_gate).
    pub(crate) fn gated(self) -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..self
        }
    }

    pub(crate) fn open_gate(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(Semaphore::MAX_PERMITS / 2);
        }
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }
}

#[async_trait]
impl PromptUi for ScriptedPrompt {
    async fn ask_credential(&self, retry: bool) -> CredentialReply {
        self.record(if retry { "retry" } else { "show" });
        if let Some(gate) = &self.gate {
            let _permit = gate.acquire().await.unwrap();
        }
        self.credentials
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(CredentialReply::Dismissed)
    }

    async fn ask_login_method(&self) -> LoginMethodReply {
        self.record("login_method");
        self.login_methods
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(LoginMethodReply::Dismissed)
    }

    async fn hide(&self, prompt: PromptKind) {
        self.record(match prompt {
            PromptKind::Credential => "hide:credential",
            PromptKind::LoginMethod => "hide:login_method",
        });
    }
}

/// Accepts a fixed set of `username:secret` pairs.
pub(crate) struct StubValidator {
    accepted: HashSet<String>,
    attempts: Mutex<Vec<String>>,
    fail_next: AtomicBool,
}

impl StubValidator {
    pub(crate) fn accepting(pairs: &[(&str, &str)]) -> Self {
        Self {
            accepted: pairs.iter().map(|(u, s)| format!("{u}:{s}")).collect(),
            attempts: Mutex::new(Vec::new()),
            fail_next: AtomicBool::new(false),
        }
    }

    /// Answer the first validation with an error instead of a verdict.
    pub(crate) fn failing_once(self) -> Self {
        self.fail_next.store(true, Ordering::SeqCst);
        self
    }

    pub(crate) fn attempts(&self) -> Vec<String> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl CredentialValidator for StubValidator {
    async fn validate(&self, credential: &Credential) -> Result<bool, SubmissionError> {
        let pair = format!("{}:{}", credential.username, credential.secret);
        self.attempts.lock().unwrap().push(pair.clone());
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(SubmissionError::Dropped);
        }
        Ok(self.accepted.contains(&pair))
    }
}
