use std::sync::Arc;

use activity_log::{EventKind, EventRecord, LogQueue, SubmissionError, WriteError};
use async_trait::async_trait;
use credential_vault::Credential;

use crate::focus::FocusTracker;

/// Decides whether a candidate credential is accepted upstream.
#[async_trait]
pub trait CredentialValidator: Send + Sync {
    /// `Ok(false)` means the credential was refused; `Err` means no verdict
    /// could be obtained.
    async fn validate(&self, credential: &Credential) -> Result<bool, SubmissionError>;
}

/// Validates by sending a "Testing API key" record through the ordinary
/// logging pipeline and reading the sink's answer.
///
/// The probe is queued behind any pending records, exactly like a browsing
/// event. A file sink acknowledges every write, so locally every credential
/// is valid; an HTTP sink only acknowledges `201 Created`.
pub struct PipelineValidator {
    queue: LogQueue,
    focus: Arc<FocusTracker>,
}

impl PipelineValidator {
    pub fn new(queue: LogQueue, focus: Arc<FocusTracker>) -> Self {
        Self { queue, focus }
    }
}

#[async_trait]
impl CredentialValidator for PipelineValidator {
    async fn validate(&self, credential: &Credential) -> Result<bool, SubmissionError> {
        let record = EventRecord::capture(
            &credential.username,
            EventKind::CredentialTest,
            &self.focus.current(),
        );

        match self.queue.submit(record, credential.clone()).wait().await {
            Ok(_) => Ok(true),
            Err(SubmissionError::Write(WriteError::Rejected { status })) => {
                tracing::info!(
                    username = %credential.username,
                    status,
                    "credential rejected by logging endpoint"
                );
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }
}
