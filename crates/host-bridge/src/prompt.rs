use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use logger_session::{CredentialReply, LoginMethodReply, PromptKind, PromptUi};
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::protocol::HostMessage;

/// [`PromptUi`] backed by the extension currently attached to the bridge.
///
/// Asking sends a `show`/`retry` frame and parks a oneshot until the
/// connection reader routes the matching reply back through
/// [`deliver_credential`](Self::deliver_credential) or
/// [`deliver_login_method`](Self::deliver_login_method). A question asked
/// while the same panel is already open joins it and gets the same answer.
/// With no extension attached, or when it detaches mid-question, the answer
/// is `Dismissed`.
#[derive(Default)]
pub struct BridgePrompt {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    attached: Option<(Uuid, mpsc::UnboundedSender<HostMessage>)>,
    credential: Vec<oneshot::Sender<CredentialReply>>,
    login_method: Vec<oneshot::Sender<LoginMethodReply>>,
}

impl State {
    /// Send a frame to the attached extension, if any.
    fn send(&self, message: HostMessage) -> bool {
        match &self.attached {
            Some((_, tx)) => tx.send(message).is_ok(),
            None => false,
        }
    }

    /// Drop every parked question; their askers see `Dismissed`.
    fn dismiss_pending(&mut self) {
        self.credential.clear();
        self.login_method.clear();
    }
}

impl BridgePrompt {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Route prompts to connection `id`. Replaces any previous attachment.
    pub fn attach(&self, id: Uuid, outbound: mpsc::UnboundedSender<HostMessage>) {
        let mut state = self.state();
        if let Some((previous, _)) = state.attached.replace((id, outbound)) {
            tracing::info!(%previous, connection_id = %id, "extension attachment replaced");
        }
        state.dismiss_pending();
    }

    /// Forget connection `id` if it is still the attached one.
    pub fn detach(&self, id: Uuid) {
        let mut state = self.state();
        if matches!(&state.attached, Some((current, _)) if *current == id) {
            state.attached = None;
            state.dismiss_pending();
        }
    }

    pub fn is_attached(&self) -> bool {
        self.state().attached.is_some()
    }

    pub fn deliver_credential(&self, reply: CredentialReply) {
        let waiters = std::mem::take(&mut self.state().credential);
        if waiters.is_empty() {
            tracing::debug!("credential reply with no open panel; ignored");
        }
        for waiter in waiters {
            let _ = waiter.send(reply.clone());
        }
    }

    pub fn deliver_login_method(&self, reply: LoginMethodReply) {
        let waiters = std::mem::take(&mut self.state().login_method);
        if waiters.is_empty() {
            tracing::debug!("login method reply with no open panel; ignored");
        }
        for waiter in waiters {
            let _ = waiter.send(reply);
        }
    }
}

#[async_trait]
impl PromptUi for BridgePrompt {
    async fn ask_credential(&self, retry: bool) -> CredentialReply {
        let rx = {
            let mut state = self.state();
            if state.credential.is_empty() {
                let prompt = PromptKind::Credential;
                let frame = if retry {
                    HostMessage::Retry { prompt }
                } else {
                    HostMessage::Show { prompt }
                };
                if !state.send(frame) {
                    tracing::debug!("no extension attached; credential prompt dismissed");
                    return CredentialReply::Dismissed;
                }
            }
            let (tx, rx) = oneshot::channel();
            state.credential.push(tx);
            rx
        };
        rx.await.unwrap_or(CredentialReply::Dismissed)
    }

    async fn ask_login_method(&self) -> LoginMethodReply {
        let rx = {
            let mut state = self.state();
            if state.login_method.is_empty()
                && !state.send(HostMessage::Show {
                    prompt: PromptKind::LoginMethod,
                })
            {
                tracing::debug!("no extension attached; login method prompt dismissed");
                return LoginMethodReply::Dismissed;
            }
            let (tx, rx) = oneshot::channel();
            state.login_method.push(tx);
            rx
        };
        rx.await.unwrap_or(LoginMethodReply::Dismissed)
    }

    async fn hide(&self, prompt: PromptKind) {
        self.state().send(HostMessage::Hide { prompt });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn attached() -> (Arc<BridgePrompt>, Uuid, mpsc::UnboundedReceiver<HostMessage>) {
        let prompt = Arc::new(BridgePrompt::new());
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        prompt.attach(id, tx);
        (prompt, id, rx)
    }

    #[tokio::test]
    async fn nothing_attached_means_dismissed() {
        let prompt = BridgePrompt::new();
        assert!(!prompt.is_attached());
        assert_eq!(prompt.ask_credential(false).await, CredentialReply::Dismissed);
        assert_eq!(prompt.ask_login_method().await, LoginMethodReply::Dismissed);
    }

    #[tokio::test]
    async fn reply_is_routed_to_the_waiting_question() {
        let (prompt, _, mut frames) = attached();

        let asker = tokio::spawn({
            let prompt = Arc::clone(&prompt);
            async move { prompt.ask_credential(true).await }
        });

        assert_eq!(
            frames.recv().await,
            Some(HostMessage::Retry {
                prompt: PromptKind::Credential
            })
        );
        prompt.deliver_credential(CredentialReply::Cancelled);
        assert_eq!(asker.await.unwrap(), CredentialReply::Cancelled);

        prompt.hide(PromptKind::Credential).await;
        assert_eq!(
            frames.recv().await,
            Some(HostMessage::Hide {
                prompt: PromptKind::Credential
            })
        );
    }

    #[tokio::test]
    async fn detaching_dismisses_open_questions() {
        let (prompt, id, mut frames) = attached();

        let asker = tokio::spawn({
            let prompt = Arc::clone(&prompt);
            async move { prompt.ask_login_method().await }
        });
        assert_eq!(
            frames.recv().await,
            Some(HostMessage::Show {
                prompt: PromptKind::LoginMethod
            })
        );

        // A stale connection id changes nothing.
        prompt.detach(Uuid::new_v4());
        assert!(prompt.is_attached());

        prompt.detach(id);
        assert_eq!(asker.await.unwrap(), LoginMethodReply::Dismissed);
        assert!(!prompt.is_attached());
    }

    #[tokio::test]
    async fn new_attachment_takes_over() {
        let (prompt, _, mut old_frames) = attached();

        let asker = tokio::spawn({
            let prompt = Arc::clone(&prompt);
            async move { prompt.ask_credential(false).await }
        });
        old_frames.recv().await;

        let (tx, mut new_frames) = mpsc::unbounded_channel();
        prompt.attach(Uuid::new_v4(), tx);
        assert_eq!(asker.await.unwrap(), CredentialReply::Dismissed);

        prompt.hide(PromptKind::Credential).await;
        assert!(new_frames.recv().await.is_some());
    }

    #[tokio::test]
    async fn concurrent_login_method_questions_share_one_panel() {
        let (prompt, _, mut frames) = attached();

        let first = tokio::spawn({
            let prompt = Arc::clone(&prompt);
            async move { prompt.ask_login_method().await }
        });
        assert_eq!(
            frames.recv().await,
            Some(HostMessage::Show {
                prompt: PromptKind::LoginMethod
            })
        );

        let second = tokio::spawn({
            let prompt = Arc::clone(&prompt);
            async move { prompt.ask_login_method().await }
        });
        // Wait until the second question has joined the open panel.
        while prompt.state().login_method.len() < 2 {
            tokio::task::yield_now().await;
        }
        assert!(frames.try_recv().is_err());

        prompt.deliver_login_method(LoginMethodReply::Existing);
        assert_eq!(first.await.unwrap(), LoginMethodReply::Existing);
        assert_eq!(second.await.unwrap(), LoginMethodReply::Existing);
    }

    #[test]
    fn unsolicited_replies_are_ignored() {
        let prompt = BridgePrompt::new();
        prompt.deliver_credential(CredentialReply::Dismissed);
        prompt.deliver_login_method(LoginMethodReply::New);
    }
}
