use std::net::SocketAddr;
use std::sync::Arc;

use activity_log::TabSnapshot;
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use http::header::ORIGIN;
use http::StatusCode;
use logger_session::{BrowserEvent, LoggerSession};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{
    ErrorResponse, Request as HsRequest, Response as HsResponse,
};
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

use crate::origin::OriginPolicy;
use crate::prompt::BridgePrompt;
use crate::protocol::{ExtensionMessage, HostMessage};

/// Configuration for the extension bridge.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Address to bind the listening socket to.
    pub listen_addr: SocketAddr,
    pub origins: OriginPolicy,
}

/// WebSocket server the browser extension connects to.
///
/// Each connection gets a reader loop and a writer task. Browser events are
/// stamped on arrival and handed, in order, to one worker task per
/// connection, which feeds them to the [`LoggerSession`]. Panel replies
/// bypass the worker and go straight to the [`BridgePrompt`], so a worker
/// waiting on a credential never blocks the reply it is waiting for.
pub struct Bridge {
    config: BridgeConfig,
    session: Arc<LoggerSession>,
    prompt: Arc<BridgePrompt>,
}

impl Bridge {
    pub fn new(config: BridgeConfig, session: Arc<LoggerSession>, prompt: Arc<BridgePrompt>) -> Self {
        Self {
            config,
            session,
            prompt,
        }
    }

    /// Bind to `listen_addr` and accept connections forever.
    pub async fn run(&self) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.config.listen_addr).await?;
        self.serve(listener).await
    }

    /// Accept connections on an already bound listener.
    pub async fn serve(&self, listener: TcpListener) -> anyhow::Result<()> {
        tracing::info!(addr = %listener.local_addr()?, "host bridge listening");

        loop {
            let (stream, remote_addr) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(err) => {
                    tracing::warn!(%err, "accept failed");
                    continue;
                }
            };

            let connection = Connection {
                id: Uuid::new_v4(),
                remote_addr,
                session: Arc::clone(&self.session),
                prompt: Arc::clone(&self.prompt),
            };
            let origins = self.config.origins.clone();

            tokio::spawn(async move {
                if let Err(err) = connection.handle(stream, origins).await {
                    tracing::warn!(%remote_addr, %err, "connection handler error");
                }
            });
        }
    }
}

/// Work that must run in arrival order.
enum Work {
    Event(BrowserEvent),
    Rating {
        rating: i64,
        tab: TabSnapshot,
        at: DateTime<Utc>,
    },
    Toggle(bool),
    Reauthenticate,
}

struct Connection {
    id: Uuid,
    remote_addr: SocketAddr,
    session: Arc<LoggerSession>,
    prompt: Arc<BridgePrompt>,
}

impl Connection {
    async fn handle(self, stream: TcpStream, origins: OriginPolicy) -> anyhow::Result<()> {
        // ------------------------------------------------------------------
        // 1. Handshake, rejecting foreign origins.
        // ------------------------------------------------------------------
        let remote_addr = self.remote_addr;
        let callback =
            move |req: &HsRequest, response: HsResponse| -> Result<HsResponse, ErrorResponse> {
                // A header that is not valid UTF-8 counts as malformed.
                let origin = req
                    .headers()
                    .get(ORIGIN)
                    .map(|v| v.to_str().unwrap_or_default());

                if let Err(rejection) = origins.check(origin) {
                    tracing::warn!(%remote_addr, %rejection, "origin rejected");
                    let mut denied = ErrorResponse::new(Some("Origin not allowed".to_string()));
                    *denied.status_mut() = StatusCode::FORBIDDEN;
                    return Err(denied);
                }
                Ok(response)
            };

        let ws = tokio_tungstenite::accept_hdr_async(stream, callback).await?;
        tracing::info!(connection_id = %self.id, %remote_addr, "extension connected");

        // ------------------------------------------------------------------
        // 2. Writer task, prompt attachment and the ordered worker.
        // ------------------------------------------------------------------
        let (mut ws_write, mut ws_read) = ws.split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<HostMessage>();

        let connection_id = self.id;
        tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                let json = match serde_json::to_string(&frame) {
                    Ok(json) => json,
                    Err(err) => {
                        tracing::error!(%connection_id, %err, "failed to serialize frame");
                        continue;
                    }
                };
                if ws_write.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
            let _ = ws_write.close().await;
        });

        self.prompt.attach(self.id, outbound.clone());

        let (work_tx, work_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_worker(Arc::clone(&self.session), work_rx, outbound));

        // ------------------------------------------------------------------
        // 3. Reader loop.
        // ------------------------------------------------------------------
        while let Some(frame) = ws_read.next().await {
            let text = match frame {
                Ok(Message::Text(text)) => text,
                Ok(Message::Close(_)) => break,
                Ok(_) => continue,
                Err(err) => {
                    tracing::debug!(connection_id = %self.id, %err, "read error, closing");
                    break;
                }
            };

            match serde_json::from_str::<ExtensionMessage>(&text) {
                Ok(message) => self.dispatch(message, &work_tx),
                Err(err) => {
                    tracing::warn!(connection_id = %self.id, %err, "unrecognised frame ignored");
                }
            }
        }

        self.prompt.detach(self.id);
        tracing::info!(connection_id = %self.id, %remote_addr, "extension disconnected");
        Ok(())
    }

    fn dispatch(&self, message: ExtensionMessage, work: &mpsc::UnboundedSender<Work>) {
        let item = match message {
            ExtensionMessage::Window { event, tab } => {
                Work::Event(BrowserEvent::now(event.into(), tab.into()))
            }
            ExtensionMessage::Tab { event, tab } => {
                Work::Event(BrowserEvent::now(event.into(), tab.into()))
            }
            ExtensionMessage::Rating { rating, tab } => Work::Rating {
                rating,
                tab: tab.into(),
                at: Utc::now(),
            },
            ExtensionMessage::Toggle { checked } => Work::Toggle(checked),
            ExtensionMessage::Reauthenticate => Work::Reauthenticate,
            ExtensionMessage::Credential { reply } => {
                self.prompt.deliver_credential(reply.into());
                return;
            }
            ExtensionMessage::LoginMethod { choice } => {
                self.prompt.deliver_login_method(choice.into());
                return;
            }
        };

        if work.send(item).is_err() {
            tracing::warn!(connection_id = %self.id, "event worker gone; frame dropped");
        }
    }
}

async fn run_worker(
    session: Arc<LoggerSession>,
    mut work: mpsc::UnboundedReceiver<Work>,
    outbound: mpsc::UnboundedSender<HostMessage>,
) {
    while let Some(item) = work.recv().await {
        let login = match item {
            // Only an event that ran a login has anything to show.
            Work::Event(event) => match session.log_event(event).await.login() {
                Some(result) => Some(result),
                None => continue,
            },
            Work::Rating { rating, tab, at } => {
                match session.rate(rating, tab, at).await.login() {
                    Some(result) => Some(result),
                    None => continue,
                }
            }
            Work::Toggle(checked) => session.set_logging(checked).await,
            Work::Reauthenticate => Some(session.reauthenticate().await),
        };

        for frame in HostMessage::for_login(login) {
            // The extension may already be gone.
            let _ = outbound.send(frame);
        }
    }
}
