use crate::stream::{ConnectionError, ConnectionEvent, EventFeed, StreamPayload};
use futures_util::StreamExt;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Owns the single streaming connection to the detection service.
///
/// The socket lives in a background task that forwards every inbound unit as a
/// [`ConnectionEvent`]. Dropping the manager drops the shutdown sender, which
/// makes the task send a close frame and exit.
pub struct ConnectionManager {
    url: String,
    events_rx: Option<mpsc::UnboundedReceiver<ConnectionEvent>>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ConnectionManager {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            events_rx: None,
            shutdown: None,
            task: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Opens the connection in the background. Outcome arrives as `Opened` or `Failed`.
    pub fn connect(&mut self) -> Result<(), ConnectionError> {
        if self.is_connected() {
            return Err(ConnectionError::AlreadyConnected);
        }

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let url = self.url.clone();

        info!(url = %url, "Opening streaming connection");
        let task = tokio::spawn(async move {
            match connect_async(url.as_str()).await {
                Ok((ws, _response)) => {
                    if events_tx.send(ConnectionEvent::Opened).is_err() {
                        return;
                    }
                    pump(ws, shutdown_rx, events_tx).await;
                }
                Err(err) => {
                    let _ = events_tx.send(ConnectionEvent::Failed(ConnectionError::Handshake {
                        url,
                        reason: err.to_string(),
                    }));
                }
            }
        });

        self.events_rx = Some(events_rx);
        self.shutdown = Some(shutdown_tx);
        self.task = Some(task);
        Ok(())
    }
}

impl EventFeed for ConnectionManager {
    async fn next_event(&mut self) -> Option<ConnectionEvent> {
        match self.events_rx.as_mut() {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }

    async fn close(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(mut task) = self.task.take() {
            if tokio::time::timeout(CLOSE_TIMEOUT, &mut task).await.is_err() {
                warn!(url = %self.url, "Streaming task did not stop in time, aborting");
                task.abort();
            }
        }
        self.events_rx = None;
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

async fn pump(
    mut ws: WsStream,
    mut shutdown: oneshot::Receiver<()>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
) {
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                if let Err(err) = ws.close(None).await {
                    debug!(error = %err, "Close handshake failed");
                }
                let _ = events.send(ConnectionEvent::Closed("closed by console".to_string()));
                return;
            }
            message = ws.next() => {
                let event = match message {
                    Some(Ok(Message::Text(text))) => ConnectionEvent::MessageReceived(
                        StreamPayload::Text(text.as_str().to_owned()),
                    ),
                    Some(Ok(Message::Binary(bytes))) => {
                        ConnectionEvent::MessageReceived(StreamPayload::Binary(bytes.to_vec()))
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let reason = match frame {
                            Some(frame) if !frame.reason.as_str().is_empty() => {
                                format!("{} ({})", frame.reason.as_str(), u16::from(frame.code))
                            }
                            Some(frame) => format!("code {}", u16::from(frame.code)),
                            None => "closed by server".to_string(),
                        };
                        let _ = events.send(ConnectionEvent::Closed(reason));
                        return;
                    }
                    // Ping/pong are answered by tungstenite itself.
                    Some(Ok(_)) => continue,
                    Some(Err(err)) => {
                        let _ = events.send(ConnectionEvent::Failed(ConnectionError::Transport(
                            err.to_string(),
                        )));
                        return;
                    }
                    None => {
                        let _ = events.send(ConnectionEvent::Closed("stream ended".to_string()));
                        return;
                    }
                };
                if events.send(event).is_err() {
                    return;
                }
            }
        }
    }
}
