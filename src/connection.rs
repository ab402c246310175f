use crate::error::{DutchDutchError, Result};
use crate::protocol::{excerpt, Envelope, Request};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Commands for the socket task
enum Outgoing {
    Frame(String),
    Close,
}

/// Sending half of a connection; cheap to clone, never waits for replies
#[derive(Clone)]
pub(crate) struct FrameSender {
    tx: mpsc::UnboundedSender<Outgoing>,
}

/// Receiving half of a connection; there is exactly one reader per socket
pub(crate) struct FrameReceiver {
    rx: mpsc::UnboundedReceiver<String>,
}

/// Low-level WebSocket connection to one speaker
///
/// A background task owns the socket. It writes queued frames, forwards
/// inbound text frames, and pings the speaker every heartbeat interval.
/// When a pong is overdue by half an interval the socket is dropped and
/// [`FrameReceiver::receive`] reports the connection as closed.
pub(crate) struct Connection {
    sender: FrameSender,
    receiver: FrameReceiver,
}

impl Connection {
    /// Connect to a WebSocket URL
    pub(crate) async fn connect(url: &str, heartbeat: Duration) -> Result<Self> {
        tracing::info!("Connecting to {}", url);

        let (socket, _) = connect_async(url).await?;

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();

        let url = url.to_string();
        tokio::spawn(async move {
            run_socket(socket, out_rx, in_tx, heartbeat).await;
            tracing::debug!("Socket task for {} finished", url);
        });

        Ok(Self {
            sender: FrameSender { tx: out_tx },
            receiver: FrameReceiver { rx: in_rx },
        })
    }

    /// Hand the two halves to their owners
    pub(crate) fn split(self) -> (FrameSender, FrameReceiver) {
        (self.sender, self.receiver)
    }

    /// Send a request and wait for the reply carrying the same id
    ///
    /// Every other frame received while waiting is discarded, including
    /// notifications. Only use this before a listener owns the receiver.
    pub(crate) async fn send_request(
        &mut self,
        request: &Request,
        limit: Option<Duration>,
    ) -> Result<Envelope> {
        self.sender.send_only(request)?;

        let wait = self.receiver.receive_reply(request);
        match limit {
            Some(limit) => tokio::time::timeout(limit, wait)
                .await
                .map_err(|_| DutchDutchError::Timeout)?,
            None => wait.await,
        }
    }

    /// Close the socket
    pub(crate) fn close(self) {
        self.sender.close();
    }
}

impl FrameSender {
    /// Queue a request for sending
    pub(crate) fn send_only(&self, request: &Request) -> Result<()> {
        let json = request.encode()?;
        tracing::debug!("WS send: {}", excerpt(&json));

        self.tx
            .send(Outgoing::Frame(json))
            .map_err(|_| DutchDutchError::ConnectionClosed)
    }

    /// Ask the socket task to close the connection
    pub(crate) fn close(&self) {
        let _ = self.tx.send(Outgoing::Close);
    }
}

impl FrameReceiver {
    /// Wait for the next text frame
    pub(crate) async fn receive(&mut self) -> Result<String> {
        self.rx.recv().await.ok_or(DutchDutchError::ConnectionClosed)
    }

    async fn receive_reply(&mut self, request: &Request) -> Result<Envelope> {
        loop {
            let text = self.receive().await?;
            tracing::debug!("WS response: {}", excerpt(&text));

            match Envelope::parse(&text) {
                Ok(frame) if frame.answers(request.id()) => return Ok(frame),
                Ok(_) => tracing::trace!("Discarding frame not matching {}", request.id()),
                Err(e) => tracing::debug!("Discarding undecodable frame: {}", e),
            }
        }
    }
}

async fn run_socket(
    socket: Socket,
    mut outgoing: mpsc::UnboundedReceiver<Outgoing>,
    incoming: mpsc::UnboundedSender<String>,
    heartbeat: Duration,
) {
    let (mut write, mut read) = socket.split();

    let mut ticker = interval_at(Instant::now() + heartbeat, heartbeat);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut pong_due: Option<Instant> = None;

    loop {
        let deadline = pong_due.unwrap_or_else(|| Instant::now() + heartbeat);

        tokio::select! {
            command = outgoing.recv() => match command {
                Some(Outgoing::Frame(text)) => {
                    if let Err(e) = write.send(Message::Text(text)).await {
                        tracing::warn!("WS send failed: {}", e);
                        break;
                    }
                }
                Some(Outgoing::Close) | None => {
                    let _ = write.close().await;
                    break;
                }
            },
            message = read.next() => {
                pong_due = None;
                match message {
                    Some(Ok(Message::Text(text))) => {
                        // The reader may already be gone during teardown
                        let _ = incoming.send(text);
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::info!("WebSocket connection closed");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!("WebSocket error: {}", e);
                        break;
                    }
                }
            },
            _ = ticker.tick() => {
                if let Err(e) = write.send(Message::Ping(Vec::new())).await {
                    tracing::warn!("Heartbeat ping failed: {}", e);
                    break;
                }
                if pong_due.is_none() {
                    pong_due = Some(Instant::now() + heartbeat / 2);
                }
            },
            _ = sleep_until(deadline), if pong_due.is_some() => {
                tracing::warn!("Heartbeat timed out, dropping connection");
                break;
            }
        }
    }
}
