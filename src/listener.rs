use crate::connection::FrameReceiver;
use crate::protocol::{excerpt, Envelope};
use crate::session::Inner;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Background consumer of notifications on a steady connection
///
/// It owns the only receiver of the connection. When the connection ends it
/// tears down the phase it was started for and exits; it never reconnects.
pub(crate) struct Listener {
    handle: JoinHandle<()>,
}

impl Listener {
    pub(crate) fn spawn(inner: Arc<Inner>, generation: u64, receiver: FrameReceiver) -> Self {
        let handle = tokio::spawn(listen(inner, generation, receiver));
        Self { handle }
    }

    /// Whether the task has exited, normally or not
    pub(crate) fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stop the task without waiting for it
    pub(crate) fn cancel(&self) {
        self.handle.abort();
    }

    /// Stop the task and wait until it is gone
    pub(crate) async fn shutdown(self) {
        self.handle.abort();
        match self.handle.await {
            Ok(()) => {}
            Err(e) if e.is_cancelled() => tracing::debug!("Listener cancelled"),
            Err(e) => tracing::warn!("Listener ended abnormally: {}", e),
        }
    }
}

async fn listen(inner: Arc<Inner>, generation: u64, mut receiver: FrameReceiver) {
    tracing::debug!("Listener {} started", generation);

    loop {
        let text = match receiver.receive().await {
            Ok(text) => text,
            Err(e) => {
                tracing::info!("Listener {} stopping: {}", generation, e);
                break;
            }
        };
        tracing::debug!("WS notification: {}", excerpt(&text));

        let frame = match Envelope::parse(&text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!("Ignoring undecodable frame: {}", e);
                continue;
            }
        };
        if !frame.is_network_notification() {
            continue;
        }

        if let Some(state) = inner.apply_network(frame.data) {
            inner.notifier().notify(&state);
        }
    }

    inner.connection_lost(Some(generation));
}
