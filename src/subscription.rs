use crate::error::{DutchDutchError, Result};
use crate::state::DeviceState;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;

type UpdateCallback = Arc<dyn Fn(&DeviceState) + Send + Sync>;

/// Fans pushed state out to the registered callback and to receivers
#[derive(Clone)]
pub(crate) struct Notifier {
    tx: broadcast::Sender<DeviceState>,
    callback: Arc<Mutex<Option<UpdateCallback>>>,
}

impl Notifier {
    pub(crate) fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            callback: Arc::new(Mutex::new(None)),
        }
    }

    pub(crate) fn set_callback(&self, callback: UpdateCallback) {
        *self.callback.lock().unwrap_or_else(PoisonError::into_inner) = Some(callback);
    }

    pub(crate) fn subscribe(&self) -> StateReceiver {
        StateReceiver::new(self.tx.subscribe())
    }

    pub(crate) fn notify(&self, state: &DeviceState) {
        let callback = self
            .callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(callback) = callback {
            callback(state);
        }
        // Nobody listening is fine
        let _ = self.tx.send(state.clone());
    }
}

/// Receiver for pushed state updates
pub struct StateReceiver {
    rx: broadcast::Receiver<DeviceState>,
}

impl StateReceiver {
    /// Create a new state receiver
    pub(crate) fn new(rx: broadcast::Receiver<DeviceState>) -> Self {
        Self { rx }
    }

    /// Receive the next state update
    ///
    /// Returns an error once the session has been dropped.
    pub async fn recv(&mut self) -> Result<DeviceState> {
        self.rx
            .recv()
            .await
            .map_err(|e| match e {
                broadcast::error::RecvError::Closed => DutchDutchError::ConnectionClosed,
                broadcast::error::RecvError::Lagged(n) => {
                    DutchDutchError::Unexpected(format!("Lagged by {} messages", n))
                }
            })
    }

    /// Try to receive a state update without blocking
    ///
    /// Returns `None` if no message is available.
    pub fn try_recv(&mut self) -> Result<Option<DeviceState>> {
        match self.rx.try_recv() {
            Ok(update) => Ok(Some(update)),
            Err(broadcast::error::TryRecvError::Empty) => Ok(None),
            Err(broadcast::error::TryRecvError::Closed) => Err(DutchDutchError::ConnectionClosed),
            Err(broadcast::error::TryRecvError::Lagged(n)) => Err(DutchDutchError::Unexpected(
                format!("Lagged by {} messages", n),
            )),
        }
    }
}
