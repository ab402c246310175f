//! Rust driver for a paired Dutch and Dutch 8c speaker
//!
//! This library discovers, monitors and controls a stereo pair of 8c speakers
//! over the local network. It supports:
//!
//! - Finding the master unit from either speaker's address
//! - A typed view of room state: volume, mute, source, preset, playback, power
//! - Push updates through a callback or a broadcast receiver
//! - Volume, mute, source, preset, transport and power commands
//!
//! # Quick Start
//!
//! ```no_run
//! use dutchdutch_8c::{Session, SessionConfig};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let session = Session::new(SessionConfig::new("192.168.1.50"))?;
//!     let mut updates = session.subscribe();
//!
//!     // Poll on a fixed interval; the first successful call connects
//!     let mut ticker = tokio::time::interval(Duration::from_secs(5));
//!     loop {
//!         tokio::select! {
//!             _ = ticker.tick() => {
//!                 println!("{:?}, available: {}", session.update().await, session.is_available());
//!             }
//!             Ok(state) = updates.recv() => {
//!                 println!("Pushed: volume {:.2}, source {:?}", state.volume_level(), state.source());
//!             }
//!         }
//!     }
//! }
//! ```
//!
//! # Architecture
//!
//! - **Session**: phase machine (`Unbootstrapped → Bootstrapping → Steady`), commands, accessors
//! - **Discovery**: HTTP probe, master resolution and target classification
//! - **Listener**: background consumer of `network` notifications
//! - **Connection**: WebSocket transport with heartbeat and reply correlation
//! - **Protocol**: JSON envelope structures
//! - **State**: derivation of the typed room view from raw payloads

mod config;
mod connection;
mod discovery;
mod error;
mod listener;
mod presets;
mod probe;
mod protocol;
mod room;
mod session;
mod state;
mod subscription;
mod types;

// Public exports
pub use config::{SessionConfig, DEFAULT_WS_PORT};
pub use error::{DutchDutchError, ErrorKind, Result};
pub use presets::PresetRegistry;
pub use session::{Diagnostics, Session, UpdateOutcome};
pub use state::{gain_from_level, level_from_gain, DeviceState, GAIN_CEILING, MIN_GAIN};
pub use subscription::StateReceiver;
pub use types::{
    input_for_source, source_label, DeviceIdentity, Targets, TransportAction, MODEL,
    VALID_STREAMERS, VOLUME_STEP, XLR,
};
