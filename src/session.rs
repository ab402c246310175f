use crate::config::SessionConfig;
use crate::connection::FrameSender;
use crate::discovery::{bootstrap, Bootstrapped};
use crate::error::{DutchDutchError, Result};
use crate::listener::Listener;
use crate::presets::PresetRegistry;
use crate::probe::http_client;
use crate::protocol::{Endpoint, Method, Request};
use crate::room::RoomCommands;
use crate::state::{gain_from_level, materialize, DeviceState};
use crate::subscription::{Notifier, StateReceiver};
use crate::types::{input_for_source, DeviceIdentity, Targets, TransportAction, MODEL};
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Result of one [`Session::update`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The device state was rebuilt from the latest snapshot
    Refreshed,
    /// Connected, but the snapshot could not be used; previous state kept
    Unchanged,
    /// Not connected; call again on the next tick
    Unavailable,
}

/// Connection phase of a session
///
/// Only `Bootstrapping` reads replies on the foreground; once `Steady`, the
/// listener owns the receiver and foreground calls only send. Both carry the
/// generation of the attempt that entered them.
enum Phase {
    Unbootstrapped,
    Bootstrapping(u64),
    Steady(Steady),
}

struct Steady {
    generation: u64,
    sender: FrameSender,
    listener: Listener,
}

impl Phase {
    fn name(&self) -> &'static str {
        match self {
            Self::Unbootstrapped => "unbootstrapped",
            Self::Bootstrapping(_) => "bootstrapping",
            Self::Steady(_) => "steady",
        }
    }
}

/// Cached knowledge about the pair, mutated only by `update` and the listener
#[derive(Default)]
struct SessionState {
    available: bool,
    identity: DeviceIdentity,
    master_url: Option<String>,
    targets: Option<Targets>,
    /// Data of the last network read or notification
    network: Option<Value>,
    device: Option<DeviceState>,
    presets: PresetRegistry,
}

impl SessionState {
    /// Rebuild the device state from the cached snapshot
    fn refresh(&mut self) -> UpdateOutcome {
        let (Some(network), Some(targets)) = (&self.network, &self.targets) else {
            return UpdateOutcome::Unchanged;
        };

        match materialize(network, &targets.room, &mut self.presets) {
            Ok(Some(device)) => {
                self.device = Some(device);
                UpdateOutcome::Refreshed
            }
            Ok(None) => UpdateOutcome::Unchanged,
            Err(e) => {
                tracing::warn!("Skipping update, keeping previous state: {}", e);
                UpdateOutcome::Unchanged
            }
        }
    }
}

/// Shared core of a session, also held by its listener task
pub(crate) struct Inner {
    config: SessionConfig,
    http: reqwest::Client,
    phase: Mutex<Phase>,
    state: Mutex<SessionState>,
    notifier: Notifier,
    generations: AtomicU64,
}

impl Inner {
    fn phase(&self) -> MutexGuard<'_, Phase> {
        self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Replace the network snapshot and rebuild the device state
    ///
    /// Returns the new state when it could be materialized.
    pub(crate) fn apply_network(&self, network: Value) -> Option<DeviceState> {
        let mut state = self.state();
        state.network = Some(network);
        match state.refresh() {
            UpdateOutcome::Refreshed => state.device.clone(),
            _ => None,
        }
    }

    /// Report a failed steady connection and tear it down
    pub(crate) fn connection_lost(&self, generation: Option<u64>) {
        if self.teardown(generation) {
            tracing::warn!("Lost connection to {}", self.config.host);
        }
    }

    /// Tear down the steady connection, returning whether there was one
    ///
    /// With a generation, only the steady phase started under that generation
    /// is torn down, so a stale listener cannot end a newer connection.
    fn teardown(&self, generation: Option<u64>) -> bool {
        let previous = {
            let mut phase = self.phase();
            let current = matches!(
                &*phase,
                Phase::Steady(steady) if generation.map_or(true, |g| g == steady.generation)
            );
            if !current {
                return false;
            }
            std::mem::replace(&mut *phase, Phase::Unbootstrapped)
        };

        self.state().available = false;

        if let Phase::Steady(steady) = previous {
            steady.sender.close();
            steady.listener.cancel();
        }
        true
    }

    /// Generation of a steady phase whose listener is no longer running
    fn stale_generation(&self) -> Option<u64> {
        match &*self.phase() {
            Phase::Steady(steady) if steady.listener.is_finished() => Some(steady.generation),
            _ => None,
        }
    }

    /// Move from `Unbootstrapped` to `Bootstrapping` under a new generation
    fn begin_bootstrap(&self) -> Option<BootstrapGuard<'_>> {
        let mut phase = self.phase();
        if !matches!(*phase, Phase::Unbootstrapped) {
            return None;
        }
        let generation = self.generations.fetch_add(1, Ordering::Relaxed) + 1;
        *phase = Phase::Bootstrapping(generation);
        Some(BootstrapGuard {
            inner: self,
            generation,
            committed: false,
        })
    }

    /// Sender and room of the steady connection
    fn steady_sender(&self) -> Result<(FrameSender, u64, String)> {
        let phase = self.phase();
        let Phase::Steady(steady) = &*phase else {
            return Err(DutchDutchError::NotConnected);
        };
        let room = self
            .state()
            .targets
            .as_ref()
            .map(|targets| targets.room.clone())
            .ok_or(DutchDutchError::NotConnected)?;
        Ok((steady.sender.clone(), steady.generation, room))
    }
}

/// Reverts a bootstrap that did not reach steady state
///
/// A `disconnect` while discovery runs resets the phase; the guard then no
/// longer owns it and the attempt must not commit.
struct BootstrapGuard<'a> {
    inner: &'a Inner,
    generation: u64,
    committed: bool,
}

impl BootstrapGuard<'_> {
    /// Whether `phase` still belongs to this attempt
    fn owns(&self, phase: &Phase) -> bool {
        matches!(phase, Phase::Bootstrapping(g) if *g == self.generation)
    }
}

impl Drop for BootstrapGuard<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        let mut phase = self.inner.phase();
        if self.owns(&phase) {
            *phase = Phase::Unbootstrapped;
        }
    }
}

/// Snapshot of cached fields for troubleshooting
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostics {
    pub is_available: bool,
    pub phase: &'static str,
    pub master_url: Option<String>,
    pub identity: DeviceIdentity,
    pub targets: Option<Targets>,
    pub sources: Vec<String>,
    pub source_list: Vec<&'static str>,
    pub streaming: Option<bool>,
    pub gain: Option<f64>,
    pub preset: Option<String>,
    pub network_info: Option<Value>,
}

/// Session with one stereo pair
///
/// Nothing happens until [`update`](Self::update) is called. The first call
/// discovers the master, reads the full room state and starts listening for
/// notifications. Later calls rebuild state from the cached snapshot, or
/// rediscover from scratch after the connection was lost. Call it on a fixed
/// interval; there is no internal retry.
///
/// # Example
///
/// ```no_run
/// use dutchdutch_8c::{Session, SessionConfig, UpdateOutcome};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let session = Session::new(SessionConfig::new("192.168.1.50"))?;
///     session.on_update(|state| println!("volume {:.2}", state.volume_level()));
///
///     if session.update().await != UpdateOutcome::Unavailable {
///         session.set_volume_level(0.4).await?;
///         session.select_source("Roon Ready").await?;
///     }
///     Ok(())
/// }
/// ```
pub struct Session {
    inner: Arc<Inner>,
}

impl Session {
    /// Create an unconnected session
    pub fn new(config: SessionConfig) -> Result<Self> {
        let http = http_client(config.probe_timeout)?;
        let notifier = Notifier::new(config.update_channel_capacity);

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                http,
                phase: Mutex::new(Phase::Unbootstrapped),
                state: Mutex::new(SessionState::default()),
                notifier,
                generations: AtomicU64::new(0),
            }),
        })
    }

    /// Configuration this session was created with
    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    // ========== Update Cycle ==========

    /// Connect if needed and rebuild the device state
    ///
    /// Never fails: problems are logged and reported as an outcome.
    pub async fn update(&self) -> UpdateOutcome {
        let inner = &self.inner;

        if let Some(generation) = inner.stale_generation() {
            tracing::warn!("Listener {} is no longer running", generation);
            inner.connection_lost(Some(generation));
        }

        let Some(guard) = inner.begin_bootstrap() else {
            return match &*inner.phase() {
                Phase::Steady(_) => inner.state().refresh(),
                _ => UpdateOutcome::Unavailable,
            };
        };

        tracing::debug!("Bootstrapping {}", inner.config.host);
        let bootstrapped = match bootstrap(&inner.config, &inner.http).await {
            Ok(bootstrapped) => bootstrapped,
            Err(e) => {
                if e.requires_reconnect() {
                    tracing::debug!("{} unreachable: {}", inner.config.host, e);
                } else {
                    tracing::warn!("Discovery of {} failed: {}", inner.config.host, e);
                }
                inner.state().available = false;
                return UpdateOutcome::Unavailable;
            }
        };

        match self.enter_steady(guard, bootstrapped) {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!("Could not start listening to {}: {}", inner.config.host, e);
                inner.state().available = false;
                UpdateOutcome::Unavailable
            }
        }
    }

    /// Publish a finished discovery and start listening
    ///
    /// The phase lock is held throughout, so a concurrent `disconnect` either
    /// lands before (and the attempt is dropped) or after (and tears it down).
    fn enter_steady(
        &self,
        mut guard: BootstrapGuard<'_>,
        bootstrapped: Bootstrapped,
    ) -> Result<UpdateOutcome> {
        let inner = &self.inner;
        let Bootstrapped {
            identity,
            master_url,
            targets,
            network,
            connection,
        } = bootstrapped;
        let (sender, receiver) = connection.split();

        let mut phase = inner.phase();
        if !guard.owns(&phase) {
            drop(phase);
            tracing::info!("Discovery of {} abandoned by disconnect", inner.config.host);
            sender.close();
            return Ok(UpdateOutcome::Unavailable);
        }

        let outcome = {
            let mut state = inner.state();
            state.identity = identity;
            state.master_url = Some(master_url);
            state.targets = Some(targets);
            state.network = Some(network);
            state.refresh()
        };

        let generation = guard.generation;
        let listener = Listener::spawn(inner.clone(), generation, receiver);

        if let Err(e) = sender.send_only(&Request::new(Endpoint::Network, Method::Subscribe)) {
            listener.cancel();
            drop(phase);
            return Err(e);
        }

        *phase = Phase::Steady(Steady {
            generation,
            sender,
            listener,
        });
        guard.committed = true;
        inner.state().available = true;
        drop(phase);

        tracing::info!("Listening to {} (generation {})", inner.config.host, generation);
        Ok(outcome)
    }

    /// Close the connection and stop listening
    ///
    /// A discovery still in flight is abandoned. The next
    /// [`update`](Self::update) starts over with discovery.
    pub async fn disconnect(&self) {
        let previous = std::mem::replace(&mut *self.inner.phase(), Phase::Unbootstrapped);
        self.inner.state().available = false;

        if let Phase::Steady(steady) = previous {
            steady.sender.close();
            steady.listener.shutdown().await;
            tracing::info!("Disconnected from {}", self.inner.config.host);
        }
    }

    // ========== Push Updates ==========

    /// Register a callback run after every accepted notification
    ///
    /// The callback runs on the listener task and must not block.
    pub fn on_update<F>(&self, callback: F)
    where
        F: Fn(&DeviceState) + Send + Sync + 'static,
    {
        self.inner.notifier.set_callback(Arc::new(callback));
    }

    /// Receive every state pushed by a notification
    pub fn subscribe(&self) -> StateReceiver {
        self.inner.notifier.subscribe()
    }

    // ========== Commands ==========

    async fn dispatch(&self, build: impl FnOnce(&RoomCommands<'_>) -> Request) -> Result<()> {
        let (sender, generation, room) = self.inner.steady_sender()?;
        let request = build(&RoomCommands::new(&room));

        if let Err(e) = sender.send_only(&request) {
            tracing::warn!("Send to {} failed: {}", self.inner.config.host, e);
            self.inner.connection_lost(Some(generation));
            return Err(e);
        }
        Ok(())
    }

    /// Set the volume level (0..1)
    ///
    /// The requested gain never exceeds -10 dB. Nothing is sent while the
    /// selected XLR input has external gain, as the level would be ignored.
    pub async fn set_volume_level(&self, level: f64) -> Result<()> {
        if self.device().is_some_and(|device| device.external_gain) {
            tracing::debug!("External gain active, ignoring volume change");
            return Ok(());
        }
        let gain = gain_from_level(level);
        self.dispatch(|room| room.set_gain(gain)).await
    }

    /// Mute or unmute
    pub async fn mute_volume(&self, mute: bool) -> Result<()> {
        self.dispatch(|room| room.set_mute(mute)).await
    }

    /// Resume playback on the active streamer
    pub async fn media_play(&self) -> Result<()> {
        self.dispatch(|room| room.transport(TransportAction::Play)).await
    }

    /// Pause the active streamer
    pub async fn media_pause(&self) -> Result<()> {
        self.dispatch(|room| room.transport(TransportAction::Pause)).await
    }

    /// Streamers have no stop; this pauses
    pub async fn media_stop(&self) -> Result<()> {
        self.dispatch(|room| room.transport(TransportAction::Pause)).await
    }

    /// Skip to the next track
    pub async fn media_next_track(&self) -> Result<()> {
        self.dispatch(|room| room.transport(TransportAction::Next)).await
    }

    /// Go back to the previous track
    pub async fn media_previous_track(&self) -> Result<()> {
        self.dispatch(|room| room.transport(TransportAction::Previous)).await
    }

    /// Select a source by label; anything but a known streamer selects XLR
    pub async fn select_source(&self, source: &str) -> Result<()> {
        let input = input_for_source(source);
        self.dispatch(|room| room.set_input(input)).await
    }

    /// Select a preset by name
    ///
    /// Fails with [`DutchDutchError::UnknownPreset`] without sending anything
    /// if the speaker never reported a preset with that name.
    pub async fn select_preset(&self, name: &str) -> Result<()> {
        let id = self.inner.state().presets.id_for(name).map(str::to_string);
        let Some(id) = id else {
            tracing::error!("Unknown preset {} selected", name);
            return Err(DutchDutchError::UnknownPreset(name.to_string()));
        };
        self.dispatch(|room| room.select_preset(&id)).await
    }

    /// Wake the pair from sleep
    pub async fn turn_on(&self) -> Result<()> {
        self.dispatch(|room| room.set_sleep(false)).await
    }

    /// Put the pair to sleep
    pub async fn turn_off(&self) -> Result<()> {
        self.dispatch(|room| room.set_sleep(true)).await
    }

    // ========== Accessors ==========

    /// Whether the session is connected and listening
    pub fn is_available(&self) -> bool {
        self.inner.state().available
    }

    /// Identity of the pair; empty until the first discovery
    pub fn identity(&self) -> DeviceIdentity {
        self.inner.state().identity.clone()
    }

    /// Master name, the unique key of the pair
    pub fn serial(&self) -> String {
        self.inner.state().identity.serial.clone()
    }

    /// Same as the serial
    pub fn device_name(&self) -> String {
        self.serial()
    }

    /// Always `8c`
    pub fn model(&self) -> &'static str {
        MODEL
    }

    /// Firmware version of the master
    pub fn version(&self) -> String {
        self.inner.state().identity.version.clone()
    }

    /// WebSocket URL of the master, once discovered
    pub fn master_url(&self) -> Option<String> {
        self.inner.state().master_url.clone()
    }

    /// Room, master and slave targets, once discovered
    pub fn targets(&self) -> Option<Targets> {
        self.inner.state().targets.clone()
    }

    /// Last materialized device state
    pub fn device(&self) -> Option<DeviceState> {
        self.inner.state().device.clone()
    }

    /// Volume level in 0..1
    pub fn volume_level(&self) -> Option<f64> {
        self.device().map(|device| device.volume_level())
    }

    /// Mute state of the room
    pub fn is_volume_muted(&self) -> Option<bool> {
        self.device().and_then(|device| device.muted)
    }

    /// Whether a streaming input is selected
    pub fn streaming(&self) -> Option<bool> {
        self.device().map(|device| device.streaming)
    }

    /// Playing or paused; `None` when not streaming
    pub fn playing(&self) -> Option<bool> {
        self.device().and_then(|device| device.playing)
    }

    /// On unless the pair sleeps
    pub fn power(&self) -> Option<bool> {
        self.device().and_then(|device| device.power())
    }

    /// Label of the selected source
    pub fn source(&self) -> Option<&'static str> {
        self.device().and_then(|device| device.source())
    }

    /// Sources the room offers, sorted
    pub fn source_list(&self) -> Vec<&'static str> {
        self.device()
            .map(|device| device.source_list())
            .unwrap_or_default()
    }

    /// Name of the current preset
    pub fn preset(&self) -> Option<String> {
        self.device().and_then(|device| device.preset)
    }

    /// Names of every preset seen so far, sorted
    pub fn preset_list(&self) -> Vec<String> {
        self.inner.state().presets.names()
    }

    /// Current title, or the XLR sub-input when on XLR
    pub fn media_title(&self) -> Option<String> {
        self.device()
            .and_then(|device| device.media_title().map(str::to_string))
    }

    /// Artist of the current stream
    pub fn media_artist(&self) -> Option<String> {
        self.device().and_then(|device| device.artist)
    }

    /// Album of the current stream
    pub fn media_album_name(&self) -> Option<String> {
        self.device().and_then(|device| device.album)
    }

    /// Album art URL of the current stream
    pub fn media_image_url(&self) -> Option<String> {
        self.device().and_then(|device| device.image_url)
    }

    /// Transport options usable while streaming
    pub fn available_options(&self) -> Option<[&'static str; 4]> {
        self.device().and_then(|device| device.available_options())
    }

    /// Read-only dump of cached fields
    pub fn diagnostics(&self) -> Diagnostics {
        let phase = self.inner.phase().name();
        let state = self.inner.state();
        let device = state.device.as_ref();

        Diagnostics {
            is_available: state.available,
            phase,
            master_url: state.master_url.clone(),
            identity: state.identity.clone(),
            targets: state.targets.clone(),
            sources: device.map(|d| d.input_modes.clone()).unwrap_or_default(),
            source_list: device.map(DeviceState::source_list).unwrap_or_default(),
            streaming: device.map(|d| d.streaming),
            gain: device.map(|d| d.gain),
            preset: device.and_then(|d| d.last_selected_preset.clone()),
            network_info: state.network.clone(),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // The listener holds the core alive; stop it with the session
        self.inner.teardown(None);
    }
}
