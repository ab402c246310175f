//! Poll an 8c pair and print every state change
//!
//! ```text
//! RUST_LOG=dutchdutch_8c=debug cargo run --example monitor -- 192.168.1.50
//! ```

use dutchdutch_8c::{Session, SessionConfig, UpdateOutcome};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const POLL_INTERVAL: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let host = std::env::args()
        .nth(1)
        .ok_or("usage: monitor <speaker address>")?;

    let session = Session::new(SessionConfig::new(host))?;
    session.on_update(|state| {
        println!(
            "volume {:.2} muted {:?} source {:?} preset {:?}",
            state.volume_level(),
            state.muted,
            state.source(),
            state.preset
        );
    });
    let mut updates = session.subscribe();

    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match session.update().await {
                    UpdateOutcome::Unavailable => println!("{} unavailable", session.config().host),
                    outcome => println!(
                        "{:?}: {} {} v{} at {:?}, playing {:?}, title {:?}",
                        outcome,
                        session.model(),
                        session.serial(),
                        session.version(),
                        session.master_url(),
                        session.playing(),
                        session.media_title()
                    ),
                }
            }
            Ok(state) = updates.recv() => {
                tracing::debug!("Pushed state: {:?}", state);
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    session.disconnect().await;
    Ok(())
}
