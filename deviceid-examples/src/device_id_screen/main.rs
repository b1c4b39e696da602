//! Device ID screen example
//!
//! Starts resolution once, the way an app would at launch, against an
//! in-memory SDK whose direct query comes back empty and which broadcasts
//! the identifier one second later. The screen then shows the resolved ID.
//!
//! Set `RUST_LOG=deviceid=debug` to watch the race, and
//! `DEVICEID_SUBSCRIPTION_TIMEOUT_MS=500` to see it fail instead.

use anyhow::Result;
use deviceid::{BroadcastEvent, DeviceIdResolver, ResolverConfig, TracingNotifier};
use deviceid_examples::screen::DeviceIdScreen;
use deviceid_memory::{DirectResponse, InMemorySdk};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::prelude::*;

fn init_logging() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_logging();

    let config = ResolverConfig::from_env()?;
    info!(?config, "configuration loaded");

    let sdk = InMemorySdk::new().with_direct_response(DirectResponse::empty());
    let resolver = DeviceIdResolver::with_config(sdk.clone(), sdk.clone(), TracingNotifier, config);

    // App launch
    let attempt = resolver.initialize();
    info!(attempt = %attempt.attempt(), "device ID resolution started");

    sdk.emit_after(
        Duration::from_secs(1),
        BroadcastEvent::received_device_id("abc123"),
    );

    let accessor = resolver.accessor();
    println!("{}", DeviceIdScreen::snapshot(&accessor));

    let screen = DeviceIdScreen::load(&accessor).await;
    if let DeviceIdScreen::Failed(err) = &screen {
        info!(error = %err, "showing screen without a device ID");
    }
    println!("{screen}");

    Ok(())
}
