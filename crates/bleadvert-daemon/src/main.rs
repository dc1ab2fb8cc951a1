//! # bleadvert
//!
//! Registers a BLE advertisement with BlueZ and keeps it registered until
//! SIGINT or SIGTERM.
//!
//! ## Running
//!
//! ```bash
//! # Built-in example advertisement, pretty logs
//! cargo run --package bleadvert-daemon
//!
//! # Under systemd
//! bleadvert --production --config /etc/bleadvert/config.toml
//!
//! # Inspect what would be exported
//! bleadvert --print-properties
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

use anyhow::Context;
use bleadvert_core::{default_config_path, Advertisement, Config};
use bleadvert_daemon::cli::Cli;
use bleadvert_daemon::logging::{self, LogMode};
use clap::Parser;
use tracing::info;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(LogMode::detect(cli.production))?;

    if let Some(path) = &cli.write_default_config {
        Config::default()
            .save(path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!(path = %path.display(), "Wrote default configuration");
        return Ok(());
    }

    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let config = Config::load_or_default(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path.display()))?;
    let advertisement = config
        .advertisement
        .to_advertisement()
        .context("Invalid advertisement configuration")?;

    if cli.print_properties {
        let properties = serde_json::to_string_pretty(&advertisement.properties())?;
        println!("{properties}");
        return Ok(());
    }

    info!(
        path = advertisement.path(),
        advertising_type = %advertisement.ad_type(),
        "Starting bleadvert"
    );
    advertise(&config, advertisement).await?;

    info!("bleadvert shutdown complete");
    Ok(())
}

#[cfg(feature = "bluez")]
async fn advertise(config: &Config, advertisement: Advertisement) -> anyhow::Result<()> {
    use bleadvert_core::{Advertiser, BluezManager};

    let shutdown = bleadvert_daemon::shutdown::install().context("Failed to install signal handlers")?;
    let manager = BluezManager::connect(config.bus.call_timeout())
        .context("Failed to connect to the system bus")?;

    Advertiser::new(manager)
        .run(advertisement, shutdown)
        .await
        .map_err(|e| {
            tracing::error!(error_code = e.error_code(), "{e}");
            anyhow::Error::new(e)
        })
}

#[cfg(not(feature = "bluez"))]
async fn advertise(_config: &Config, _advertisement: Advertisement) -> anyhow::Result<()> {
    anyhow::bail!("bleadvert was built without the `bluez` feature; only --print-properties is available")
}
