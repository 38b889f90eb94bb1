//! BLE discovery: scan for the advertised device name within a bounded window.

use std::time::Duration;

use anyhow::{bail, Context};
use btleplug::api::{Central, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral};
use tokio::time::Instant;
use tracing::{debug, info, warn};

const SCAN_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Scan the first Bluetooth adapter for a peripheral advertising `name`.
/// Not finding it within `scan_timeout` is fatal: no protocol exchange is attempted.
pub async fn find_device(name: &str, scan_timeout: Duration) -> anyhow::Result<Peripheral> {
    info!("Searching for {name}...");
    let manager = Manager::new()
        .await
        .context("Bluetooth manager unavailable")?;
    let adapter = manager
        .adapters()
        .await
        .context("cannot list Bluetooth adapters")?
        .into_iter()
        .next()
        .context("no Bluetooth adapter found")?;
    adapter
        .start_scan(ScanFilter::default())
        .await
        .context("cannot start BLE scan")?;

    let found = scan_for(&adapter, name, scan_timeout).await;
    if let Err(e) = adapter.stop_scan().await {
        warn!("Failed to stop BLE scan: {e}");
    }
    match found? {
        Some(peripheral) => {
            info!("{name} found!");
            Ok(peripheral)
        }
        None => bail!("{name} has not been found"),
    }
}

async fn scan_for(
    adapter: &Adapter,
    name: &str,
    scan_timeout: Duration,
) -> anyhow::Result<Option<Peripheral>> {
    let deadline = Instant::now() + scan_timeout;
    loop {
        for peripheral in adapter.peripherals().await? {
            let local_name = peripheral
                .properties()
                .await?
                .and_then(|props| props.local_name);
            debug!(address = %peripheral.address(), ?local_name, "seen");
            if matches_name(local_name.as_deref(), name) {
                return Ok(Some(peripheral));
            }
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        tokio::time::sleep(SCAN_POLL_INTERVAL).await;
    }
}

/// Exact match on the advertised local name.
fn matches_name(advertised: Option<&str>, wanted: &str) -> bool {
    advertised == Some(wanted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_must_match_exactly() {
        assert!(matches_name(Some("Synth OPL"), "Synth OPL"));
        assert!(!matches_name(Some("Synth OPL 2"), "Synth OPL"));
        assert!(!matches_name(Some("synth opl"), "Synth OPL"));
        assert!(!matches_name(None, "Synth OPL"));
    }
}
