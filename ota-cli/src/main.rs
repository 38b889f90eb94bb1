// opl-ota: push a firmware image to a Synth OPL over Bluetooth LE.

mod config;
mod discovery;
mod transport;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use ota_core::{OtaController, OutcomeReport};
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Push a firmware image to a Synth OPL over Bluetooth LE.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Firmware image to upload.
    firmware: PathBuf,
}

// Current-thread runtime: the notification listener and the session share one scheduler.
#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    init_tracing();
    let args = Args::parse();

    match run(&args).await {
        Ok(report) if report.is_success() => {
            println!("{report}");
            ExitCode::SUCCESS
        }
        Ok(report) => {
            println!("{report}");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("{e:#}");
            println!("OTA failed.");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &Args) -> anyhow::Result<OutcomeReport> {
    let cfg = config::load();
    let firmware = tokio::fs::read(&args.firmware)
        .await
        .with_context(|| format!("cannot read firmware {}", args.firmware.display()))?;

    let peripheral = discovery::find_device(&cfg.device_name, cfg.scan_timeout()).await?;
    let transport = transport::BleTransport::connect(peripheral, cfg.mtu.into()).await?;

    let outcome = OtaController::new(cfg.controller())
        .run(&transport, &firmware)
        .await;
    transport.disconnect().await;
    outcome.context("OTA session not started")
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
