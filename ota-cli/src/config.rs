//! Load config from file and environment.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use ota_core::{ControllerConfig, DEFAULT_DEVICE_NAME, PROTOCOL_OVERHEAD};
use serde::Deserialize;
use tracing::warn;

/// Updater configuration. File: ~/.config/opl-ota/config.toml or /etc/opl-ota/config.toml.
/// Env overrides: OPL_OTA_DEVICE_NAME, OPL_OTA_SCAN_TIMEOUT_SECS, OPL_OTA_ACK_TIMEOUT_MS, OPL_OTA_MTU.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Advertised name of the target device (default "Synth OPL").
    #[serde(default = "default_device_name")]
    pub device_name: String,
    /// How long to scan for the device (default 20 s).
    #[serde(default = "default_scan_timeout_secs")]
    pub scan_timeout_secs: u64,
    /// Wait for each handshake reply (default 5000 ms).
    #[serde(default = "default_ack_timeout_ms")]
    pub ack_timeout_ms: u64,
    /// ATT MTU assumed for the link (default 23, the BLE minimum).
    #[serde(default = "default_mtu")]
    pub mtu: u16,
}

fn default_device_name() -> String {
    DEFAULT_DEVICE_NAME.to_string()
}
fn default_scan_timeout_secs() -> u64 {
    20
}
fn default_ack_timeout_ms() -> u64 {
    5000
}
fn default_mtu() -> u16 {
    23
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device_name: default_device_name(),
            scan_timeout_secs: default_scan_timeout_secs(),
            ack_timeout_ms: default_ack_timeout_ms(),
            mtu: default_mtu(),
        }
    }
}

impl Config {
    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_secs)
    }

    pub fn controller(&self) -> ControllerConfig {
        ControllerConfig {
            ack_timeout: Duration::from_millis(self.ack_timeout_ms),
            overhead: PROTOCOL_OVERHEAD,
        }
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(name) = var("OPL_OTA_DEVICE_NAME") {
            if !name.is_empty() {
                self.device_name = name;
            }
        }
        if let Some(v) = parse_env(&var, "OPL_OTA_SCAN_TIMEOUT_SECS") {
            self.scan_timeout_secs = v;
        }
        if let Some(v) = parse_env(&var, "OPL_OTA_ACK_TIMEOUT_MS") {
            self.ack_timeout_ms = v;
        }
        if let Some(v) = parse_env(&var, "OPL_OTA_MTU") {
            self.mtu = v;
        }
    }
}

/// Numeric override; an unparsable value keeps the current setting.
fn parse_env<T>(var: impl Fn(&str) -> Option<String>, key: &str) -> Option<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    let s = var(key)?;
    match s.parse() {
        Ok(v) => Some(v),
        Err(e) => {
            warn!("Ignoring {key}={s:?}: {e}");
            None
        }
    }
}

/// Load config: merge default, then config file (if present), then env vars.
pub fn load() -> Config {
    let mut c = load_file().unwrap_or_default();
    c.apply_env(|key| std::env::var(key).ok());
    c
}

fn config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/opl-ota/config.toml"));
    }
    out.push(PathBuf::from("/etc/opl-ota/config.toml"));
    out
}

fn load_file() -> Option<Config> {
    let path = config_paths().into_iter().find(|p| p.exists())?;
    let s = match std::fs::read_to_string(&path) {
        Ok(s) => s,
        Err(e) => {
            warn!("Cannot read {}: {e}", path.display());
            return None;
        }
    };
    match toml::from_str::<Config>(&s) {
        Ok(c) => Some(c),
        Err(e) => {
            warn!("Ignoring {}: {e}", path.display());
            None
        }
    }
}
