use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::scan::ScanTimings;

const APP_DIR_NAME: &str = "wifi-identifier";

/// Scan nearby WiFi networks, tag them with colors and hide the noise.
#[derive(Debug, Clone, Parser)]
#[command(name = "wifi-identifier", version, about)]
pub(crate) struct Config {
    /// Directory holding known_networks.json and the ignore lists.
    #[arg(long, value_name = "PATH")]
    pub(crate) data_dir: Option<PathBuf>,

    /// Wireless interface to scan on (defaults to the first one).
    #[arg(long, value_name = "NAME")]
    pub(crate) interface: Option<String>,

    /// Start with auto-refresh enabled.
    #[arg(long)]
    pub(crate) auto_refresh: bool,

    /// Seconds between auto-refresh scans.
    #[arg(long, value_name = "SECS", default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..))]
    pub(crate) refresh_interval: u64,

    /// Seconds to wait for the daemon to finish a scan.
    #[arg(long, value_name = "SECS", default_value_t = 15, value_parser = clap::value_parser!(u64).range(1..))]
    pub(crate) scan_timeout: u64,

    /// Milliseconds between checks of the daemon's scanning flag.
    #[arg(long, value_name = "MILLIS", default_value_t = 250, value_parser = clap::value_parser!(u64).range(10..))]
    pub(crate) poll_interval: u64,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long)]
    pub(crate) verbose: bool,
}

impl Config {
    pub(crate) fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .map(|dir| dir.join(APP_DIR_NAME))
                .unwrap_or_else(|| PathBuf::from("."))
        })
    }

    pub(crate) fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval)
    }

    pub(crate) fn timings(&self) -> ScanTimings {
        ScanTimings {
            poll_interval: Duration::from_millis(self.poll_interval),
            timeout: Duration::from_secs(self.scan_timeout),
        }
    }
}
