// src/config.rs
//! Command line and environment configuration.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::collector::MAX_SLOTS;

#[derive(Debug, Clone, Parser)]
#[command(name = "nvmecollectd", version, about = "Ships NVMe drive health telemetry over UDP")]
pub struct Config {
    /// UDP destination for telemetry documents
    #[arg(long, env = "METRICS_TARGET", default_value = "127.0.0.1:1555")]
    pub target: String,

    /// Seconds between polls
    #[arg(long, env = "NVMECOLLECTD_INTERVAL", default_value_t = 10)]
    pub interval: u64,

    /// Controller slots scanned at startup
    #[arg(long, default_value_t = MAX_SLOTS)]
    pub max_slots: u32,

    /// Replay raw captures from this directory instead of querying devices
    #[arg(long, env = "NVMECOLLECTD_DUMP_DIR")]
    pub dump_dir: Option<PathBuf>,

    /// Print the diagnostic report of every drive and exit
    #[arg(long, conflicts_with = "once")]
    pub report: bool,

    /// Print a single telemetry document to stdout and exit
    #[arg(long)]
    pub once: bool,
}

impl Config {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.interval.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::try_parse_from(["nvmecollectd"]).unwrap();
        assert_eq!(config.max_slots, 32);
        assert!(config.dump_dir.is_none());
        assert!(!config.report);
    }

    #[test]
    fn test_zero_interval_is_clamped() {
        let config =
            Config::try_parse_from(["nvmecollectd", "--interval", "0", "--target", "10.0.0.1:9"])
                .unwrap();
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.target, "10.0.0.1:9");
    }

    #[test]
    fn test_report_conflicts_with_once() {
        assert!(Config::try_parse_from(["nvmecollectd", "--report", "--once"]).is_err());
    }
}
