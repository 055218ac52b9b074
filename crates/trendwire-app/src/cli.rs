//! CLI argument definitions for the Trendwire binary.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use trendwire_core::config::TrendwireConfig;

/// Trendwire - collects news items, analyzes them and delivers digests and
/// trend reports.
#[derive(Parser, Debug)]
#[command(name = "trendwire", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Data directory holding the SQLite database.
    #[arg(short = 'd', long = "data-dir", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    /// JSON feed file read by the collector. Defaults to `<data-dir>/feed.json`.
    #[arg(long = "feed", global = true)]
    pub feed: Option<PathBuf>,

    /// Directory digests and trend reports are written to. Defaults to
    /// `<data-dir>/reports`.
    #[arg(long = "out-dir", global = true)]
    pub out_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Collect, analyze and deliver a daily digest.
    RunDaily,
    /// Collect, analyze, then deliver a trend report and a digest.
    RunPeriodic {
        /// Look-back window in days. Defaults to `pipeline.periodic_window_days`.
        #[arg(long = "days")]
        days: Option<i64>,
    },
    /// Print item counts per status.
    Status,
    /// Write a default configuration file.
    InitConfig {
        /// Overwrite an existing file.
        #[arg(long = "force")]
        force: bool,
    },
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > TRENDWIRE_CONFIG env var > ~/.trendwire/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("TRENDWIRE_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the data directory, expanding a leading `~`.
    ///
    /// Priority: --data-dir flag > config file value.
    pub fn resolve_data_dir(&self, config: &TrendwireConfig) -> PathBuf {
        match self.data_dir {
            Some(ref p) => p.clone(),
            None => expand_home(&config.general.data_dir),
        }
    }

    /// Log filter directive from the flag, if given. `RUST_LOG` and the config
    /// value are consulted by the caller.
    pub fn resolve_log_level(&self) -> Option<String> {
        self.log_level.clone()
    }

    pub fn resolve_feed(&self, data_dir: &Path) -> PathBuf {
        self.feed
            .clone()
            .unwrap_or_else(|| data_dir.join("feed.json"))
    }

    pub fn resolve_out_dir(&self, data_dir: &Path) -> PathBuf {
        self.out_dir
            .clone()
            .unwrap_or_else(|| data_dir.join("reports"))
    }
}

/// Expand `~/` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => match std::env::var("HOME") {
            Ok(home) => PathBuf::from(home).join(rest),
            Err(_) => PathBuf::from(path),
        },
        None => PathBuf::from(path),
    }
}

/// Default config file path.
fn default_config_path() -> PathBuf {
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".trendwire").join("config.toml");
    }
    PathBuf::from("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        CliArgs::command().debug_assert();
    }

    #[test]
    fn test_parse_subcommands() {
        let args = CliArgs::try_parse_from(["trendwire", "run-daily"]).unwrap();
        assert_eq!(args.command, Command::RunDaily);

        let args = CliArgs::try_parse_from(["trendwire", "run-periodic", "--days", "14"]).unwrap();
        assert_eq!(args.command, Command::RunPeriodic { days: Some(14) });

        let args = CliArgs::try_parse_from(["trendwire", "init-config", "--force"]).unwrap();
        assert_eq!(args.command, Command::InitConfig { force: true });
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = CliArgs::try_parse_from([
            "trendwire",
            "status",
            "--data-dir",
            "/tmp/tw",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(args.command, Command::Status);
        assert_eq!(args.data_dir, Some(PathBuf::from("/tmp/tw")));
        assert_eq!(args.resolve_log_level().as_deref(), Some("debug"));
    }

    #[test]
    fn test_missing_subcommand_is_rejected() {
        assert!(CliArgs::try_parse_from(["trendwire"]).is_err());
    }

    #[test]
    fn test_config_flag_wins() {
        let args =
            CliArgs::try_parse_from(["trendwire", "--config", "/etc/tw.toml", "status"]).unwrap();
        assert_eq!(args.resolve_config_path(), PathBuf::from("/etc/tw.toml"));
    }

    #[test]
    fn test_data_dir_defaults_to_config() {
        let args = CliArgs::try_parse_from(["trendwire", "status"]).unwrap();
        let mut config = TrendwireConfig::default();
        config.general.data_dir = "/var/lib/trendwire".to_string();

        let data_dir = args.resolve_data_dir(&config);
        assert_eq!(data_dir, PathBuf::from("/var/lib/trendwire"));
        assert_eq!(args.resolve_feed(&data_dir), data_dir.join("feed.json"));
        assert_eq!(args.resolve_out_dir(&data_dir), data_dir.join("reports"));
    }

    #[test]
    fn test_expand_home_leaves_absolute_paths() {
        assert_eq!(expand_home("/data/tw"), PathBuf::from("/data/tw"));
        assert_eq!(expand_home("relative/dir"), PathBuf::from("relative/dir"));
    }
}
