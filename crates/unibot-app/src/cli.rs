//! CLI argument definitions for the unibot binary.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use unibot_core::config::UnibotConfig;

/// Unibot - a university support chat bot fleet with a retrieval-backed FAQ.
#[derive(Parser, Debug)]
#[command(name = "unibot", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Status API port.
    #[arg(short = 'p', long = "port", global = true)]
    pub port: Option<u16>,

    /// Data directory for SQLite and the knowledge index.
    #[arg(short = 'd', long = "data-dir", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Start every enabled bot and serve the status API until Ctrl-C.
    Run,
    /// Build the knowledge index from a CSV knowledge base.
    Ingest {
        /// CSV with Question, Answer, Category and Interface columns.
        /// Defaults to `retrieval.faq_csv_path`.
        #[arg(long)]
        csv: Option<PathBuf>,
        /// Add to the existing index instead of rebuilding it.
        #[arg(long)]
        append: bool,
    },
    /// Run one message through the pipeline and print the result as JSON.
    Ask {
        question: String,
        #[arg(long, default_value = "Student")]
        salutation: String,
        /// Query the knowledge base directly, restricted to this interface.
        #[arg(long)]
        interface: Option<String>,
    },
}

impl CliArgs {
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Run)
    }

    /// Priority: --config flag > UNIBOT_CONFIG env var > ~/.unibot/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("UNIBOT_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Priority: --port flag > UNIBOT_PORT env var > config file value.
    pub fn resolve_port(&self, config_port: u16) -> u16 {
        self.resolve_port_with_env(config_port, std::env::var("UNIBOT_PORT").ok())
    }

    fn resolve_port_with_env(&self, config_port: u16, env_port: Option<String>) -> u16 {
        if let Some(p) = self.port {
            return p;
        }
        env_port
            .and_then(|v| v.trim().parse::<u16>().ok())
            .unwrap_or(config_port)
    }

    /// Fold CLI and environment overrides into the loaded configuration.
    pub fn apply_overrides(&self, config: &mut UnibotConfig) {
        config.general.port = self.resolve_port(config.general.port);
        if let Some(ref dir) = self.data_dir {
            config.general.data_dir = dir.to_string_lossy().to_string();
        }
        if let Some(ref level) = self.log_level {
            config.general.log_level = level.clone();
        }
    }
}

fn default_config_path() -> PathBuf {
    match home_dir() {
        Some(home) => home.join(".unibot").join("config.toml"),
        None => PathBuf::from("config.toml"),
    }
}

pub fn home_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    let var = "USERPROFILE";
    #[cfg(not(target_os = "windows"))]
    let var = "HOME";
    std::env::var(var).ok().map(PathBuf::from)
}

/// Expand a leading `~` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\")) {
        let home = home_dir().unwrap_or_else(|| PathBuf::from("."));
        return home.join(rest);
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> CliArgs {
        CliArgs::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_default_command_is_run() {
        assert_eq!(parse(&["unibot"]).command(), Command::Run);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = parse(&["unibot", "ingest", "--csv", "faq.csv", "--append", "-p", "4000"]);
        assert_eq!(
            args.command(),
            Command::Ingest {
                csv: Some(PathBuf::from("faq.csv")),
                append: true
            }
        );
        assert_eq!(args.port, Some(4000));
    }

    #[test]
    fn test_ask_defaults() {
        let args = parse(&["unibot", "ask", "what is the refund policy"]);
        match args.command() {
            Command::Ask {
                question,
                salutation,
                interface,
            } => {
                assert_eq!(question, "what is the refund policy");
                assert_eq!(salutation, "Student");
                assert!(interface.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_port_priority() {
        let args = parse(&["unibot"]);
        assert_eq!(args.resolve_port_with_env(3040, None), 3040);
        assert_eq!(args.resolve_port_with_env(3040, Some("5000".into())), 5000);
        assert_eq!(args.resolve_port_with_env(3040, Some("bogus".into())), 3040);

        let args = parse(&["unibot", "--port", "6000"]);
        assert_eq!(args.resolve_port_with_env(3040, Some("5000".into())), 6000);
    }

    #[test]
    fn test_overrides_applied() {
        let args = parse(&["unibot", "--data-dir", "/tmp/unibot", "--log-level", "debug", "-p", "7000"]);
        let mut config = UnibotConfig::default();
        args.apply_overrides(&mut config);
        assert_eq!(config.general.data_dir, "/tmp/unibot");
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.general.port, 7000);
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home("/var/data"), PathBuf::from("/var/data"));
        assert!(!expand_home("~/data").to_string_lossy().starts_with('~'));
    }
}
