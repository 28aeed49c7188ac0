//! CLI argument definitions for the pagechat server.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use std::path::PathBuf;

use clap::Parser;

use pagechat_core::config::PageChatConfig;

const DEFAULT_CONFIG_FILE: &str = "pagechat.toml";

/// pagechat - chat with uploaded PDF documents over HTTP.
#[derive(Parser, Debug)]
#[command(name = "pagechat", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Address to bind the API server to.
    #[arg(long = "host")]
    pub host: Option<String>,

    /// API server port.
    #[arg(short = 'p', long = "port")]
    pub port: Option<u16>,

    /// Data directory; the SQLite database is created inside it.
    #[arg(short = 'd', long = "data-dir")]
    pub data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,
}

impl CliArgs {
    /// Priority: --config flag > PAGECHAT_CONFIG env var > `./pagechat.toml`.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("PAGECHAT_CONFIG") {
            return PathBuf::from(p);
        }
        PathBuf::from(DEFAULT_CONFIG_FILE)
    }

    /// Priority: --port flag > PAGECHAT_PORT env var > config file value.
    pub fn resolve_port(&self, config_port: u16) -> u16 {
        if let Some(p) = self.port {
            return p;
        }
        if let Ok(val) = std::env::var("PAGECHAT_PORT") {
            if let Ok(p) = val.parse::<u16>() {
                return p;
            }
        }
        config_port
    }

    /// Fold the command-line overrides into `config`.
    pub fn apply(&self, config: &mut PageChatConfig) {
        config.server.port = self.resolve_port(config.server.port);
        if let Some(ref host) = self.host {
            config.server.host = host.clone();
        }
        if let Some(ref dir) = self.data_dir {
            config.general.data_dir = dir.to_string_lossy().to_string();
            config.memory.database_path.clear();
        }
        if let Some(ref level) = self.log_level {
            config.general.log_level = level.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let args = CliArgs::parse_from([
            "pagechat",
            "--host",
            "127.0.0.1",
            "--port",
            "9000",
            "--data-dir",
            "/tmp/pc",
            "--log-level",
            "debug",
        ]);
        let mut config = PageChatConfig::default();
        args.apply(&mut config);

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.general.data_dir, "/tmp/pc");
        assert_eq!(config.database_path(), PathBuf::from("/tmp/pc").join("pagechat.db"));
        assert_eq!(config.general.log_level, "debug");
    }

    #[test]
    fn test_explicit_config_path_wins() {
        let args = CliArgs::parse_from(["pagechat", "-c", "/etc/pagechat.toml"]);
        assert_eq!(args.resolve_config_path(), PathBuf::from("/etc/pagechat.toml"));
    }

    #[test]
    fn test_no_flags_keeps_file_values() {
        let args = CliArgs::parse_from(["pagechat"]);
        let mut config = PageChatConfig::default();
        config.server.host = "10.0.0.5".to_string();
        args.apply(&mut config);
        assert_eq!(config.server.host, "10.0.0.5");
        assert_eq!(config.database_path(), PathBuf::from("./data").join("pagechat.db"));
    }
}
