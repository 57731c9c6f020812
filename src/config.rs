//! # Configuration Module
//!
//! lastirc reads a single TOML file describing the IRC connection, the
//! Last.fm credentials and where the identity store lives.
//!
//! ```toml
//! store = "/var/lib/lastirc/associations.db"   # optional
//!
//! [irc]
//! server = "irc.libera.chat"
//! port = 6667
//! nick = "lastfm"
//! channels = ["#music"]
//! prefix = "!"
//!
//! [lastfm]
//! token = "api key"
//! secret = "api secret"
//! chart_limit = 0          # optional, 0 reads the whole global chart
//! ```
//!
//! ## Data Storage
//!
//! Without an explicit `store`, associations are kept in the
//! platform-standard data directory:
//! - Linux: `~/.local/share/lastirc/associations.db`
//! - macOS: `~/Library/Application Support/lastirc/associations.db`
//! - Windows: `%APPDATA%\lastirc\associations.db`

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::router::DEFAULT_PREFIX;

/// Config file looked up when none is given on the command line.
pub const DEFAULT_CONFIG_FILE: &str = "lastirc.toml";

/// Returns the default identity store path inside the platform data directory.
///
/// # Errors
///
/// Fails when the platform has no data directory.
pub fn default_store_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir().ok_or_else(|| {
        anyhow::anyhow!(
            "Could not determine system data directory. Please set `store` in the config file."
        )
    })?;

    Ok(data_dir.join("lastirc").join("associations.db"))
}

/// Whole configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub irc: IrcConfig,
    pub lastfm: LastFmConfig,
    /// Identity store file. Defaults to [`default_store_path`].
    #[serde(default)]
    pub store: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrcConfig {
    pub server: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_nick")]
    pub nick: String,
    #[serde(default)]
    pub channels: Vec<String>,
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastFmConfig {
    /// API key.
    pub token: String,
    /// Shared secret. Only read calls are made, so it is carried but unused.
    pub secret: String,
    /// Cap on global chart artists used for mainstream scores. `0` means the
    /// whole chart.
    #[serde(default)]
    pub chart_limit: u32,
}

fn default_port() -> u16 {
    6667
}

fn default_nick() -> String {
    "lastfm".to_string()
}

fn default_prefix() -> String {
    DEFAULT_PREFIX.to_string()
}

impl Config {
    /// Read and validate the config file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config = Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Parse and validate TOML text.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would only fail later at connect time.
    pub fn validate(&self) -> Result<()> {
        if self.irc.server.trim().is_empty() {
            bail!("irc.server must not be empty");
        }
        if self.irc.nick.trim().is_empty() || self.irc.nick.contains(' ') {
            bail!("irc.nick must be a single non-empty word");
        }
        if self.lastfm.token.trim().is_empty() {
            bail!("lastfm.token must not be empty");
        }
        if self.lastfm.secret.trim().is_empty() {
            bail!("lastfm.secret must not be empty");
        }
        if let Some(bad) = self.irc.channels.iter().find(|c| !c.starts_with(['#', '&'])) {
            bail!("irc.channels entry '{bad}' is not a channel name");
        }
        Ok(())
    }

    /// Store path from the file, or the platform default.
    pub fn store_path(&self) -> Result<PathBuf> {
        match &self.store {
            Some(path) => Ok(path.clone()),
            None => default_store_path(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const MINIMAL: &str = r#"
        [irc]
        server = "irc.example.net"

        [lastfm]
        token = "key"
        secret = "shh"
    "#;

    #[test]
    fn test_defaults_fill_optional_fields() -> Result<()> {
        let config = Config::parse(MINIMAL)?;

        assert_eq!(config.irc.port, 6667);
        assert_eq!(config.irc.nick, "lastfm");
        assert_eq!(config.irc.prefix, "!");
        assert!(config.irc.channels.is_empty());
        assert_eq!(config.lastfm.chart_limit, 0);
        assert_eq!(config.store, None);
        Ok(())
    }

    #[test]
    fn test_full_config() -> Result<()> {
        let config = Config::parse(
            r##"
            store = "/tmp/lastirc-test.db"

            [irc]
            server = "irc.example.net"
            port = 6697
            nick = "scrobbler"
            channels = ["#music", "#indie"]
            prefix = "."

            [lastfm]
            token = "key"
            secret = "shh"
            chart_limit = 250
            "##,
        )?;

        assert_eq!(config.irc.channels, vec!["#music", "#indie"]);
        assert_eq!(config.irc.prefix, ".");
        assert_eq!(config.lastfm.chart_limit, 250);
        assert_eq!(config.store_path()?, PathBuf::from("/tmp/lastirc-test.db"));
        Ok(())
    }

    #[test]
    fn test_missing_required_fields() {
        assert!(Config::parse("[irc]\nserver = \"x\"").is_err());
        assert!(Config::parse(&MINIMAL.replace("\"key\"", "\"\"")).is_err());
    }

    #[test]
    fn test_rejects_bad_channel_names() {
        let text = MINIMAL.replace(
            "server = \"irc.example.net\"",
            "server = \"irc.example.net\"\nchannels = [\"music\"]",
        );
        assert!(Config::parse(&text).is_err());
    }

    #[test]
    fn test_load_reports_path() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("lastirc.toml");

        let err = Config::load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("lastirc.toml"));

        fs::write(&path, MINIMAL)?;
        assert_eq!(Config::load(&path)?.irc.server, "irc.example.net");
        Ok(())
    }

    #[test]
    fn test_default_store_path_structure() -> Result<()> {
        // Not every CI sandbox has a data directory.
        if dirs::data_dir().is_none() {
            return Ok(());
        }

        let path = default_store_path()?;
        assert!(path.ends_with("lastirc/associations.db"));
        Ok(())
    }
}
