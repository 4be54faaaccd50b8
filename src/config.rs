// Config file loading. The file is INI with two sections:
//
//   [client]
//   webservice = https://<gateway>/prod
//
//   [database]
//   path = journal.db
//
// A relative database path is taken relative to the config file.

use anyhow::{bail, Context, Result};
use ini::Ini;
use std::path::{Path, PathBuf};

/// Environment variable overriding the config path.
pub const CONFIG_PATH_ENV_VAR: &str = "JOURNALAPP_CONFIG";

/// Value shipped in the sample config; must be replaced before use.
pub const PLACEHOLDER_URL: &str = "https://YOUR_GATEWAY_API.amazonaws.com";

const MIN_URL_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub webservice: String,
    pub database: PathBuf,
}

/// `~/.journalapp/config.ini`, or `./config.ini` when there is no home dir.
pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".journalapp").join("config.ini"))
        .unwrap_or_else(|| PathBuf::from("config.ini"))
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            bail!("config file '{}' does not exist", path.display());
        }
        let ini = Ini::load_from_file(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let config = Self::from_ini(&ini, base_dir)?;
        tracing::debug!(path = %path.display(), ?config, "config loaded");
        Ok(config)
    }

    pub fn from_ini(ini: &Ini, base_dir: &Path) -> Result<Self> {
        let webservice = ini
            .get_from(Some("client"), "webservice")
            .context("config is missing [client] webservice")?;
        let webservice = normalize_base_url(webservice)?;

        let database = ini
            .get_from(Some("database"), "path")
            .context("config is missing [database] path")?;
        let database = PathBuf::from(database.trim());
        let database = if database.is_relative() {
            base_dir.join(database)
        } else {
            database
        };

        Ok(Self {
            webservice,
            database,
        })
    }
}

/// Check the gateway address and drop a trailing slash.
pub fn normalize_base_url(raw: &str) -> Result<String> {
    let url = raw.trim();
    if url.len() < MIN_URL_LEN {
        bail!("baseurl '{}' is not nearly long enough...", url);
    }
    if url == PLACEHOLDER_URL {
        bail!("update config file with your gateway endpoint");
    }
    if url.starts_with("http:") {
        bail!("your URL starts with 'http', it should start with 'https'");
    }
    if !url.starts_with("https://") {
        bail!("baseurl '{}' must start with 'https://'", url);
    }
    Ok(url.strip_suffix('/').unwrap_or(url).to_string())
}
