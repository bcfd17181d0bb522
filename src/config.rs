//! Persistent settings, layered under command-line flags.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::client::ClientOptions;
use crate::error::{Result, TransferError};
use crate::protocol::{DEFAULT_CHUNK_SIZE, DEFAULT_HOST, DEFAULT_PORT};
use crate::session::Endpoint;

const CONFIG_FILE_NAME: &str = "mediapull.toml";

pub fn config_dir() -> PathBuf {
    #[cfg(windows)]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata).join("mediapull");
        }
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".config").join("mediapull");
    }
    PathBuf::from(".mediapull")
}

/// Where files land when neither the command line nor the settings name a
/// destination.
pub fn default_dest() -> PathBuf {
    let home = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE"));
    match home {
        Ok(home) => PathBuf::from(home).join("Downloads").join("mediapull"),
        Err(_) => PathBuf::from("mediapull"),
    }
}

pub fn config_path() -> PathBuf {
    config_dir().join(CONFIG_FILE_NAME)
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub dest: Option<PathBuf>,
    pub resume: bool,
    pub chunk_size: usize,
    pub log_file: Option<PathBuf>,
    /// Run `adb forward` before connecting.
    pub forward: bool,
    pub history: bool,
    pub refetch: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            dest: None,
            resume: true,
            chunk_size: DEFAULT_CHUNK_SIZE,
            log_file: None,
            forward: true,
            history: true,
            refetch: false,
        }
    }
}

impl Config {
    pub fn from_toml(data: &str) -> Result<Self> {
        let config: Config = toml::from_str(data)
            .map_err(|e| TransferError::Config(format!("invalid settings: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load settings. An explicit path must exist; the default location is
    /// optional and falls back to built-in defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(p) => p.to_path_buf(),
            None => {
                let p = config_path();
                if !p.exists() {
                    return Ok(Self::default());
                }
                p
            }
        };
        let data = std::fs::read_to_string(&path).map_err(|e| {
            TransferError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml(&data)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(TransferError::Config("chunk_size must be positive".into()));
        }
        if self.host.trim().is_empty() {
            return Err(TransferError::Config("host must not be empty".into()));
        }
        Ok(())
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.host.clone(), self.port)
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            resume: self.resume,
            chunk_size: self.chunk_size,
            refetch: self.refetch,
        }
    }

    pub fn dest_dir(&self) -> PathBuf {
        self.dest.clone().unwrap_or_else(default_dest)
    }
}
