use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_ADDR: &str = "127.0.0.1:37240";
pub const DEFAULT_SESSION_TTL_SECS: i64 = 3600;
pub const MAX_SESSION_TTL_SECS: i64 = 365 * 24 * 3600;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("could not parse config file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid value for {name}: {value}")]
    InvalidVar { name: &'static str, value: String },

    #[error("session_ttl_secs must be between 1 and {MAX_SESSION_TTL_SECS}, got {0}")]
    SessionTtl(i64),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data_dir: PathBuf,
    pub addr: SocketAddr,
    pub session_ttl_secs: i64,
    pub bcrypt_cost: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            addr: SocketAddr::from(([127, 0, 0, 1], 37240)),
            session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
            bcrypt_cost: bcrypt::DEFAULT_COST,
        }
    }
}

impl Config {
    /// Defaults, then the optional YAML file, then `BACKOFFICE_*` variables
    /// (after loading `.env`).
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let mut config = match file {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                serde_yaml::from_str(&text)?
            }
            None => Config::default(),
        };
        config.apply_env()?;
        if !(1..=MAX_SESSION_TTL_SECS).contains(&config.session_ttl_secs) {
            return Err(ConfigError::SessionTtl(config.session_ttl_secs));
        }
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(dir) = std::env::var("BACKOFFICE_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(addr) = parse_var("BACKOFFICE_ADDR")? {
            self.addr = addr;
        }
        if let Some(ttl) = parse_var("BACKOFFICE_SESSION_TTL")? {
            self.session_ttl_secs = ttl;
        }
        if let Some(cost) = parse_var("BACKOFFICE_BCRYPT_COST")? {
            self.bcrypt_cost = cost;
        }
        Ok(())
    }

    /// A configuration rooted at `data_dir` with a cheap hash cost, for tests
    /// and tooling.
    pub fn for_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            bcrypt_cost: 4,
            ..Config::default()
        }
    }
}

fn parse_var<V: std::str::FromStr>(name: &'static str) -> Result<Option<V>, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidVar { name, value }),
        Err(_) => Ok(None),
    }
}
