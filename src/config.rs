use std::env;
use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::ServerError;
use crate::protocol::{DEFAULT_BROADCAST_INTERVAL_MS, DEFAULT_PORT, DEFAULT_TTL_MS};

pub const CONFIG_ENV: &str = "DSU_SERVER_CONFIG";
pub const PORT_ENV: &str = "DSU_SERVER_PORT";

#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: IpAddr,
    pub port: u16,
    /// Silence after which a subscription is dropped.
    pub subscription_ttl_ms: u64,
    pub broadcast_interval_ms: u64,
    pub sensors: SensorPaths,
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct SensorPaths {
    pub iio_root: PathBuf,
    pub battery_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            subscription_ttl_ms: DEFAULT_TTL_MS,
            broadcast_interval_ms: DEFAULT_BROADCAST_INTERVAL_MS,
            sensors: SensorPaths::default(),
        }
    }
}

impl Default for SensorPaths {
    fn default() -> Self {
        Self {
            iio_root: PathBuf::from("/sys/bus/iio/devices"),
            battery_dir: PathBuf::from("/sys/class/power_supply/BAT0"),
        }
    }
}

impl ServerConfig {
    /// Loads the config file named on the command line or in
    /// `DSU_SERVER_CONFIG`, then applies `DSU_SERVER_PORT`.
    pub fn load(cli_path: Option<PathBuf>) -> Result<Self, ServerError> {
        let path = cli_path.or_else(|| env::var_os(CONFIG_ENV).map(PathBuf::from));
        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None => {
                debug!("no config file given, using defaults");
                Self::default()
            }
        };

        if let Ok(port) = env::var(PORT_ENV) {
            config.port = port
                .trim()
                .parse()
                .map_err(|_| ServerError::Config(format!("{PORT_ENV}={port:?} is not a port")))?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ServerError> {
        let text = fs::read_to_string(path).map_err(|source| ServerError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&text)?;
        info!(path = %path.display(), "config loaded");
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, ServerError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ServerError> {
        if self.subscription_ttl_ms == 0 {
            return Err(ServerError::Config("subscription_ttl_ms must be > 0".into()));
        }
        if self.broadcast_interval_ms == 0 {
            return Err(ServerError::Config("broadcast_interval_ms must be > 0".into()));
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.subscription_ttl_ms)
    }

    pub fn broadcast_interval(&self) -> Duration {
        Duration::from_millis(self.broadcast_interval_ms)
    }
}
