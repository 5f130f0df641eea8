//! Service configuration, loaded once at startup.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::platform::PlatformCapabilities;

pub const DEFAULT_OWNING_APP_ID: &str = "org.strongswan.android";
const LOG_FILE: &str = "charon.log";

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("could not read config: {0}")]
    ReadError(std::io::Error),
    #[error("could not deserialize config: {0}")]
    DeserializeError(serde_json::Error),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceConfig {
    pub data_dir: PathBuf,
    /// Handed to the negotiation engine, `<dataDir>/charon.log` if unset.
    pub log_file: Option<PathBuf>,
    pub language: String,
    /// Always excluded from the tunnel.
    pub owning_app_id: String,
    pub byod: bool,
    /// Narrows what the platform reports, e.g. to turn off per-app scoping.
    pub capabilities: PlatformCapabilities,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            log_file: None,
            language: "en".into(),
            owning_app_id: DEFAULT_OWNING_APP_ID.into(),
            byod: false,
            capabilities: PlatformCapabilities::default(),
        }
    }
}

impl ServiceConfig {
    pub fn log_file(&self) -> PathBuf {
        self.log_file.clone().unwrap_or_else(|| self.data_dir.join(LOG_FILE))
    }
}

/// A missing file yields the defaults.
pub fn load(path: &Path) -> Result<ServiceConfig, ConfigLoadError> {
    let file = match fs::File::open(path) {
        Ok(f) => f,
        Err(err) => {
            if err.kind() == ErrorKind::NotFound {
                tracing::info!(message_id = "c3RkVg9z", path = %path.display(), "no config file, using defaults");
                return Ok(ServiceConfig::default());
            }
            return Err(ConfigLoadError::ReadError(err));
        }
    };
    serde_json::from_reader(file).map_err(ConfigLoadError::DeserializeError)
}
