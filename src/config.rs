use crate::error::{Result, VastError};
use crate::options::{RequestOptions, UnitOptions};
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Settings file shared by the CLI and embedders
///
/// ```json
/// { "request": { "wrapperLimit": 3 }, "unit": { "viewability": true }, "timeout": 5000 }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub request: RequestOptions,

    pub unit: UnitOptions,

    /// Budget in milliseconds for a whole waterfall run
    pub timeout: Option<u64>,
}

impl Settings {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| VastError::Config(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading settings from {}", path.display());
        let json = std::fs::read_to_string(path)
            .map_err(|e| VastError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }
}
