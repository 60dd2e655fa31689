use std::path::Path;

use thiserror::Error;

use crate::api::FlashOptions;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unable to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Loads session options from a JSON file. Missing keys keep their defaults.
pub fn load_options(path: &Path) -> Result<FlashOptions, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    parse_options(&text).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}

pub fn parse_options(text: &str) -> Result<FlashOptions, serde_json::Error> {
    serde_json::from_str(text)
}
