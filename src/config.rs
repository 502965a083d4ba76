//! Startup configuration (ambient stack: spec.md doesn't name a format,
//! but every complete program needs one). Reuses `serde`/`serde_json`, the
//! same pair the teacher already depends on for its own session files.

use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Small, optional startup configuration: device preferences and defaults
/// for the timecode definition and importer path.
#[derive(Debug, Deserialize)]
pub struct Config {
    pub timecode_def: String,
    pub importer: String,
    #[serde(default)]
    pub protect: bool,
    #[serde(default = "default_monitor_size")]
    pub monitor_size: usize,
}

fn default_monitor_size() -> usize {
    0
}

impl Config {
    /// Load and validate a config file. A missing file is not an error —
    /// callers fall back to command-line arguments (spec §1 leaves
    /// argument parsing out of scope); a *malformed* file is a fatal
    /// `ConfigError` (spec §7).
    pub fn load(path: &Path) -> Result<Option<Config>> {
        crate::spin::rt_not_allowed();
        if !path.exists() {
            return Ok(None);
        }

        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("reading {}: {e}", path.display())))?;

        let config: Config = serde_json::from_str(&text)
            .map_err(|e| Error::Config(format!("parsing {}: {e}", path.display())))?;

        if config.timecode_def.is_empty() {
            return Err(Error::Config("timecode_def must not be empty".into()));
        }
        if config.importer.is_empty() {
            return Err(Error::Config("importer must not be empty".into()));
        }

        Ok(Some(config))
    }
}
