//! Cache configuration.
//!
//! Supplied at construction; `Deserialize` with defaults so hosts can embed
//! an `[isr]` table in their own settings file.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

// Default values for ISR configuration
const DEFAULT_REVALIDATE_AFTER_SECS: u64 = 10;
const DEFAULT_OUTPUT_DIR: &str = "__isr__";

/// Configuration for an ISR page cache.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IsrConfig {
    /// Age in seconds after which a served artifact triggers a background
    /// re-render. Never abandons a render already in flight.
    pub revalidate_after_secs: u64,
    /// Directory artifacts are written under, resolved against the process
    /// working directory unless absolute.
    pub output_dir: PathBuf,
}

impl Default for IsrConfig {
    fn default() -> Self {
        Self {
            revalidate_after_secs: DEFAULT_REVALIDATE_AFTER_SECS,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
        }
    }
}

impl IsrConfig {
    /// The staleness threshold as a `Duration`.
    pub fn revalidate_after(&self) -> Duration {
        Duration::from_secs(self.revalidate_after_secs)
    }
}
