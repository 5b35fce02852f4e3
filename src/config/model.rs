//! Serde data structures for the relaycast configuration file.
//!
//! [`Config`] is the root: the ordered target list (first is primary),
//! the per-delivery timeout, and an optional scratch directory for
//! request buffers. Parsing uses `deny_unknown_fields`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

const fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn is_default_timeout(v: &u64) -> bool {
    *v == default_timeout()
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Per-delivery timeout in milliseconds.
    #[serde(
        default = "default_timeout",
        skip_serializing_if = "is_default_timeout"
    )]
    pub timeout: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scratch_dir: Option<PathBuf>,

    #[serde(default)]
    pub targets: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            scratch_dir: None,
            targets: Vec::new(),
        }
    }
}

impl Config {
    #[must_use]
    pub fn primary(&self) -> Option<&str> {
        self.targets.first().map(String::as_str)
    }

    #[must_use]
    pub fn secondaries(&self) -> &[String] {
        self.targets.get(1..).unwrap_or_default()
    }
}
