//! Service configuration.
//!
//! The daemon reads `config.json` from its root directory when present;
//! command-line flags override individual fields. The file is written
//! atomically so a crash mid-write never leaves a torn config behind.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::storage::write_atomic;

/// Which session store backend the daemon runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// Blobs live in process memory and die with the daemon.
    Memory,
    /// One blob file per session under `<root>/sessions/`.
    File,
}

/// Configuration for the Reprise daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Root directory for durable state (default: .reprise/)
    pub root: PathBuf,

    /// Session store backend.
    pub store: StoreBackend,

    /// TCP listen address; stdio transport when absent.
    pub listen: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(".reprise"),
            store: StoreBackend::File,
            listen: None,
        }
    }
}

impl ServiceConfig {
    /// Path of the config file under a root directory.
    pub fn path_under(root: &Path) -> PathBuf {
        root.join("config.json")
    }

    /// Directory holding session blob files for the file backend.
    pub fn sessions_dir(&self) -> PathBuf {
        self.root.join("sessions")
    }

    /// Load configuration from `<root>/config.json`, falling back to
    /// defaults (with `root` set) when the file does not exist.
    pub fn load(root: &Path) -> Result<Self> {
        let path = Self::path_under(root);
        if !path.exists() {
            return Ok(Self {
                root: root.to_path_buf(),
                ..Self::default()
            });
        }

        let data = fs::read(&path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let mut config: ServiceConfig =
            serde_json::from_slice(&data).context("Failed to deserialize config")?;
        config.root = root.to_path_buf();
        Ok(config)
    }

    /// Write configuration to `<root>/config.json`.
    pub fn save(&self) -> Result<()> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("Failed to create root directory: {:?}", self.root))?;

        let json = serde_json::to_vec_pretty(self).context("Failed to serialize config")?;
        write_atomic(&Self::path_under(&self.root), &json).context("Failed to write config")?;
        Ok(())
    }
}
