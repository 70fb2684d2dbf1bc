use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tubepace_cli::{ConfigStore, FileConfigStore};

use super::output::OutputFormat;

pub struct CliContext {
    store: Arc<FileConfigStore>,
    output: OutputFormat,
}

impl CliContext {
    pub fn new(config_path: Option<&Path>, output: OutputFormat) -> Result<Self> {
        let store = FileConfigStore::resolve(config_path).context("Failed to locate settings file")?;
        Ok(Self {
            store: Arc::new(store),
            output,
        })
    }

    pub fn config_path(&self) -> PathBuf {
        self.store.path().to_path_buf()
    }

    pub fn store(&self) -> Arc<dyn ConfigStore> {
        self.store.clone()
    }

    pub fn output(&self) -> OutputFormat {
        self.output
    }
}
