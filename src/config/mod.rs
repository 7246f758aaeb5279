use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub mod datafresh;

pub use datafresh::{DataFreshConfig, ReferenceClosure, StorageKind};

pub const CONFIG_FILE: &str = ".datafresh.json";

/// Write a fresh config file into `dir`. Refuses to overwrite an existing one.
pub fn init_at(dir: &Path, cfg: &DataFreshConfig) -> Result<PathBuf> {
    let path = dir.join(CONFIG_FILE);
    if path.exists() {
        return Err(Error::Config(format!("{} already exists", path.display())));
    }
    save_config(&path, cfg)?;
    Ok(path)
}

/// Look for a config file in `start` and each of its parents.
pub fn find_config(start: &Path) -> Result<PathBuf> {
    let mut dir = start.to_path_buf();
    loop {
        let candidate = dir.join(CONFIG_FILE);
        if candidate.is_file() {
            return Ok(candidate);
        }
        if !dir.pop() {
            break;
        }
    }
    Err(Error::Config(format!("no {} found in {} or its parents", CONFIG_FILE, start.display())))
}

pub fn load_config(path: &Path) -> Result<DataFreshConfig> {
    let content = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    let mut cfg: DataFreshConfig = serde_json::from_str(&content)?;
    // Relative snapshot roots are anchored at the config file.
    if let (Some(root), Some(dir)) = (cfg.snapshot_root.as_ref(), path.parent()) {
        if root.is_relative() {
            cfg.snapshot_root = Some(dir.join(root));
        }
    }
    Ok(cfg)
}

pub fn save_config(path: &Path, cfg: &DataFreshConfig) -> Result<()> {
    let content = serde_json::to_string_pretty(cfg)?;
    fs::write(path, content).map_err(|e| Error::io(path, e))
}
