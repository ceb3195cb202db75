use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

/// `$RECEIPTS_HOME`, or `~/.receipts`
pub fn receipts_home() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os("RECEIPTS_HOME").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    let home = std::env::var("HOME").context("HOME is not set (or set RECEIPTS_HOME)")?;
    Ok(PathBuf::from(home).join(".receipts"))
}

pub fn ensure_receipts_home() -> Result<PathBuf> {
    let dir = receipts_home()?;
    fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    Ok(dir)
}

/// Default slot directory when the config does not name one
pub fn default_data_dir() -> Result<PathBuf> {
    Ok(receipts_home()?.join("data"))
}

/// Lowest-priority seed candidate, after the configured ones
pub fn home_seed_path() -> Result<PathBuf> {
    Ok(receipts_home()?.join("seed.json"))
}

/// Expand a leading `~/` against $HOME
pub fn expand_home(path: &std::path::Path) -> PathBuf {
    match (path.strip_prefix("~"), std::env::var_os("HOME")) {
        (Ok(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => path.to_path_buf(),
    }
}
