use anyhow::{Context, Result};
use receipts_core::{StoreConfig, Tz, parse_timezone};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::state::{default_data_dir, ensure_receipts_home, expand_home, receipts_home};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Fallback tracing filter when RUST_LOG is unset
    pub log_level: String,
    pub storage: StorageSection,
    pub display: DisplaySection,
    pub seed: SeedSection,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// Slot directory; defaults to <home>/data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
    #[serde(flatten)]
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplaySection {
    /// IANA timezone used for day matching and listing
    pub timezone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedSection {
    /// Bundled seed files, tried in order
    pub candidates: Vec<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            storage: StorageSection::default(),
            display: DisplaySection::default(),
            seed: SeedSection::default(),
        }
    }
}

impl Default for DisplaySection {
    fn default() -> Self {
        Self {
            timezone: "UTC".to_string(),
        }
    }
}

impl Default for SeedSection {
    fn default() -> Self {
        Self {
            candidates: vec![
                PathBuf::from("receipts.json"),
                PathBuf::from("seed/receipts.json"),
            ],
        }
    }
}

impl Config {
    pub fn timezone(&self) -> Result<Tz> {
        parse_timezone(&self.display.timezone).context("config [display].timezone")
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        match &self.storage.dir {
            Some(dir) => Ok(expand_home(dir)),
            None => default_data_dir(),
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    Ok(receipts_home()?.join("config.toml"))
}

pub fn load_config() -> Result<Config> {
    let p = config_path()?;
    if !p.exists() {
        return Ok(Config::default());
    }
    let s = fs::read_to_string(&p).with_context(|| format!("read {}", p.display()))?;
    toml::from_str(&s).with_context(|| format!("parse {}", p.display()))
}

pub fn save_config(cfg: &Config) -> Result<()> {
    ensure_receipts_home()?;
    let p = config_path()?;
    let s = toml::to_string_pretty(cfg).context("serialize config")?;
    fs::write(&p, s).with_context(|| format!("write {}", p.display()))?;
    Ok(())
}

pub fn init_config() -> Result<()> {
    let p = config_path()?;
    if p.exists() {
        println!("Config already exists: {}", p.display());
        return Ok(());
    }
    save_config(&Config::default())?;
    println!("Wrote {}", p.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use receipts_core::DuplicatePolicy;

    #[test]
    fn test_empty_file_gives_defaults() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg.log_level, "warn");
        assert_eq!(cfg.storage.store.slot, "receipts");
        assert_eq!(cfg.storage.store.duplicate_ids, DuplicatePolicy::Allow);
        assert_eq!(cfg.timezone().unwrap(), Tz::UTC);
        assert_eq!(cfg.seed.candidates.len(), 2);
    }

    #[test]
    fn test_parses_documented_layout() {
        let cfg: Config = toml::from_str(
            r#"
log_level = "debug"

[storage]
dir = "/tmp/receipts-data"
slot = "receipts-2024"
duplicate_ids = "reject"

[display]
timezone = "Europe/Madrid"

[seed]
candidates = ["a.json", "b.json"]
"#,
        )
        .unwrap();

        assert_eq!(cfg.data_dir().unwrap(), PathBuf::from("/tmp/receipts-data"));
        assert_eq!(cfg.storage.store.slot, "receipts-2024");
        assert_eq!(cfg.storage.store.duplicate_ids, DuplicatePolicy::Reject);
        assert_eq!(cfg.timezone().unwrap(), "Europe/Madrid".parse::<Tz>().unwrap());
        assert_eq!(cfg.seed.candidates, [PathBuf::from("a.json"), PathBuf::from("b.json")]);
    }

    #[test]
    fn test_bad_timezone_is_an_error() {
        let cfg: Config = toml::from_str("[display]\ntimezone = \"Nowhere/Special\"").unwrap();
        assert!(cfg.timezone().is_err());
    }

    #[test]
    fn test_default_config_round_trips_through_toml() {
        let s = toml::to_string_pretty(&Config::default()).unwrap();
        let back: Config = toml::from_str(&s).unwrap();
        assert_eq!(back.storage.store, StoreConfig::default());
        assert_eq!(back.display.timezone, "UTC");
    }
}
