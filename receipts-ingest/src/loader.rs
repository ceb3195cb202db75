//! Bundled seed-data loader.
//!
//! One loader, an ordered list of candidate locations. Candidates are tried
//! in sequence:
//! - missing file: skipped
//! - unreadable or undecodable file: logged, skipped, remembered
//! - first clean decode wins
//!
//! When every candidate is exhausted the caller gets `NotFound` (nothing
//! existed) or the first failure that was seen.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use receipts_core::DecodeError;
use thiserror::Error;
use tracing::{debug, warn};

use crate::types::{BundledReceipt, decode_bundle};

#[derive(Debug, Error)]
pub enum BundleError {
    #[error("no bundled receipts found (tried: {})", display_paths(tried))]
    NotFound { tried: Vec<PathBuf> },

    #[error("reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: DecodeError,
    },
}

fn display_paths(paths: &[PathBuf]) -> String {
    if paths.is_empty() {
        return "no candidates configured".to_string();
    }
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Bundled tickets plus the candidate they came from
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedBundle {
    pub source: PathBuf,
    pub receipts: Vec<BundledReceipt>,
}

#[derive(Debug, Clone, Default)]
pub struct BundleLoader {
    candidates: Vec<PathBuf>,
}

impl BundleLoader {
    pub fn new<I, P>(candidates: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            candidates: candidates.into_iter().map(Into::into).collect(),
        }
    }

    /// Append a lower-priority candidate
    pub fn with_candidate(mut self, path: impl Into<PathBuf>) -> Self {
        self.candidates.push(path.into());
        self
    }

    pub fn candidates(&self) -> &[PathBuf] {
        &self.candidates
    }

    pub fn load(&self) -> Result<LoadedBundle, BundleError> {
        let mut first_failure: Option<BundleError> = None;

        for path in &self.candidates {
            match load_one(path) {
                Ok(Some(receipts)) => {
                    debug!(path = %path.display(), count = receipts.len(), "bundled receipts loaded");
                    return Ok(LoadedBundle {
                        source: path.clone(),
                        receipts,
                    });
                }
                Ok(None) => {
                    debug!(path = %path.display(), "bundle candidate missing");
                }
                Err(e) => {
                    warn!(error = %e, "bundle candidate rejected; trying next");
                    if first_failure.is_none() {
                        first_failure = Some(e);
                    }
                }
            }
        }

        Err(first_failure.unwrap_or_else(|| BundleError::NotFound {
            tried: self.candidates.clone(),
        }))
    }

    /// Like `load`, but any failure becomes an empty list and a log line.
    pub fn load_or_empty(&self) -> Vec<BundledReceipt> {
        match self.load() {
            Ok(bundle) => bundle.receipts,
            Err(e) => {
                warn!(error = %e, "no usable bundled receipts; continuing with none");
                Vec::new()
            }
        }
    }
}

/// `Ok(None)` when the file does not exist
fn load_one(path: &Path) -> Result<Option<Vec<BundledReceipt>>, BundleError> {
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(BundleError::Io {
                path: path.to_path_buf(),
                source: e,
            });
        }
    };

    let what = path.display().to_string();
    decode_bundle(&bytes, &what)
        .map(Some)
        .map_err(|source| BundleError::Decode {
            path: path.to_path_buf(),
            source,
        })
}
