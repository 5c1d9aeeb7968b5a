//! Persisted set of blacklisted panel hostnames
//!
//! The blacklist is the only state that survives a restart. It is stored as
//! `{"entries": [...], "updatedAt": <unix ms>}` and rewritten through a temp
//! file and rename on every mutation. Loading is best-effort: a missing file
//! is an empty set, and an unreadable one is logged and treated as empty.

use crate::utils::{get_timestamp, normalize_host};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;

const TMP_SUFFIX: &str = ".tmp";

#[derive(Debug, Error)]
pub enum BlacklistError {
    #[error("`{0}` is not a valid hostname")]
    InvalidHost(String),
    #[error("io error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("encoding blacklist failed: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlacklistRecord {
    entries: Vec<String>,
    #[serde(default)]
    updated_at: u64,
}

#[derive(Debug)]
pub struct BlacklistSet {
    path: PathBuf,
    entries: BTreeSet<String>,
    updated_at: u64,
}

impl BlacklistSet {
    pub fn empty(path: PathBuf) -> Self {
        Self {
            path,
            entries: BTreeSet::new(),
            updated_at: 0,
        }
    }

    pub async fn load(path: PathBuf) -> Self {
        let data = match fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No blacklist at {}, starting empty", path.display());
                return Self::empty(path);
            }
            Err(e) => {
                warn!("Could not read blacklist {}: {}", path.display(), e);
                return Self::empty(path);
            }
        };

        if data.iter().all(u8::is_ascii_whitespace) {
            return Self::empty(path);
        }

        match serde_json::from_slice::<BlacklistRecord>(&data) {
            Ok(record) => {
                let entries: BTreeSet<String> = record
                    .entries
                    .iter()
                    .filter_map(|entry| normalize_host(entry))
                    .collect();
                info!(
                    "Loaded {} blacklisted hosts from {}",
                    entries.len(),
                    path.display()
                );
                Self {
                    path,
                    entries,
                    updated_at: record.updated_at,
                }
            }
            Err(e) => {
                warn!("Ignoring corrupt blacklist {}: {}", path.display(), e);
                Self::empty(path)
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, host: &str) -> bool {
        normalize_host(host)
            .map(|host| self.entries.contains(&host))
            .unwrap_or(false)
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn updated_at(&self) -> u64 {
        self.updated_at
    }

    /// Returns the normalized host and whether it was newly added.
    pub async fn add(&mut self, host: &str) -> Result<(String, bool), BlacklistError> {
        let host = normalize_host(host).ok_or_else(|| BlacklistError::InvalidHost(host.to_string()))?;
        if !self.entries.insert(host.clone()) {
            return Ok((host, false));
        }

        if let Err(e) = self.commit().await {
            self.entries.remove(&host);
            return Err(e);
        }
        info!("Blacklisted {}", host);
        Ok((host, true))
    }

    /// Returns the normalized host and whether it was present.
    pub async fn remove(&mut self, host: &str) -> Result<(String, bool), BlacklistError> {
        let host = normalize_host(host).ok_or_else(|| BlacklistError::InvalidHost(host.to_string()))?;
        if !self.entries.remove(&host) {
            return Ok((host, false));
        }

        if let Err(e) = self.commit().await {
            self.entries.insert(host.clone());
            return Err(e);
        }
        info!("Removed {} from the blacklist", host);
        Ok((host, true))
    }

    async fn commit(&mut self) -> Result<(), BlacklistError> {
        let updated_at = get_timestamp();
        let record = BlacklistRecord {
            entries: self.entries(),
            updated_at,
        };
        let json = serde_json::to_vec_pretty(&record)?;
        write_atomic(&self.path, &json).await?;
        self.updated_at = updated_at;
        Ok(())
    }
}

async fn write_atomic(path: &Path, data: &[u8]) -> Result<(), BlacklistError> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| BlacklistError::Io { path, source }
    };

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(TMP_SUFFIX);
    let tmp_path = PathBuf::from(tmp_name);

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await.map_err(io_err(parent))?;
    }

    let mut file = fs::File::create(&tmp_path).await.map_err(io_err(&tmp_path))?;
    file.write_all(data).await.map_err(io_err(&tmp_path))?;
    file.sync_all().await.map_err(io_err(&tmp_path))?;
    drop(file);
    fs::rename(&tmp_path, path).await.map_err(io_err(path))?;
    Ok(())
}
