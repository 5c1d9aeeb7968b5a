//! Volume root discovery and per-server path derivation
//!
//! Every server on the panel keeps its persistent data in a directory named
//! after its identifier under a single volume root. The resolver finds that
//! root once and then hands out server directories, failing closed whenever
//! the derived directory is missing so that writers never create data under
//! a server shell that does not exist.

use crate::error::ProvisionError;
use log::{debug, info};
use shared::{CREDENTIAL_FILE_NAME, SESSION_DIR_NAME};
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

/// Platform conventions tried after the configured override.
pub const DEFAULT_VOLUME_ROOTS: [&str; 3] = [
    "/var/lib/pterodactyl/volumes",
    "/var/lib/pelican/volumes",
    "/srv/daemon-data",
];

/// Resolves the volume root and the directories derived from it.
///
/// A successful root lookup is cached for the lifetime of the resolver. A
/// miss is not cached, so a volume that gets mounted later is still found.
#[derive(Debug)]
pub struct VolumeResolver {
    candidates: Vec<PathBuf>,
    root: OnceLock<PathBuf>,
}

impl VolumeResolver {
    /// Builds a resolver that tries `override_root` first, then the platform defaults.
    pub fn new(override_root: Option<PathBuf>) -> Self {
        let candidates = override_root
            .into_iter()
            .chain(DEFAULT_VOLUME_ROOTS.iter().map(PathBuf::from))
            .collect();
        Self::with_candidates(candidates)
    }

    /// Builds a resolver with an explicit, ordered candidate list.
    pub fn with_candidates(candidates: Vec<PathBuf>) -> Self {
        Self {
            candidates,
            root: OnceLock::new(),
        }
    }

    pub fn resolve_volume_root(&self) -> Result<PathBuf, ProvisionError> {
        if let Some(root) = self.root.get() {
            return Ok(root.clone());
        }

        let found = self
            .candidates
            .iter()
            .find(|candidate| candidate.is_dir() && std::fs::read_dir(candidate).is_ok())
            .cloned()
            .ok_or(ProvisionError::VolumeRootNotFound {
                tried: self.candidates.len(),
            })?;

        info!("Using volume root {}", found.display());
        Ok(self.root.get_or_init(|| found).clone())
    }

    pub fn resolve_server_path(&self, identifier: &str) -> Result<PathBuf, ProvisionError> {
        if !is_safe_identifier(identifier) {
            return Err(ProvisionError::InvalidIdentifier(identifier.to_string()));
        }

        let path = self.resolve_volume_root()?.join(identifier);
        if path.is_dir() {
            Ok(path)
        } else {
            debug!("Server directory {} does not exist", path.display());
            Err(ProvisionError::PathNotFound(path))
        }
    }
}

pub fn session_dir(server_path: &Path) -> PathBuf {
    server_path.join(SESSION_DIR_NAME)
}

pub fn credential_path(server_path: &Path) -> PathBuf {
    session_dir(server_path).join(CREDENTIAL_FILE_NAME)
}

/// An identifier must name exactly one directory entry directly under the root.
fn is_safe_identifier(identifier: &str) -> bool {
    let mut components = Path::new(identifier).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    ) && !identifier.contains(['/', '\\'])
}
