//! Three-way classification of the server roster
//!
//! Each server lands in exactly one bucket: no session directory, session
//! directory without a credential (eligible), or session directory with a
//! credential (occupied). Eligible servers keep roster order because the
//! distribution queue hands them out first-come first-served.

use crate::gateway::ServerRecord;
use crate::paths::{credential_path, session_dir, VolumeResolver};
use log::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    NoSession,
    Eligible,
    Occupied,
}

#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    pub eligible: Vec<ServerRecord>,
    pub occupied: usize,
    pub no_session: usize,
}

impl ScanReport {
    pub fn total(&self) -> usize {
        self.eligible.len() + self.occupied + self.no_session
    }
}

/// Classifies a single server. An unresolvable server path counts as no session.
pub fn classify(resolver: &VolumeResolver, server: &ServerRecord) -> Eligibility {
    let server_path = match resolver.resolve_server_path(&server.identifier) {
        Ok(path) => path,
        Err(e) => {
            debug!("Skipping {} ({}): {}", server.display_name, server.identifier, e);
            return Eligibility::NoSession;
        }
    };

    if !session_dir(&server_path).is_dir() {
        Eligibility::NoSession
    } else if credential_path(&server_path).exists() {
        Eligibility::Occupied
    } else {
        Eligibility::Eligible
    }
}

pub fn scan(resolver: &VolumeResolver, servers: &[ServerRecord]) -> ScanReport {
    let mut report = ScanReport::default();

    for server in servers {
        match classify(resolver, server) {
            Eligibility::NoSession => report.no_session += 1,
            Eligibility::Occupied => report.occupied += 1,
            Eligibility::Eligible => report.eligible.push(server.clone()),
        }
    }

    report
}
