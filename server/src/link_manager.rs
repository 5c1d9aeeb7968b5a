//! Console link tracking for the UDP chat transport
//!
//! This module keeps the transport-side view of connected operator consoles:
//! - Link lifecycle (connect, reconnect from a new address, disconnect, timeout)
//! - Routing replies to the most recent address of an operator
//! - Capacity enforcement for concurrent consoles
//!
//! Links are routing only. Dropping a link never touches the operator's
//! upload workflow, which lives until it is finalized or cancelled.

use log::info;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// A connected operator console
#[derive(Debug)]
pub struct Link {
    /// Operator the console authenticated as
    pub operator_id: u64,
    /// Network address replies are sent to
    pub addr: SocketAddr,
    /// Last time we received any packet from this console
    pub last_seen: Instant,
}

impl Link {
    pub fn new(operator_id: u64, addr: SocketAddr) -> Self {
        Self {
            operator_id,
            addr,
            last_seen: Instant::now(),
        }
    }

    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    /// Returns true if nothing arrived from this console within `timeout`.
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Routes between operator ids and console addresses
pub struct LinkManager {
    /// Links indexed by operator id
    links: HashMap<u64, Link>,
    /// Maximum number of concurrent links allowed
    max_links: usize,
}

impl LinkManager {
    pub fn new(max_links: usize) -> Self {
        Self {
            links: HashMap::new(),
            max_links,
        }
    }

    /// Registers a console for an operator.
    ///
    /// An operator reconnecting from a new address replaces their old route
    /// and does not count against capacity. Returns false when full.
    pub fn add_link(&mut self, operator_id: u64, addr: SocketAddr) -> bool {
        if let Some(existing) = self.links.get_mut(&operator_id) {
            if existing.addr != addr {
                info!(
                    "Operator {} moved from {} to {}",
                    operator_id, existing.addr, addr
                );
            }
            existing.addr = addr;
            existing.touch();
            return true;
        }

        if self.links.len() >= self.max_links {
            return false;
        }

        info!("Operator {} connected from {}", operator_id, addr);
        self.links.insert(operator_id, Link::new(operator_id, addr));
        true
    }

    /// Returns true if the operator had a link.
    pub fn remove_link(&mut self, operator_id: &u64) -> bool {
        if let Some(link) = self.links.remove(operator_id) {
            info!("Operator {} disconnected from {}", link.operator_id, link.addr);
            true
        } else {
            false
        }
    }

    /// Associates an incoming packet with a linked operator.
    pub fn find_operator_by_addr(&self, addr: SocketAddr) -> Option<u64> {
        self.links
            .values()
            .find(|link| link.addr == addr)
            .map(|link| link.operator_id)
    }

    pub fn addr_for(&self, operator_id: u64) -> Option<SocketAddr> {
        self.links.get(&operator_id).map(|link| link.addr)
    }

    /// Marks the console as alive. Returns false for unknown operators.
    pub fn touch(&mut self, operator_id: u64) -> bool {
        match self.links.get_mut(&operator_id) {
            Some(link) => {
                link.touch();
                true
            }
            None => false,
        }
    }

    /// Removes links that went silent and returns their operator ids.
    pub fn check_timeouts(&mut self, timeout: Duration) -> Vec<u64> {
        let timed_out: Vec<u64> = self
            .links
            .values()
            .filter(|link| link.is_timed_out(timeout))
            .map(|link| link.operator_id)
            .collect();

        for operator_id in &timed_out {
            self.remove_link(operator_id);
        }

        timed_out
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}
