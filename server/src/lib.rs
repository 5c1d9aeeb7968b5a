//! # Panel Provisioning Bot Library
//!
//! This library implements a chat-driven operator bot for a fleet of servers
//! hosted on a Pterodactyl-style panel. Its core job is distributing uploaded
//! credential files across server volumes: each uploaded file lands on exactly
//! one eligible server, each server receives at most one credential, and the
//! whole exchange runs as a resumable, multi-step conversation.
//!
//! ## Core Responsibilities
//!
//! ### Credential Distribution
//! Operators open an upload session, send credential files one at a time and
//! close the session when done. Every file is validated, cleaned into parseable
//! JSON and written atomically into the session directory of the next eligible
//! server. Nothing that was written is ever rolled back.
//!
//! ### Conversation State
//! Each operator owns one workflow that moves between idle, collecting and
//! awaiting a restart decision. Inputs for one operator are serialized; different
//! operators never block each other.
//!
//! ### Panel Operations
//! Server listing, user lookups and power actions go through a gateway trait.
//! Reads are retried with bounded backoff, restarts are paced and never retried,
//! and a persisted host blacklist can block every panel call at once.
//!
//! ## Module Organization
//!
//! ### Provisioning Core
//! - `paths`: volume root discovery and fail-closed server path resolution
//! - `sanitize`: recovery of JSON from noisy uploads
//! - `scanner`: eligibility classification of the panel roster
//! - `distribution`: the per-session FIFO queue and atomic credential writes
//! - `workflow`: the per-operator state machine
//! - `session_manager`: ownership of one workflow per operator
//!
//! ### Collaborators
//! - `gateway`: the panel REST API
//! - `fetch`: retry policy and downloads of remote uploads
//! - `blacklist`: the persisted set of blocked panel hosts
//!
//! ### Chat Surface
//! - `bot`: authorization, command parsing and admin commands
//! - `network`, `link_manager`: the UDP transport consoles connect to
//! - `config`: command line and environment settings
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::blacklist::BlacklistSet;
//! use server::bot::Bot;
//! use server::distribution::UploadLimits;
//! use server::fetch::{HttpFetcher, RetryPolicy};
//! use server::gateway::PterodactylGateway;
//! use server::network::Server;
//! use server::paths::VolumeResolver;
//! use server::workflow::ProvisionContext;
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tokio::sync::RwLock;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = reqwest::Client::new();
//!     let gateway = PterodactylGateway::new(
//!         client.clone(),
//!         "https://panel.example.com",
//!         "ptla_application_key".into(),
//!         "ptlc_client_key".into(),
//!         RetryPolicy::default(),
//!     )?;
//!
//!     let ctx = ProvisionContext {
//!         resolver: VolumeResolver::new(None),
//!         gateway: Arc::new(gateway),
//!         fetcher: Arc::new(HttpFetcher::new(client, RetryPolicy::default())),
//!         blacklist: Arc::new(RwLock::new(BlacklistSet::load("blacklist.json".into()).await)),
//!         limits: UploadLimits::default(),
//!         restart_delay: Duration::from_secs(2),
//!     };
//!
//!     // Operator 1001 is the only one allowed to talk to the bot
//!     let bot = Arc::new(Bot::new(ctx, [1001]));
//!
//!     let mut server = Server::new("127.0.0.1:8080", bot, 16, Duration::from_secs(120)).await?;
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! The server runs internal async tasks that handle:
//! - **Network Receiver**: decodes incoming console datagrams
//! - **Network Sender**: delivers replies to each operator's current address
//! - **Timeout Checker**: drops console links that went silent
//! - **Dispatchers**: one per operator, feeding chat events to the bot in order
//!
//! ## Failure Model
//!
//! No single failure stops the bot. Validation problems, missing paths, write
//! errors and panel errors are all turned into a reply to the operator, and any
//! transition that fails part way leaves the workflow idle rather than stuck.

pub mod blacklist;
pub mod bot;
pub mod config;
pub mod distribution;
pub mod error;
pub mod fetch;
pub mod gateway;
pub mod link_manager;
pub mod network;
pub mod paths;
pub mod sanitize;
pub mod scanner;
pub mod session_manager;
pub mod utils;
pub mod workflow;
