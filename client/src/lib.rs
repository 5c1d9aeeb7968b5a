//! # Operator Console Library
//!
//! A terminal chat client for the provisioning bot. It speaks the same UDP
//! packet protocol the bot serves and stands in for a chat application: the
//! operator types commands and uploads, the console renders the bot's replies
//! and numbered buttons.
//!
//! ## Module Organization
//!
//! ### Input Module (`input`)
//! Turns typed lines into chat events:
//! - `/file <path>` reads a local file and sends it inline
//! - `/url <name> <url>` sends a remote upload the bot downloads itself
//! - `/press <n>` presses a button from the most recent reply
//! - anything else is sent as text, so bot commands like `/upload` pass through
//!
//! Files larger than one datagram can carry are refused before sending.
//!
//! ### Network Module (`network`)
//! Owns the UDP socket and the console loop:
//! - handshake with the bot and periodic heartbeats
//! - reconnect attempts while the link is down
//! - decoding replies and handing them to the renderer
//!
//! ### Rendering Module (`rendering`)
//! Formats replies as plain text followed by a numbered button row.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::Console;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut console = Console::new("127.0.0.1:8080", 1001, Duration::from_secs(10)).await?;
//!     console.run().await?;
//!     Ok(())
//! }
//! ```

pub mod input;
pub mod network;
pub mod rendering;
