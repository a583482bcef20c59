//! # remanga-farmer
//!
//! Reading-activity farming library for the ReManga catalog: it logs in as a
//! user, walks the title catalog page by page, and submits view events for
//! every free chapter the user has not read yet.
//!
//! ## Design Philosophy
//!
//! - **Resilient by default** - background calls grind through transient
//!   server failures with a large bounded retry budget; only bad credentials
//!   fail fast
//! - **One task per account** - every account owns its session, pending set
//!   and viewed set exclusively; accounts never share state and never stop
//!   each other
//! - **Library-first** - no CLI; a small example program wires the pieces
//!   into a runnable process
//!
//! ## Quick Start
//!
//! ```no_run
//! use remanga_farmer::{Config, accounts, farmer};
//! use std::sync::Arc;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Arc::new(Config::default());
//!     let accounts = accounts::parse_accounts("alice:pw1\n")?;
//!
//!     // Runs every account's farming loop until the process exits.
//!     farmer::farm_all(config, accounts).await;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Account list parsing
pub mod accounts;
/// Per-account cache persistence
pub mod cache;
/// Bookmark and catalog scanning
pub mod catalog;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// HTTP request executor with bounded retries
pub mod executor;
/// The farming orchestrator
pub mod farmer;
/// Session construction and the login handshake
pub mod session;
/// Core types
pub mod types;

pub use accounts::Credentials;
pub use config::Config;
pub use error::{Error, Result};
pub use farmer::AccountFarmer;
pub use session::Session;
