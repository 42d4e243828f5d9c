//! # dhcpd-leases
//!
//! Reads an ISC dhcpd lease database (`dhcpd.leases`) and resolves the
//! current MAC-to-IP binding for every client.
//!
//! ## Features
//!
//! - Parses `lease <ip> { ... }` blocks anywhere in the file, skipping
//!   headers, comments, and failover state
//! - `starts`, `ends` (including `never`), `tstp`, `tsfp`, `hardware`,
//!   `uid`, and `binding` clauses; both calendar and `epoch` timestamps
//! - Keeps the lease with the latest `starts` time for each MAC
//! - All-or-nothing reloads with shareable immutable snapshots
//! - VMware Fusion `vmnet-dhcpd-<network>.leases` path resolution
//!
//! ## Quick Start
//!
//! ```no_run
//! use dhcpd_leases::{Config, DhcpdLeases};
//!
//! fn main() -> dhcpd_leases::Result<()> {
//!     let config = Config::load_or_create("config.json")?;
//!     let mut leases = DhcpdLeases::from_config(&config)?;
//!     leases.load()?;
//!
//!     for (mac, ip) in leases.iter() {
//!         println!("{} {}", mac, ip);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`lexer`] - Splits lease file text into tokens
//! - [`grammar`] - Parses lease blocks into [`LeaseRecord`]s
//! - [`resolver`] - Folds records into a [`LeaseTable`]; [`DhcpdLeases`] owns
//!   the published table
//! - [`Config`] - Which lease file to read

pub mod config;
pub mod error;
pub mod grammar;
pub mod lease;
pub mod lexer;
pub mod resolver;

pub use config::Config;
pub use error::{Error, Result};
pub use grammar::parse;
pub use lease::{Binding, DateRef, EndsAt, Hardware, LeaseMatch, LeaseRecord};
pub use resolver::{DhcpdLeases, IncompleteRecord, LeaseTable, MissingClause, Resolution, resolve};
