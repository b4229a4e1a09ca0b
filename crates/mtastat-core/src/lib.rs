//! mtastat-core — sendmail statistics exposed as MTA-MIB style table rows.
//!
//! Provides:
//! - `collector` — statistics file decoding, sendmail.cf parsing, queue scanning
//!   and the TTL-gated refresh cache
//! - `models` — channel list and snapshot data models
//! - `config` — module configuration and host directives
//! - `table` — ordered table lookup (exact / next) and field accessors
//! - `agent` — the context object tying everything together for a host

pub mod agent;
pub mod collector;
pub mod config;
pub mod models;
pub mod table;

pub use agent::{ApplyError, MtaContext};
