//! kvlookup - Entity Enrichment from a Key-Value Store
//!
//! kvlookup takes a batch of entities (IP addresses, domains, hashes, ...),
//! maps each to a store key through a template, fetches the keys from a
//! Redis-compatible server and turns every hit into a short list of summary
//! tags plus the full parsed value.
//!
//! # Architecture
//! This library provides the core functionality for both the CLI and the host
//! server. Both are thin wrappers around [`Lookup`].
//!
//! # Module Organization
//! - [`error`] - Error types and handling
//! - [`output`] - JSON output envelope types
//! - [`store`] - Store connection traits and transports (RESP, in-memory)
//! - [`connection`] - Single live connection lifecycle
//! - [`key`] - Key template resolution
//! - [`parse`] - Raw value classification
//! - [`summary`] - Summary tag extraction
//! - [`lookup`] - Batch orchestration
//! - [`options`] - Host option validation
//! - [`config`] - Named profiles
//! - [`host`] - JSON-RPC host server

pub mod config;
pub mod connection;
pub mod error;
pub mod host;
pub mod key;
pub mod lookup;
pub mod options;
pub mod output;
pub mod parse;
pub mod store;
pub mod summary;

// Re-export commonly used types for convenience
pub use config::{list_profiles, resolve_profile, save_profile, ConfigLocation, ProfileRegistry, StoredProfile};
pub use connection::{ConnectionManager, ConnectionState};
pub use error::{LookupError, Result};
pub use key::resolve_key;
pub use lookup::{BatchOutcome, Entity, EntityFailure, Lookup, LookupData, LookupRequest, LookupResult};
pub use options::{validate_options, LookupOptions, OptionError, RawOptions, ViewPreference};
pub use output::{ErrorEnvelope, ErrorInfo, Metadata, SuccessEnvelope};
pub use parse::{parse, ParsedValue};
pub use store::{ConnectionConfig, StoreConnection, StoreConnector};
pub use summary::summarize;
