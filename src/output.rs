//! JSON Output Envelope Types
//!
//! Every CLI command prints exactly one envelope on stdout.
//!
//! # Output Contract
//! - Success: `{"ok": true, "command": "...", "data": {...}, "meta": {...}}`
//! - Error: `{"ok": false, "command": "...", "error": {"code": "...", "message": "..."}}`
//!
//! A lookup batch in which some entities failed is still a success envelope:
//! `data` carries the completed results and `meta.failed` counts the rest.

use serde::{Deserialize, Serialize};

use crate::error::LookupError;

/// Success envelope for command results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessEnvelope<T> {
    /// Always true for success envelopes
    pub ok: bool,

    /// Command that was executed (lookup, validate, profile)
    pub command: String,

    pub data: T,

    pub meta: Metadata,
}

impl<T> SuccessEnvelope<T> {
    pub fn new(command: impl Into<String>, data: T, meta: Metadata) -> Self {
        Self { ok: true, command: command.into(), data, meta }
    }
}

/// Error envelope for command failures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// Always false for error envelopes
    pub ok: bool,

    pub command: String,

    pub error: ErrorInfo,
}

impl ErrorEnvelope {
    pub fn new(command: impl Into<String>, error: ErrorInfo) -> Self {
        Self { ok: false, command: command.into(), error }
    }

    /// Create error envelope from a [`LookupError`]
    pub fn from_error(command: impl Into<String>, err: &LookupError) -> Self {
        Self::new(command, ErrorInfo::new(err.error_code(), err.message()))
    }
}

/// Error information structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable error code (e.g., "CONNECTION_FAILED", "INVALID_INPUT")
    pub code: String,

    /// Human-readable error message (never contains the store password)
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self { code: code.into(), message: message.into() }
    }
}

/// Execution metadata included in all success responses
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Execution time in milliseconds
    pub execution_ms: u64,

    /// Number of entities in the batch (lookup only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entities: Option<usize>,

    /// Number of entities with data (lookup only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hits: Option<usize>,

    /// Number of entities whose lookup failed (lookup only, omitted when zero)
    #[serde(default, skip_serializing_if = "is_zero")]
    pub failed: usize,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
const fn is_zero(n: &usize) -> bool {
    *n == 0
}

impl Metadata {
    /// Metadata with just execution time
    #[must_use]
    pub const fn new(execution_ms: u64) -> Self {
        Self { execution_ms, entities: None, hits: None, failed: 0 }
    }

    /// Metadata for a lookup batch
    #[must_use]
    pub const fn for_batch(execution_ms: u64, entities: usize, hits: usize, failed: usize) -> Self {
        Self { execution_ms, entities: Some(entities), hits: Some(hits), failed }
    }
}
