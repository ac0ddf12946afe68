//! Lookup Options
//!
//! Hosts hand over options as loosely-typed JSON ([`RawOptions`], keyed the
//! way the option schema names them). [`RawOptions::validate`] reports every
//! problem as a `{key, message}` pair; [`RawOptions::into_options`] turns a
//! valid set into the strongly-typed [`LookupOptions`] the lookup core uses.
//!
//! # Defaults
//! | key           | default      |
//! |---------------|--------------|
//! | `port`        | `6379`       |
//! | `database`    | `0`          |
//! | `key`         | `{{entity}}` |
//! | `isJson`      | `true`       |
//! | `summaryTags` | empty        |
//! | `viewAsTable` | `false`      |
//! | `enableTls`   | `false`      |

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{LookupError, Result};
use crate::key::ENTITY_PLACEHOLDER;
use crate::store::{ConnectionConfig, DEFAULT_PORT};

/// How the presentation layer should render structured details
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewPreference {
    /// Pretty-printed JSON
    #[default]
    Json,
    /// Key/value table
    Table,
}

/// Options as supplied by a host, before validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawOptions {
    #[serde(default)]
    pub host: String,

    #[serde(default = "default_port", deserialize_with = "lenient_integer")]
    pub port: Option<i64>,

    #[serde(default = "default_database", deserialize_with = "lenient_integer")]
    pub database: Option<i64>,

    /// WARNING: Sensitive data, do not log or include in error messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Key template, see [`crate::key`]
    #[serde(default = "default_key")]
    pub key: String,

    #[serde(default = "default_true")]
    pub is_json: bool,

    #[serde(default)]
    pub summary_tags: String,

    #[serde(default)]
    pub view_as_table: bool,

    #[serde(default)]
    pub enable_tls: bool,
}

const fn default_port() -> Option<i64> {
    Some(DEFAULT_PORT as i64)
}

const fn default_database() -> Option<i64> {
    Some(0)
}

fn default_key() -> String {
    ENTITY_PLACEHOLDER.to_string()
}

const fn default_true() -> bool {
    true
}

/// Accept numbers and numeric strings; anything else reads as "not a number".
fn lenient_integer<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<i64>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_i64().or_else(|| {
            n.as_f64().filter(|f| f.fract() == 0.0 && f.abs() < 9.0e15).map(|f| f as i64)
        }),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

impl Default for RawOptions {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_port(),
            database: default_database(),
            password: None,
            key: default_key(),
            is_json: true,
            summary_tags: String::new(),
            view_as_table: false,
            enable_tls: false,
        }
    }
}

/// A single validation failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionError {
    /// Option key the message refers to
    pub key: String,
    pub message: String,
}

impl OptionError {
    fn new(key: &str, message: &str) -> Self {
        Self { key: key.to_string(), message: message.to_string() }
    }
}

impl RawOptions {
    /// Check the options, returning every problem found
    ///
    /// An empty vector means the options are valid.
    #[must_use]
    pub fn validate(&self) -> Vec<OptionError> {
        let mut errors = Vec::new();

        if self.host.is_empty() {
            errors.push(OptionError::new("host", "You must provide a host value"));
        }

        if !self.port.is_some_and(|port| u16::try_from(port).is_ok()) {
            errors.push(OptionError::new("port", "You must provide the port Redis is running on"));
        }

        if !self.database.is_some_and(|db| u32::try_from(db).is_ok()) {
            errors.push(OptionError::new(
                "database",
                "You must provide the Redis database you are connecting to",
            ));
        }

        errors
    }

    /// Validate and convert into [`LookupOptions`]
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` listing every validation message.
    pub fn into_options(self) -> Result<LookupOptions> {
        let errors = self.validate();
        if !errors.is_empty() {
            let messages: Vec<String> =
                errors.iter().map(|e| format!("{}: {}", e.key, e.message)).collect();
            return Err(LookupError::invalid_input(messages.join("; ")));
        }

        let port = self
            .port
            .and_then(|p| u16::try_from(p).ok())
            .ok_or_else(|| LookupError::invalid_input("port out of range"))?;
        let database = self
            .database
            .and_then(|d| u32::try_from(d).ok())
            .ok_or_else(|| LookupError::invalid_input("database out of range"))?;

        Ok(LookupOptions {
            connection: ConnectionConfig {
                host: self.host,
                port,
                use_tls: self.enable_tls,
                database,
                password: self.password.filter(|p| !p.is_empty()),
            },
            key_template: self.key,
            is_structured: self.is_json,
            summary_tags: self.summary_tags,
            view: if self.view_as_table { ViewPreference::Table } else { ViewPreference::Json },
        })
    }
}

/// Validated options for one lookup batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupOptions {
    pub connection: ConnectionConfig,
    pub key_template: String,
    /// Stored values are JSON
    pub is_structured: bool,
    /// Summary tag specification, see [`crate::summary`]
    pub summary_tags: String,
    pub view: ViewPreference,
}

impl LookupOptions {
    /// Options with default key template, JSON values and no summary tags
    #[must_use]
    pub fn new(connection: ConnectionConfig) -> Self {
        Self {
            connection,
            key_template: default_key(),
            is_structured: true,
            summary_tags: String::new(),
            view: ViewPreference::Json,
        }
    }

    #[must_use]
    pub fn with_key_template(mut self, template: impl Into<String>) -> Self {
        self.key_template = template.into();
        self
    }

    #[must_use]
    pub const fn with_structured(mut self, is_structured: bool) -> Self {
        self.is_structured = is_structured;
        self
    }

    #[must_use]
    pub fn with_summary_tags(mut self, spec: impl Into<String>) -> Self {
        self.summary_tags = spec.into();
        self
    }

    #[must_use]
    pub const fn with_view(mut self, view: ViewPreference) -> Self {
        self.view = view;
        self
    }
}

/// Validate candidate options
///
/// Convenience wrapper around [`RawOptions::validate`].
#[must_use]
pub fn validate_options(options: &RawOptions) -> Vec<OptionError> {
    tracing::debug!(host = %options.host, port = ?options.port, database = ?options.database, "Validating user options");
    options.validate()
}
