//! Batch Lookups
//!
//! [`Lookup`] is the entry point hosts call with a batch of entities. For a
//! batch it:
//! 1. makes sure the store connection matches the batch's connection options
//! 2. runs one GET per entity concurrently over that connection
//! 3. parses and summarizes every hit
//!
//! A connection failure aborts the batch before any entity is looked up. A
//! failure of an individual GET is logged and recorded in
//! [`BatchOutcome::failures`]; every other entity still completes. Results
//! come back in input order.

use futures::future::join_all;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use tracing::{error, trace};

use crate::connection::ConnectionManager;
use crate::error::{LookupError, Result};
use crate::key::resolve_key;
use crate::options::{LookupOptions, ViewPreference};
use crate::parse::{parse, ParsedValue};
use crate::store::{StoreConnection, StoreConnector};
use crate::summary::summarize;

/// An identifier supplied by the host (IP address, domain, hash, ...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub value: String,

    /// Host-assigned entity type, passed through untouched
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
}

impl Entity {
    pub fn new(value: impl Into<String>) -> Self {
        Self { value: value.into(), entity_type: None }
    }
}

/// Everything needed to look up one entity
#[derive(Debug, Clone, Copy)]
pub struct LookupRequest<'a> {
    pub entity_value: &'a str,
    pub key_template: &'a str,
    pub is_structured: bool,
    pub summary_spec: &'a str,
    pub view: ViewPreference,
}

impl<'a> LookupRequest<'a> {
    #[must_use]
    pub fn new(entity: &'a Entity, options: &'a LookupOptions) -> Self {
        Self {
            entity_value: &entity.value,
            key_template: &options.key_template,
            is_structured: options.is_structured,
            summary_spec: &options.summary_tags,
            view: options.view,
        }
    }

    /// Store key for this entity
    #[must_use]
    pub fn key(&self) -> String {
        resolve_key(self.entity_value, self.key_template)
    }
}

/// Data found for an entity
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LookupData {
    /// Short display tags
    pub summary: Vec<String>,
    /// Parsed value: a JSON tree or a string
    pub details: ParsedValue,
    pub view: ViewPreference,
}

/// Outcome for one entity
///
/// `data` is `None` when the store has no value for the entity's key. That is
/// a valid result, not an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LookupResult {
    pub entity: Entity,
    pub data: Option<LookupData>,
}

impl LookupResult {
    /// Result for a key the store does not hold
    #[must_use]
    pub const fn no_data(entity: Entity) -> Self {
        Self { entity, data: None }
    }

    #[must_use]
    pub const fn is_hit(&self) -> bool {
        self.data.is_some()
    }
}

/// An entity whose lookup failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityFailure {
    pub entity: Entity,
    pub error: LookupError,
}

impl Serialize for EntityFailure {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("EntityFailure", 3)?;
        state.serialize_field("entity", &self.entity)?;
        state.serialize_field("code", self.error.error_code())?;
        state.serialize_field("message", &self.error.message())?;
        state.end()
    }
}

/// Everything a batch produced
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchOutcome {
    /// Completed lookups (hits and misses), in input order
    pub results: Vec<LookupResult>,
    /// Lookups that failed, in input order
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<EntityFailure>,
}

impl BatchOutcome {
    /// Aggregate error when any entity failed
    #[must_use]
    pub fn error(&self) -> Option<LookupError> {
        if self.failures.is_empty() {
            None
        } else {
            Some(LookupError::partial_failure(
                self.failures.len(),
                self.failures.len() + self.results.len(),
            ))
        }
    }

    /// Number of entities with data
    #[must_use]
    pub fn hits(&self) -> usize {
        self.results.iter().filter(|r| r.is_hit()).count()
    }
}

/// Batch lookup front end, owning the store connection
pub struct Lookup<C: StoreConnector> {
    manager: ConnectionManager<C>,
}

impl<C: StoreConnector> Lookup<C> {
    pub const fn new(connector: C) -> Self {
        Self { manager: ConnectionManager::new(connector) }
    }

    #[must_use]
    pub const fn manager(&self) -> &ConnectionManager<C> {
        &self.manager
    }

    /// Look up every entity of a batch
    ///
    /// # Errors
    ///
    /// Returns `ConnectionFailed` when the store connection cannot be
    /// established; no entity is looked up in that case. Per-entity failures
    /// are reported through [`BatchOutcome::failures`] instead.
    pub async fn lookup_all(
        &mut self,
        entities: &[Entity],
        options: &LookupOptions,
    ) -> Result<BatchOutcome> {
        trace!(entities = entities.len(), "lookup_all");

        let connection = self.manager.ensure_ready(&options.connection).await?;

        let outcomes = join_all(
            entities.iter().map(|entity| lookup_entity(connection.as_ref(), entity, options)),
        )
        .await;

        let mut batch = BatchOutcome::default();
        for (entity, outcome) in entities.iter().zip(outcomes) {
            match outcome {
                Ok(result) => batch.results.push(result),
                Err(e) => {
                    error!(entity = %entity.value, error = %e, "Entity lookup failed");
                    batch.failures.push(EntityFailure { entity: entity.clone(), error: e });
                }
            }
        }

        trace!(results = batch.results.len(), hits = batch.hits(), failures = batch.failures.len(), "Lookup results");
        Ok(batch)
    }

    /// Close the store connection
    pub async fn shutdown(&mut self) {
        self.manager.close().await;
    }
}

async fn lookup_entity<S: StoreConnection>(
    connection: &S,
    entity: &Entity,
    options: &LookupOptions,
) -> Result<LookupResult> {
    let request = LookupRequest::new(entity, options);
    let key = request.key();

    let Some(raw) = connection.get(&key).await? else {
        trace!(%key, "No data");
        return Ok(LookupResult::no_data(entity.clone()));
    };

    let details = parse(&raw, request.is_structured);
    let summary = summarize(&details, request.summary_spec);
    Ok(LookupResult {
        entity: entity.clone(),
        data: Some(LookupData { summary, details, view: request.view }),
    })
}
