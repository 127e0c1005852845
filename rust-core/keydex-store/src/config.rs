// SPDX-License-Identifier: PMPL-1.0-or-later
//! Store configuration.
//!
//! Defaults:
//! - default_limit: 10 items per list page
//! - max_indexes_per_record: 64
//! - schema: empty (schemaless mode)
//!
//! Environment overrides: `KEYDEX_DEFAULT_LIMIT`, `KEYDEX_MAX_INDEXES`.

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};
use crate::schema::Schema;

/// Page size used when a request sets no limit.
pub const DEFAULT_LIMIT: usize = 10;

/// Page number used when a request sets no page.
pub const DEFAULT_PAGE: usize = 0;

/// Upper bound on index entries one record may populate.
pub const DEFAULT_MAX_INDEXES_PER_RECORD: usize = 64;

/// Environment variable overriding [`StoreConfig::default_limit`].
pub const ENV_DEFAULT_LIMIT: &str = "KEYDEX_DEFAULT_LIMIT";

/// Environment variable overriding [`StoreConfig::max_indexes_per_record`].
pub const ENV_MAX_INDEXES: &str = "KEYDEX_MAX_INDEXES";

/// Configuration for a [`crate::Store`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Page size applied when a request sets no limit.
    pub default_limit: usize,
    /// Maximum index entries a single record may populate.
    pub max_indexes_per_record: usize,
    /// Table and index definitions. Immutable once the store is built.
    pub schema: Schema,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_LIMIT,
            max_indexes_per_record: DEFAULT_MAX_INDEXES_PER_RECORD,
            schema: Schema::default(),
        }
    }
}

impl StoreConfig {
    /// A default configuration with the given schema.
    pub fn with_schema(schema: Schema) -> Self {
        Self {
            schema,
            ..Self::default()
        }
    }

    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> StoreResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|err| StoreError::Config(format!("invalid config JSON: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from the process environment.
    pub fn with_env_overrides(self) -> StoreResult<Self> {
        self.with_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn with_overrides_from<F>(mut self, lookup: F) -> StoreResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_DEFAULT_LIMIT) {
            self.default_limit = parse_count(ENV_DEFAULT_LIMIT, &raw)?;
        }
        if let Some(raw) = lookup(ENV_MAX_INDEXES) {
            self.max_indexes_per_record = parse_count(ENV_MAX_INDEXES, &raw)?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Check limits and the schema.
    pub fn validate(&self) -> StoreResult<()> {
        if self.default_limit == 0 {
            return Err(StoreError::Config(
                "default_limit must be at least 1".to_string(),
            ));
        }
        if self.max_indexes_per_record == 0 {
            return Err(StoreError::Config(
                "max_indexes_per_record must be at least 1".to_string(),
            ));
        }
        self.schema.validate()
    }
}

fn parse_count(name: &str, raw: &str) -> StoreResult<usize> {
    raw.trim()
        .parse()
        .map_err(|err| StoreError::Config(format!("{name}={raw:?} is not a count: {err}")))
}
