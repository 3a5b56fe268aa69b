//! Run configuration.
//!
//! Supports TOML configuration files and programmatic overrides.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::MigrateError;

/// Limits and defaults for a migration run.
///
/// # Example
///
/// ```rust
/// use schemaport::config::MigrationConfig;
///
/// let config = MigrationConfig::default()
///     .with_max_retry_cycles(5)
///     .with_default_schema("sales");
///
/// assert_eq!(config.max_retry_cycles, 5);
/// assert_eq!(config.default_schema, "sales");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
	/// Upper bound on retry cycles after the initial pass.
	pub max_retry_cycles: u32,

	/// Per-object attempt budget (initial pass included) unless a
	/// registration overrides it.
	pub default_max_attempts: u32,

	/// Schema applied to objects registered without an explicit qualifier.
	pub default_schema: String,
}

impl Default for MigrationConfig {
	fn default() -> Self {
		Self {
			max_retry_cycles: 3,
			default_max_attempts: 4,
			default_schema: "dbo".to_string(),
		}
	}
}

impl MigrationConfig {
	/// Set the retry-cycle bound.
	pub fn with_max_retry_cycles(mut self, cycles: u32) -> Self {
		self.max_retry_cycles = cycles;
		self
	}

	/// Set the default per-object attempt budget.
	pub fn with_default_max_attempts(mut self, attempts: u32) -> Self {
		self.default_max_attempts = attempts;
		self
	}

	/// Set the schema assumed for unqualified object names.
	pub fn with_default_schema(mut self, schema: impl Into<String>) -> Self {
		self.default_schema = schema.into();
		self
	}

	/// Load configuration from a TOML file.
	///
	/// # Errors
	///
	/// Returns an error if the file cannot be read or parsed.
	pub fn from_file(path: impl AsRef<Path>) -> Result<Self, MigrateError> {
		let content = std::fs::read_to_string(path.as_ref()).map_err(|e| MigrateError::Io {
			path: path.as_ref().to_path_buf(),
			source: e,
		})?;

		Self::from_toml(&content)
	}

	/// Parse configuration from a TOML string.
	pub fn from_toml(content: &str) -> Result<Self, MigrateError> {
		toml::from_str(content).map_err(|e| MigrateError::ConfigParse {
			message: e.to_string(),
		})
	}
}
