//! Error taxonomy for the migration scheduler.
//!
//! Only faults that must stop the caller are surfaced as [`MigrateError`].
//! Failures coming back from the target engine are *data*: they are run
//! through the [`ErrorClassifier`](crate::classifier::ErrorClassifier) and
//! recorded on the owning object, never raised as errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MigrateError {
	/// Malformed registration or definition input. Fails fast at call time
	/// and is never retried.
	#[error("Validation error: {0}")]
	Validation(String),

	/// The executor (or translator transport) is unreachable. Aborts the
	/// whole run, since every subsequent attempt would fail identically.
	#[error("Connectivity fault: {0}")]
	Connectivity(String),

	#[error("IO error reading {path}: {source}")]
	Io {
		path: std::path::PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("Failed to parse configuration: {message}")]
	ConfigParse { message: String },

	#[error("Serialization error: {0}")]
	Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MigrateError>;
