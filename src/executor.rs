//! External collaborator interfaces.
//!
//! The scheduler never talks to a database or a translation engine
//! directly: it drives these traits. The executor is the sole channel
//! through which true dependencies are discovered, so implementations must
//! return engine error text unmodified.

use async_trait::async_trait;

use crate::error::Result;
use crate::object::ObjectKind;

/// Outcome of submitting one statement to the target engine.
///
/// A rejected statement is a normal, classifiable outcome. Transport-level
/// faults (server unreachable, authentication lost) are surfaced as
/// [`MigrateError::Connectivity`](crate::error::MigrateError::Connectivity)
/// through the trait's `Result` instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
	Success,
	Failure {
		/// Raw, unmodified engine error text.
		error_text: String,
	},
}

impl ExecutionOutcome {
	pub fn failure(error_text: impl Into<String>) -> Self {
		Self::Failure {
			error_text: error_text.into(),
		}
	}

	pub fn is_success(&self) -> bool {
		matches!(self, Self::Success)
	}
}

/// Executes statements against the target engine.
#[async_trait]
pub trait SqlExecutor: Send + Sync {
	async fn execute(&self, statement: &str) -> Result<ExecutionOutcome>;
}

/// Outcome of translating one object's source code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranslationOutcome {
	Translated { target_code: String },
	/// Translation failed; the text is classified exactly like an
	/// executor failure.
	Failure { error_text: String },
}

/// Converts source-engine definitions into target-engine SQL.
///
/// Implementations should be pure functions of the source text, which
/// makes translation of unrelated objects safe to parallelize upstream.
#[async_trait]
pub trait Translator: Send + Sync {
	async fn translate(
		&self,
		source_code: &str,
		kind: ObjectKind,
		name: &str,
	) -> Result<TranslationOutcome>;
}

/// Optional source-catalog lookup used to disambiguate "missing object"
/// errors when the message does not say what kind of object is missing.
pub trait CatalogProbe: Send + Sync {
	fn kind_of(&self, name: &str) -> Option<ObjectKind>;
}
