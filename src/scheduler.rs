//! Feedback-driven migration scheduler.
//!
//! Objects are attempted in five fixed priority bands (tables first,
//! triggers last) and failures are classified from the target engine's own
//! error text. A retryable failure parks the object as `Skipped` with the
//! referenced names recorded as blocking dependencies; bounded retry
//! cycles re-attempt objects once their dependencies have succeeded. The
//! band order statistically minimizes forward references, but correctness
//! comes from the retry cycles, not from the static order.

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::classifier::{ErrorClassifier, ErrorKind};
use crate::config::MigrationConfig;
use crate::constraints::{ConstraintApplyResult, ConstraintLedger, ForeignKeyDefinition};
use crate::error::{MigrateError, Result};
use crate::executor::{
	CatalogProbe, ExecutionOutcome, SqlExecutor, TranslationOutcome, Translator,
};
use crate::object::{MigrationObject, ObjectKind, ObjectStatus};
use crate::registry::ObjectRegistry;
use crate::report::{MigrationCycle, MigrationReport};

/// One object handed to [`MigrationScheduler::register`].
#[derive(Debug, Clone)]
pub struct Registration {
	pub name: String,
	pub schema: Option<String>,
	pub kind: ObjectKind,
	pub source_code: String,
	pub max_attempts: Option<u32>,
}

impl Registration {
	pub fn new(name: impl Into<String>, kind: ObjectKind, source_code: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			schema: None,
			kind,
			source_code: source_code.into(),
			max_attempts: None,
		}
	}

	pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
		self.schema = Some(schema.into());
		self
	}

	pub fn with_max_attempts(mut self, attempts: u32) -> Self {
		self.max_attempts = Some(attempts);
		self
	}
}

/// Drives registration, banded cycles and deferred constraint application
/// for one migration run. Owns its registry and ledger; each run starts
/// empty.
pub struct MigrationScheduler {
	config: MigrationConfig,
	registry: ObjectRegistry,
	ledger: ConstraintLedger,
	classifier: ErrorClassifier,
	translator: Arc<dyn Translator>,
}

impl MigrationScheduler {
	pub fn new(config: MigrationConfig, translator: Arc<dyn Translator>) -> Self {
		Self {
			config,
			registry: ObjectRegistry::new(),
			ledger: ConstraintLedger::new(),
			classifier: ErrorClassifier::new(),
			translator,
		}
	}

	/// Attach a catalog probe for missing-object disambiguation.
	pub fn with_probe(mut self, probe: Arc<dyn CatalogProbe>) -> Self {
		self.classifier = self.classifier.with_probe(probe);
		self
	}

	pub fn registry(&self) -> &ObjectRegistry {
		&self.registry
	}

	pub fn ledger(&self) -> &ConstraintLedger {
		&self.ledger
	}

	/// Register custom classification rules before the run.
	pub fn classifier_mut(&mut self) -> &mut ErrorClassifier {
		&mut self.classifier
	}

	/// Register one object. Must happen before any cycle starts.
	pub fn register(&mut self, registration: Registration) -> Result<()> {
		let schema = registration
			.schema
			.unwrap_or_else(|| self.config.default_schema.clone());
		let max_attempts = registration
			.max_attempts
			.unwrap_or(self.config.default_max_attempts);
		self.registry.register(MigrationObject::new(
			registration.name,
			schema,
			registration.kind,
			registration.source_code,
			max_attempts,
		))
	}

	/// Execute the initial pass plus all retry cycles to termination.
	///
	/// Cancellation is checked between objects, never mid-call; on
	/// cancellation the remaining non-terminal objects become `Cancelled`
	/// and a partial report is still produced.
	///
	/// # Errors
	///
	/// Returns an error only on a connectivity fault, which would make
	/// every subsequent attempt fail identically.
	pub async fn run(
		&mut self,
		executor: &dyn SqlExecutor,
		cancel: &CancellationToken,
	) -> Result<MigrationReport> {
		let started_at = Utc::now();
		let mut cycles = Vec::new();

		let initial = self.run_cycle(executor, cancel, 0, None).await?;
		let mut last_succeeded = initial.objects_succeeded;
		cycles.push(initial);

		let mut cycle_number = 0;
		while !cancel.is_cancelled() && self.needs_retry_cycle(cycle_number, last_succeeded) {
			cycle_number += 1;
			let candidates = self.retry_candidates();
			if candidates.is_empty() {
				break;
			}
			for name in &candidates {
				if let Some(object) = self.registry.get_mut(name) {
					object.status = ObjectStatus::Pending;
				}
			}
			let cycle = self
				.run_cycle(executor, cancel, cycle_number, Some(candidates.as_slice()))
				.await?;
			last_succeeded = cycle.objects_succeeded;
			tracing::info!(
				cycle = cycle.cycle_number,
				attempted = cycle.objects_attempted,
				succeeded = cycle.objects_succeeded,
				"retry cycle finished"
			);
			cycles.push(cycle);
		}

		if cancel.is_cancelled() {
			self.mark_remaining_cancelled();
		} else {
			self.fail_unresolved();
		}

		Ok(MigrationReport::build(&self.registry, cycles, started_at))
	}

	/// Apply all deferred foreign keys. Run once table-kind objects have
	/// stabilized.
	pub async fn apply_constraints(
		&self,
		executor: &dyn SqlExecutor,
	) -> Result<ConstraintApplyResult> {
		let ordered = self.ordered_definitions();
		self.ledger.apply(executor, &ordered).await
	}

	/// Ordered `ALTER TABLE` statements, without executing anything.
	pub fn statements_for_review(&self) -> Vec<String> {
		self.ledger.generate_statements(&self.ordered_definitions())
	}

	/// Replayable constraint script, independent of any apply outcome.
	pub fn export_script(&self) -> String {
		self.ledger.export_script(&self.ordered_definitions())
	}

	fn ordered_definitions(&self) -> Vec<ForeignKeyDefinition> {
		self.ledger.order_for_application(&self.ledger.definitions())
	}

	/// Termination: stop once the cycle budget is used, once a full cycle
	/// yields zero new successes, or once no skipped objects remain.
	fn needs_retry_cycle(&self, cycle_number: u32, last_succeeded: usize) -> bool {
		if cycle_number >= self.config.max_retry_cycles {
			return false;
		}
		if cycle_number > 0 && last_succeeded == 0 {
			return false;
		}
		self.registry.count_with_status(ObjectStatus::Skipped) > 0
	}

	/// Snapshot of skipped objects whose blocking dependencies are all
	/// satisfied, taken at the start of a retry cycle, in band order.
	fn retry_candidates(&self) -> Vec<String> {
		let mut candidates = Vec::new();
		for kind in ObjectKind::BAND_ORDER {
			for name in self.registry.names_with(kind, ObjectStatus::Skipped) {
				let satisfied = self
					.registry
					.get(&name)
					.map(|o| self.registry.dependencies_satisfied(&o.blocking_dependencies))
					.unwrap_or(false);
				if satisfied {
					candidates.push(name);
				}
			}
		}
		candidates
	}

	async fn run_cycle(
		&mut self,
		executor: &dyn SqlExecutor,
		cancel: &CancellationToken,
		cycle_number: u32,
		only: Option<&[String]>,
	) -> Result<MigrationCycle> {
		let mut attempted = 0;
		let mut succeeded = 0;
		for kind in ObjectKind::BAND_ORDER {
			for name in self.registry.names_with(kind, ObjectStatus::Pending) {
				if let Some(only) = only
					&& !only.contains(&name)
				{
					continue;
				}
				if cancel.is_cancelled() {
					return Ok(MigrationCycle {
						cycle_number,
						objects_attempted: attempted,
						objects_succeeded: succeeded,
					});
				}
				attempted += 1;
				if self.attempt_object(executor, &name).await? {
					succeeded += 1;
				}
			}
		}
		Ok(MigrationCycle {
			cycle_number,
			objects_attempted: attempted,
			objects_succeeded: succeeded,
		})
	}

	/// One attempt: translate if needed, submit, classify on failure.
	/// Returns whether the object reached `Success`.
	async fn attempt_object(&mut self, executor: &dyn SqlExecutor, name: &str) -> Result<bool> {
		let (kind, object_name, schema, source, translated) = {
			let Some(object) = self.registry.get_mut(name) else {
				return Ok(false);
			};
			object.status = ObjectStatus::InProgress;
			object.attempt_count += 1;
			(
				object.kind,
				object.name.clone(),
				object.schema.clone(),
				object.source_code.clone(),
				object.translated_code.clone(),
			)
		};

		let statement = match translated {
			Some(statement) => statement,
			None => {
				let translator = Arc::clone(&self.translator);
				match translator.translate(&source, kind, &object_name).await? {
					TranslationOutcome::Translated { target_code } => {
						match self.prepare_statement(kind, &object_name, &schema, target_code) {
							Ok(statement) => {
								if let Some(object) = self.registry.get_mut(name) {
									object.translated_code = Some(statement.clone());
								}
								statement
							}
							Err(MigrateError::Validation(message)) => {
								self.terminalize(name, ErrorKind::Other, message);
								return Ok(false);
							}
							Err(e) => return Err(e),
						}
					}
					TranslationOutcome::Failure { error_text } => {
						self.record_failure(name, kind, error_text);
						return Ok(false);
					}
				}
			}
		};

		match executor.execute(&statement).await? {
			ExecutionOutcome::Success => {
				if let Some(object) = self.registry.get_mut(name) {
					object.status = ObjectStatus::Success;
					object.blocking_dependencies.clear();
				}
				tracing::info!(object = %name, kind = %kind, "object created");
				Ok(true)
			}
			ExecutionOutcome::Failure { error_text } => {
				self.record_failure(name, kind, error_text);
				Ok(false)
			}
		}
	}

	/// Tables get their foreign keys stripped into the ledger before the
	/// first creation attempt, so creation order stops mattering.
	fn prepare_statement(
		&self,
		kind: ObjectKind,
		object_name: &str,
		schema: &str,
		target_code: String,
	) -> Result<String> {
		if kind != ObjectKind::Table {
			return Ok(target_code);
		}
		let (clean_text, _) = self.ledger.strip(&target_code, object_name, schema)?;
		Ok(clean_text)
	}

	fn record_failure(&mut self, name: &str, kind: ObjectKind, error_text: String) {
		let classification = self.classifier.classify(&error_text, kind);
		let Some(object) = self.registry.get_mut(name) else {
			return;
		};
		object.last_error_kind = Some(classification.kind);
		object.last_error_text = Some(error_text.clone());

		if classification.retryable && object.attempts_remain() {
			object.blocking_dependencies = classification.referenced_names.iter().cloned().collect();
			object.status = ObjectStatus::Skipped;
			tracing::debug!(
				object = %name,
				error_kind = %classification.kind,
				dependencies = ?object.blocking_dependencies,
				"object skipped, will retry"
			);
		} else {
			object.status = ObjectStatus::Failed;
			tracing::warn!(
				object = %name,
				error_kind = %classification.kind,
				error = %error_text,
				"object failed terminally"
			);
		}
	}

	fn terminalize(&mut self, name: &str, kind: ErrorKind, message: String) {
		if let Some(object) = self.registry.get_mut(name) {
			object.status = ObjectStatus::Failed;
			object.last_error_kind = Some(kind);
			object.last_error_text = Some(message);
		}
	}

	/// Any skipped object remaining at termination failed to have its
	/// dependencies materialize; a reference to an object outside the
	/// migration scope is an expected terminal state, not an exception.
	fn fail_unresolved(&mut self) {
		let unresolved = self.registry.names_with_status(ObjectStatus::Skipped);
		for name in unresolved {
			if let Some(object) = self.registry.get_mut(&name) {
				let dependencies = object
					.blocking_dependencies
					.iter()
					.cloned()
					.collect::<Vec<_>>()
					.join(", ");
				object.status = ObjectStatus::Failed;
				object.last_error_text = Some(format!("unresolved dependency: {dependencies}"));
			}
		}
	}

	fn mark_remaining_cancelled(&mut self) {
		for status in [ObjectStatus::Pending, ObjectStatus::InProgress] {
			for name in self.registry.names_with_status(status) {
				if let Some(object) = self.registry.get_mut(&name) {
					object.status = ObjectStatus::Cancelled;
				}
			}
		}
	}
}
