//! Migration object records and their status state machine.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::classifier::ErrorKind;

/// Kind of schema or code object being migrated.
///
/// Kinds are grouped into five fixed, strictly-sequenced priority bands:
/// tables first, triggers last. The band order statistically minimizes
/// forward references; correctness is recovered by retry cycles, not by
/// this static order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ObjectKind {
	Table,
	View,
	Function,
	Procedure,
	Trigger,
}

impl ObjectKind {
	/// All kinds in band order.
	pub const BAND_ORDER: [ObjectKind; 5] = [
		ObjectKind::Table,
		ObjectKind::View,
		ObjectKind::Function,
		ObjectKind::Procedure,
		ObjectKind::Trigger,
	];

	/// Fixed priority band (0 = attempted first).
	pub fn band(&self) -> usize {
		match self {
			ObjectKind::Table => 0,
			ObjectKind::View => 1,
			ObjectKind::Function => 2,
			ObjectKind::Procedure => 3,
			ObjectKind::Trigger => 4,
		}
	}

	/// SQL noun for log and report output.
	pub fn sql_noun(&self) -> &'static str {
		match self {
			ObjectKind::Table => "TABLE",
			ObjectKind::View => "VIEW",
			ObjectKind::Function => "FUNCTION",
			ObjectKind::Procedure => "PROCEDURE",
			ObjectKind::Trigger => "TRIGGER",
		}
	}
}

impl std::fmt::Display for ObjectKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.sql_noun())
	}
}

/// Per-object migration status.
///
/// Transitions are monotonic except `Skipped` → `Pending` when blocking
/// dependencies resolve. `Success`, `Failed` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectStatus {
	/// Registered, not yet attempted in the current cycle.
	Pending,
	/// An attempt is underway.
	InProgress,
	/// Created on the target. The record is immutable from here on.
	Success,
	/// Terminal failure: non-retryable classification, exhausted attempt
	/// budget, or unresolved dependencies at termination.
	Failed,
	/// Retryable failure with attempts remaining; eligible for the next
	/// cycle once its blocking dependencies are satisfied.
	Skipped,
	/// Run was cancelled before this object reached a terminal state.
	Cancelled,
}

impl ObjectStatus {
	pub fn is_terminal(&self) -> bool {
		matches!(
			self,
			ObjectStatus::Success | ObjectStatus::Failed | ObjectStatus::Cancelled
		)
	}

	pub fn label(&self) -> &'static str {
		match self {
			ObjectStatus::Pending => "pending",
			ObjectStatus::InProgress => "in_progress",
			ObjectStatus::Success => "success",
			ObjectStatus::Failed => "failed",
			ObjectStatus::Skipped => "skipped",
			ObjectStatus::Cancelled => "cancelled",
		}
	}
}

impl std::fmt::Display for ObjectStatus {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.label())
	}
}

/// One schema or code object under migration.
///
/// Created at registration, never deleted mid-run; finalized into the
/// report when the run terminates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationObject {
	/// Object name without schema qualifier.
	pub name: String,
	/// Owning schema on the target engine.
	pub schema: String,
	pub kind: ObjectKind,
	/// Source-engine definition text, as registered.
	pub source_code: String,
	/// Target-engine definition, populated by the translator on the first
	/// attempt. For tables this is the stripped (constraint-free) text.
	pub translated_code: Option<String>,
	pub status: ObjectStatus,
	pub attempt_count: u32,
	pub max_attempts: u32,
	/// Names extracted from failure messages, believed to be unmet
	/// prerequisites. Sorted for deterministic report output.
	pub blocking_dependencies: BTreeSet<String>,
	pub last_error_kind: Option<ErrorKind>,
	pub last_error_text: Option<String>,
}

impl MigrationObject {
	pub fn new(
		name: impl Into<String>,
		schema: impl Into<String>,
		kind: ObjectKind,
		source_code: impl Into<String>,
		max_attempts: u32,
	) -> Self {
		Self {
			name: name.into(),
			schema: schema.into(),
			kind,
			source_code: source_code.into(),
			translated_code: None,
			status: ObjectStatus::Pending,
			attempt_count: 0,
			max_attempts,
			blocking_dependencies: BTreeSet::new(),
			last_error_kind: None,
			last_error_text: None,
		}
	}

	/// Schema-qualified name, e.g. `dbo.Orders`.
	pub fn qualified_name(&self) -> String {
		format!("{}.{}", self.schema, self.name)
	}

	/// Whether the attempt budget still has room.
	pub fn attempts_remain(&self) -> bool {
		self.attempt_count < self.max_attempts
	}
}
