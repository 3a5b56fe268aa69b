//! Migration report generation.
//!
//! The report is the sole channel for partial-success information:
//! `run()` returning without an error must never be read as "everything
//! migrated". Ordering within each group follows registration order so
//! output is stable for snapshot tests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::classifier::ErrorKind;
use crate::object::{MigrationObject, ObjectKind, ObjectStatus};
use crate::registry::ObjectRegistry;

/// One retry cycle's accounting; cycle 0 is the initial pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationCycle {
	pub cycle_number: u32,
	pub objects_attempted: usize,
	pub objects_succeeded: usize,
}

/// Final state of one object, frozen into the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectOutcome {
	pub name: String,
	pub schema: String,
	pub kind: ObjectKind,
	pub status: ObjectStatus,
	pub attempt_count: u32,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error_kind: Option<ErrorKind>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error_text: Option<String>,
	/// Unsatisfied prerequisites for objects that terminalized as
	/// "unresolved dependency".
	#[serde(skip_serializing_if = "Vec::is_empty", default)]
	pub blocking_dependencies: Vec<String>,
}

impl ObjectOutcome {
	fn from_object(object: &MigrationObject) -> Self {
		let blocking = if object.status == ObjectStatus::Failed {
			object.blocking_dependencies.iter().cloned().collect()
		} else {
			Vec::new()
		};
		Self {
			name: object.name.clone(),
			schema: object.schema.clone(),
			kind: object.kind,
			status: object.status,
			attempt_count: object.attempt_count,
			error_kind: object.last_error_kind,
			error_text: object.last_error_text.clone(),
			blocking_dependencies: blocking,
		}
	}
}

/// Deterministic, serializable audit of a whole run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationReport {
	pub started_at: DateTime<Utc>,
	pub finished_at: DateTime<Utc>,
	/// Initial pass plus every retry cycle, in execution order.
	pub cycles: Vec<MigrationCycle>,
	/// `(status label, count)` for every status with at least one object.
	pub counts_by_status: Vec<(String, usize)>,
	/// `(kind label, count)` in band order.
	pub counts_by_kind: Vec<(String, usize)>,
	/// Every registered object in registration order.
	pub objects: Vec<ObjectOutcome>,
}

impl MigrationReport {
	pub(crate) fn build(
		registry: &ObjectRegistry,
		cycles: Vec<MigrationCycle>,
		started_at: DateTime<Utc>,
	) -> Self {
		let statuses = [
			ObjectStatus::Success,
			ObjectStatus::Failed,
			ObjectStatus::Cancelled,
			ObjectStatus::Skipped,
			ObjectStatus::Pending,
			ObjectStatus::InProgress,
		];
		let counts_by_status = statuses
			.iter()
			.map(|s| (s.label().to_string(), registry.count_with_status(*s)))
			.filter(|(_, count)| *count > 0)
			.collect();

		let counts_by_kind = ObjectKind::BAND_ORDER
			.iter()
			.map(|kind| {
				let count = registry.objects().filter(|o| o.kind == *kind).count();
				(kind.sql_noun().to_string(), count)
			})
			.filter(|(_, count)| *count > 0)
			.collect();

		Self {
			started_at,
			finished_at: Utc::now(),
			cycles,
			counts_by_status,
			counts_by_kind,
			objects: registry.objects().map(ObjectOutcome::from_object).collect(),
		}
	}

	/// Retry cycles consumed (the initial pass is not a retry).
	pub fn retry_cycles_used(&self) -> u32 {
		self.cycles
			.iter()
			.map(|c| c.cycle_number)
			.max()
			.unwrap_or(0)
	}

	pub fn succeeded(&self) -> usize {
		self.count_of(ObjectStatus::Success)
	}

	pub fn failed(&self) -> usize {
		self.count_of(ObjectStatus::Failed)
	}

	fn count_of(&self, status: ObjectStatus) -> usize {
		self.objects.iter().filter(|o| o.status == status).count()
	}

	/// Structured form for persistence or downstream tooling.
	pub fn to_json(&self) -> crate::error::Result<String> {
		Ok(serde_json::to_string_pretty(self)?)
	}

	/// Human-readable summary.
	pub fn render_text(&self) -> String {
		let mut out = String::new();
		out.push_str("Migration report\n");
		out.push_str("================\n");
		out.push_str(&format!(
			"Objects: {}  (retry cycles used: {})\n",
			self.objects.len(),
			self.retry_cycles_used()
		));

		out.push_str("\nBy status:\n");
		for (label, count) in &self.counts_by_status {
			out.push_str(&format!("  {label:<12} {count}\n"));
		}

		out.push_str("\nBy kind:\n");
		for (label, count) in &self.counts_by_kind {
			out.push_str(&format!("  {label:<12} {count}\n"));
		}

		let failures: Vec<&ObjectOutcome> = self
			.objects
			.iter()
			.filter(|o| o.status == ObjectStatus::Failed)
			.collect();
		if !failures.is_empty() {
			out.push_str("\nFailures:\n");
			for outcome in failures {
				let kind_label = outcome
					.error_kind
					.map(|k| k.label())
					.unwrap_or("unclassified");
				out.push_str(&format!(
					"  {}.{} [{}] after {} attempt(s): {}\n",
					outcome.schema,
					outcome.name,
					kind_label,
					outcome.attempt_count,
					outcome.error_text.as_deref().unwrap_or("no error text"),
				));
				if !outcome.blocking_dependencies.is_empty() {
					out.push_str(&format!(
						"      blocked on: {}\n",
						outcome.blocking_dependencies.join(", ")
					));
				}
			}
		}

		out
	}
}
