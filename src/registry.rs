//! Per-run object registry.
//!
//! One registry value is owned by each scheduler run; there is no
//! process-wide registration. Iteration order is registration order,
//! which keeps report output deterministic.

use std::collections::BTreeSet;

use indexmap::IndexMap;

use crate::classifier::clean_identifier;
use crate::error::{MigrateError, Result};
use crate::object::{MigrationObject, ObjectKind, ObjectStatus};

#[derive(Debug, Default)]
pub struct ObjectRegistry {
	objects: IndexMap<String, MigrationObject>,
}

impl ObjectRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Register one object before any cycle starts.
	///
	/// # Errors
	///
	/// Returns a validation error on an empty name, an attempt budget of
	/// zero, or a duplicate qualified name.
	pub fn register(&mut self, object: MigrationObject) -> Result<()> {
		if object.name.trim().is_empty() {
			return Err(MigrateError::Validation(
				"object name must not be empty".to_string(),
			));
		}
		if object.max_attempts == 0 {
			return Err(MigrateError::Validation(format!(
				"object {} has a zero attempt budget",
				object.qualified_name()
			)));
		}
		let key = object_key(&object.qualified_name());
		if self.objects.contains_key(&key) {
			return Err(MigrateError::Validation(format!(
				"duplicate registration for {}",
				object.qualified_name()
			)));
		}
		self.objects.insert(key, object);
		Ok(())
	}

	pub fn len(&self) -> usize {
		self.objects.len()
	}

	pub fn is_empty(&self) -> bool {
		self.objects.is_empty()
	}

	pub fn get(&self, qualified_name: &str) -> Option<&MigrationObject> {
		self.objects.get(&object_key(qualified_name))
	}

	pub(crate) fn get_mut(&mut self, qualified_name: &str) -> Option<&mut MigrationObject> {
		self.objects.get_mut(&object_key(qualified_name))
	}

	/// All objects in registration order.
	pub fn objects(&self) -> impl Iterator<Item = &MigrationObject> {
		self.objects.values()
	}

	/// Qualified names of one kind with one status, in registration order.
	pub fn names_with(&self, kind: ObjectKind, status: ObjectStatus) -> Vec<String> {
		self.objects
			.values()
			.filter(|o| o.kind == kind && o.status == status)
			.map(|o| o.qualified_name())
			.collect()
	}

	/// Qualified names with one status, in registration order, all kinds.
	pub fn names_with_status(&self, status: ObjectStatus) -> Vec<String> {
		self.objects
			.values()
			.filter(|o| o.status == status)
			.map(|o| o.qualified_name())
			.collect()
	}

	pub fn count_with_status(&self, status: ObjectStatus) -> usize {
		self.objects.values().filter(|o| o.status == status).count()
	}

	/// Lookup keys that count as "successfully created" when deciding
	/// whether a blocking dependency is satisfied. Both the bare and the
	/// schema-qualified spelling of every successful object are present,
	/// lowercased, since engines report missing names in either form.
	pub fn success_keys(&self) -> BTreeSet<String> {
		let mut keys = BTreeSet::new();
		for object in self.objects.values() {
			if object.status == ObjectStatus::Success {
				keys.insert(object.name.to_ascii_lowercase());
				keys.insert(object_key(&object.qualified_name()));
			}
		}
		keys
	}

	/// Whether every name in the set resolves to a successful object.
	pub fn dependencies_satisfied(&self, dependencies: &BTreeSet<String>) -> bool {
		let keys = self.success_keys();
		dependencies
			.iter()
			.all(|dep| keys.contains(&dependency_key(dep)))
	}
}

fn object_key(qualified_name: &str) -> String {
	qualified_name.to_ascii_lowercase()
}

/// Normalize a dependency name as extracted from an error message.
fn dependency_key(raw: &str) -> String {
	clean_identifier(raw).to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
	use super::*;

	fn table(name: &str) -> MigrationObject {
		MigrationObject::new(name, "dbo", ObjectKind::Table, "CREATE ...", 4)
	}

	#[test]
	fn test_register_rejects_duplicates() {
		let mut registry = ObjectRegistry::new();
		registry.register(table("ORDERS")).unwrap();

		let duplicate = registry.register(table("orders"));
		assert!(
			matches!(duplicate, Err(MigrateError::Validation(_))),
			"qualified names are case-insensitively unique"
		);
		assert_eq!(registry.len(), 1);
	}

	#[test]
	fn test_register_rejects_empty_name_and_zero_budget() {
		let mut registry = ObjectRegistry::new();
		assert!(registry.register(table("  ")).is_err());

		let mut zero = table("ORDERS");
		zero.max_attempts = 0;
		assert!(registry.register(zero).is_err());
	}

	#[test]
	fn test_registration_order_is_preserved() {
		let mut registry = ObjectRegistry::new();
		for name in ["C", "A", "B"] {
			registry.register(table(name)).unwrap();
		}

		let names: Vec<String> = registry.objects().map(|o| o.name.clone()).collect();
		assert_eq!(names, vec!["C", "A", "B"]);
	}

	#[test]
	fn test_dependency_resolution_matches_bare_and_qualified_names() {
		let mut registry = ObjectRegistry::new();
		registry.register(table("CUSTOMERS")).unwrap();
		registry
			.get_mut("dbo.CUSTOMERS")
			.unwrap()
			.status = ObjectStatus::Success;

		let mut deps = BTreeSet::new();
		deps.insert("CUSTOMERS".to_string());
		assert!(registry.dependencies_satisfied(&deps));

		deps.insert("[dbo].[CUSTOMERS]".to_string());
		assert!(
			registry.dependencies_satisfied(&deps),
			"bracketed qualified spellings must resolve too"
		);

		deps.insert("SUPPLIERS".to_string());
		assert!(!registry.dependencies_satisfied(&deps));
	}

	#[test]
	fn test_empty_dependency_set_is_trivially_satisfied() {
		let registry = ObjectRegistry::new();
		assert!(registry.dependencies_satisfied(&BTreeSet::new()));
	}
}
