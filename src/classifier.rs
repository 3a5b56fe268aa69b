//! Error classification.
//!
//! Turns opaque failure text from the target engine (or the translator) into
//! a structured classification plus the object names the message references.
//! Rules are evaluated in order, first match wins: built-in rules, then
//! custom rules in registration order, then the `Other` fallback.
//!
//! The classifier is a pure function of the rule table — no I/O, no shared
//! mutable state — so it is unit-testable without a live database.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{MigrateError, Result};
use crate::executor::CatalogProbe;
use crate::object::ObjectKind;

/// Structured failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
	MissingTable,
	MissingView,
	MissingFunction,
	MissingProcedure,
	SyntaxError,
	PermissionError,
	Other,
}

impl ErrorKind {
	pub fn label(&self) -> &'static str {
		match self {
			ErrorKind::MissingTable => "missing_table",
			ErrorKind::MissingView => "missing_view",
			ErrorKind::MissingFunction => "missing_function",
			ErrorKind::MissingProcedure => "missing_procedure",
			ErrorKind::SyntaxError => "syntax_error",
			ErrorKind::PermissionError => "permission_error",
			ErrorKind::Other => "other",
		}
	}

	/// Whether this kind names an unmet prerequisite object.
	pub fn is_missing_object(&self) -> bool {
		matches!(
			self,
			ErrorKind::MissingTable
				| ErrorKind::MissingView
				| ErrorKind::MissingFunction
				| ErrorKind::MissingProcedure
		)
	}

	fn for_object_kind(kind: ObjectKind) -> Self {
		match kind {
			ObjectKind::Table => ErrorKind::MissingTable,
			ObjectKind::View => ErrorKind::MissingView,
			ObjectKind::Function => ErrorKind::MissingFunction,
			// Triggers are never referenced by name from other objects'
			// bodies; a probe reporting one is treated as a procedure.
			ObjectKind::Procedure | ObjectKind::Trigger => ErrorKind::MissingProcedure,
		}
	}
}

impl std::fmt::Display for ErrorKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.label())
	}
}

/// Result of classifying one failure message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorClassification {
	pub kind: ErrorKind,
	/// Object names the message references, de-duplicated, in order of
	/// appearance, with quoting and brackets stripped.
	pub referenced_names: Vec<String>,
	pub retryable: bool,
}

/// A single (pattern, kind, retryable) classification rule.
///
/// The pattern's first capture group, if any, extracts a referenced name.
///
/// # Example
///
/// ```rust
/// use schemaport::classifier::{ClassificationRule, ErrorKind};
///
/// let rule = ClassificationRule::new(
///     r"sequence '([^']+)' is not defined",
///     ErrorKind::Other,
///     true,
/// )
/// .unwrap();
/// assert!(rule.matches("sequence 'ORDER_SEQ' is not defined"));
/// ```
#[derive(Debug, Clone)]
pub struct ClassificationRule {
	pattern: Regex,
	kind: ErrorKind,
	retryable: bool,
}

impl ClassificationRule {
	/// Compile a rule from a regex pattern.
	///
	/// # Errors
	///
	/// Returns a validation error if the pattern does not compile.
	pub fn new(pattern: &str, kind: ErrorKind, retryable: bool) -> Result<Self> {
		let pattern = Regex::new(pattern)
			.map_err(|e| MigrateError::Validation(format!("invalid rule pattern: {e}")))?;
		Ok(Self {
			pattern,
			kind,
			retryable,
		})
	}

	pub fn matches(&self, error_text: &str) -> bool {
		self.pattern.is_match(error_text)
	}
}

/// How a built-in missing-object rule decides the final kind.
#[derive(Debug, Clone, Copy)]
enum BuiltinOutcome {
	/// Generic "object not found": resolve through the catalog probe,
	/// defaulting to [`ErrorKind::MissingTable`] when unknown.
	MissingObject,
	Fixed(ErrorKind),
}

struct BuiltinRule {
	pattern: &'static Lazy<Regex>,
	outcome: BuiltinOutcome,
	retryable: bool,
}

macro_rules! builtin_regex {
	($name:ident, $pattern:expr) => {
		static $name: Lazy<Regex> = Lazy::new(|| {
			Regex::new($pattern).unwrap_or_else(|e| panic!("built-in pattern failed to compile: {e}"))
		});
	};
}

// MSSQL msg 208.
builtin_regex!(RE_INVALID_OBJECT, r"(?i)invalid object name\s+'([^']+)'");
// MSSQL msg 2812.
builtin_regex!(
	RE_MISSING_PROC,
	r"(?i)could not find stored procedure\s+'([^']+)'"
);
// MSSQL OBJECT_ID / metadata lookups.
builtin_regex!(RE_CANNOT_FIND, r#"(?i)cannot find the object\s+["']([^"']+)["']"#);
// PostgreSQL missing relation (tables and views share the wording).
builtin_regex!(RE_PG_RELATION, r#"relation "([^"]+)" does not exist"#);
// PostgreSQL missing function/procedure, e.g. `function fn_tax(numeric) does not exist`.
builtin_regex!(
	RE_PG_FUNCTION,
	r"(?i)(function|procedure)\s+([^\s(]+)\([^)]*\)\s+does not exist"
);
builtin_regex!(RE_MSSQL_SYNTAX, r"(?i)incorrect syntax near");
builtin_regex!(RE_PG_SYNTAX, r"(?i)syntax error at or near");
builtin_regex!(
	RE_PERMISSION,
	r"(?i)permission denied|permission was denied|access is denied"
);

/// Ordered rule table over raw engine error text.
pub struct ErrorClassifier {
	custom_rules: Vec<ClassificationRule>,
	probe: Option<Arc<dyn CatalogProbe>>,
}

impl Default for ErrorClassifier {
	fn default() -> Self {
		Self::new()
	}
}

impl std::fmt::Debug for ErrorClassifier {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ErrorClassifier")
			.field("custom_rules", &self.custom_rules.len())
			.field("probe", &self.probe.is_some())
			.finish()
	}
}

impl ErrorClassifier {
	pub fn new() -> Self {
		Self {
			custom_rules: Vec::new(),
			probe: None,
		}
	}

	/// Attach a catalog probe used to disambiguate "missing object" errors.
	pub fn with_probe(mut self, probe: Arc<dyn CatalogProbe>) -> Self {
		self.probe = Some(probe);
		self
	}

	/// Register a custom rule. Custom rules are tried after the built-ins
	/// and before the fallback, in registration order.
	pub fn register_rule(&mut self, rule: ClassificationRule) {
		self.custom_rules.push(rule);
	}

	/// Classify one failure message.
	pub fn classify(&self, error_text: &str, attempted_kind: ObjectKind) -> ErrorClassification {
		let classification = self.classify_inner(error_text);
		tracing::debug!(
			kind = %classification.kind,
			retryable = classification.retryable,
			attempted = %attempted_kind,
			"classified execution failure"
		);
		classification
	}

	fn classify_inner(&self, error_text: &str) -> ErrorClassification {
		for rule in Self::builtin_rules() {
			if !rule.pattern.is_match(error_text) {
				continue;
			}
			let names = extract_names(rule.pattern, error_text);
			let kind = match rule.outcome {
				BuiltinOutcome::Fixed(kind) => kind,
				BuiltinOutcome::MissingObject => self.resolve_missing_kind(&names),
			};
			return ErrorClassification {
				kind,
				referenced_names: names,
				retryable: rule.retryable,
			};
		}

		for rule in &self.custom_rules {
			if rule.matches(error_text) {
				return ErrorClassification {
					kind: rule.kind,
					referenced_names: extract_names(&rule.pattern, error_text),
					retryable: rule.retryable,
				};
			}
		}

		// Conservative fallback: an unrecognized failure might be transient.
		ErrorClassification {
			kind: ErrorKind::Other,
			referenced_names: Vec::new(),
			retryable: true,
		}
	}

	fn resolve_missing_kind(&self, names: &[String]) -> ErrorKind {
		if let Some(probe) = &self.probe {
			for name in names {
				if let Some(kind) = probe.kind_of(name) {
					return ErrorKind::for_object_kind(kind);
				}
			}
		}
		ErrorKind::MissingTable
	}

	fn builtin_rules() -> &'static [BuiltinRule] {
		static RULES: Lazy<Vec<BuiltinRule>> = Lazy::new(|| {
			vec![
				BuiltinRule {
					pattern: &RE_MISSING_PROC,
					outcome: BuiltinOutcome::Fixed(ErrorKind::MissingProcedure),
					retryable: true,
				},
				BuiltinRule {
					pattern: &RE_PG_FUNCTION,
					outcome: BuiltinOutcome::Fixed(ErrorKind::MissingFunction),
					retryable: true,
				},
				BuiltinRule {
					pattern: &RE_INVALID_OBJECT,
					outcome: BuiltinOutcome::MissingObject,
					retryable: true,
				},
				BuiltinRule {
					pattern: &RE_CANNOT_FIND,
					outcome: BuiltinOutcome::MissingObject,
					retryable: true,
				},
				BuiltinRule {
					pattern: &RE_PG_RELATION,
					outcome: BuiltinOutcome::MissingObject,
					retryable: true,
				},
				BuiltinRule {
					pattern: &RE_MSSQL_SYNTAX,
					outcome: BuiltinOutcome::Fixed(ErrorKind::SyntaxError),
					retryable: false,
				},
				BuiltinRule {
					pattern: &RE_PG_SYNTAX,
					outcome: BuiltinOutcome::Fixed(ErrorKind::SyntaxError),
					retryable: false,
				},
				BuiltinRule {
					pattern: &RE_PERMISSION,
					outcome: BuiltinOutcome::Fixed(ErrorKind::PermissionError),
					retryable: false,
				},
			]
		});
		&RULES
	}
}

/// Collect every capture of the pattern's name group, de-duplicated,
/// preserving order of appearance.
fn extract_names(pattern: &Regex, error_text: &str) -> Vec<String> {
	let mut names: Vec<String> = Vec::new();
	if pattern.captures_len() < 2 {
		// No name group (syntax and permission patterns).
		return names;
	}
	for captures in pattern.captures_iter(error_text) {
		// The name group is the last capture group; RE_PG_FUNCTION uses an
		// earlier group for the object noun.
		let Some(raw) = captures.get(captures.len() - 1) else {
			continue;
		};
		let cleaned = clean_identifier(raw.as_str());
		if !cleaned.is_empty() && !names.iter().any(|n| n == &cleaned) {
			names.push(cleaned);
		}
	}
	names
}

/// Strip brackets and quoting from an identifier as it appeared in an
/// error message: `[dbo].[Orders]` → `dbo.Orders`.
pub(crate) fn clean_identifier(raw: &str) -> String {
	raw.split('.')
		.map(|part| part.trim_matches(|c| matches!(c, '[' | ']' | '"' | '\'' | ' ')))
		.filter(|part| !part.is_empty())
		.collect::<Vec<_>>()
		.join(".")
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_mssql_invalid_object_name() {
		let classifier = ErrorClassifier::new();
		let classification = classifier.classify("Invalid object name 'ACCOUNTS'", ObjectKind::View);

		assert_eq!(classification.kind, ErrorKind::MissingTable);
		assert_eq!(classification.referenced_names, vec!["ACCOUNTS".to_string()]);
		assert!(classification.retryable);
	}

	#[test]
	fn test_mssql_missing_procedure() {
		let classifier = ErrorClassifier::new();
		let classification = classifier.classify(
			"Could not find stored procedure 'dbo.usp_recalc_totals'.",
			ObjectKind::Procedure,
		);

		assert_eq!(classification.kind, ErrorKind::MissingProcedure);
		assert_eq!(
			classification.referenced_names,
			vec!["dbo.usp_recalc_totals".to_string()]
		);
		assert!(classification.retryable);
	}

	#[test]
	fn test_pg_missing_relation() {
		let classifier = ErrorClassifier::new();
		let classification = classifier.classify(
			r#"ERROR: relation "customers" does not exist"#,
			ObjectKind::View,
		);

		assert_eq!(classification.kind, ErrorKind::MissingTable);
		assert_eq!(classification.referenced_names, vec!["customers".to_string()]);
	}

	#[test]
	fn test_pg_missing_function() {
		let classifier = ErrorClassifier::new();
		let classification = classifier.classify(
			"ERROR: function fn_tax(numeric) does not exist",
			ObjectKind::View,
		);

		assert_eq!(classification.kind, ErrorKind::MissingFunction);
		assert_eq!(classification.referenced_names, vec!["fn_tax".to_string()]);
	}

	#[test]
	fn test_syntax_errors_are_not_retryable() {
		let classifier = ErrorClassifier::new();

		let mssql = classifier.classify("Incorrect syntax near ')'.", ObjectKind::Procedure);
		assert_eq!(mssql.kind, ErrorKind::SyntaxError);
		assert!(!mssql.retryable);

		let pg = classifier.classify(
			r#"ERROR: syntax error at or near "SELCT""#,
			ObjectKind::View,
		);
		assert_eq!(pg.kind, ErrorKind::SyntaxError);
		assert!(!pg.retryable);
	}

	#[test]
	fn test_permission_errors_are_not_retryable() {
		let classifier = ErrorClassifier::new();
		let classification = classifier.classify(
			"ERROR: permission denied for schema sales",
			ObjectKind::Table,
		);

		assert_eq!(classification.kind, ErrorKind::PermissionError);
		assert!(!classification.retryable);
		assert!(classification.referenced_names.is_empty());
	}

	#[test]
	fn test_unrecognized_text_falls_back_to_retryable_other() {
		let classifier = ErrorClassifier::new();
		let classification =
			classifier.classify("connection reset during statement", ObjectKind::Table);

		assert_eq!(classification.kind, ErrorKind::Other);
		assert!(
			classification.retryable,
			"unknown failures are conservatively retryable"
		);
	}

	#[test]
	fn test_custom_rule_runs_after_builtins() {
		let mut classifier = ErrorClassifier::new();
		classifier.register_rule(
			ClassificationRule::new(r"(?i)invalid object name", ErrorKind::Other, false).unwrap(),
		);

		// The built-in rule still wins for the same text.
		let classification = classifier.classify("Invalid object name 'X'", ObjectKind::Table);
		assert_eq!(classification.kind, ErrorKind::MissingTable);

		// But custom rules beat the fallback.
		classifier.register_rule(
			ClassificationRule::new(
				r"(?i)deadlock victim",
				ErrorKind::Other,
				true,
			)
			.unwrap(),
		);
		let deadlock = classifier.classify(
			"Transaction was chosen as the deadlock victim",
			ObjectKind::Table,
		);
		assert_eq!(deadlock.kind, ErrorKind::Other);
		assert!(deadlock.retryable);
	}

	#[test]
	fn test_probe_disambiguates_missing_object_kind() {
		struct ViewProbe;
		impl CatalogProbe for ViewProbe {
			fn kind_of(&self, name: &str) -> Option<ObjectKind> {
				(name == "V_SALES").then_some(ObjectKind::View)
			}
		}

		let classifier = ErrorClassifier::new().with_probe(Arc::new(ViewProbe));
		let classification =
			classifier.classify("Invalid object name 'V_SALES'", ObjectKind::Procedure);

		assert_eq!(classification.kind, ErrorKind::MissingView);
		assert_eq!(classification.referenced_names, vec!["V_SALES".to_string()]);
	}

	#[test]
	fn test_bracketed_identifier_is_cleaned() {
		let classifier = ErrorClassifier::new();
		let classification =
			classifier.classify("Invalid object name '[dbo].[Order Details]'", ObjectKind::View);

		assert_eq!(
			classification.referenced_names,
			vec!["dbo.Order Details".to_string()]
		);
	}

	#[test]
	fn test_repeated_names_are_deduplicated() {
		let classifier = ErrorClassifier::new();
		let classification = classifier.classify(
			"Invalid object name 'A'. Invalid object name 'B'. Invalid object name 'A'.",
			ObjectKind::View,
		);

		assert_eq!(
			classification.referenced_names,
			vec!["A".to_string(), "B".to_string()]
		);
	}
}
