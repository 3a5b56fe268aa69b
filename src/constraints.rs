//! Deferred foreign-key constraint management.
//!
//! Real schemas contain circular and self-referencing foreign-key chains
//! that make single-pass "create in dependency order" impossible. The
//! ledger removes inline foreign-key clauses from table definitions so
//! tables can be created in any order, then applies the stripped
//! constraints afterward as `ALTER TABLE … ADD CONSTRAINT` statements in
//! an order that minimizes avoidable failures.

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::classifier::clean_identifier;
use crate::error::{MigrateError, Result};
use crate::executor::{ExecutionOutcome, SqlExecutor};

/// Referential action on delete or update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ForeignKeyAction {
	Restrict,
	Cascade,
	SetNull,
	#[default]
	NoAction,
	SetDefault,
}

impl ForeignKeyAction {
	/// Convert to SQL keyword for use in constraint definitions.
	pub fn to_sql_keyword(&self) -> &'static str {
		match self {
			ForeignKeyAction::Restrict => "RESTRICT",
			ForeignKeyAction::Cascade => "CASCADE",
			ForeignKeyAction::SetNull => "SET NULL",
			ForeignKeyAction::NoAction => "NO ACTION",
			ForeignKeyAction::SetDefault => "SET DEFAULT",
		}
	}

	fn from_sql_keyword(keyword: &str) -> Self {
		let normalized = keyword.split_whitespace().collect::<Vec<_>>().join(" ");
		match normalized.to_ascii_uppercase().as_str() {
			"RESTRICT" => ForeignKeyAction::Restrict,
			"CASCADE" => ForeignKeyAction::Cascade,
			"SET NULL" => ForeignKeyAction::SetNull,
			"SET DEFAULT" => ForeignKeyAction::SetDefault,
			_ => ForeignKeyAction::NoAction,
		}
	}
}

/// One foreign-key constraint stripped out of a table definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyDefinition {
	pub constraint_name: String,
	/// Schema of the owning table.
	pub schema: String,
	pub owning_table: String,
	pub owning_columns: Vec<String>,
	/// Schema qualifier as written in the reference, if any. Falls back to
	/// the owning schema when generating statements.
	pub referenced_schema: Option<String>,
	pub referenced_table: String,
	/// Empty when the reference names no columns (primary key implied).
	pub referenced_columns: Vec<String>,
	pub on_delete: ForeignKeyAction,
	pub on_update: ForeignKeyAction,
	pub self_referencing: bool,
}

impl ForeignKeyDefinition {
	/// Schema-qualified owning table, e.g. `dbo.Orders`.
	pub fn qualified_owning_table(&self) -> String {
		format!("{}.{}", self.schema, self.owning_table)
	}

	/// Schema-qualified referenced table; unqualified references resolve
	/// to the owning schema.
	pub fn qualified_referenced_table(&self) -> String {
		let schema = self.referenced_schema.as_deref().unwrap_or(&self.schema);
		format!("{}.{}", schema, self.referenced_table)
	}

	/// Render the deferred `ALTER TABLE` statement for this definition.
	pub fn to_alter_statement(&self) -> String {
		let referenced_columns = if self.referenced_columns.is_empty() {
			String::new()
		} else {
			format!(" ({})", self.referenced_columns.join(", "))
		};
		format!(
			"ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {}{} ON DELETE {} ON UPDATE {};",
			self.qualified_owning_table(),
			self.constraint_name,
			self.owning_columns.join(", "),
			self.qualified_referenced_table(),
			referenced_columns,
			self.on_delete.to_sql_keyword(),
			self.on_update.to_sql_keyword(),
		)
	}
}

/// Application state of a ledger entry. Entries are consumed, never
/// deleted: a failed application stays visible with its error text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConstraintState {
	Deferred,
	Applied,
	Failed { error_text: String },
}

#[derive(Debug, Clone)]
struct LedgerEntry {
	definition: ForeignKeyDefinition,
	state: ConstraintState,
}

/// Outcome of one `apply` pass.
#[derive(Debug, Clone, Default)]
pub struct ConstraintApplyResult {
	pub applied: usize,
	pub failed: Vec<(ForeignKeyDefinition, String)>,
}

impl ConstraintApplyResult {
	pub fn attempted(&self) -> usize {
		self.applied + self.failed.len()
	}
}

// A quoted or bracketed identifier part, or a bare word.
const IDENT_PART: &str = r#"(?:\[[^\]]+\]|"[^"]+"|[A-Za-z_][\w$#]*)"#;

static FK_CLAUSE_RE: Lazy<Regex> = Lazy::new(|| {
	let ident = format!(r"{IDENT_PART}(?:\s*\.\s*{IDENT_PART})*");
	let pattern = format!(
		r#"(?is)(,\s*)?(?:CONSTRAINT\s+({IDENT_PART})\s+)?FOREIGN\s+KEY\s*\(\s*([^)]+?)\s*\)\s*REFERENCES\s+({ident})\s*(?:\(\s*([^)]+?)\s*\))?((?:\s*ON\s+(?:DELETE|UPDATE)\s+(?:CASCADE|SET\s+NULL|SET\s+DEFAULT|NO\s+ACTION|RESTRICT))*)"#
	);
	Regex::new(&pattern).unwrap_or_else(|e| panic!("foreign key pattern failed to compile: {e}"))
});

static ON_DELETE_RE: Lazy<Regex> = Lazy::new(|| {
	Regex::new(r"(?i)ON\s+DELETE\s+(CASCADE|SET\s+NULL|SET\s+DEFAULT|NO\s+ACTION|RESTRICT)")
		.unwrap_or_else(|e| panic!("ON DELETE pattern failed to compile: {e}"))
});

static ON_UPDATE_RE: Lazy<Regex> = Lazy::new(|| {
	Regex::new(r"(?i)ON\s+UPDATE\s+(CASCADE|SET\s+NULL|SET\s+DEFAULT|NO\s+ACTION|RESTRICT)")
		.unwrap_or_else(|e| panic!("ON UPDATE pattern failed to compile: {e}"))
});

/// Append-only store of stripped foreign keys, keyed by owning table.
#[derive(Debug, Default)]
pub struct ConstraintLedger {
	entries: RwLock<IndexMap<String, Vec<LedgerEntry>>>,
}

impl ConstraintLedger {
	pub fn new() -> Self {
		Self::default()
	}

	/// Remove every foreign-key clause from a table definition.
	///
	/// Returns the cleaned definition text plus the parsed constraints,
	/// and appends the constraints to the ledger keyed by owning table.
	/// Input with zero foreign keys is returned unchanged with an empty
	/// list, which also makes the call idempotent on already-stripped
	/// text.
	///
	/// # Errors
	///
	/// Returns a validation error on structurally malformed constraints,
	/// e.g. mismatched column-list lengths.
	pub fn strip(
		&self,
		definition_text: &str,
		table_name: &str,
		schema: &str,
	) -> Result<(String, Vec<ForeignKeyDefinition>)> {
		let mut definitions = Vec::new();
		for captures in FK_CLAUSE_RE.captures_iter(definition_text) {
			definitions.push(parse_clause(&captures, table_name, schema)?);
		}

		if definitions.is_empty() {
			return Ok((definition_text.to_string(), Vec::new()));
		}

		let cleaned = FK_CLAUSE_RE.replace_all(definition_text, "");
		let cleaned = tidy_column_list(&cleaned);

		self.append(&definitions);
		tracing::debug!(
			table = %format!("{schema}.{table_name}"),
			count = definitions.len(),
			"deferred foreign key constraints"
		);
		Ok((cleaned, definitions))
	}

	fn append(&self, definitions: &[ForeignKeyDefinition]) {
		let mut entries = self.entries.write();
		for definition in definitions {
			let slot = entries
				.entry(table_key(&definition.qualified_owning_table()))
				.or_default();
			// Constraint names are unique per schema; re-registration of
			// the same constraint is a no-op.
			if slot
				.iter()
				.any(|e| e.definition.constraint_name == definition.constraint_name)
			{
				continue;
			}
			slot.push(LedgerEntry {
				definition: definition.clone(),
				state: ConstraintState::Deferred,
			});
		}
	}

	/// Every definition in the ledger, in insertion order.
	pub fn definitions(&self) -> Vec<ForeignKeyDefinition> {
		self.entries
			.read()
			.values()
			.flatten()
			.map(|e| e.definition.clone())
			.collect()
	}

	/// Definitions owned by one table (schema-qualified name).
	pub fn definitions_for_table(&self, qualified_table: &str) -> Vec<ForeignKeyDefinition> {
		self.entries
			.read()
			.get(&table_key(qualified_table))
			.map(|slot| slot.iter().map(|e| e.definition.clone()).collect())
			.unwrap_or_default()
	}

	/// Application state per constraint, in insertion order.
	pub fn states(&self) -> Vec<(String, ConstraintState)> {
		self.entries
			.read()
			.values()
			.flatten()
			.map(|e| (e.definition.constraint_name.clone(), e.state.clone()))
			.collect()
	}

	pub fn len(&self) -> usize {
		self.entries.read().values().map(Vec::len).sum()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.read().values().all(Vec::is_empty)
	}

	/// Order definitions for application.
	///
	/// Non-self-referencing constraints come first, preferring those whose
	/// referenced table has the fewest outgoing foreign keys of its own
	/// ("leaf" tables first). Self-referencing constraints always come
	/// last: their owning table is guaranteed to exist by then. Ties break
	/// by (owning table, constraint name) for reproducible output.
	pub fn order_for_application(
		&self,
		definitions: &[ForeignKeyDefinition],
	) -> Vec<ForeignKeyDefinition> {
		let mut outgoing: IndexMap<String, usize> = IndexMap::new();
		for definition in definitions {
			if !definition.self_referencing {
				*outgoing
					.entry(table_key(&definition.qualified_owning_table()))
					.or_insert(0) += 1;
			}
		}

		let (mut self_refs, mut plain): (Vec<_>, Vec<_>) = definitions
			.iter()
			.cloned()
			.partition(|d| d.self_referencing);

		plain.sort_by(|a, b| {
			let a_weight = outgoing
				.get(&table_key(&a.qualified_referenced_table()))
				.copied()
				.unwrap_or(0);
			let b_weight = outgoing
				.get(&table_key(&b.qualified_referenced_table()))
				.copied()
				.unwrap_or(0);
			a_weight
				.cmp(&b_weight)
				.then_with(|| a.qualified_owning_table().cmp(&b.qualified_owning_table()))
				.then_with(|| a.constraint_name.cmp(&b.constraint_name))
		});
		self_refs.sort_by(|a, b| {
			a.qualified_owning_table()
				.cmp(&b.qualified_owning_table())
				.then_with(|| a.constraint_name.cmp(&b.constraint_name))
		});

		plain.extend(self_refs);
		plain
	}

	/// Render one fully schema-qualified `ALTER TABLE` statement per
	/// definition, in the given order.
	pub fn generate_statements(&self, ordered: &[ForeignKeyDefinition]) -> Vec<String> {
		ordered.iter().map(|d| d.to_alter_statement()).collect()
	}

	/// Apply the ordered definitions sequentially, continuing past
	/// individual failures. There is no per-constraint retry within this
	/// call; the exported script is the replay channel.
	///
	/// # Errors
	///
	/// Returns an error only on a connectivity fault from the executor.
	pub async fn apply(
		&self,
		executor: &dyn SqlExecutor,
		ordered: &[ForeignKeyDefinition],
	) -> Result<ConstraintApplyResult> {
		let mut result = ConstraintApplyResult::default();
		for definition in ordered {
			let statement = definition.to_alter_statement();
			match executor.execute(&statement).await? {
				ExecutionOutcome::Success => {
					self.mark(definition, ConstraintState::Applied);
					result.applied += 1;
				}
				ExecutionOutcome::Failure { error_text } => {
					tracing::warn!(
						constraint = %definition.constraint_name,
						table = %definition.qualified_owning_table(),
						error = %error_text,
						"foreign key application failed"
					);
					self.mark(
						definition,
						ConstraintState::Failed {
							error_text: error_text.clone(),
						},
					);
					result.failed.push((definition.clone(), error_text));
				}
			}
		}
		tracing::info!(
			applied = result.applied,
			failed = result.failed.len(),
			"constraint application pass finished"
		);
		Ok(result)
	}

	fn mark(&self, definition: &ForeignKeyDefinition, state: ConstraintState) {
		let mut entries = self.entries.write();
		if let Some(slot) = entries.get_mut(&table_key(&definition.qualified_owning_table()))
			&& let Some(entry) = slot
				.iter_mut()
				.find(|e| e.definition.constraint_name == definition.constraint_name)
		{
			entry.state = state;
		}
	}

	/// Build a replayable script for the ordered definitions, independent
	/// of any `apply` outcome.
	pub fn export_script(&self, ordered: &[ForeignKeyDefinition]) -> String {
		let mut script = String::from(
			"-- Deferred foreign key constraints\n-- Replayable; apply with psql -f after all tables exist.\n",
		);
		for statement in self.generate_statements(ordered) {
			script.push('\n');
			script.push_str(&statement);
		}
		script.push('\n');
		script
	}
}

/// Case-insensitive ledger key for a qualified table name.
fn table_key(qualified_table: &str) -> String {
	qualified_table.to_ascii_lowercase()
}

fn parse_clause(
	captures: &regex::Captures<'_>,
	table_name: &str,
	schema: &str,
) -> Result<ForeignKeyDefinition> {
	let owning_columns = split_column_list(captures.get(3).map_or("", |m| m.as_str()));
	let referenced_columns = captures
		.get(5)
		.map(|m| split_column_list(m.as_str()))
		.unwrap_or_default();

	if owning_columns.is_empty() {
		return Err(MigrateError::Validation(format!(
			"foreign key on {schema}.{table_name} lists no owning columns"
		)));
	}
	if !referenced_columns.is_empty() && referenced_columns.len() != owning_columns.len() {
		return Err(MigrateError::Validation(format!(
			"foreign key on {schema}.{table_name} has {} owning column(s) but {} referenced column(s)",
			owning_columns.len(),
			referenced_columns.len()
		)));
	}

	let (referenced_schema, referenced_table) =
		split_qualified(captures.get(4).map_or("", |m| m.as_str()));
	let constraint_name = captures
		.get(2)
		.map(|m| clean_identifier(m.as_str()))
		.unwrap_or_else(|| synthesize_name(table_name, &owning_columns));

	let actions = captures.get(6).map_or("", |m| m.as_str());
	let on_delete = ON_DELETE_RE
		.captures(actions)
		.and_then(|c| c.get(1))
		.map(|m| ForeignKeyAction::from_sql_keyword(m.as_str()))
		.unwrap_or_default();
	let on_update = ON_UPDATE_RE
		.captures(actions)
		.and_then(|c| c.get(1))
		.map(|m| ForeignKeyAction::from_sql_keyword(m.as_str()))
		.unwrap_or_default();

	let self_referencing = referenced_table.eq_ignore_ascii_case(table_name)
		&& referenced_schema
			.as_deref()
			.map(|s| s.eq_ignore_ascii_case(schema))
			.unwrap_or(true);

	Ok(ForeignKeyDefinition {
		constraint_name,
		schema: schema.to_string(),
		owning_table: table_name.to_string(),
		owning_columns,
		referenced_schema,
		referenced_table,
		referenced_columns,
		on_delete,
		on_update,
		self_referencing,
	})
}

fn split_column_list(raw: &str) -> Vec<String> {
	raw.split(',')
		.map(clean_identifier)
		.filter(|c| !c.is_empty())
		.collect()
}

/// Split an identifier into (schema, name); the schema is the
/// second-to-last path segment when the identifier is qualified.
fn split_qualified(raw: &str) -> (Option<String>, String) {
	let cleaned = clean_identifier(raw);
	match cleaned.rsplit_once('.') {
		Some((qualifier, name)) => {
			let schema = qualifier
				.rsplit('.')
				.next()
				.map(str::to_string)
				.filter(|s| !s.is_empty());
			(schema, name.to_string())
		}
		None => (None, cleaned),
	}
}

/// MSSQL allows unnamed inline REFERENCES clauses; the deferred ALTER
/// needs a deterministic constraint name.
fn synthesize_name(table_name: &str, owning_columns: &[String]) -> String {
	let column = owning_columns.first().map(String::as_str).unwrap_or("fk");
	format!("fk_{}_{}", table_name, column).to_ascii_lowercase()
}

/// Clean up the comma structure left behind by clause removal.
fn tidy_column_list(text: &str) -> String {
	static DOUBLE_COMMA: Lazy<Regex> = Lazy::new(|| {
		Regex::new(r",\s*,").unwrap_or_else(|e| panic!("comma pattern failed to compile: {e}"))
	});
	static COMMA_BEFORE_PAREN: Lazy<Regex> = Lazy::new(|| {
		Regex::new(r",\s*\)").unwrap_or_else(|e| panic!("comma pattern failed to compile: {e}"))
	});
	static COMMA_AFTER_PAREN: Lazy<Regex> = Lazy::new(|| {
		Regex::new(r"\(\s*,").unwrap_or_else(|e| panic!("comma pattern failed to compile: {e}"))
	});

	let text = DOUBLE_COMMA.replace_all(text, ",");
	let text = COMMA_BEFORE_PAREN.replace_all(&text, "\n)");
	let text = COMMA_AFTER_PAREN.replace_all(&text, "(");
	text.into_owned()
}

#[cfg(test)]
mod tests {
	use super::*;

	const ORDERS_DDL: &str = "CREATE TABLE dbo.ORDERS (\n\
		\tORDER_ID INT NOT NULL PRIMARY KEY,\n\
		\tCUSTOMER_ID INT NOT NULL,\n\
		\tPARENT_ORDER_ID INT NULL,\n\
		\tCONSTRAINT FK_ORDERS_CUSTOMERS FOREIGN KEY (CUSTOMER_ID) REFERENCES dbo.CUSTOMERS (CUSTOMER_ID) ON DELETE CASCADE,\n\
		\tCONSTRAINT FK_ORDERS_PARENT FOREIGN KEY (PARENT_ORDER_ID) REFERENCES dbo.ORDERS (ORDER_ID)\n\
		)";

	#[test]
	fn test_strip_removes_constraints_and_keeps_columns() {
		let ledger = ConstraintLedger::new();
		let (cleaned, definitions) = ledger.strip(ORDERS_DDL, "ORDERS", "dbo").unwrap();

		assert_eq!(definitions.len(), 2);
		assert!(
			!cleaned.to_uppercase().contains("FOREIGN KEY"),
			"cleaned text should carry no foreign keys, got: {cleaned}"
		);
		assert!(
			cleaned.contains("CUSTOMER_ID INT NOT NULL"),
			"column definitions must survive stripping, got: {cleaned}"
		);
		assert!(
			!cleaned.contains(",\n)") && !cleaned.contains(", )"),
			"no dangling comma before the closing paren, got: {cleaned}"
		);
		assert_eq!(ledger.len(), 2);
	}

	#[test]
	fn test_strip_parses_definition_fields() {
		let ledger = ConstraintLedger::new();
		let (_, definitions) = ledger.strip(ORDERS_DDL, "ORDERS", "dbo").unwrap();

		let customers_fk = &definitions[0];
		assert_eq!(customers_fk.constraint_name, "FK_ORDERS_CUSTOMERS");
		assert_eq!(customers_fk.owning_columns, vec!["CUSTOMER_ID".to_string()]);
		assert_eq!(customers_fk.referenced_table, "CUSTOMERS");
		assert_eq!(customers_fk.referenced_schema.as_deref(), Some("dbo"));
		assert_eq!(customers_fk.on_delete, ForeignKeyAction::Cascade);
		assert_eq!(customers_fk.on_update, ForeignKeyAction::NoAction);
		assert!(!customers_fk.self_referencing);

		let parent_fk = &definitions[1];
		assert!(parent_fk.self_referencing, "ORDERS → ORDERS is self-referencing");
	}

	#[test]
	fn test_strip_is_idempotent() {
		let ledger = ConstraintLedger::new();
		let (cleaned, first) = ledger.strip(ORDERS_DDL, "ORDERS", "dbo").unwrap();
		assert_eq!(first.len(), 2);

		let (again, second) = ledger.strip(&cleaned, "ORDERS", "dbo").unwrap();
		assert!(second.is_empty(), "second strip must find nothing");
		assert_eq!(again, cleaned, "already-stripped text must pass through unchanged");
		assert_eq!(ledger.len(), 2, "ledger must not grow on re-strip");
	}

	#[test]
	fn test_strip_no_op_without_constraints() {
		let ledger = ConstraintLedger::new();
		let ddl = "CREATE TABLE t (id INT PRIMARY KEY, note VARCHAR(40))";
		let (cleaned, definitions) = ledger.strip(ddl, "t", "dbo").unwrap();

		assert_eq!(cleaned, ddl);
		assert!(definitions.is_empty());
		assert!(ledger.is_empty());
	}

	#[test]
	fn test_strip_composite_and_bracketed() {
		let ledger = ConstraintLedger::new();
		let ddl = "CREATE TABLE [dbo].[ORDER_LINES] (\n\
			ORDER_ID INT, LINE_NO INT, PRODUCT VARCHAR(20),\n\
			CONSTRAINT [FK_LINES_ORDERS] FOREIGN KEY ([ORDER_ID], [LINE_NO]) REFERENCES [dbo].[ORDERS] ([ORDER_ID], [LINE_NO]) ON UPDATE SET NULL\n\
			)";
		let (_, definitions) = ledger.strip(ddl, "ORDER_LINES", "dbo").unwrap();

		assert_eq!(definitions.len(), 1);
		let fk = &definitions[0];
		assert_eq!(fk.constraint_name, "FK_LINES_ORDERS");
		assert_eq!(
			fk.owning_columns,
			vec!["ORDER_ID".to_string(), "LINE_NO".to_string()]
		);
		assert_eq!(
			fk.referenced_columns,
			vec!["ORDER_ID".to_string(), "LINE_NO".to_string()]
		);
		assert_eq!(fk.on_update, ForeignKeyAction::SetNull);
		assert_eq!(fk.on_delete, ForeignKeyAction::NoAction);
	}

	#[test]
	fn test_strip_unnamed_inline_constraint() {
		let ledger = ConstraintLedger::new();
		let ddl = "CREATE TABLE invoices (\n\
			id INT,\n\
			account_id INT,\n\
			FOREIGN KEY (account_id) REFERENCES accounts (id)\n\
			)";
		let (_, definitions) = ledger.strip(ddl, "invoices", "finance").unwrap();

		assert_eq!(definitions.len(), 1);
		assert_eq!(definitions[0].constraint_name, "fk_invoices_account_id");
		assert_eq!(definitions[0].referenced_schema, None);
		assert_eq!(
			definitions[0].qualified_referenced_table(),
			"finance.accounts",
			"unqualified references resolve to the owning schema"
		);
	}

	#[test]
	fn test_strip_rejects_mismatched_column_lists() {
		let ledger = ConstraintLedger::new();
		let ddl = "CREATE TABLE t (a INT, b INT,\n\
			CONSTRAINT fk_bad FOREIGN KEY (a, b) REFERENCES other (x)\n\
			)";
		let result = ledger.strip(ddl, "t", "dbo");

		assert!(matches!(result, Err(MigrateError::Validation(_))));
		assert!(ledger.is_empty(), "malformed input must not reach the ledger");
	}

	fn fk(
		name: &str,
		owning: &str,
		referenced: &str,
		self_referencing: bool,
	) -> ForeignKeyDefinition {
		ForeignKeyDefinition {
			constraint_name: name.to_string(),
			schema: "dbo".to_string(),
			owning_table: owning.to_string(),
			owning_columns: vec!["id".to_string()],
			referenced_schema: Some("dbo".to_string()),
			referenced_table: referenced.to_string(),
			referenced_columns: vec!["id".to_string()],
			on_delete: ForeignKeyAction::NoAction,
			on_update: ForeignKeyAction::NoAction,
			self_referencing,
		}
	}

	#[test]
	fn test_order_puts_self_references_last() {
		let ledger = ConstraintLedger::new();
		let definitions = vec![
			fk("fk_a_self", "A", "A", true),
			fk("fk_b_c", "B", "C", false),
			fk("fk_c_d", "C", "D", false),
		];

		let ordered = ledger.order_for_application(&definitions);
		assert_eq!(ordered.last().unwrap().constraint_name, "fk_a_self");
	}

	#[test]
	fn test_order_prefers_leaf_referenced_tables() {
		let ledger = ConstraintLedger::new();
		// C owns one outgoing FK, D owns none: the constraint pointing at
		// leaf table D must be applied before the one pointing at C.
		let definitions = vec![
			fk("fk_b_c", "B", "C", false),
			fk("fk_c_d", "C", "D", false),
		];

		let ordered = ledger.order_for_application(&definitions);
		assert_eq!(ordered[0].constraint_name, "fk_c_d");
		assert_eq!(ordered[1].constraint_name, "fk_b_c");
	}

	#[test]
	fn test_order_tiebreak_is_lexicographic() {
		let ledger = ConstraintLedger::new();
		let definitions = vec![
			fk("fk_z", "Zoo", "Leaf", false),
			fk("fk_a", "Bar", "Leaf", false),
			fk("fk_b", "Bar", "Leaf", false),
		];

		let ordered = ledger.order_for_application(&definitions);
		let names: Vec<&str> = ordered.iter().map(|d| d.constraint_name.as_str()).collect();
		assert_eq!(names, vec!["fk_a", "fk_b", "fk_z"]);
	}

	#[test]
	fn test_round_trip_statements_cover_all_definitions() {
		let ledger = ConstraintLedger::new();
		let (_, mut definitions) = ledger.strip(ORDERS_DDL, "ORDERS", "dbo").unwrap();
		let (_, lines) = ledger
			.strip(
				"CREATE TABLE x (a INT, b INT, CONSTRAINT fk_x FOREIGN KEY (a, b) REFERENCES y (c, d))",
				"x",
				"dbo",
			)
			.unwrap();
		definitions.extend(lines);

		let ordered = ledger.order_for_application(&definitions);
		let statements = ledger.generate_statements(&ordered);
		assert_eq!(statements.len(), definitions.len());

		for definition in &definitions {
			let found = statements.iter().any(|s| {
				s.contains(&definition.constraint_name)
					&& s.contains(&definition.qualified_owning_table())
					&& s.contains(&definition.owning_columns.join(", "))
					&& s.contains(&definition.qualified_referenced_table())
			});
			assert!(
				found,
				"no statement covers constraint {}",
				definition.constraint_name
			);
		}
	}

	#[test]
	fn test_generated_statement_shape() {
		let definition = fk("fk_orders_customers", "ORDERS", "CUSTOMERS", false);
		assert_eq!(
			definition.to_alter_statement(),
			"ALTER TABLE dbo.ORDERS ADD CONSTRAINT fk_orders_customers FOREIGN KEY (id) \
			 REFERENCES dbo.CUSTOMERS (id) ON DELETE NO ACTION ON UPDATE NO ACTION;"
		);
	}

	#[test]
	fn test_export_script_contains_all_statements() {
		let ledger = ConstraintLedger::new();
		let (_, definitions) = ledger.strip(ORDERS_DDL, "ORDERS", "dbo").unwrap();
		let ordered = ledger.order_for_application(&definitions);

		let script = ledger.export_script(&ordered);
		assert!(script.starts_with("-- Deferred foreign key constraints"));
		assert_eq!(script.matches("ALTER TABLE").count(), 2);
	}
}
