//! # schemaport
//!
//! Dependency-aware migration of schema and code objects from Microsoft
//! SQL Server to PostgreSQL.
//!
//! Creating objects on the target fails for reasons no static analysis
//! reliably predicts: views referencing views, procedures calling
//! functions, foreign keys forming cycles. schemaport does not try to
//! build a dependency graph up front. Instead it:
//!
//! - creates objects in five fixed priority bands (tables, views,
//!   functions, procedures, triggers),
//! - **learns true dependencies from the target engine's own error
//!   messages**, parking failed objects and re-attempting them in bounded
//!   retry cycles once the objects they were missing exist,
//! - **defers foreign keys**: inline constraint clauses are stripped from
//!   table definitions so tables can be created in any order, then applied
//!   afterward as ordered `ALTER TABLE` statements.
//!
//! Source-code translation and statement execution are external
//! collaborators behind the [`Translator`](executor::Translator) and
//! [`SqlExecutor`](executor::SqlExecutor) traits; this crate owns the
//! scheduling, classification, constraint deferral and reporting.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use schemaport::prelude::*;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn demo(translator: Arc<dyn Translator>, executor: impl SqlExecutor) -> schemaport::Result<()> {
//! let mut scheduler = MigrationScheduler::new(MigrationConfig::default(), translator);
//! scheduler.register(Registration::new("CUSTOMERS", ObjectKind::Table, customers_ddl))?;
//! scheduler.register(Registration::new("ORDERS", ObjectKind::Table, orders_ddl))?;
//!
//! let report = scheduler.run(&executor, &CancellationToken::new()).await?;
//! let constraints = scheduler.apply_constraints(&executor).await?;
//! println!("{}", report.render_text());
//! std::fs::write("deferred_constraints.sql", scheduler.export_script())?;
//! # Ok(())
//! # }
//! ```
//!
//! The report — not the absence of an `Err` — is the channel for
//! partial-success information.

pub mod classifier;
pub mod config;
pub mod constraints;
pub mod error;
pub mod executor;
pub mod object;
pub mod registry;
pub mod report;
pub mod scheduler;

pub use error::{MigrateError, Result};

/// Commonly used types.
pub mod prelude {
	pub use crate::classifier::{ClassificationRule, ErrorClassification, ErrorClassifier, ErrorKind};
	pub use crate::config::MigrationConfig;
	pub use crate::constraints::{
		ConstraintApplyResult, ConstraintLedger, ConstraintState, ForeignKeyAction,
		ForeignKeyDefinition,
	};
	pub use crate::error::{MigrateError, Result};
	pub use crate::executor::{
		CatalogProbe, ExecutionOutcome, SqlExecutor, TranslationOutcome, Translator,
	};
	pub use crate::object::{MigrationObject, ObjectKind, ObjectStatus};
	pub use crate::registry::ObjectRegistry;
	pub use crate::report::{MigrationCycle, MigrationReport, ObjectOutcome};
	pub use crate::scheduler::{MigrationScheduler, Registration};
}
