//! Diff verification engine for declarative MySQL/MariaDB schema management.
//!
//! The tool this crate anchors reconciles a declarative set of CREATE TABLE
//! statements with the live state of a server by computing and applying
//! ALTER TABLE statements. Computing a correct DDL diff for every server
//! feature is impossible in closed form, so [`verify_diff`] executes each
//! candidate ALTER against a throwaway workspace schema first and proves, by
//! a second diff, that it produces exactly the desired table.

#![deny(rust_2018_idioms, unsafe_code)]

mod connection;
mod error;
mod logical_schema;
mod statement_modifiers;
mod table_differ;
mod target;
mod verifier;
mod workspace;

pub use connection::Connection;
pub use error::{ConnectorError, ConnectorResult, DiffError, UnsupportedDiff};
pub use logical_schema::{LogicalSchema, ObjectType, Statement, StatementKind};
pub use statement_modifiers::{NextAutoInc, PartitioningMode, StatementModifiers};
pub use table_differ::{DiffType, SchemaDiff, TableDiff};
pub use target::{verifier_options_for_target, Config, Target};
pub use verifier::{verify_diff, Outcome, Promotions, VerifierOptions};
pub use workspace::{
    options_for, Options as WorkspaceOptions, StatementFailure, TempSchemaWorkspace, Workspace, WorkspaceSchema,
};
