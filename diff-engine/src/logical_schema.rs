//! A logical schema is an ordered list of DDL statements, materialized into a
//! real schema by the workspace. Statements replay in insertion order.

use std::collections::BTreeSet;

/// The kind of a statement in a logical schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Create,
    Alter,
    Use,
    Other,
}

/// The kind of object a statement applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ObjectType {
    Table,
}

/// One statement of a logical schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub kind: StatementKind,
    pub object_type: ObjectType,
    pub object_name: String,
    pub text: String,
}

impl Statement {
    pub fn create_table(name: impl Into<String>, text: impl Into<String>) -> Statement {
        Statement {
            kind: StatementKind::Create,
            object_type: ObjectType::Table,
            object_name: name.into(),
            text: text.into(),
        }
    }

    pub fn alter_table(name: impl Into<String>, text: impl Into<String>) -> Statement {
        Statement {
            kind: StatementKind::Alter,
            object_type: ObjectType::Table,
            object_name: name.into(),
            text: text.into(),
        }
    }
}

/// The blueprint the workspace executes.
///
/// A second CREATE for the same object is not an error: the first one stays
/// authoritative and the duplicate is recorded. A table's diff sometimes gets
/// split into multiple ALTERs, and each split re-inserts the CREATE.
#[derive(Debug, Clone, Default)]
pub struct LogicalSchema {
    /// Default character set for the materialized schema.
    pub char_set: String,
    /// Default collation for the materialized schema.
    pub collation: String,
    statements: Vec<Statement>,
    created: BTreeSet<(ObjectType, String)>,
    duplicates: Vec<Statement>,
}

impl LogicalSchema {
    pub fn new() -> LogicalSchema {
        LogicalSchema::default()
    }

    pub fn add_statement(&mut self, statement: Statement) {
        if statement.kind == StatementKind::Create {
            let key = (statement.object_type, statement.object_name.clone());
            if !self.created.insert(key) {
                self.duplicates.push(statement);
                return;
            }
        }
        self.statements.push(statement);
    }

    /// The accepted statements, in insertion order.
    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    /// CREATEs that were rejected as duplicates, for diagnostics.
    pub fn duplicates(&self) -> &[Statement] {
        &self.duplicates
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }
}
