//! Table descriptions for MySQL and MariaDB. This crate is used heavily in the
//! diff engine: the differ compares two [`Table`] values, and the workspace
//! introspects its temporary schema back into them.

#![deny(rust_2018_idioms, unsafe_code)]

pub mod flavor;

mod error;
mod getters;
mod mysql;

pub use self::{
    error::{DescriberError, DescriberErrorKind, DescriberResult},
    flavor::{Flavor, Vendor},
    mysql::SchemaDescriber,
};

use serde::{Deserialize, Serialize};

/// The result of introspecting one database schema.
#[derive(Serialize, Deserialize, PartialEq, Debug, Default, Clone)]
pub struct Schema {
    /// Schema (database) name.
    pub name: String,
    /// Default character set of the schema.
    pub char_set: String,
    /// Default collation of the schema.
    pub collation: String,
    /// The schema's tables, in name order.
    pub tables: Vec<Table>,
}

impl Schema {
    /// Find a table by name.
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }
}

/// A logical description of one table.
///
/// Index and foreign key children refer to columns by name only; lookups go
/// through [`Table::column`].
#[derive(Serialize, Deserialize, PartialEq, Debug, Default, Clone)]
pub struct Table {
    /// Table name.
    pub name: String,
    /// Storage engine, e.g. `InnoDB`.
    pub engine: String,
    /// Default character set.
    pub char_set: String,
    /// Default collation.
    pub collation: String,
    /// Ordered column list.
    pub columns: Vec<Column>,
    /// The primary key, if any. Always unique, columns always non-null.
    pub primary_key: Option<Index>,
    /// Ordered secondary indexes.
    pub secondary_indexes: Vec<Index>,
    /// Ordered foreign keys.
    pub foreign_keys: Vec<ForeignKey>,
    /// Ordered check constraints.
    pub checks: Vec<CheckConstraint>,
    /// Partitioning clause, verbatim from the server, e.g.
    /// `PARTITION BY RANGE (id) (PARTITION p0 VALUES LESS THAN (10))`.
    pub partitioning: Option<String>,
    /// Next auto-increment counter. 0 means the table has no auto-increment
    /// column.
    pub next_auto_increment: u64,
    /// True when the table uses features this model does not capture. The raw
    /// [`Table::create_statement`] is then authoritative and the structural
    /// fields may be partial.
    pub unsupported_ddl: bool,
    /// The `SHOW CREATE TABLE` output as last seen from the server.
    pub create_statement: String,
}

impl Table {
    /// Find a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Find a secondary index by name.
    pub fn secondary_index(&self, name: &str) -> Option<&Index> {
        self.secondary_indexes.iter().find(|i| i.name == name)
    }

    pub fn has_auto_increment(&self) -> bool {
        self.columns.iter().any(|c| c.auto_increment)
    }
}

/// One column of a table.
#[derive(Serialize, Deserialize, PartialEq, Debug, Default, Clone)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// The full column type as the server reports it, e.g.
    /// `smallint(5) unsigned`.
    pub type_in_db: String,
    /// Whether NULL is a permitted value.
    pub nullable: bool,
    /// Whether this is the auto-increment column.
    pub auto_increment: bool,
    /// The column default.
    pub default: ColumnDefault,
    /// `ON UPDATE` expression, e.g. `CURRENT_TIMESTAMP(2)`.
    pub on_update: Option<String>,
    /// Column-level character set, when the server reports one.
    pub char_set: Option<String>,
    /// Column-level collation, when the server reports one.
    pub collation: Option<String>,
}

/// The default value of a column.
#[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
pub enum ColumnDefault {
    /// No explicit default; NULL when the column is nullable.
    Null,
    /// A constant literal, stored unquoted.
    Literal(String),
    /// An expression the server evaluates, stored verbatim, e.g.
    /// `CURRENT_TIMESTAMP(2)` or `(uuid())`.
    Expression(String),
}

impl Default for ColumnDefault {
    fn default() -> Self {
        ColumnDefault::Null
    }
}

impl ColumnDefault {
    pub fn literal(value: impl Into<String>) -> Self {
        ColumnDefault::Literal(value.into())
    }

    pub fn expression(expr: impl Into<String>) -> Self {
        ColumnDefault::Expression(expr.into())
    }
}

/// The type of an index.
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone, Copy, Default)]
pub enum IndexType {
    #[default]
    Normal,
    Fulltext,
    Spatial,
}

/// The sort order of an index column.
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone, Copy, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// One column of an index, referencing the table column by name.
#[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
pub struct IndexColumn {
    pub name: String,
    /// Prefix length for partial indexes, e.g. the 10 in `KEY (name(10))`.
    pub prefix_length: Option<u16>,
    pub sort_order: SortOrder,
}

impl IndexColumn {
    pub fn new(name: impl Into<String>) -> Self {
        IndexColumn {
            name: name.into(),
            prefix_length: None,
            sort_order: SortOrder::Asc,
        }
    }
}

/// An index on a table. The primary key is an [`Index`] with
/// `unique == true` held in [`Table::primary_key`].
#[derive(Serialize, Deserialize, PartialEq, Debug, Default, Clone)]
pub struct Index {
    pub name: String,
    pub columns: Vec<IndexColumn>,
    pub unique: bool,
    pub index_type: IndexType,
}

/// A foreign key constraint. Referenced objects are held by name; an empty
/// `referenced_schema` means the same schema as the constrained table.
#[derive(Serialize, Deserialize, PartialEq, Debug, Default, Clone)]
pub struct ForeignKey {
    pub name: String,
    pub columns: Vec<String>,
    pub referenced_schema: String,
    pub referenced_table: String,
    pub referenced_columns: Vec<String>,
    pub on_delete: ForeignKeyAction,
    pub on_update: ForeignKeyAction,
}

/// Foreign key referential actions (for ON DELETE | ON UPDATE).
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone, Copy, Default)]
pub enum ForeignKeyAction {
    #[default]
    NoAction,
    Restrict,
    Cascade,
    SetNull,
    SetDefault,
}

impl ForeignKeyAction {
    pub fn as_sql(&self) -> &'static str {
        match self {
            ForeignKeyAction::NoAction => "NO ACTION",
            ForeignKeyAction::Restrict => "RESTRICT",
            ForeignKeyAction::Cascade => "CASCADE",
            ForeignKeyAction::SetNull => "SET NULL",
            ForeignKeyAction::SetDefault => "SET DEFAULT",
        }
    }

    pub fn from_sql(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "RESTRICT" => ForeignKeyAction::Restrict,
            "CASCADE" => ForeignKeyAction::Cascade,
            "SET NULL" => ForeignKeyAction::SetNull,
            "SET DEFAULT" => ForeignKeyAction::SetDefault,
            _ => ForeignKeyAction::NoAction,
        }
    }
}

/// A check constraint.
#[derive(Serialize, Deserialize, PartialEq, Debug, Default, Clone)]
pub struct CheckConstraint {
    pub name: String,
    /// The check clause, verbatim, without the surrounding `CHECK (...)`.
    pub clause: String,
    pub enforced: bool,
}
