//! The table differ: computes the DDL transforming one table descriptor into
//! another, and renders it under a [`StatementModifiers`] policy.
//!
//! Rendering recomputes the clause list per policy: the strict ordering and
//! naming flags change which clauses exist, not just their text.

pub(crate) mod ddl;

use crate::{
    error::{DiffError, UnsupportedDiff},
    statement_modifiers::{NextAutoInc, PartitioningMode, StatementModifiers},
};
use ddl::{render_check, render_column_definition, render_foreign_key, render_index, render_primary_key, Ident};
use mysql_schema_describer::{CheckConstraint, Column, ForeignKey, Index, Schema, Table};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;

/// The kind of a table diff.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffType {
    Create,
    Alter,
    Drop,
}

/// A set of table diffs transforming one schema into another.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct SchemaDiff {
    table_diffs: Vec<TableDiff>,
}

impl SchemaDiff {
    /// Diff two schemas table by table. Identical tables produce no diff.
    pub fn new(from: &Schema, to: &Schema) -> SchemaDiff {
        let mut table_diffs = Vec::new();

        for from_table in &from.tables {
            match to.table(&from_table.name) {
                None => table_diffs.push(TableDiff::new_drop_table(from_table)),
                Some(to_table) => {
                    if from_table != to_table || from_table.unsupported_ddl || to_table.unsupported_ddl {
                        table_diffs.push(TableDiff::new_alter_table(from_table, to_table));
                    }
                }
            }
        }
        for to_table in &to.tables {
            if from.table(&to_table.name).is_none() {
                table_diffs.push(TableDiff::new_create_table(to_table));
            }
        }

        SchemaDiff { table_diffs }
    }

    /// Build a diff from already-computed table diffs.
    pub fn from_table_diffs(table_diffs: Vec<TableDiff>) -> SchemaDiff {
        SchemaDiff { table_diffs }
    }

    pub fn table_diffs(&self) -> &[TableDiff] {
        &self.table_diffs
    }

    /// The diffs of one kind, in insertion order.
    pub fn filtered_table_diffs(&self, diff_type: DiffType) -> Vec<&TableDiff> {
        self.table_diffs
            .iter()
            .filter(|td| td.diff_type == diff_type)
            .collect()
    }

    /// Flip the supported flag on the diffs of the named tables. Transitions
    /// are monotone: a diff never goes back to unsupported.
    pub fn mark_supported<'a>(&mut self, tables: impl IntoIterator<Item = &'a str>) {
        for name in tables {
            let diff = self
                .table_diffs
                .iter_mut()
                .find(|td| td.from.as_ref().map(|t| t.name.as_str()) == Some(name));
            if let Some(td) = diff {
                td.mark_supported();
            }
        }
    }
}

/// The DDL changes transforming a `from` table into a `to` table.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TableDiff {
    diff_type: DiffType,
    from: Option<Table>,
    to: Option<Table>,
    supported: bool,
    unsupported_reason: Option<String>,
    pre_drop: bool,
}

impl TableDiff {
    pub fn new_create_table(to: &Table) -> TableDiff {
        TableDiff {
            diff_type: DiffType::Create,
            from: None,
            to: Some(to.clone()),
            supported: !to.unsupported_ddl,
            unsupported_reason: None,
            pre_drop: false,
        }
    }

    pub fn new_drop_table(from: &Table) -> TableDiff {
        TableDiff {
            diff_type: DiffType::Drop,
            from: Some(from.clone()),
            to: None,
            supported: true,
            unsupported_reason: None,
            pre_drop: false,
        }
    }

    /// Diff two table descriptors. The diff is flagged unsupported when
    /// either side's structural fields are not authoritative.
    pub fn new_alter_table(from: &Table, to: &Table) -> TableDiff {
        let unsupported_reason = if from.unsupported_ddl {
            Some(format!(
                "original state of table `{}` uses features the differ cannot express",
                from.name
            ))
        } else if to.unsupported_ddl {
            Some(format!(
                "desired state of table `{}` uses features the differ cannot express",
                to.name
            ))
        } else {
            None
        };

        TableDiff {
            diff_type: DiffType::Alter,
            from: Some(from.clone()),
            to: Some(to.clone()),
            supported: unsupported_reason.is_none(),
            unsupported_reason,
            pre_drop: false,
        }
    }

    /// Mark this alter as existing only to speed up a subsequent DROP.
    pub fn into_pre_drop(mut self) -> Self {
        self.pre_drop = true;
        self
    }

    pub fn diff_type(&self) -> DiffType {
        self.diff_type
    }

    pub fn from(&self) -> Option<&Table> {
        self.from.as_ref()
    }

    pub fn to(&self) -> Option<&Table> {
        self.to.as_ref()
    }

    pub fn is_pre_drop(&self) -> bool {
        self.pre_drop
    }

    /// Whether the differ fully models this diff. Starts false when either
    /// table has `unsupported_ddl` set; verification may promote it to true.
    pub fn supported(&self) -> bool {
        self.supported
    }

    pub fn mark_supported(&mut self) {
        self.supported = true;
    }

    /// The ordered ALTER sub-clauses under a policy. Empty for a no-op.
    pub fn alter_clauses(&self, mods: &StatementModifiers) -> Vec<String> {
        match (&self.from, &self.to) {
            (Some(from), Some(to)) => compute_clauses(from, to, mods).0,
            _ => Vec::new(),
        }
    }

    /// Render this diff to a statement under a policy.
    ///
    /// A no-op renders to the empty string. When the diff is flagged
    /// unsupported, the error carries the best-effort statement covering the
    /// modeled part of the diff.
    pub fn render(&self, mods: &StatementModifiers) -> Result<String, DiffError> {
        match self.diff_type {
            DiffType::Create => Ok(self.to.as_ref().map(describe_table).unwrap_or_default()),
            DiffType::Drop => {
                let Some(from) = &self.from else { return Ok(String::new()) };
                let clause = format!("DROP TABLE {}", Ident(&from.name));
                if !mods.allow_unsafe {
                    return Err(DiffError::Forbidden { clauses: vec![clause] });
                }
                Ok(clause)
            }
            DiffType::Alter => self.render_alter(mods),
        }
    }

    fn render_alter(&self, mods: &StatementModifiers) -> Result<String, DiffError> {
        let (Some(from), Some(to)) = (&self.from, &self.to) else {
            return Ok(String::new());
        };

        if self.pre_drop && mods.skip_pre_drop_alters {
            return Ok(String::new());
        }

        let (parts, unsafe_parts) = compute_clauses(from, to, mods);

        if !mods.allow_unsafe && !unsafe_parts.is_empty() {
            return Err(DiffError::Forbidden { clauses: unsafe_parts });
        }

        let statement = if parts.is_empty() {
            String::new()
        } else {
            let mut all = Vec::with_capacity(parts.len() + 1);
            if !mods.algorithm_clause.is_empty() {
                all.push(format!("ALGORITHM={}", mods.algorithm_clause.to_ascii_uppercase()));
            }
            all.extend(parts);
            format!("ALTER TABLE {} {}", Ident(&from.name), all.join(", "))
        };

        if !self.supported {
            let reason = self
                .unsupported_reason
                .clone()
                .unwrap_or_else(|| format!("table `{}` uses features the differ cannot express", from.name));
            return Err(DiffError::Unsupported(UnsupportedDiff {
                reason,
                expected_desc: format!("desired state:\n{}", describe_table(to)),
                actual_desc: format!("original state:\n{}", describe_table(from)),
                statement,
            }));
        }

        Ok(statement)
    }
}

fn describe_table(table: &Table) -> String {
    if table.create_statement.is_empty() {
        ddl::generate_create(table)
    } else {
        table.create_statement.clone()
    }
}

/// All clauses for `from` -> `to` under `mods`, plus the subset that is
/// destructive. Ordering: child drops, column changes, primary key, child
/// adds, table options, partitioning.
fn compute_clauses(from: &Table, to: &Table, mods: &StatementModifiers) -> (Vec<String>, Vec<String>) {
    let mut unsafe_parts = Vec::new();

    let (check_drops, check_adds) = check_changes(from, to, mods);
    let (fk_drops, fk_adds) = foreign_key_changes(from, to, mods);
    let (index_drops, index_adds) = index_changes(from, to, mods);
    let column_clauses = column_changes(from, to, mods, &mut unsafe_parts);
    let pk_clauses = primary_key_changes(from, to);
    let option_clauses = option_changes(from, to, mods, &mut unsafe_parts);
    let partition_clauses = partitioning_changes(from, to, mods);

    let mut parts = Vec::new();
    parts.extend(check_drops);
    parts.extend(fk_drops);
    parts.extend(index_drops);
    parts.extend(column_clauses);
    parts.extend(pk_clauses);
    parts.extend(index_adds);
    parts.extend(fk_adds);
    parts.extend(check_adds);
    parts.extend(option_clauses);
    parts.extend(partition_clauses);

    (parts, unsafe_parts)
}

fn column_changes(from: &Table, to: &Table, mods: &StatementModifiers, unsafe_parts: &mut Vec<String>) -> Vec<String> {
    let from_by_name: HashMap<&str, &Column> = from.columns.iter().map(|c| (c.name.as_str(), c)).collect();
    let to_by_name: HashMap<&str, &Column> = to.columns.iter().map(|c| (c.name.as_str(), c)).collect();

    let mut clauses = Vec::new();

    for column in &from.columns {
        if !to_by_name.contains_key(column.name.as_str()) {
            let clause = format!("DROP COLUMN {}", Ident(&column.name));
            unsafe_parts.push(clause.clone());
            clauses.push(clause);
        }
    }

    for (position, column) in to.columns.iter().enumerate() {
        if !from_by_name.contains_key(column.name.as_str()) {
            let mut clause = format!("ADD COLUMN {}", render_column_definition(column));
            push_position(&mut clause, to, position);
            clauses.push(clause);
        }
    }

    // Common columns whose relative order changed get re-positioned from the
    // first point of divergence onward.
    let common_from: Vec<&str> = from
        .columns
        .iter()
        .map(|c| c.name.as_str())
        .filter(|name| to_by_name.contains_key(name))
        .collect();
    let common_to: Vec<&str> = to
        .columns
        .iter()
        .map(|c| c.name.as_str())
        .filter(|name| from_by_name.contains_key(name))
        .collect();
    let moved: HashSet<&str> = match common_from.iter().zip(&common_to).position(|(a, b)| a != b) {
        Some(i) => common_to[i..].iter().copied().collect(),
        None => HashSet::new(),
    };

    for (position, column) in to.columns.iter().enumerate() {
        let Some(&from_column) = from_by_name.get(column.name.as_str()) else {
            continue;
        };

        let changed = if mods.strict_column_definition {
            from_column != column
        } else {
            !columns_equal_ignoring_charset(from_column, column)
        };
        let is_moved = moved.contains(column.name.as_str());

        if changed || is_moved {
            let mut clause = format!("MODIFY COLUMN {}", render_column_definition(column));
            if is_moved {
                push_position(&mut clause, to, position);
            }
            if changed && type_change_is_lossy(&from_column.type_in_db, &column.type_in_db) {
                unsafe_parts.push(clause.clone());
            }
            clauses.push(clause);
        }
    }

    clauses
}

fn push_position(clause: &mut String, to: &Table, position: usize) {
    if position == 0 {
        clause.push_str(" FIRST");
    } else {
        write!(clause, " AFTER {}", Ident(&to.columns[position - 1].name)).unwrap();
    }
}

fn columns_equal_ignoring_charset(a: &Column, b: &Column) -> bool {
    let mut a = a.clone();
    let mut b = b.clone();
    a.char_set = None;
    a.collation = None;
    b.char_set = None;
    b.collation = None;
    a == b
}

/// Lossy unless the change is a pure widening within the same type family.
fn type_change_is_lossy(from: &str, to: &str) -> bool {
    if from == to {
        return false;
    }

    const INT_FAMILY: [&str; 5] = ["tinyint", "smallint", "mediumint", "int", "bigint"];
    let int_rank = |t: &str| -> Option<usize> { INT_FAMILY.iter().position(|family| t.starts_with(family)) };
    if let (Some(a), Some(b)) = (int_rank(from), int_rank(to)) {
        return b < a || from.contains("unsigned") != to.contains("unsigned");
    }

    let varchar_len = |t: &str| -> Option<u32> {
        t.strip_prefix("varchar(")
            .and_then(|rest| rest.strip_suffix(')'))
            .and_then(|n| n.parse().ok())
    };
    if let (Some(a), Some(b)) = (varchar_len(from), varchar_len(to)) {
        return b < a;
    }

    true
}

fn primary_key_changes(from: &Table, to: &Table) -> Vec<String> {
    match (&from.primary_key, &to.primary_key) {
        (Some(f), Some(t)) if f.columns == t.columns => Vec::new(),
        (Some(_), Some(t)) => vec!["DROP PRIMARY KEY".to_owned(), format!("ADD {}", render_primary_key(t))],
        (Some(_), None) => vec!["DROP PRIMARY KEY".to_owned()],
        (None, Some(t)) => vec![format!("ADD {}", render_primary_key(t))],
        (None, None) => Vec::new(),
    }
}

fn index_changes(from: &Table, to: &Table, mods: &StatementModifiers) -> (Vec<String>, Vec<String>) {
    let from_by_name: HashMap<&str, &Index> = from.secondary_indexes.iter().map(|i| (i.name.as_str(), i)).collect();
    let to_by_name: HashMap<&str, &Index> = to.secondary_indexes.iter().map(|i| (i.name.as_str(), i)).collect();

    let mut drops = Vec::new();
    let mut adds = Vec::new();

    for index in &from.secondary_indexes {
        if !to_by_name.contains_key(index.name.as_str()) {
            drops.push(format!("DROP KEY {}", Ident(&index.name)));
        }
    }

    if mods.strict_index_order {
        // Indexes recreated in a single ALTER land at the end in clause
        // order, so everything past the longest already-ordered prefix must
        // be dropped and re-added in the desired order.
        let survivors: Vec<&str> = from
            .secondary_indexes
            .iter()
            .map(|i| i.name.as_str())
            .filter(|name| to_by_name.get(name).is_some_and(|t| from_by_name[name] == *t))
            .collect();

        let mut consumed = 0;
        let mut prefix = 0;
        for index in &to.secondary_indexes {
            let unchanged = from_by_name
                .get(index.name.as_str())
                .is_some_and(|f| *f == index);
            if unchanged && survivors.get(consumed) == Some(&index.name.as_str()) {
                consumed += 1;
                prefix += 1;
            } else {
                break;
            }
        }

        for index in &to.secondary_indexes[prefix..] {
            if from_by_name.contains_key(index.name.as_str()) {
                drops.push(format!("DROP KEY {}", Ident(&index.name)));
            }
            adds.push(format!("ADD {}", render_index(index)));
        }
    } else {
        for index in &to.secondary_indexes {
            match from_by_name.get(index.name.as_str()) {
                None => adds.push(format!("ADD {}", render_index(index))),
                Some(existing) if *existing != index => {
                    drops.push(format!("DROP KEY {}", Ident(&index.name)));
                    adds.push(format!("ADD {}", render_index(index)));
                }
                Some(_) => {}
            }
        }
    }

    (drops, adds)
}

fn foreign_key_changes(from: &Table, to: &Table, mods: &StatementModifiers) -> (Vec<String>, Vec<String>) {
    let mut drops = Vec::new();
    let mut adds = Vec::new();
    let mut matched: HashSet<&str> = HashSet::new();

    for from_fk in &from.foreign_keys {
        if let Some(to_fk) = to.foreign_keys.iter().find(|f| f.name == from_fk.name) {
            matched.insert(to_fk.name.as_str());
            if from_fk != to_fk {
                drops.push(format!("DROP FOREIGN KEY {}", Ident(&from_fk.name)));
                adds.push(format!("ADD {}", render_foreign_key(to_fk)));
            }
        } else if let Some(to_fk) = to
            .foreign_keys
            .iter()
            .find(|f| !matched.contains(f.name.as_str()) && fks_equal_ignoring_name(from_fk, f))
        {
            // Same constraint under a different name.
            matched.insert(to_fk.name.as_str());
            if mods.strict_foreign_key_naming {
                drops.push(format!("DROP FOREIGN KEY {}", Ident(&from_fk.name)));
                adds.push(format!("ADD {}", render_foreign_key(to_fk)));
            }
        } else {
            drops.push(format!("DROP FOREIGN KEY {}", Ident(&from_fk.name)));
        }
    }

    for to_fk in &to.foreign_keys {
        let name_matched = from.foreign_keys.iter().any(|f| f.name == to_fk.name);
        if !name_matched && !matched.contains(to_fk.name.as_str()) {
            adds.push(format!("ADD {}", render_foreign_key(to_fk)));
        }
    }

    (drops, adds)
}

fn fks_equal_ignoring_name(a: &ForeignKey, b: &ForeignKey) -> bool {
    a.columns == b.columns
        && a.referenced_schema == b.referenced_schema
        && a.referenced_table == b.referenced_table
        && a.referenced_columns == b.referenced_columns
        && a.on_delete == b.on_delete
        && a.on_update == b.on_update
}

fn check_changes(from: &Table, to: &Table, mods: &StatementModifiers) -> (Vec<String>, Vec<String>) {
    let from_by_name: HashMap<&str, &CheckConstraint> = from.checks.iter().map(|c| (c.name.as_str(), c)).collect();
    let to_by_name: HashMap<&str, &CheckConstraint> = to.checks.iter().map(|c| (c.name.as_str(), c)).collect();

    let drop_clause = |name: &str| {
        if mods.flavor.is_mariadb() {
            format!("DROP CONSTRAINT {}", Ident(name))
        } else {
            format!("DROP CHECK {}", Ident(name))
        }
    };

    let mut drops = Vec::new();
    let mut adds = Vec::new();

    for check in &from.checks {
        if !to_by_name.contains_key(check.name.as_str()) {
            drops.push(drop_clause(&check.name));
        }
    }

    if mods.strict_check_order {
        let survivors: Vec<&str> = from
            .checks
            .iter()
            .map(|c| c.name.as_str())
            .filter(|name| to_by_name.get(name).is_some_and(|t| from_by_name[name] == *t))
            .collect();

        let mut consumed = 0;
        let mut prefix = 0;
        for check in &to.checks {
            let unchanged = from_by_name.get(check.name.as_str()).is_some_and(|f| *f == check);
            if unchanged && survivors.get(consumed) == Some(&check.name.as_str()) {
                consumed += 1;
                prefix += 1;
            } else {
                break;
            }
        }

        for check in &to.checks[prefix..] {
            if from_by_name.contains_key(check.name.as_str()) {
                drops.push(drop_clause(&check.name));
            }
            adds.push(format!("ADD {}", render_check(check)));
        }
    } else {
        for check in &to.checks {
            match from_by_name.get(check.name.as_str()) {
                None => adds.push(format!("ADD {}", render_check(check))),
                Some(existing) if *existing != check => {
                    drops.push(drop_clause(&check.name));
                    adds.push(format!("ADD {}", render_check(check)));
                }
                Some(_) => {}
            }
        }
    }

    (drops, adds)
}

fn option_changes(from: &Table, to: &Table, mods: &StatementModifiers, unsafe_parts: &mut Vec<String>) -> Vec<String> {
    let mut clauses = Vec::new();

    if !to.engine.is_empty() && !from.engine.eq_ignore_ascii_case(&to.engine) {
        let clause = format!("ENGINE={}", to.engine);
        unsafe_parts.push(clause.clone());
        clauses.push(clause);
    }

    if !to.char_set.is_empty() && (from.char_set != to.char_set || from.collation != to.collation) {
        let mut clause = format!("DEFAULT CHARSET={}", to.char_set);
        if !to.collation.is_empty() {
            write!(clause, " COLLATE={}", to.collation).unwrap();
        }
        clauses.push(clause);
    }

    let emit_auto_inc = match mods.next_auto_inc {
        NextAutoInc::Never => false,
        NextAutoInc::Always => to.next_auto_increment > 0 && to.next_auto_increment != from.next_auto_increment,
        NextAutoInc::IfIncreased => to.next_auto_increment > from.next_auto_increment,
    };
    if emit_auto_inc && to.has_auto_increment() {
        clauses.push(format!("AUTO_INCREMENT={}", to.next_auto_increment));
    }

    clauses
}

fn partitioning_changes(from: &Table, to: &Table, mods: &StatementModifiers) -> Vec<String> {
    match (&from.partitioning, &to.partitioning) {
        (from_part, Some(to_part)) if from_part.as_deref() != Some(to_part.as_str()) => vec![to_part.clone()],
        (Some(_), None) if mods.partitioning == PartitioningMode::Strict => vec!["REMOVE PARTITIONING".to_owned()],
        _ => Vec::new(),
    }
}
