//! Statement modifiers control how a table diff is rendered to DDL text.
//!
//! Two closely related policies are used inside a single verification run:
//! the strict policy materializes candidate ALTERs into the workspace, the
//! relaxed policy re-diffs the result afterwards.

use mysql_schema_describer::{flavor::MYSQL_55, Flavor};

/// How to treat a difference in the next auto-increment counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NextAutoInc {
    /// Emit an `AUTO_INCREMENT=` clause whenever the counters differ.
    Always,
    /// Emit the clause only when the desired counter is higher than the live
    /// one.
    IfIncreased,
    /// Never emit the clause.
    #[default]
    Never,
}

/// How to treat partitioning differences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PartitioningMode {
    /// Apply the desired partitioning clause when the desired table has one,
    /// but leave a live table's partitioning alone when the desired state
    /// omits it.
    #[default]
    Permissive,
    /// Additionally emit `REMOVE PARTITIONING` when the desired state is
    /// unpartitioned.
    Strict,
}

/// Configuration for rendering a table diff to an ALTER TABLE statement.
#[derive(Debug, Clone, PartialEq)]
pub struct StatementModifiers {
    pub next_auto_inc: NextAutoInc,
    pub partitioning: PartitioningMode,
    /// Permit destructive clauses (dropped columns, lossy type changes,
    /// engine changes).
    pub allow_unsafe: bool,
    /// Value for an `ALGORITHM=` clause prepended to every ALTER, e.g.
    /// `copy`. Empty means none.
    pub algorithm_clause: String,
    /// Force secondary index order to match exactly, re-creating indexes
    /// that are only out of order.
    pub strict_index_order: bool,
    /// Force check constraint order to match exactly.
    pub strict_check_order: bool,
    /// Treat foreign keys that differ only in name as different.
    pub strict_foreign_key_naming: bool,
    /// Treat column-level charset/collation clauses as significant.
    pub strict_column_definition: bool,
    /// Render ALTERs that only exist to speed up a subsequent DROP as empty.
    pub skip_pre_drop_alters: bool,
    pub flavor: Flavor,
}

impl Default for StatementModifiers {
    fn default() -> Self {
        StatementModifiers {
            next_auto_inc: NextAutoInc::default(),
            partitioning: PartitioningMode::default(),
            allow_unsafe: false,
            algorithm_clause: String::new(),
            strict_index_order: false,
            strict_check_order: false,
            strict_foreign_key_naming: false,
            strict_column_definition: false,
            skip_pre_drop_alters: false,
            flavor: Flavor::default(),
        }
    }
}

impl StatementModifiers {
    /// The policy used to materialize candidate ALTERs into the workspace.
    /// The workspace is disposable, so unsafe operations are fine; every
    /// cosmetic and structural difference the ALTER intends to express must
    /// be reproduced, so all the strict flags are on and `ALGORITHM=copy`
    /// keeps the server from silently collapsing index re-orderings.
    pub fn strict_verification(flavor: Flavor) -> Self {
        let algorithm_clause = if flavor.matches(MYSQL_55) {
            // MySQL 5.5 doesn't support the ALGORITHM clause.
            String::new()
        } else {
            "copy".to_owned()
        };

        StatementModifiers {
            next_auto_inc: NextAutoInc::Always,
            partitioning: PartitioningMode::Permissive,
            allow_unsafe: true,
            algorithm_clause,
            strict_index_order: true,
            strict_check_order: true,
            strict_foreign_key_naming: true,
            strict_column_definition: true,
            skip_pre_drop_alters: true,
            flavor,
        }
    }

    /// The policy for the verification re-diff after execution. MySQL 8
    /// emits superfluous column-level charset/collation clauses in some edge
    /// cases; those discrepancies are cosmetic and must not fail
    /// verification. The algorithm clause goes away because the second diff
    /// is never executed.
    pub fn relaxed_verification(flavor: Flavor) -> Self {
        let mut mods = Self::strict_verification(flavor);
        mods.strict_column_definition = false;
        mods.algorithm_clause = String::new();
        mods
    }
}
