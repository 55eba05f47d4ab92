//! The diff verifier. Before any computed ALTER ships to a real instance, it
//! is executed against a throwaway workspace schema, and a second diff proves
//! it actually transforms the source table into the desired table.

use crate::{
    error::{ConnectorError, ConnectorResult, DiffError},
    logical_schema::{LogicalSchema, Statement},
    statement_modifiers::StatementModifiers,
    table_differ::{DiffType, SchemaDiff, TableDiff},
    workspace::{Options as WorkspaceOptions, Workspace},
};
use mysql_schema_describer::{Flavor, Table};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::debug;

/// Configuration for the diff verification operation.
#[derive(Clone)]
pub struct VerifierOptions {
    /// If false, only verify unsupported alter diffs; if true, verify all
    /// alter diffs.
    pub all_alters: bool,
    pub flavor: Flavor,
    pub default_character_set: String,
    pub default_collation: String,
    pub workspace: Arc<dyn Workspace>,
    pub workspace_options: WorkspaceOptions,
}

/// Tables whose unsupported diffs verified cleanly. Apply with
/// [`SchemaDiff::mark_supported`] after `verify_diff` returns.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Promotions(BTreeSet<String>);

impl Promotions {
    pub fn contains(&self, table: &str) -> bool {
        self.0.contains(table)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

/// Per-target outcome counters, folded across targets by higher layers.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    pub differences: bool,
    pub skip_count: usize,
    pub unsupported_count: usize,
}

impl Outcome {
    /// In-place aggregation: `differences` ors, counts add.
    pub fn merge(&mut self, other: Outcome) {
        self.differences |= other.differences;
        self.skip_count += other.skip_count;
        self.unsupported_count += other.unsupported_count;
    }
}

/// Verify the ALTERs in `diff`, confirming that applying each one would bring
/// its table from the version on the instance to the desired version.
///
/// The ALTERs run against a temporary workspace schema under a strict
/// rendering policy; a second diff under a slightly relaxed policy then
/// proves the result matches. Returns the unsupported diffs that verified
/// cleanly; any verification failure is an error whose message begins with
/// `Diff verification failure`.
pub async fn verify_diff(diff: &SchemaDiff, opts: &VerifierOptions) -> ConnectorResult<Promotions> {
    // No ALTERs, nothing to verify.
    let alters = diff.filtered_table_diffs(DiffType::Alter);
    if alters.is_empty() {
        return Ok(Promotions::default());
    }

    let mods = StatementModifiers::strict_verification(opts.flavor);

    // Gather CREATE and ALTER for modified tables into a logical schema.
    // Even when --verify is off we still look for unsupported diffs, to
    // potentially mark some as supported: a diff can generate non-blank SQL
    // that verifies fine because it never touches the unsupported feature.
    let mut logical_schema = LogicalSchema::new();
    logical_schema.char_set = opts.default_character_set.clone();
    logical_schema.collation = opts.default_collation.clone();

    let mut desired_tables: BTreeMap<String, Table> = BTreeMap::new();
    let mut unsupported_tables: BTreeSet<String> = BTreeSet::new();

    for td in &alters {
        let (Some(from), Some(to)) = (td.from(), td.to()) else {
            continue;
        };

        let statement = match td.render(&mods) {
            Ok(stmt) if stmt.is_empty() => continue,
            Ok(stmt) => {
                if !opts.all_alters {
                    continue;
                }
                stmt
            }
            Err(DiffError::Unsupported(unsupported)) => {
                unsupported_tables.insert(from.name.clone());
                if unsupported.statement.is_empty() {
                    // Nothing renderable, nothing to promote.
                    continue;
                }
                unsupported.statement
            }
            Err(err) => {
                return Err(ConnectorError::from_source(
                    err,
                    format!(
                        "Diff verification failure: generating ALTER for table {} failed",
                        from.name
                    )
                    .into_boxed_str(),
                ));
            }
        };

        // A table's diff sometimes gets split into multiple ALTERs; the
        // duplicate CREATEs that produces are discarded by the logical
        // schema, which is exactly what we want here.
        logical_schema.add_statement(Statement::create_table(&from.name, &from.create_statement));
        logical_schema.add_statement(Statement::alter_table(&from.name, statement));
        desired_tables.insert(from.name.clone(), to.clone());
    }

    // --verify disabled and no verifiable unsupported tables.
    if desired_tables.is_empty() {
        return Ok(Promotions::default());
    }

    debug!("Verifying ALTERs for {} tables in a workspace", desired_tables.len());
    let ws_schema = match opts
        .workspace
        .exec_logical_schema(&logical_schema, &opts.workspace_options)
        .await
    {
        Ok(ws_schema) if !ws_schema.failures.is_empty() => {
            return Err(ConnectorError::from_msg(format!(
                "Diff verification failure: {}",
                ws_schema.failures[0]
            )));
        }
        Ok(ws_schema) => ws_schema,
        Err(err) => {
            return Err(ConnectorError::from_msg(format!("Diff verification failure: {err}")));
        }
    };

    // Compare the desired version of each table with what the workspace
    // produced, by running a second diff under the relaxed policy.
    let mods = StatementModifiers::relaxed_verification(opts.flavor);
    let mut promotions = Promotions::default();
    for (name, desired) in &desired_tables {
        let was_unsupported = unsupported_tables.contains(name);
        match verify_table(ws_schema.tables_by_name().get(name), desired, &mods) {
            Ok(()) if was_unsupported => {
                promotions.0.insert(name.clone());
            }
            Ok(()) => {}
            // An unsupported diff that fails the re-diff just stays
            // unsupported.
            Err(_) if was_unsupported => {}
            Err(err) => return Err(err),
        }
    }

    Ok(promotions)
}

/// Confirm a workspace table has the desired structure by diffing once more.
/// A non-empty ALTER, an error, or an unsupported diff here means the first
/// diff did not do its job.
fn verify_table(actual: Option<&Table>, desired: &Table, mods: &StatementModifiers) -> ConnectorResult<()> {
    let header = format!("Diff verification failure on table {}", desired.name);

    let Some(actual) = actual else {
        return Err(ConnectorError::from_msg(format!(
            "{header}: table is missing from the workspace after executing the generated DDL."
        )));
    };

    let td = TableDiff::new_alter_table(actual, desired);
    match td.render(mods) {
        Err(DiffError::Unsupported(unsupported)) => {
            let unsupported = unsupported.into_post_verification();
            Err(ConnectorError::from_msg(format!(
                "{header}. This may indicate a diff engine bug.\nRun command again with --skip-verify if this discrepancy is safe to ignore.\nDebug details: {}",
                unsupported.extended_error()
            )))
        }
        Err(err) => Err(ConnectorError::from_source(
            err,
            format!("{header} due to unexpected error. Run command again with --skip-verify if this is safe to ignore")
                .into_boxed_str(),
        )),
        Ok(stmt) if !stmt.is_empty() => Err(ConnectorError::from_msg(format!(
            "{header}: the generated ALTER TABLE does not fully bring the table to the desired state.\nRun command again with --skip-verify if this discrepancy is safe to ignore.\nDebug details: secondary verification diff is non-empty, yielding this DDL: {stmt}"
        ))),
        Ok(_) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_merge_ors_differences_and_adds_counts() {
        let mut result = Outcome {
            differences: false,
            skip_count: 1,
            unsupported_count: 0,
        };
        result.merge(Outcome {
            differences: true,
            skip_count: 3,
            unsupported_count: 5,
        });

        assert_eq!(
            result,
            Outcome {
                differences: true,
                skip_count: 4,
                unsupported_count: 5,
            }
        );
    }

    #[test]
    fn outcome_merge_is_commutative_and_associative() {
        let a = Outcome {
            differences: false,
            skip_count: 1,
            unsupported_count: 2,
        };
        let b = Outcome {
            differences: true,
            skip_count: 10,
            unsupported_count: 0,
        };
        let c = Outcome {
            differences: false,
            skip_count: 0,
            unsupported_count: 7,
        };

        let mut ab = a;
        ab.merge(b);
        let mut ba = b;
        ba.merge(a);
        assert_eq!(ab, ba);

        let mut ab_c = ab;
        ab_c.merge(c);
        let mut bc = b;
        bc.merge(c);
        let mut a_bc = a;
        a_bc.merge(bc);
        assert_eq!(ab_c, a_bc);
    }
}
