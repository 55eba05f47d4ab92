//! End-to-end verifier scenarios, driven through a fake workspace so no
//! server is needed: call counting, canned introspection output, and
//! injected failures.

use async_trait::async_trait;
use diff_engine::{
    verifier_options_for_target, verify_diff, Config, ConnectorError, ConnectorResult, LogicalSchema, SchemaDiff,
    Statement, StatementFailure, TableDiff, Target, VerifierOptions, Workspace, WorkspaceOptions, WorkspaceSchema,
};
use mysql_schema_describer::{flavor::MYSQL_80, Column, Flavor, Table, Vendor};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

enum Behavior {
    Tables(Vec<Table>),
    StatementFailures(Vec<StatementFailure>),
    Error(String),
}

struct FakeWorkspace {
    calls: AtomicUsize,
    captured: Mutex<Vec<LogicalSchema>>,
    behavior: Behavior,
}

impl FakeWorkspace {
    fn returning(tables: Vec<Table>) -> Arc<FakeWorkspace> {
        Arc::new(FakeWorkspace {
            calls: AtomicUsize::new(0),
            captured: Mutex::new(Vec::new()),
            behavior: Behavior::Tables(tables),
        })
    }

    fn failing(failures: Vec<StatementFailure>) -> Arc<FakeWorkspace> {
        Arc::new(FakeWorkspace {
            calls: AtomicUsize::new(0),
            captured: Mutex::new(Vec::new()),
            behavior: Behavior::StatementFailures(failures),
        })
    }

    fn erroring(message: &str) -> Arc<FakeWorkspace> {
        Arc::new(FakeWorkspace {
            calls: AtomicUsize::new(0),
            captured: Mutex::new(Vec::new()),
            behavior: Behavior::Error(message.to_owned()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn captured_statements(&self) -> Vec<String> {
        self.captured
            .lock()
            .unwrap()
            .iter()
            .flat_map(|schema| schema.statements().iter().map(|s| s.text.clone()))
            .collect()
    }
}

#[async_trait]
impl Workspace for FakeWorkspace {
    async fn exec_logical_schema(
        &self,
        schema: &LogicalSchema,
        _options: &WorkspaceOptions,
    ) -> ConnectorResult<WorkspaceSchema> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.captured.lock().unwrap().push(schema.clone());

        match &self.behavior {
            Behavior::Tables(tables) => Ok(WorkspaceSchema::new(tables.clone())),
            Behavior::StatementFailures(failures) => {
                let mut ws_schema = WorkspaceSchema::new(Vec::new());
                for failure in failures {
                    ws_schema.push_failure(failure.clone());
                }
                Ok(ws_schema)
            }
            Behavior::Error(message) => Err(ConnectorError::from_msg(message.clone())),
        }
    }
}

fn options(all_alters: bool, workspace: Arc<FakeWorkspace>) -> VerifierOptions {
    options_with_flavor(all_alters, MYSQL_80, workspace)
}

fn options_with_flavor(all_alters: bool, flavor: Flavor, workspace: Arc<FakeWorkspace>) -> VerifierOptions {
    VerifierOptions {
        all_alters,
        flavor,
        default_character_set: "utf8mb4".into(),
        default_collation: "utf8mb4_unicode_ci".into(),
        workspace,
        workspace_options: WorkspaceOptions::for_instance("mysql://root@localhost:3306/app"),
    }
}

fn simple_table(name: &str, columns: &[(&str, &str)]) -> Table {
    let column_lines: Vec<String> = columns
        .iter()
        .map(|(col, tpe)| format!("  `{col}` {tpe} NOT NULL"))
        .collect();

    Table {
        name: name.into(),
        engine: "InnoDB".into(),
        char_set: "latin1".into(),
        collation: "latin1_swedish_ci".into(),
        columns: columns
            .iter()
            .map(|(col, tpe)| Column {
                name: (*col).into(),
                type_in_db: (*tpe).into(),
                ..Default::default()
            })
            .collect(),
        create_statement: format!(
            "CREATE TABLE `{name}` (\n{}\n) ENGINE=InnoDB DEFAULT CHARSET=latin1",
            column_lines.join(",\n")
        ),
        ..Default::default()
    }
}

/// A table the introspector could not fully model (range partitioning with
/// vendor comments), so its diffs start out unsupported.
fn partitioned_table(name: &str, columns: &[(&str, &str)]) -> Table {
    let mut table = simple_table(name, columns);
    table.partitioning = Some("PARTITION BY RANGE (customer_id)\n(PARTITION p0 VALUES LESS THAN (123) ENGINE = InnoDB,\n PARTITION p1 VALUES LESS THAN MAXVALUE ENGINE = InnoDB)".into());
    table.unsupported_ddl = true;
    table.create_statement.push_str(
        "\n/*!50100 PARTITION BY RANGE (customer_id)\n(PARTITION p0 VALUES LESS THAN (123) ENGINE = InnoDB,\n PARTITION p1 VALUES LESS THAN MAXVALUE ENGINE = InnoDB) */",
    );
    table
}

#[tokio::test]
async fn diffing_a_schema_against_itself_verifies_without_opening_a_workspace() {
    let schema = mysql_schema_describer::Schema {
        name: "app".into(),
        char_set: "utf8mb4".into(),
        collation: "utf8mb4_unicode_ci".into(),
        tables: vec![
            simple_table("orders", &[("id", "int"), ("c", "int")]),
            simple_table("customers", &[("id", "int")]),
        ],
    };

    let diff = SchemaDiff::new(&schema, &schema.clone());
    let workspace = FakeWorkspace::returning(Vec::new());

    let promotions = verify_diff(&diff, &options(true, workspace.clone())).await.unwrap();

    assert!(promotions.is_empty());
    assert_eq!(workspace.calls(), 0);
}

#[tokio::test]
async fn a_diff_without_alters_verifies_without_opening_a_workspace() {
    let created = simple_table("new_table", &[("id", "int")]);
    let dropped = simple_table("old_table", &[("id", "int")]);
    let diff = SchemaDiff::from_table_diffs(vec![
        TableDiff::new_create_table(&created),
        TableDiff::new_drop_table(&dropped),
    ]);

    let workspace = FakeWorkspace::returning(Vec::new());
    let promotions = verify_diff(&diff, &options(true, workspace.clone())).await.unwrap();

    assert!(promotions.is_empty());
    assert_eq!(workspace.calls(), 0);
}

#[tokio::test]
async fn verify_disabled_with_no_unsupported_diffs_is_a_no_op() {
    let from = simple_table("orders", &[("id", "int"), ("c", "int")]);
    let mut to = from.clone();
    to.columns[1].type_in_db = "bigint".into();

    let diff = SchemaDiff::from_table_diffs(vec![TableDiff::new_alter_table(&from, &to)]);
    let workspace = FakeWorkspace::returning(Vec::new());

    let promotions = verify_diff(&diff, &options(false, workspace.clone())).await.unwrap();

    assert!(promotions.is_empty());
    assert_eq!(workspace.calls(), 0);
}

#[tokio::test]
async fn happy_path_roundtrip_verifies_a_column_type_change() {
    let from = simple_table("orders", &[("id", "int"), ("c", "int")]);
    let mut to = from.clone();
    to.columns[1].type_in_db = "bigint".into();

    let diff = SchemaDiff::from_table_diffs(vec![TableDiff::new_alter_table(&from, &to)]);
    // The workspace produces exactly the desired table.
    let workspace = FakeWorkspace::returning(vec![to.clone()]);

    let promotions = verify_diff(&diff, &options(true, workspace.clone())).await.unwrap();

    assert!(promotions.is_empty());
    assert_eq!(workspace.calls(), 1);

    let statements = workspace.captured_statements();
    assert_eq!(statements.len(), 2);
    assert!(statements[0].starts_with("CREATE TABLE `orders`"));
    assert!(statements[1].contains("MODIFY COLUMN `c` bigint"), "{}", statements[1]);
    assert!(statements[1].contains("ALGORITHM=COPY"));
}

#[tokio::test]
async fn mysql_55_blueprints_never_contain_an_algorithm_clause() {
    let from = simple_table("orders", &[("id", "int"), ("c", "int")]);
    let mut to = from.clone();
    to.columns[1].type_in_db = "bigint".into();

    let diff = SchemaDiff::from_table_diffs(vec![TableDiff::new_alter_table(&from, &to)]);
    let workspace = FakeWorkspace::returning(vec![to.clone()]);
    let opts = options_with_flavor(true, Flavor::new(Vendor::Mysql, 5, 5), workspace.clone());

    verify_diff(&diff, &opts).await.unwrap();

    for statement in workspace.captured_statements() {
        assert!(!statement.contains("ALGORITHM="), "{statement}");
    }
}

#[tokio::test]
async fn an_unsupported_diff_that_verifies_cleanly_is_promoted() {
    let from = partitioned_table("orders", &[("id", "int"), ("customer_id", "int")]);
    let mut to = simple_table("orders", &[("id", "int"), ("customer_id", "int")]);
    to.columns[1].type_in_db = "bigint".into();

    let mut diff = SchemaDiff::from_table_diffs(vec![TableDiff::new_alter_table(&from, &to)]);
    assert!(!diff.table_diffs()[0].supported());

    // Verification runs even with all_alters off, because promotion requires
    // it.
    let workspace = FakeWorkspace::returning(vec![to.clone()]);
    let promotions = verify_diff(&diff, &options(false, workspace.clone())).await.unwrap();

    assert_eq!(workspace.calls(), 1);
    assert!(promotions.contains("orders"));

    diff.mark_supported(promotions.iter());
    assert!(diff.table_diffs()[0].supported());
}

#[tokio::test]
async fn an_unsupported_diff_that_fails_the_rediff_stays_unsupported() {
    let from = partitioned_table("orders", &[("id", "int"), ("customer_id", "int")]);
    let mut to = simple_table("orders", &[("id", "int"), ("customer_id", "int")]);
    to.columns[1].type_in_db = "bigint".into();

    let diff = SchemaDiff::from_table_diffs(vec![TableDiff::new_alter_table(&from, &to)]);

    // The workspace table still carries unmodeled DDL, so the re-diff is
    // unsupported too. That is tolerated: no promotion, no error.
    let mut actual = to.clone();
    actual.unsupported_ddl = true;
    let workspace = FakeWorkspace::returning(vec![actual]);

    let promotions = verify_diff(&diff, &options(false, workspace.clone())).await.unwrap();
    assert!(promotions.is_empty());
}

#[tokio::test]
async fn a_buggy_differ_is_detected_by_the_second_diff() {
    let from = simple_table("orders", &[("id", "int"), ("c", "int")]);
    let mut to = from.clone();
    to.columns[1].type_in_db = "bigint".into();

    let diff = SchemaDiff::from_table_diffs(vec![TableDiff::new_alter_table(&from, &to)]);
    // The workspace hands back the unchanged table, as if the generated
    // ALTER had omitted the column change.
    let workspace = FakeWorkspace::returning(vec![from.clone()]);

    let err = verify_diff(&diff, &options(true, workspace)).await.unwrap_err();
    let message = err.to_string();

    assert!(message.starts_with("Diff verification failure on table orders"), "{message}");
    assert!(message.contains("the generated ALTER TABLE does not fully bring the table to the desired state"));
    assert!(
        message.contains("secondary verification diff is non-empty, yielding this DDL:"),
        "{message}"
    );
    assert!(message.contains("`c` bigint"), "{message}");
}

#[tokio::test]
async fn a_rediff_gone_unsupported_reports_the_post_verification_state() {
    let from = simple_table("orders", &[("id", "int"), ("c", "int")]);
    let mut to = from.clone();
    to.columns[1].type_in_db = "bigint".into();

    let diff = SchemaDiff::from_table_diffs(vec![TableDiff::new_alter_table(&from, &to)]);
    let mut actual = to.clone();
    actual.unsupported_ddl = true;
    let workspace = FakeWorkspace::returning(vec![actual]);

    let err = verify_diff(&diff, &options(true, workspace)).await.unwrap_err();
    let message = err.to_string();

    assert!(message.starts_with("Diff verification failure on table orders"), "{message}");
    assert!(message.contains("This may indicate a diff engine bug"));
    assert!(message.contains("--skip-verify"));
    assert!(message.contains("post-verification state"), "{message}");
    assert!(!message.contains("original state of table"), "{message}");
}

#[tokio::test]
async fn statement_failures_in_the_workspace_surface_first() {
    let from = simple_table("orders", &[("id", "int"), ("c", "int")]);
    let mut to = from.clone();
    to.columns[1].type_in_db = "bigint".into();

    let diff = SchemaDiff::from_table_diffs(vec![TableDiff::new_alter_table(&from, &to)]);
    let workspace = FakeWorkspace::failing(vec![
        StatementFailure {
            statement: Statement::alter_table("orders", "ALTER TABLE `orders` MODIFY COLUMN `c` bigint NOT NULL"),
            message: "Unknown column 'c' in 'orders'".into(),
        },
        StatementFailure {
            statement: Statement::alter_table("orders", "ALTER TABLE `orders` whatever"),
            message: "second failure, never surfaced".into(),
        },
    ]);

    let err = verify_diff(&diff, &options(true, workspace)).await.unwrap_err();
    let message = err.to_string();

    assert!(message.starts_with("Diff verification failure: "), "{message}");
    assert!(message.contains("Unknown column 'c' in 'orders'"));
    assert!(!message.contains("second failure"));
}

#[tokio::test]
async fn workspace_level_errors_surface_with_the_same_prefix() {
    let from = simple_table("orders", &[("id", "int"), ("c", "int")]);
    let mut to = from.clone();
    to.columns[1].type_in_db = "bigint".into();

    let diff = SchemaDiff::from_table_diffs(vec![TableDiff::new_alter_table(&from, &to)]);
    let workspace = FakeWorkspace::erroring("server has gone away");

    let err = verify_diff(&diff, &options(true, workspace)).await.unwrap_err();
    let message = err.to_string();

    assert!(message.starts_with("Diff verification failure: "), "{message}");
    assert!(message.contains("server has gone away"));
}

#[tokio::test]
async fn a_table_missing_from_the_workspace_is_a_failure() {
    let from = simple_table("orders", &[("id", "int"), ("c", "int")]);
    let mut to = from.clone();
    to.columns[1].type_in_db = "bigint".into();

    let diff = SchemaDiff::from_table_diffs(vec![TableDiff::new_alter_table(&from, &to)]);
    let workspace = FakeWorkspace::returning(Vec::new());

    let err = verify_diff(&diff, &options(true, workspace)).await.unwrap_err();
    assert!(err.to_string().contains("missing from the workspace"));
}

#[tokio::test]
async fn split_alters_for_one_table_share_a_single_create() {
    // Two alter diffs for the same source table: the duplicate CREATE is
    // silently discarded, both ALTERs run.
    let from = simple_table("orders", &[("id", "int"), ("c", "int"), ("d", "int")]);
    let mut to_first = from.clone();
    to_first.columns[1].type_in_db = "bigint".into();
    let mut to_second = from.clone();
    to_second.columns[2].type_in_db = "bigint".into();

    let diff = SchemaDiff::from_table_diffs(vec![
        TableDiff::new_alter_table(&from, &to_first),
        TableDiff::new_alter_table(&from, &to_second),
    ]);

    // The later diff's desired state wins for the re-diff, and the fake
    // produces exactly that table.
    let workspace = FakeWorkspace::returning(vec![to_second.clone()]);
    verify_diff(&diff, &options(true, workspace.clone())).await.unwrap();

    let statements = workspace.captured_statements();
    let creates = statements.iter().filter(|s| s.starts_with("CREATE TABLE")).count();
    let alters = statements.iter().filter(|s| s.starts_with("ALTER TABLE")).count();
    assert_eq!(creates, 1);
    assert_eq!(alters, 2);
}

#[tokio::test]
async fn targets_supply_verifier_options_and_workspace_handles() {
    let from = simple_table("orders", &[("id", "int"), ("c", "int")]);
    let mut to = from.clone();
    to.columns[1].type_in_db = "bigint".into();
    let diff = SchemaDiff::from_table_diffs(vec![TableDiff::new_alter_table(&from, &to)]);

    let workspace = FakeWorkspace::returning(vec![to.clone()]);
    let config = Config::new()
        .with("verify", "true")
        .with("default-character-set", "utf8mb4")
        .with("default-collation", "utf8mb4_unicode_ci");
    let target = Target::with_workspace("mysql://root@localhost:3306/app", MYSQL_80, config, workspace.clone());

    let opts = verifier_options_for_target(&target).unwrap();
    assert!(opts.all_alters);

    let promotions = verify_diff(&diff, &opts).await.unwrap();
    assert!(promotions.is_empty());
    assert_eq!(workspace.calls(), 1);
}
