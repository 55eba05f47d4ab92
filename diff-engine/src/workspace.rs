//! Workspaces materialize a logical schema on a live server under a
//! generated-name temporary schema, and hand back introspected tables.
//!
//! The temporary schema is exclusive to one verification run and is dropped
//! on every exit path before any result is surfaced.

use crate::{
    connection::Connection,
    error::ConnectorResult,
    logical_schema::{LogicalSchema, Statement},
    target::Config,
};
use async_trait::async_trait;
use mysql_async::prelude::Queryable;
use mysql_schema_describer::{SchemaDescriber, Table};
use std::{collections::BTreeMap, fmt};
use tracing::debug;
use uuid::Uuid;

const DEFAULT_SCHEMA_PREFIX: &str = "_diff_verifier_";

/// Options for executing a logical schema.
#[derive(Debug, Clone)]
pub struct Options {
    /// Connection URL of the instance hosting the temporary schema.
    pub url: String,
    /// Prefix for the generated schema name. Leftovers from hard kills can
    /// be garbage-collected by prefix.
    pub schema_prefix: String,
    /// `lock_wait_timeout` for the workspace session, in seconds.
    pub lock_wait_timeout: Option<u32>,
}

impl Options {
    pub fn for_instance(url: impl Into<String>) -> Options {
        Options {
            url: url.into(),
            schema_prefix: DEFAULT_SCHEMA_PREFIX.to_owned(),
            lock_wait_timeout: Some(5),
        }
    }
}

/// Workspace options based on a directory's configuration and the target
/// instance.
pub fn options_for(config: &Config, instance_url: &str) -> Options {
    let mut options = Options::for_instance(instance_url);
    let prefix = config.get("temp-schema");
    if !prefix.is_empty() {
        options.schema_prefix = prefix.to_owned();
    }
    options
}

/// A statement the server rejected while materializing a logical schema.
#[derive(Debug, Clone)]
pub struct StatementFailure {
    pub statement: Statement,
    pub message: String,
}

impl fmt::Display for StatementFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [statement: {}]", self.message, self.statement.text)
    }
}

impl std::error::Error for StatementFailure {}

/// The outcome of materializing a logical schema: introspected tables plus
/// the statement-level failures, in submission order.
#[derive(Debug, Default)]
pub struct WorkspaceSchema {
    pub failures: Vec<StatementFailure>,
    tables: BTreeMap<String, Table>,
}

impl WorkspaceSchema {
    pub fn new(tables: impl IntoIterator<Item = Table>) -> WorkspaceSchema {
        WorkspaceSchema {
            failures: Vec::new(),
            tables: tables.into_iter().map(|t| (t.name.clone(), t)).collect(),
        }
    }

    pub fn push_failure(&mut self, failure: StatementFailure) {
        self.failures.push(failure);
    }

    pub fn tables_by_name(&self) -> &BTreeMap<String, Table> {
        &self.tables
    }
}

/// The contract the verifier consumes.
#[async_trait]
pub trait Workspace: Send + Sync {
    /// Materialize `schema` under a temporary schema, introspect the result,
    /// and release the temporary schema on every exit path.
    async fn exec_logical_schema(&self, schema: &LogicalSchema, options: &Options) -> ConnectorResult<WorkspaceSchema>;
}

/// The production workspace: a temporary schema on the configured live
/// instance.
#[derive(Debug)]
pub struct TempSchemaWorkspace {
    connection: Connection,
}

impl TempSchemaWorkspace {
    pub fn new(connection: Connection) -> TempSchemaWorkspace {
        TempSchemaWorkspace { connection }
    }

    pub fn connect(url: &str) -> ConnectorResult<TempSchemaWorkspace> {
        Ok(TempSchemaWorkspace::new(Connection::new(url)?))
    }

    async fn exec_in_schema(
        &self,
        schema: &LogicalSchema,
        options: &Options,
        schema_name: &str,
    ) -> ConnectorResult<WorkspaceSchema> {
        let mut conn = self.connection.pool().get_conn().await?;
        conn.query_drop(format!("USE `{schema_name}`")).await?;
        conn.query_drop("SET SESSION foreign_key_checks = 0").await?;
        if let Some(timeout) = options.lock_wait_timeout {
            conn.query_drop(format!("SET SESSION lock_wait_timeout = {timeout}")).await?;
        }

        let mut failures = Vec::new();
        for statement in schema.statements() {
            if let Err(err) = conn.query_drop(statement.text.as_str()).await {
                match err {
                    mysql_async::Error::Server(server_error) => {
                        debug!(
                            object = statement.object_name.as_str(),
                            "Statement failed in workspace: {server_error}"
                        );
                        failures.push(StatementFailure {
                            statement: statement.clone(),
                            message: server_error.to_string(),
                        });
                    }
                    other => return Err(other.into()),
                }
            }
        }
        drop(conn);

        let describer = SchemaDescriber::new(self.connection.pool().clone());
        let described = describer.describe(schema_name).await?;

        let mut ws_schema = WorkspaceSchema::new(described.tables);
        ws_schema.failures = failures;
        Ok(ws_schema)
    }
}

#[async_trait]
impl Workspace for TempSchemaWorkspace {
    #[tracing::instrument(skip_all)]
    async fn exec_logical_schema(&self, schema: &LogicalSchema, options: &Options) -> ConnectorResult<WorkspaceSchema> {
        let schema_name = format!("{}{}", options.schema_prefix, Uuid::new_v4().simple());

        let mut create = format!("CREATE DATABASE `{schema_name}`");
        if !schema.char_set.is_empty() {
            create.push_str(&format!(" DEFAULT CHARACTER SET {}", schema.char_set));
        }
        if !schema.collation.is_empty() {
            create.push_str(&format!(" COLLATE {}", schema.collation));
        }
        self.connection.raw_cmd(&create).await?;
        debug!("Created workspace schema `{schema_name}`");

        // Holds any error until the DROP below has run; no exit path may
        // leave the temporary schema on the server.
        let result = self.exec_in_schema(schema, options, &schema_name).await;

        self.connection
            .raw_cmd(&format!("DROP DATABASE IF EXISTS `{schema_name}`"))
            .await?;
        debug!("Dropped workspace schema `{schema_name}`");

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logical_schema::StatementKind;

    #[test]
    fn statement_failures_format_with_the_offending_statement() {
        let failure = StatementFailure {
            statement: Statement {
                kind: StatementKind::Alter,
                object_type: crate::logical_schema::ObjectType::Table,
                object_name: "orders".into(),
                text: "ALTER TABLE `orders` ADD COLUMN `a` int".into(),
            },
            message: "Duplicate column name 'a'".into(),
        };

        assert_eq!(
            failure.to_string(),
            "Duplicate column name 'a' [statement: ALTER TABLE `orders` ADD COLUMN `a` int]"
        );
    }

    #[test]
    fn options_honor_the_temp_schema_config_key() {
        let config = Config::default();
        let options = options_for(&config, "mysql://root@localhost/db");
        assert_eq!(options.schema_prefix, DEFAULT_SCHEMA_PREFIX);

        let mut config = Config::default();
        config.set("temp-schema", "_scratch_");
        let options = options_for(&config, "mysql://root@localhost/db");
        assert_eq!(options.schema_prefix, "_scratch_");
        assert_eq!(options.url, "mysql://root@localhost/db");
    }

    #[test]
    fn workspace_schemas_index_tables_by_name() {
        let table = Table {
            name: "orders".into(),
            ..Default::default()
        };
        let ws_schema = WorkspaceSchema::new(vec![table]);
        assert!(ws_schema.tables_by_name().contains_key("orders"));
        assert!(ws_schema.failures.is_empty());
    }
}
