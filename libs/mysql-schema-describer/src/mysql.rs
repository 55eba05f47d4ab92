use crate::{
    error::{DescriberErrorKind, DescriberResult},
    flavor::Flavor,
    getters::Getter,
    CheckConstraint, Column, ColumnDefault, ForeignKey, ForeignKeyAction, Index, IndexColumn, IndexType, Schema,
    SortOrder, Table,
};
use indoc::indoc;
use mysql_async::{prelude::Queryable, Pool, Row};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use tracing::trace;

static PARTITION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)(?:/\*!\d+\s+)?(PARTITION BY .+?)(?:\s*\*/)?\s*$").unwrap());

/// Features the table model does not capture. A table whose CREATE contains
/// one of these is introspected with `unsupported_ddl = true` and its raw
/// CREATE statement is authoritative.
static UNSUPPORTED_FEATURE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"SUBPARTITION|GENERATED ALWAYS AS|WITH PARSER").unwrap());

/// Introspects schemas on a live MySQL or MariaDB server into [`Schema`]
/// values.
pub struct SchemaDescriber {
    pool: Pool,
}

impl SchemaDescriber {
    /// Constructor.
    pub fn new(pool: Pool) -> SchemaDescriber {
        SchemaDescriber { pool }
    }

    /// The server version string, e.g. `8.0.32`.
    pub async fn version(&self) -> DescriberResult<Option<String>> {
        let mut conn = self.pool.get_conn().await?;
        Ok(conn.query_first("SELECT @@version").await?)
    }

    /// The server flavor, derived from the version string.
    pub async fn flavor(&self) -> DescriberResult<Flavor> {
        let version = self.version().await?.unwrap_or_default();
        Ok(Flavor::from_version_string(&version))
    }

    /// Describe one schema.
    #[tracing::instrument(skip(self))]
    pub async fn describe(&self, schema: &str) -> DescriberResult<Schema> {
        let flavor = self.flavor().await?;
        let mut conn = self.pool.get_conn().await?;

        let sql = indoc! {r#"
            SELECT default_character_set_name AS char_set, default_collation_name AS collation
            FROM information_schema.schemata
            WHERE schema_name = ?
        "#};
        let schema_row: Vec<Row> = conn.exec(sql, (schema,)).await?;
        let (char_set, collation) = match schema_row.into_iter().next() {
            Some(row) => (row.get_expect_string("char_set"), row.get_expect_string("collation")),
            None => {
                return Err(DescriberErrorKind::UnknownSchema {
                    name: schema.to_owned(),
                }
                .into())
            }
        };

        let mut tables = self.get_tables(&mut conn, schema).await?;
        self.get_all_columns(&mut conn, schema, &flavor, &mut tables).await?;
        self.get_all_indexes(&mut conn, schema, &mut tables).await?;
        self.get_foreign_keys(&mut conn, schema, &mut tables).await?;
        self.get_check_constraints(&mut conn, schema, &flavor, &mut tables).await?;

        for table in tables.values_mut() {
            let create = Self::get_create_statement(&mut conn, schema, &table.name).await?;
            table.partitioning = PARTITION_RE
                .captures(&create)
                .map(|caps| caps[1].trim_end().to_owned());
            table.unsupported_ddl = UNSUPPORTED_FEATURE_RE.is_match(&create);
            table.create_statement = create;
        }

        trace!("Described {} tables in `{}`", tables.len(), schema);

        Ok(Schema {
            name: schema.to_owned(),
            char_set,
            collation,
            tables: tables.into_values().collect(),
        })
    }

    async fn get_tables(
        &self,
        conn: &mut mysql_async::Conn,
        schema: &str,
    ) -> DescriberResult<BTreeMap<String, Table>> {
        let sql = indoc! {r#"
            SELECT table_name AS table_name, engine AS engine,
                   auto_increment AS next_auto_increment, table_collation AS collation
            FROM information_schema.tables
            WHERE table_schema = ? AND table_type = 'BASE TABLE'
            ORDER BY table_name
        "#};
        let rows: Vec<Row> = conn.exec(sql, (schema,)).await?;

        let mut tables = BTreeMap::new();
        for row in rows {
            let name = row.get_expect_string("table_name");
            let collation = row.get_string("collation").unwrap_or_default();
            let table = Table {
                name: name.clone(),
                engine: row.get_string("engine").unwrap_or_default(),
                char_set: char_set_of_collation(&collation),
                collation,
                next_auto_increment: row.get_u64("next_auto_increment").unwrap_or(0),
                ..Default::default()
            };
            tables.insert(name, table);
        }
        Ok(tables)
    }

    async fn get_all_columns(
        &self,
        conn: &mut mysql_async::Conn,
        schema: &str,
        flavor: &Flavor,
        tables: &mut BTreeMap<String, Table>,
    ) -> DescriberResult<()> {
        let sql = indoc! {r#"
            SELECT table_name AS table_name, column_name AS column_name, column_type AS column_type,
                   is_nullable AS is_nullable, column_default AS column_default, extra AS extra,
                   character_set_name AS character_set_name, collation_name AS collation_name
            FROM information_schema.columns
            WHERE table_schema = ?
            ORDER BY table_name, ordinal_position
        "#};
        let rows: Vec<Row> = conn.exec(sql, (schema,)).await?;

        for row in rows {
            let table_name = row.get_expect_string("table_name");
            let Some(table) = tables.get_mut(&table_name) else { continue };

            let extra = row.get_string("extra").unwrap_or_default();
            let nullable = row.get_string("is_nullable").as_deref() == Some("YES");
            let default = parse_column_default(flavor, row.get_string("column_default"), &extra, nullable);
            let on_update = extra
                .to_ascii_lowercase()
                .find("on update ")
                .map(|pos| extra[pos + "on update ".len()..].to_owned());

            table.columns.push(Column {
                name: row.get_expect_string("column_name"),
                type_in_db: row.get_expect_string("column_type"),
                nullable,
                auto_increment: extra.contains("auto_increment"),
                default,
                on_update,
                char_set: row.get_string("character_set_name"),
                collation: row.get_string("collation_name"),
            });
        }
        Ok(())
    }

    async fn get_all_indexes(
        &self,
        conn: &mut mysql_async::Conn,
        schema: &str,
        tables: &mut BTreeMap<String, Table>,
    ) -> DescriberResult<()> {
        let sql = indoc! {r#"
            SELECT table_name AS table_name, index_name AS index_name, non_unique AS non_unique,
                   column_name AS column_name, sub_part AS sub_part, index_type AS index_type,
                   collation AS collation
            FROM information_schema.statistics
            WHERE table_schema = ?
            ORDER BY table_name, index_name, seq_in_index
        "#};
        let rows: Vec<Row> = conn.exec(sql, (schema,)).await?;

        // (table, index) -> Index, in first-seen order per table.
        let mut order: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut indexes: BTreeMap<(String, String), Index> = BTreeMap::new();

        for row in rows {
            let table_name = row.get_expect_string("table_name");
            if !tables.contains_key(&table_name) {
                continue;
            }
            let index_name = row.get_expect_string("index_name");
            let column = IndexColumn {
                name: row.get_expect_string("column_name"),
                prefix_length: row.get_u64("sub_part").map(|n| n as u16),
                sort_order: match row.get_string("collation").as_deref() {
                    Some("D") => SortOrder::Desc,
                    _ => SortOrder::Asc,
                },
            };

            let entry = indexes
                .entry((table_name.clone(), index_name.clone()))
                .or_insert_with(|| {
                    order.entry(table_name).or_default().push(index_name.clone());
                    Index {
                        name: index_name,
                        columns: Vec::new(),
                        unique: !row.get_bool("non_unique").unwrap_or(true),
                        index_type: match row.get_string("index_type").as_deref() {
                            Some("FULLTEXT") => IndexType::Fulltext,
                            Some("SPATIAL") => IndexType::Spatial,
                            _ => IndexType::Normal,
                        },
                    }
                });
            entry.columns.push(column);
        }

        for (table_name, index_names) in order {
            let Some(table) = tables.get_mut(&table_name) else { continue };
            for index_name in index_names {
                let Some(index) = indexes.remove(&(table_name.clone(), index_name)) else {
                    continue;
                };
                if index.name == "PRIMARY" {
                    table.primary_key = Some(index);
                } else {
                    table.secondary_indexes.push(index);
                }
            }
        }
        Ok(())
    }

    async fn get_foreign_keys(
        &self,
        conn: &mut mysql_async::Conn,
        schema: &str,
        tables: &mut BTreeMap<String, Table>,
    ) -> DescriberResult<()> {
        let sql = indoc! {r#"
            SELECT kcu.table_name AS table_name, kcu.constraint_name AS constraint_name,
                   kcu.column_name AS column_name,
                   kcu.referenced_table_schema AS referenced_schema,
                   kcu.referenced_table_name AS referenced_table,
                   kcu.referenced_column_name AS referenced_column,
                   rc.delete_rule AS delete_rule, rc.update_rule AS update_rule
            FROM information_schema.key_column_usage kcu
            JOIN information_schema.referential_constraints rc
              ON rc.constraint_schema = kcu.constraint_schema
             AND rc.constraint_name = kcu.constraint_name
             AND rc.table_name = kcu.table_name
            WHERE kcu.table_schema = ? AND kcu.referenced_table_name IS NOT NULL
            ORDER BY kcu.table_name, kcu.constraint_name, kcu.ordinal_position
        "#};
        let rows: Vec<Row> = conn.exec(sql, (schema,)).await?;

        for row in rows {
            let table_name = row.get_expect_string("table_name");
            let Some(table) = tables.get_mut(&table_name) else { continue };

            let name = row.get_expect_string("constraint_name");
            let referenced_schema = row.get_string("referenced_schema").unwrap_or_default();
            let referenced_schema = if referenced_schema == schema {
                String::new()
            } else {
                referenced_schema
            };

            if let Some(fk) = table.foreign_keys.iter_mut().find(|fk| fk.name == name) {
                fk.columns.push(row.get_expect_string("column_name"));
                fk.referenced_columns.push(row.get_expect_string("referenced_column"));
            } else {
                table.foreign_keys.push(ForeignKey {
                    name,
                    columns: vec![row.get_expect_string("column_name")],
                    referenced_schema,
                    referenced_table: row.get_expect_string("referenced_table"),
                    referenced_columns: vec![row.get_expect_string("referenced_column")],
                    on_delete: ForeignKeyAction::from_sql(&row.get_expect_string("delete_rule")),
                    on_update: ForeignKeyAction::from_sql(&row.get_expect_string("update_rule")),
                });
            }
        }
        Ok(())
    }

    async fn get_check_constraints(
        &self,
        conn: &mut mysql_async::Conn,
        schema: &str,
        flavor: &Flavor,
        tables: &mut BTreeMap<String, Table>,
    ) -> DescriberResult<()> {
        if !flavor.supports_check_constraints() {
            return Ok(());
        }

        let rows: Vec<Row> = if flavor.is_mariadb() {
            let sql = indoc! {r#"
                SELECT table_name AS table_name, constraint_name AS constraint_name,
                       check_clause AS check_clause, 'YES' AS enforced
                FROM information_schema.check_constraints
                WHERE constraint_schema = ?
                ORDER BY table_name, constraint_name
            "#};
            conn.exec(sql, (schema,)).await?
        } else {
            let sql = indoc! {r#"
                SELECT tc.table_name AS table_name, cc.constraint_name AS constraint_name,
                       cc.check_clause AS check_clause, tc.enforced AS enforced
                FROM information_schema.table_constraints tc
                JOIN information_schema.check_constraints cc
                  ON cc.constraint_schema = tc.table_schema
                 AND cc.constraint_name = tc.constraint_name
                WHERE tc.table_schema = ? AND tc.constraint_type = 'CHECK'
                ORDER BY tc.table_name, cc.constraint_name
            "#};
            conn.exec(sql, (schema,)).await?
        };

        for row in rows {
            let table_name = row.get_expect_string("table_name");
            let Some(table) = tables.get_mut(&table_name) else { continue };
            table.checks.push(CheckConstraint {
                name: row.get_expect_string("constraint_name"),
                clause: trim_check_clause(&row.get_expect_string("check_clause")),
                enforced: row.get_string("enforced").as_deref() != Some("NO"),
            });
        }
        Ok(())
    }

    async fn get_create_statement(
        conn: &mut mysql_async::Conn,
        schema: &str,
        table: &str,
    ) -> DescriberResult<String> {
        let sql = format!("SHOW CREATE TABLE `{schema}`.`{table}`");
        let row: Option<(String, String)> = conn.query_first(sql).await?;
        Ok(row.map(|(_, create)| create).unwrap_or_default())
    }
}

/// The character set a collation belongs to is its name's first segment
/// (`utf8mb4_unicode_ci` -> `utf8mb4`).
fn char_set_of_collation(collation: &str) -> String {
    collation.split('_').next().unwrap_or_default().to_owned()
}

/// MariaDB 10.2+ reports defaults as SQL expressions (literals arrive
/// quoted); MySQL reports bare literals with an `extra` marker for
/// expression defaults.
fn parse_column_default(flavor: &Flavor, raw: Option<String>, extra: &str, _nullable: bool) -> ColumnDefault {
    let Some(raw) = raw else { return ColumnDefault::Null };

    if flavor.is_mariadb() {
        if raw == "NULL" {
            ColumnDefault::Null
        } else if raw.starts_with('\'') {
            ColumnDefault::Literal(unquote_string(&raw))
        } else if raw.chars().all(|c| c.is_ascii_digit() || c == '.' || c == '-') {
            ColumnDefault::Literal(raw)
        } else {
            ColumnDefault::Expression(raw)
        }
    } else if extra.contains("DEFAULT_GENERATED") || raw.to_ascii_uppercase().starts_with("CURRENT_TIMESTAMP") {
        ColumnDefault::Expression(raw)
    } else {
        ColumnDefault::Literal(raw)
    }
}

fn unquote_string(val: &str) -> String {
    val.trim_start_matches('\'').trim_end_matches('\'').replace("''", "'")
}

/// MariaDB wraps check clauses in one pair of parentheses, MySQL in two.
/// Strip a single balanced outer pair so clauses compare stably.
fn trim_check_clause(clause: &str) -> String {
    let trimmed = clause.trim();
    if let Some(inner) = trimmed.strip_prefix('(').and_then(|s| s.strip_suffix(')')) {
        let mut depth = 0i32;
        for c in inner.chars() {
            match c {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth < 0 {
                        return trimmed.to_owned();
                    }
                }
                _ => {}
            }
        }
        return inner.to_owned();
    }
    trimmed.to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flavor::{MYSQL_80, Vendor};
    use pretty_assertions::assert_eq;

    #[test]
    fn partition_clause_is_extracted_from_create_statements() {
        let create = "CREATE TABLE `t` (\n  `id` int NOT NULL\n) ENGINE=InnoDB\n/*!50100 PARTITION BY RANGE (id)\n(PARTITION p0 VALUES LESS THAN (10) ENGINE = InnoDB) */";
        let caps = PARTITION_RE.captures(create).unwrap();
        assert!(caps[1].starts_with("PARTITION BY RANGE (id)"));
        assert!(!caps[1].contains("*/"));
    }

    #[test]
    fn generated_columns_flag_the_table_as_unsupported() {
        let create = "CREATE TABLE `t` (\n  `a` int,\n  `b` int GENERATED ALWAYS AS (`a` + 1) STORED\n)";
        assert!(UNSUPPORTED_FEATURE_RE.is_match(create));

        let plain = "CREATE TABLE `t` (\n  `a` int\n)";
        assert!(!UNSUPPORTED_FEATURE_RE.is_match(plain));
    }

    #[test]
    fn mariadb_defaults_are_parsed_as_expressions_or_literals() {
        let mariadb = Flavor::new(Vendor::MariaDb, 10, 6);

        assert_eq!(
            parse_column_default(&mariadb, Some("'abc'".into()), "", true),
            ColumnDefault::Literal("abc".into())
        );
        assert_eq!(
            parse_column_default(&mariadb, Some("NULL".into()), "", true),
            ColumnDefault::Null
        );
        assert_eq!(
            parse_column_default(&mariadb, Some("42".into()), "", true),
            ColumnDefault::Literal("42".into())
        );
        assert_eq!(
            parse_column_default(&mariadb, Some("current_timestamp()".into()), "", true),
            ColumnDefault::Expression("current_timestamp()".into())
        );
    }

    #[test]
    fn mysql_expression_defaults_need_the_extra_marker() {
        assert_eq!(
            parse_column_default(&MYSQL_80, Some("uuid()".into()), "DEFAULT_GENERATED", false),
            ColumnDefault::Expression("uuid()".into())
        );
        assert_eq!(
            parse_column_default(&MYSQL_80, Some("1".into()), "", false),
            ColumnDefault::Literal("1".into())
        );
        assert_eq!(parse_column_default(&MYSQL_80, None, "", true), ColumnDefault::Null);
    }

    #[test]
    fn check_clauses_lose_one_level_of_parentheses() {
        assert_eq!(trim_check_clause("(`a` > 1)"), "`a` > 1");
        assert_eq!(trim_check_clause("((`a` > 1) and (`b` < 2))"), "(`a` > 1) and (`b` < 2)");
        assert_eq!(trim_check_clause("`a` > 1"), "`a` > 1");
    }
}
