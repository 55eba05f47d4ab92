//! DDL text fragments. Everything here renders descriptor values into the
//! backtick-quoted syntax the server hands back from `SHOW CREATE TABLE`.

use itertools::Itertools;
use mysql_schema_describer::{
    CheckConstraint, Column, ColumnDefault, ForeignKey, ForeignKeyAction, Index, IndexType, SortOrder, Table,
};
use std::fmt::{self, Display, Write as _};

pub(crate) const SQL_INDENTATION: &str = "  ";

pub(crate) struct Ident<'a>(pub &'a str);

impl Display for Ident<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("`")?;
        f.write_str(self.0)?;
        f.write_str("`")
    }
}

pub(crate) fn escape_string(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\'', "''")
}

pub(crate) fn render_column_definition(column: &Column) -> String {
    let mut out = format!("{} {}", Ident(&column.name), column.type_in_db);

    if let Some(char_set) = &column.char_set {
        write!(out, " CHARACTER SET {char_set}").unwrap();
    }
    if let Some(collation) = &column.collation {
        write!(out, " COLLATE {collation}").unwrap();
    }

    if !column.nullable {
        out.push_str(" NOT NULL");
    }

    match &column.default {
        ColumnDefault::Null => {
            if column.nullable {
                out.push_str(" DEFAULT NULL");
            }
        }
        ColumnDefault::Literal(value) => {
            write!(out, " DEFAULT '{}'", escape_string(value)).unwrap();
        }
        ColumnDefault::Expression(expr) => {
            write!(out, " DEFAULT {expr}").unwrap();
        }
    }

    if let Some(on_update) = &column.on_update {
        write!(out, " ON UPDATE {on_update}").unwrap();
    }

    if column.auto_increment {
        out.push_str(" AUTO_INCREMENT");
    }

    out
}

fn render_index_columns(index: &Index) -> String {
    index
        .columns
        .iter()
        .map(|col| {
            let mut rendered = Ident(&col.name).to_string();
            if let Some(length) = col.prefix_length {
                write!(rendered, "({length})").unwrap();
            }
            if col.sort_order == SortOrder::Desc {
                rendered.push_str(" DESC");
            }
            rendered
        })
        .join(",")
}

pub(crate) fn render_index(index: &Index) -> String {
    let kind = match (index.index_type, index.unique) {
        (IndexType::Fulltext, _) => "FULLTEXT KEY",
        (IndexType::Spatial, _) => "SPATIAL KEY",
        (IndexType::Normal, true) => "UNIQUE KEY",
        (IndexType::Normal, false) => "KEY",
    };

    format!("{} {} ({})", kind, Ident(&index.name), render_index_columns(index))
}

pub(crate) fn render_primary_key(index: &Index) -> String {
    format!("PRIMARY KEY ({})", render_index_columns(index))
}

pub(crate) fn render_foreign_key(fk: &ForeignKey) -> String {
    let mut out = format!(
        "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES ",
        Ident(&fk.name),
        fk.columns.iter().map(|c| Ident(c).to_string()).join(",")
    );

    if !fk.referenced_schema.is_empty() {
        write!(out, "{}.", Ident(&fk.referenced_schema)).unwrap();
    }
    write!(
        out,
        "{} ({})",
        Ident(&fk.referenced_table),
        fk.referenced_columns.iter().map(|c| Ident(c).to_string()).join(",")
    )
    .unwrap();

    if fk.on_delete != ForeignKeyAction::NoAction {
        write!(out, " ON DELETE {}", fk.on_delete.as_sql()).unwrap();
    }
    if fk.on_update != ForeignKeyAction::NoAction {
        write!(out, " ON UPDATE {}", fk.on_update.as_sql()).unwrap();
    }

    out
}

pub(crate) fn render_check(check: &CheckConstraint) -> String {
    let mut out = format!("CONSTRAINT {} CHECK ({})", Ident(&check.name), check.clause);
    if !check.enforced {
        out.push_str(" NOT ENFORCED");
    }
    out
}

/// A multi-line CREATE TABLE generated from the descriptor. Used for error
/// descriptions when the raw statement from the server is not available.
pub(crate) fn generate_create(table: &Table) -> String {
    let mut lines: Vec<String> = table.columns.iter().map(render_column_definition).collect();

    if let Some(pk) = &table.primary_key {
        lines.push(render_primary_key(pk));
    }
    lines.extend(table.secondary_indexes.iter().map(render_index));
    lines.extend(table.foreign_keys.iter().map(render_foreign_key));
    lines.extend(table.checks.iter().map(render_check));

    let mut out = format!("CREATE TABLE {} (\n", Ident(&table.name));
    out.push_str(
        &lines
            .iter()
            .map(|line| format!("{SQL_INDENTATION}{line}"))
            .join(",\n"),
    );
    out.push_str("\n)");

    if !table.engine.is_empty() {
        write!(out, " ENGINE={}", table.engine).unwrap();
    }
    if table.next_auto_increment > 1 {
        write!(out, " AUTO_INCREMENT={}", table.next_auto_increment).unwrap();
    }
    if !table.char_set.is_empty() {
        write!(out, " DEFAULT CHARSET={}", table.char_set).unwrap();
    }
    if !table.collation.is_empty() {
        write!(out, " COLLATE={}", table.collation).unwrap();
    }
    if let Some(partitioning) = &table.partitioning {
        write!(out, "\n{partitioning}").unwrap();
    }

    out
}
