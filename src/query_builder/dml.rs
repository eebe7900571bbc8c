use crate::dialect::Dialect;
use crate::engine::TableColumn;
use crate::frame::Frame;
use crate::type_mapper::ColumnDecl;

use super::RenderedQuery;

/// Upper bound on rows per INSERT regardless of the parameter budget.
const MAX_ROWS_PER_INSERT: usize = 1_000;

#[must_use]
pub fn create_table_sql(
    dialect: Dialect,
    schema: &str,
    table: &str,
    columns: &[ColumnDecl],
) -> String {
    let definitions: Vec<String> = columns
        .iter()
        .map(|decl| {
            format!(
                "{} {}",
                dialect.quote_ident(&decl.name),
                dialect.column_type_sql(decl.column_type)
            )
        })
        .collect();
    format!(
        "CREATE TABLE {} ({})",
        dialect.qualified(schema, table),
        definitions.join(", ")
    )
}

#[must_use]
pub fn drop_table_sql(dialect: Dialect, schema: &str, table: &str) -> String {
    format!("DROP TABLE IF EXISTS {}", dialect.qualified(schema, table))
}

#[must_use]
pub fn delete_rows_sql(dialect: Dialect, schema: &str, table: &str) -> String {
    format!("DELETE FROM {}", dialect.qualified(schema, table))
}

/// Multi-row INSERT statements covering every row of `frame`, chunked so no statement exceeds
/// the dialect's bind-parameter limit.
///
/// `declared` holds the target table's column types when the table already existed; values for
/// columns the dialect cannot bind natively are cast from text. Columns not listed bind as-is.
#[must_use]
pub fn insert_statements(
    dialect: Dialect,
    schema: &str,
    table: &str,
    frame: &Frame,
    declared: &[TableColumn],
) -> Vec<RenderedQuery> {
    let width = frame.num_columns();
    if width == 0 || frame.num_rows() == 0 {
        return Vec::new();
    }

    let rows_per_statement = (dialect.max_bind_params() / width).clamp(1, MAX_ROWS_PER_INSERT);
    let column_list: Vec<String> = frame
        .columns()
        .iter()
        .map(|c| dialect.quote_ident(&c.name))
        .collect();
    let casts: Vec<Option<&str>> = frame
        .columns()
        .iter()
        .map(|c| {
            declared
                .iter()
                .find(|d| d.name == c.name)
                .map(|d| d.sql_type.as_str())
                .filter(|sql_type| !dialect.binds_natively(sql_type))
        })
        .collect();
    let prefix = format!(
        "INSERT INTO {} ({}) VALUES ",
        dialect.qualified(schema, table),
        column_list.join(", ")
    );

    frame
        .rows()
        .chunks(rows_per_statement)
        .map(|rows| {
            let mut params = Vec::with_capacity(rows.len() * width);
            let tuples: Vec<String> = rows
                .iter()
                .map(|row| {
                    let placeholders: Vec<String> = row
                        .iter()
                        .zip(&casts)
                        .map(|(value, cast)| {
                            params.push(value.clone());
                            match cast {
                                Some(sql_type) => dialect.typed_placeholder(params.len(), sql_type),
                                None => dialect.placeholder(params.len()),
                            }
                        })
                        .collect();
                    format!("({})", placeholders.join(", "))
                })
                .collect();
            RenderedQuery {
                sql: format!("{prefix}{}", tuples.join(", ")),
                params,
            }
        })
        .collect()
}
