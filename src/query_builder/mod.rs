//! Builds validated SELECT statements from [`ReadSettings`] and the DDL/DML used by bulk writes.
//!
//! A read statement is composed in four independent stages: column selection, filters,
//! ordering and limit. Every column a stage references is checked against the reflected table
//! first; the first unknown column aborts the build.

use crate::engine::{TableColumn, TableRef};
use crate::error::DatasetError;
use crate::settings::{ReadSettings, SortDirection};
use crate::types::RowValues;

mod dml;
mod select;

pub use dml::{create_table_sql, delete_rows_sql, drop_table_sql, insert_statements};
pub use select::SelectStatement;

/// Which columns a statement returns.
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    /// `*`, in table order.
    All,
    Columns(Vec<String>),
}

/// `column = value` (or `column IS NULL` for a NULL value).
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub column: String,
    /// Declared type of `column`, used to bind `value`.
    pub sql_type: String,
    pub value: RowValues,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderTerm {
    pub column: String,
    pub direction: SortDirection,
}

/// SQL text plus its bind parameters, in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedQuery {
    pub sql: String,
    pub params: Vec<RowValues>,
}

/// Build the read statement for `table`.
///
/// # Errors
/// Returns `DatasetError::ColumnNotFound` naming the first unknown column and listing the
/// table's columns.
pub fn build_select(
    table: &TableRef,
    read: Option<&ReadSettings>,
) -> Result<SelectStatement, DatasetError> {
    let statement = select_columns(table, read)?;
    let statement = apply_filters(statement, table, read)?;
    let statement = apply_order_by(statement, table, read)?;
    Ok(apply_limit(statement, read))
}

/// Look up `column` in `table`.
///
/// # Errors
/// Returns `DatasetError::ColumnNotFound` when the table has no such column.
pub fn validate_column<'t>(
    table: &'t TableRef,
    column: &str,
) -> Result<&'t TableColumn, DatasetError> {
    table
        .column(column)
        .ok_or_else(|| DatasetError::ColumnNotFound {
            column: column.to_string(),
            table: table.name.clone(),
            available: table.column_names(),
        })
}

fn select_columns(
    table: &TableRef,
    read: Option<&ReadSettings>,
) -> Result<SelectStatement, DatasetError> {
    match read.and_then(|r| r.columns.as_deref()) {
        Some(columns) if !columns.is_empty() => {
            let selected = columns
                .iter()
                .map(|name| validate_column(table, name).cloned())
                .collect::<Result<Vec<_>, _>>()?;
            Ok(SelectStatement::new(
                table,
                Projection::Columns(columns.to_vec()),
                selected,
            ))
        }
        _ => Ok(SelectStatement::new(
            table,
            Projection::All,
            table.columns.clone(),
        )),
    }
}

fn apply_filters(
    mut statement: SelectStatement,
    table: &TableRef,
    read: Option<&ReadSettings>,
) -> Result<SelectStatement, DatasetError> {
    let Some(filters) = read.and_then(|r| r.filters.as_ref()) else {
        return Ok(statement);
    };

    statement.predicates = filters
        .iter()
        .map(|(column, value)| {
            let declared = validate_column(table, column)?;
            Ok(Predicate {
                column: column.clone(),
                sql_type: declared.sql_type.clone(),
                value: value.clone(),
            })
        })
        .collect::<Result<Vec<_>, DatasetError>>()?;
    Ok(statement)
}

fn apply_order_by(
    mut statement: SelectStatement,
    table: &TableRef,
    read: Option<&ReadSettings>,
) -> Result<SelectStatement, DatasetError> {
    let Some(order_by) = read.and_then(|r| r.order_by.as_ref()) else {
        return Ok(statement);
    };

    let mut terms = Vec::with_capacity(order_by.len());
    for entry in order_by {
        validate_column(table, entry.column())?;
        terms.push(OrderTerm {
            column: entry.column().to_string(),
            direction: entry.direction(),
        });
    }
    statement.order_by = terms;
    Ok(statement)
}

fn apply_limit(mut statement: SelectStatement, read: Option<&ReadSettings>) -> SelectStatement {
    statement.limit = read.and_then(|r| r.limit);
    statement
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Dialect;
    use crate::settings::OrderBy;

    fn users() -> TableRef {
        TableRef::new(
            "public",
            "users",
            vec![
                TableColumn::new("id", "bigint"),
                TableColumn::new("name", "text"),
                TableColumn::new("status", "text"),
                TableColumn::new("created_at", "timestamp"),
            ],
        )
    }

    #[test]
    fn no_settings_selects_everything() {
        let statement = build_select(&users(), None).unwrap();
        assert_eq!(statement.projection(), &Projection::All);
        assert!(statement.predicates().is_empty());
        assert!(statement.order_by().is_empty());
        assert_eq!(statement.limit(), None);
        let rendered = statement.render(Dialect::Postgres);
        assert_eq!(rendered.sql, "SELECT * FROM \"public\".\"users\"");
        assert!(rendered.params.is_empty());
    }

    #[test]
    fn empty_column_list_selects_everything() {
        let read = ReadSettings::default().with_columns(Vec::<String>::new());
        let statement = build_select(&users(), Some(&read)).unwrap();
        assert_eq!(statement.projection(), &Projection::All);
        assert_eq!(statement.output_columns().len(), 4);
    }

    #[test]
    fn selected_columns_keep_requested_order() {
        let read = ReadSettings::default().with_columns(["name", "id"]);
        let statement = build_select(&users(), Some(&read)).unwrap();
        assert_eq!(
            statement.projection(),
            &Projection::Columns(vec!["name".into(), "id".into()])
        );
        assert_eq!(
            statement.render(Dialect::Sqlite).sql,
            "SELECT \"name\", \"id\" FROM \"public\".\"users\""
        );
        assert_eq!(statement.output_columns()[0].sql_type, "text");
    }

    #[test]
    fn unknown_column_lists_available_columns() {
        let read = ReadSettings::default().with_columns(["id", "nope", "also_nope"]);
        let err = build_select(&users(), Some(&read)).unwrap_err();
        match err {
            DatasetError::ColumnNotFound {
                column,
                table,
                available,
            } => {
                assert_eq!(column, "nope");
                assert_eq!(table, "users");
                assert_eq!(available, vec!["id", "name", "status", "created_at"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn filters_are_validated_and_anded() {
        let read = ReadSettings::default()
            .with_filter("status", RowValues::Text("active".into()))
            .with_filter("id", RowValues::Int(7));
        let rendered = build_select(&users(), Some(&read))
            .unwrap()
            .render(Dialect::Postgres);
        assert_eq!(
            rendered.sql,
            "SELECT * FROM \"public\".\"users\" WHERE \"status\" = $1 AND \"id\" = $2"
        );
        assert_eq!(
            rendered.params,
            vec![RowValues::Text("active".into()), RowValues::Int(7)]
        );

        let bad = ReadSettings::default().with_filter("ghost", RowValues::Int(1));
        assert!(matches!(
            build_select(&users(), Some(&bad)),
            Err(DatasetError::ColumnNotFound { column, .. }) if column == "ghost"
        ));
    }

    #[test]
    fn first_unknown_filter_in_caller_order_is_reported() {
        let read = ReadSettings::default()
            .with_filter("zeta_missing", RowValues::Int(1))
            .with_filter("alpha_missing", RowValues::Int(2));
        assert!(matches!(
            build_select(&users(), Some(&read)),
            Err(DatasetError::ColumnNotFound { column, .. }) if column == "zeta_missing"
        ));
    }

    #[test]
    fn undecodable_columns_are_projected_as_text() {
        let products = TableRef::new(
            "public",
            "products",
            vec![
                TableColumn::new("id", "integer"),
                TableColumn::new("price", "numeric(10,2)"),
                TableColumn::new("sku", "uuid"),
            ],
        );
        let read = ReadSettings::default()
            .with_filter("price", RowValues::Float(9.99))
            .with_filter("id", RowValues::Text("1".into()));
        let rendered = build_select(&products, Some(&read))
            .unwrap()
            .render(Dialect::Postgres);
        assert_eq!(
            rendered.sql,
            "SELECT \"id\", \"price\"::text AS \"price\", \"sku\"::text AS \"sku\" \
             FROM \"public\".\"products\" \
             WHERE \"price\" = CAST($1::text AS numeric(10,2)) AND \"id\" = $2"
        );

        let narrowed = ReadSettings::default().with_columns(["sku"]);
        assert_eq!(
            build_select(&products, Some(&narrowed))
                .unwrap()
                .render(Dialect::Postgres)
                .sql,
            "SELECT \"sku\"::text AS \"sku\" FROM \"public\".\"products\""
        );
        assert_eq!(
            build_select(&products, None).unwrap().render(Dialect::Sqlite).sql,
            "SELECT * FROM \"public\".\"products\""
        );
    }

    #[test]
    fn null_filters_render_is_null() {
        let read = ReadSettings::default()
            .with_filter("name", RowValues::Null)
            .with_filter("status", RowValues::Text("x".into()));
        let rendered = build_select(&users(), Some(&read))
            .unwrap()
            .render(Dialect::Sqlite);
        assert_eq!(
            rendered.sql,
            "SELECT * FROM \"public\".\"users\" WHERE \"name\" IS NULL AND \"status\" = ?1"
        );
        assert_eq!(rendered.params, vec![RowValues::Text("x".into())]);
    }

    #[test]
    fn order_by_mixes_bare_names_and_pairs() {
        let read = ReadSettings::default().with_order_by([
            OrderBy::from(("created_at", "desc")),
            OrderBy::from("name"),
            OrderBy::from(("id", "DESC")),
            OrderBy::from(("status", "random")),
        ]);
        let statement = build_select(&users(), Some(&read)).unwrap();
        let terms: Vec<(&str, SortDirection)> = statement
            .order_by()
            .iter()
            .map(|t| (t.column.as_str(), t.direction))
            .collect();
        assert_eq!(
            terms,
            vec![
                ("created_at", SortDirection::Desc),
                ("name", SortDirection::Asc),
                ("id", SortDirection::Desc),
                ("status", SortDirection::Asc),
            ]
        );
        assert!(statement.render(Dialect::Postgres).sql.ends_with(
            "ORDER BY \"created_at\" DESC, \"name\" ASC, \"id\" DESC, \"status\" ASC"
        ));
    }

    #[test]
    fn order_by_validates_columns() {
        let read = ReadSettings::default().with_order_by([OrderBy::desc("updated_at")]);
        assert!(matches!(
            build_select(&users(), Some(&read)),
            Err(DatasetError::ColumnNotFound { column, .. }) if column == "updated_at"
        ));
    }

    #[test]
    fn all_stages_compose() {
        let read = ReadSettings::default()
            .with_columns(["id", "name"])
            .with_filter("status", RowValues::Text("active".into()))
            .with_order_by([OrderBy::asc("created_at")])
            .with_limit(100);
        let statement = build_select(&users(), Some(&read)).unwrap();
        assert_eq!(statement.limit(), Some(100));
        assert_eq!(
            statement.render(Dialect::Postgres).sql,
            "SELECT \"id\", \"name\" FROM \"public\".\"users\" WHERE \"status\" = $1 \
             ORDER BY \"created_at\" ASC LIMIT 100"
        );
    }

    #[test]
    fn zero_limit_is_kept() {
        let read = ReadSettings::default().with_limit(0);
        let statement = build_select(&users(), Some(&read)).unwrap();
        assert!(statement.render(Dialect::Sqlite).sql.ends_with("LIMIT 0"));
    }
}
