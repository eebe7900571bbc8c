use std::fmt;

use crate::dialect::Dialect;
use crate::engine::{TableColumn, TableRef};

use super::{OrderTerm, Predicate, Projection, RenderedQuery};

/// A validated read statement. Build one with [`build_select`](super::build_select).
#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
    pub(crate) schema: String,
    pub(crate) table: String,
    pub(crate) projection: Projection,
    pub(crate) output_columns: Vec<TableColumn>,
    pub(crate) predicates: Vec<Predicate>,
    pub(crate) order_by: Vec<OrderTerm>,
    pub(crate) limit: Option<u64>,
}

impl SelectStatement {
    pub(crate) fn new(
        table: &TableRef,
        projection: Projection,
        output_columns: Vec<TableColumn>,
    ) -> Self {
        Self {
            schema: table.schema.clone(),
            table: table.name.clone(),
            projection,
            output_columns,
            predicates: Vec::new(),
            order_by: Vec::new(),
            limit: None,
        }
    }

    #[must_use]
    pub fn schema(&self) -> &str {
        &self.schema
    }

    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    #[must_use]
    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    /// Columns the statement returns, in result order, with their declared types.
    #[must_use]
    pub fn output_columns(&self) -> &[TableColumn] {
        &self.output_columns
    }

    #[must_use]
    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    #[must_use]
    pub fn order_by(&self) -> &[OrderTerm] {
        &self.order_by
    }

    #[must_use]
    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    /// Render SQL for `dialect`. NULL filters are inlined as `IS NULL`; every other filter value
    /// becomes a bind parameter. Columns the dialect cannot decode are selected as text, which
    /// expands `*` into the column list.
    #[must_use]
    pub fn render(&self, dialect: Dialect) -> RenderedQuery {
        let mut sql = String::from("SELECT ");
        let all_native = self
            .output_columns
            .iter()
            .all(|c| dialect.binds_natively(&c.sql_type));
        match &self.projection {
            Projection::All if all_native => sql.push('*'),
            _ => {
                let exprs: Vec<String> = self
                    .output_columns
                    .iter()
                    .map(|c| dialect.select_expr(c))
                    .collect();
                sql.push_str(&exprs.join(", "));
            }
        }
        sql.push_str(" FROM ");
        sql.push_str(&dialect.qualified(&self.schema, &self.table));

        let mut params = Vec::new();
        if !self.predicates.is_empty() {
            let clauses: Vec<String> = self
                .predicates
                .iter()
                .map(|predicate| {
                    let column = dialect.quote_ident(&predicate.column);
                    if predicate.value.is_null() {
                        format!("{column} IS NULL")
                    } else {
                        params.push(predicate.value.clone());
                        let placeholder =
                            dialect.typed_placeholder(params.len(), &predicate.sql_type);
                        format!("{column} = {placeholder}")
                    }
                })
                .collect();
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }

        if !self.order_by.is_empty() {
            let terms: Vec<String> = self
                .order_by
                .iter()
                .map(|term| {
                    format!(
                        "{} {}",
                        dialect.quote_ident(&term.column),
                        term.direction.as_sql()
                    )
                })
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&terms.join(", "));
        }

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        RenderedQuery { sql, params }
    }
}

impl fmt::Display for SelectStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(Dialect::Postgres).sql)
    }
}
