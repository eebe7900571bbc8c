use crate::engine::TableColumn;
use crate::type_mapper::TargetColumnType;

/// SQL flavour a statement is rendered for.
///
/// Both dialects quote identifiers with double quotes; they differ in placeholder style,
/// default schema, DDL type names and bind-parameter limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// `$1`-style placeholders.
    Postgres,
    /// `?1`-style placeholders.
    Sqlite,
}

impl Dialect {
    /// Quote an identifier, doubling embedded quotes.
    #[must_use]
    pub fn quote_ident(self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    /// `"schema"."table"`
    #[must_use]
    pub fn qualified(self, schema: &str, table: &str) -> String {
        format!("{}.{}", self.quote_ident(schema), self.quote_ident(table))
    }

    /// Placeholder for the 1-based parameter `index`.
    #[must_use]
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${index}"),
            Dialect::Sqlite => format!("?{index}"),
        }
    }

    /// Whether values of a column declared as `sql_type` decode and bind without going through
    /// text. Always true for SQLite, whose values carry their own storage class.
    #[must_use]
    pub fn binds_natively(self, sql_type: &str) -> bool {
        match self {
            Dialect::Postgres => is_native_postgres_type(sql_type),
            Dialect::Sqlite => true,
        }
    }

    /// Select-list expression for `column`. Columns the driver cannot decode are read as text.
    #[must_use]
    pub fn select_expr(self, column: &TableColumn) -> String {
        let quoted = self.quote_ident(&column.name);
        if self.binds_natively(&column.sql_type) {
            quoted
        } else {
            format!("{quoted}::text AS {quoted}")
        }
    }

    /// Placeholder for a value compared with, or stored into, a column declared as `sql_type`.
    ///
    /// For types the driver cannot encode the value is bound as text and cast server-side.
    #[must_use]
    pub fn typed_placeholder(self, index: usize, sql_type: &str) -> String {
        let placeholder = self.placeholder(index);
        if self.binds_natively(sql_type) {
            placeholder
        } else {
            format!("CAST({placeholder}::text AS {sql_type})")
        }
    }

    /// Schema used when the dataset does not name one.
    #[must_use]
    pub fn default_schema(self) -> &'static str {
        match self {
            Dialect::Postgres => "public",
            Dialect::Sqlite => "main",
        }
    }

    /// Most bind parameters one statement may carry.
    #[must_use]
    pub fn max_bind_params(self) -> usize {
        match self {
            Dialect::Postgres => 65_535,
            Dialect::Sqlite => 32_766,
        }
    }

    #[must_use]
    pub fn column_type_sql(self, column_type: TargetColumnType) -> String {
        match (self, column_type) {
            (_, TargetColumnType::SmallInteger) => "SMALLINT".to_string(),
            (_, TargetColumnType::BigInteger) => "BIGINT".to_string(),
            (Dialect::Postgres, TargetColumnType::Float) => "DOUBLE PRECISION".to_string(),
            (Dialect::Sqlite, TargetColumnType::Float) => "REAL".to_string(),
            (_, TargetColumnType::Boolean) => "BOOLEAN".to_string(),
            (Dialect::Postgres, TargetColumnType::DateTime) => "TIMESTAMP".to_string(),
            (Dialect::Sqlite, TargetColumnType::DateTime) => "DATETIME".to_string(),
            (_, TargetColumnType::String { length }) => format!("VARCHAR({length})"),
        }
    }
}

/// Base type name with length/precision modifiers removed: `numeric(10,2)` becomes `numeric`,
/// `timestamp(3) without time zone` becomes `timestamp without time zone`.
fn base_type_name(sql_type: &str) -> String {
    let mut base = String::with_capacity(sql_type.len());
    let mut depth = 0usize;
    for ch in sql_type.trim().chars() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ if depth == 0 => base.push(ch.to_ascii_lowercase()),
            _ => {}
        }
    }
    base.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_native_postgres_type(sql_type: &str) -> bool {
    matches!(
        base_type_name(sql_type).as_str(),
        "smallint"
            | "int2"
            | "integer"
            | "int"
            | "int4"
            | "bigint"
            | "int8"
            | "real"
            | "float4"
            | "double precision"
            | "float8"
            | "boolean"
            | "bool"
            | "text"
            | "character varying"
            | "varchar"
            | "character"
            | "char"
            | "bpchar"
            | "name"
            | "timestamp"
            | "timestamp without time zone"
            | "timestamp with time zone"
            | "timestamptz"
            | "date"
            | "json"
            | "jsonb"
            | "bytea"
    )
}
