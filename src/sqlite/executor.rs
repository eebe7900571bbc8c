use async_trait::async_trait;
use rusqlite::Connection;
use tracing::debug;

use super::config::SqliteEngine;
use super::params::Params;
use super::query::{dtype_for_declared, query_chunks, table_columns, table_exists};
use crate::dialect::Dialect;
use crate::engine::{Engine, PoolStatus, TableRef, WritePlan, WriteRequest, prepare_write};
use crate::error::DatasetError;
use crate::frame::Frame;
use crate::query_builder::{
    SelectStatement, create_table_sql, delete_rows_sql, drop_table_sql, insert_statements,
};
use crate::type_mapper::ColumnDecl;

#[async_trait]
impl Engine for SqliteEngine {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn status(&self) -> PoolStatus {
        match self.pool() {
            Ok(pool) => {
                let state = pool.state();
                PoolStatus {
                    connections: state.connections,
                    idle_connections: state.idle_connections,
                    max_size: self.max_size(),
                }
            }
            Err(_) => PoolStatus {
                max_size: self.max_size(),
                ..PoolStatus::default()
            },
        }
    }

    async fn probe(&self) -> Result<(), DatasetError> {
        self.run_blocking(|conn| {
            let tx = conn.transaction()?;
            tx.query_row("SELECT 1", [], |_| Ok(()))?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn reflect_table(&self, schema: &str, table: &str) -> Result<TableRef, DatasetError> {
        let (schema, table) = (schema.to_string(), table.to_string());
        self.run_blocking(move |conn| {
            let columns = table_columns(conn, &schema, &table)?;
            if columns.is_empty() {
                return Err(DatasetError::TableNotFound { schema, table });
            }
            Ok(TableRef::new(schema, table, columns))
        })
        .await
    }

    async fn fetch_chunks(
        &self,
        statement: &SelectStatement,
        chunk_size: usize,
    ) -> Result<Vec<Frame>, DatasetError> {
        let rendered = statement.render(Dialect::Sqlite);
        let declared: Vec<_> = statement
            .output_columns()
            .iter()
            .map(|c| dtype_for_declared(&c.sql_type))
            .collect();
        let chunks = self
            .run_blocking(move |conn| query_chunks(conn, &rendered, &declared, chunk_size))
            .await?;
        debug!(chunks = chunks.len(), "sqlite read finished");
        Ok(chunks)
    }

    async fn write_frame(&self, frame: &Frame, request: &WriteRequest) -> Result<u64, DatasetError> {
        let (frame, decls) = prepare_write(frame, request);
        let frame = frame.into_owned();
        let request = request.clone();
        self.run_blocking(move |conn| write_in_transaction(conn, &frame, &request, &decls))
            .await
    }

    fn dispose(&self) {
        if self.release() {
            debug!(target_db = ?self.target(), "sqlite pool released");
        }
    }
}

fn write_in_transaction(
    conn: &mut Connection,
    frame: &Frame,
    request: &WriteRequest,
    decls: &[ColumnDecl],
) -> Result<u64, DatasetError> {
    let dialect = Dialect::Sqlite;
    let (schema, table) = (request.schema.as_str(), request.table.as_str());
    let qualified = dialect.qualified(schema, table);

    let tx = conn.transaction()?;
    let exists = table_exists(&tx, schema, table)?;
    let plan = WritePlan::for_mode(request.mode, exists, &qualified)?;
    debug!(table = %qualified, exists, ?plan, "sqlite write plan");

    if plan.drop_table {
        tx.execute_batch(&drop_table_sql(dialect, schema, table))?;
    }
    if plan.delete_rows {
        tx.execute_batch(&delete_rows_sql(dialect, schema, table))?;
    }
    if plan.create_table {
        tx.execute_batch(&create_table_sql(dialect, schema, table, decls))?;
    }

    let mut inserted = 0_u64;
    for insert in insert_statements(dialect, schema, table, frame, &[]) {
        let params = Params::convert(&insert.params);
        let affected = tx.execute(&insert.sql, rusqlite::params_from_iter(params.as_values()))?;
        inserted += affected as u64;
    }
    tx.commit()?;
    Ok(inserted)
}
