use async_trait::async_trait;
use tokio_postgres::GenericClient;
use tracing::debug;

use super::config::{PostgresEngine, checkout};
use super::params::Params;
use super::query::{build_frame, frame_columns};
use crate::dialect::Dialect;
use crate::engine::{
    Engine, PoolStatus, TableColumn, TableRef, WritePlan, WriteRequest, prepare_write,
};
use crate::error::DatasetError;
use crate::frame::Frame;
use crate::query_builder::{
    SelectStatement, create_table_sql, delete_rows_sql, drop_table_sql, insert_statements,
};

/// Column names and their full declared types (`numeric(10,2)`, `character varying(20)`), usable
/// as cast targets.
const REFLECT_COLUMNS: &str = "SELECT a.attname::text, format_type(a.atttypid, a.atttypmod) \
     FROM pg_catalog.pg_attribute a \
     JOIN pg_catalog.pg_class c ON c.oid = a.attrelid \
     JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace \
     WHERE n.nspname::text = $1 AND c.relname::text = $2 \
       AND c.relkind IN ('r', 'p', 'v', 'm', 'f') \
       AND a.attnum > 0 AND NOT a.attisdropped \
     ORDER BY a.attnum";

const TABLE_EXISTS: &str = "SELECT EXISTS (SELECT 1 FROM information_schema.tables \
     WHERE table_schema::text = $1 AND table_name::text = $2)";

#[async_trait]
impl Engine for PostgresEngine {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
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
        let pool = self.pool()?;
        let mut conn = checkout(&pool).await?;
        let tx = conn.transaction().await?;
        tx.query_one("SELECT 1", &[]).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn reflect_table(&self, schema: &str, table: &str) -> Result<TableRef, DatasetError> {
        let pool = self.pool()?;
        let conn = checkout(&pool).await?;
        let columns = declared_columns(&*conn, schema, table).await?;
        if columns.is_empty() {
            return Err(DatasetError::TableNotFound {
                schema: schema.to_string(),
                table: table.to_string(),
            });
        }
        Ok(TableRef::new(schema, table, columns))
    }

    async fn fetch_chunks(
        &self,
        statement: &SelectStatement,
        chunk_size: usize,
    ) -> Result<Vec<Frame>, DatasetError> {
        let rendered = statement.render(Dialect::Postgres);
        let params = Params::convert(&rendered.params);
        let (max_rows, batch_len) = portal_batch(chunk_size);

        let pool = self.pool()?;
        let mut conn = checkout(&pool).await?;
        let tx = conn.transaction().await?;
        let prepared = tx.prepare(&rendered.sql).await?;
        let columns = frame_columns(prepared.columns());
        let portal = tx.bind(&prepared, params.as_refs()).await?;

        let mut chunks = Vec::new();
        loop {
            let rows = tx.query_portal(&portal, max_rows).await?;
            if rows.is_empty() {
                break;
            }
            let exhausted = rows.len() < batch_len;
            chunks.push(build_frame(&columns, &rows)?);
            if exhausted {
                break;
            }
        }
        tx.commit().await?;

        debug!(chunks = chunks.len(), "postgres read finished");
        if chunks.is_empty() {
            chunks.push(Frame::new(columns));
        }
        Ok(chunks)
    }

    async fn write_frame(&self, frame: &Frame, request: &WriteRequest) -> Result<u64, DatasetError> {
        let dialect = Dialect::Postgres;
        let (frame, decls) = prepare_write(frame, request);
        let qualified = dialect.qualified(&request.schema, &request.table);

        let pool = self.pool()?;
        let mut conn = checkout(&pool).await?;
        let tx = conn.transaction().await?;

        let exists: bool = tx
            .query_one(TABLE_EXISTS, &[&request.schema, &request.table])
            .await?
            .try_get(0)?;
        let plan = WritePlan::for_mode(request.mode, exists, &qualified)?;
        debug!(table = %qualified, exists, ?plan, "postgres write plan");

        if plan.drop_table {
            tx.batch_execute(&drop_table_sql(dialect, &request.schema, &request.table))
                .await?;
        }
        if plan.delete_rows {
            tx.batch_execute(&delete_rows_sql(dialect, &request.schema, &request.table))
                .await?;
        }
        let declared = if plan.create_table {
            tx.batch_execute(&create_table_sql(
                dialect,
                &request.schema,
                &request.table,
                &decls,
            ))
            .await?;
            Vec::new()
        } else {
            declared_columns(&tx, &request.schema, &request.table).await?
        };

        let mut inserted = 0;
        for insert in insert_statements(
            dialect,
            &request.schema,
            &request.table,
            &frame,
            &declared,
        ) {
            let params = Params::convert(&insert.params);
            inserted += tx.execute(insert.sql.as_str(), params.as_refs()).await?;
        }
        tx.commit().await?;
        Ok(inserted)
    }

    fn dispose(&self) {
        if self.take_pool().is_some() {
            debug!("postgres pool released");
        }
    }
}

async fn declared_columns<C: GenericClient>(
    client: &C,
    schema: &str,
    table: &str,
) -> Result<Vec<TableColumn>, DatasetError> {
    client
        .query(REFLECT_COLUMNS, &[&schema, &table])
        .await?
        .iter()
        .map(|row| -> Result<TableColumn, DatasetError> {
            Ok(TableColumn::new(
                row.try_get::<_, String>(0)?,
                row.try_get::<_, String>(1)?,
            ))
        })
        .collect()
}

/// Rows requested per portal fetch, as the driver's `i32` and as a length to compare batches
/// against. Chunk sizes beyond `i32::MAX` are capped.
fn portal_batch(chunk_size: usize) -> (i32, usize) {
    let max_rows = i32::try_from(chunk_size.max(1)).unwrap_or(i32::MAX);
    (max_rows, usize::try_from(max_rows).unwrap_or(usize::MAX))
}
