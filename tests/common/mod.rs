#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sql_dataset::dialect::Dialect;
use sql_dataset::engine::{Connector, Engine, PoolStatus, TableColumn, TableRef, WriteRequest};
use sql_dataset::query_builder::SelectStatement;
use sql_dataset::type_mapper::target_type;
use sql_dataset::{DatasetError, Frame, LinkedServiceSettings, RowValues};

/// What the stub engine saw and what it will answer with.
#[derive(Debug, Default)]
pub struct StubState {
    pub creates: AtomicUsize,
    pub probes: AtomicUsize,
    pub disposes: AtomicUsize,
    pub reflections: AtomicUsize,
    pub fail_create: AtomicBool,
    pub fail_probe: AtomicBool,
    pub fail_fetch: AtomicBool,
    pub fail_write: AtomicBool,
    pub statements: Mutex<Vec<SelectStatement>>,
    pub writes: Mutex<Vec<(WriteRequest, Frame)>>,
    /// Columns reported by reflection when nothing has been written yet.
    pub table_columns: Mutex<Vec<TableColumn>>,
    /// Last frame written, echoed back by reads.
    pub stored: Mutex<Option<Frame>>,
}

impl StubState {
    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    pub fn set(flag: &AtomicBool) {
        flag.store(true, Ordering::SeqCst);
    }

    pub fn with_table(columns: &[(&str, &str)]) -> Arc<Self> {
        let state = Arc::new(StubState::default());
        *state.table_columns.lock().unwrap() = columns
            .iter()
            .map(|(name, ty)| TableColumn::new(*name, *ty))
            .collect();
        state
    }

    pub fn statements(&self) -> Vec<SelectStatement> {
        self.statements.lock().unwrap().clone()
    }

    pub fn writes(&self) -> Vec<(WriteRequest, Frame)> {
        self.writes.lock().unwrap().clone()
    }
}

#[derive(Debug)]
pub struct StubConnector {
    pub state: Arc<StubState>,
}

impl StubConnector {
    pub fn new(state: Arc<StubState>) -> Arc<Self> {
        Arc::new(Self { state })
    }
}

#[async_trait]
impl Connector for StubConnector {
    async fn create_engine(
        &self,
        _settings: &LinkedServiceSettings,
    ) -> Result<Arc<dyn Engine>, DatasetError> {
        self.state.creates.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_create.load(Ordering::SeqCst) {
            return Err(DatasetError::ConnectionError(
                "stub refused to connect".to_string(),
            ));
        }
        Ok(Arc::new(StubEngine {
            state: Arc::clone(&self.state),
        }))
    }
}

#[derive(Debug)]
pub struct StubEngine {
    state: Arc<StubState>,
}

#[async_trait]
impl Engine for StubEngine {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    fn status(&self) -> PoolStatus {
        PoolStatus {
            connections: 0,
            idle_connections: 0,
            max_size: 15,
        }
    }

    async fn probe(&self) -> Result<(), DatasetError> {
        self.state.probes.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_probe.load(Ordering::SeqCst) {
            return Err(DatasetError::ExecutionError("probe exploded".to_string()));
        }
        Ok(())
    }

    async fn reflect_table(&self, schema: &str, table: &str) -> Result<TableRef, DatasetError> {
        self.state.reflections.fetch_add(1, Ordering::SeqCst);
        let columns = match self.state.stored.lock().unwrap().as_ref() {
            Some(frame) => frame
                .columns()
                .iter()
                .map(|c| {
                    TableColumn::new(
                        c.name.clone(),
                        Dialect::Postgres.column_type_sql(target_type(c.dtype)),
                    )
                })
                .collect(),
            None => self.state.table_columns.lock().unwrap().clone(),
        };
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
        _chunk_size: usize,
    ) -> Result<Vec<Frame>, DatasetError> {
        self.state.statements.lock().unwrap().push(statement.clone());
        if self.state.fail_fetch.load(Ordering::SeqCst) {
            return Err(DatasetError::ExecutionError("fetch exploded".to_string()));
        }
        let names: Vec<String> = statement
            .output_columns()
            .iter()
            .map(|c| c.name.clone())
            .collect();
        let stored = self.state.stored.lock().unwrap().clone();
        let rows = match stored {
            Some(frame) => {
                let positions: Vec<usize> = names
                    .iter()
                    .filter_map(|name| frame.column_index(name))
                    .collect();
                frame
                    .rows()
                    .iter()
                    .map(|row| positions.iter().map(|&i| row[i].clone()).collect())
                    .collect()
            }
            None => Vec::<Vec<RowValues>>::new(),
        };
        Ok(vec![Frame::from_rows(names, rows)?])
    }

    async fn write_frame(&self, frame: &Frame, request: &WriteRequest) -> Result<u64, DatasetError> {
        self.state
            .writes
            .lock()
            .unwrap()
            .push((request.clone(), frame.clone()));
        if self.state.fail_write.load(Ordering::SeqCst) {
            return Err(DatasetError::ExecutionError("write exploded".to_string()));
        }
        *self.state.stored.lock().unwrap() = Some(frame.clone());
        Ok(frame.num_rows() as u64)
    }

    fn dispose(&self) {
        self.state.disposes.fetch_add(1, Ordering::SeqCst);
    }
}
