mod common;

use std::sync::Arc;

use chrono::NaiveDate;
use common::{StubConnector, StubState};
use sql_dataset::prelude::*;
use tokio::runtime::Runtime;

fn people() -> Result<Frame, DatasetError> {
    let joined = NaiveDate::from_ymd_opt(2024, 5, 17)
        .and_then(|d| d.and_hms_opt(9, 30, 0))
        .expect("valid timestamp");
    Frame::from_rows(
        ["id", "name", "score", "active", "joined_at"],
        vec![
            vec![
                RowValues::Int(1),
                RowValues::Text("ada".into()),
                RowValues::Float(9.5),
                RowValues::Bool(true),
                RowValues::Timestamp(joined),
            ],
            vec![
                RowValues::Int(2),
                RowValues::Text("grace".into()),
                RowValues::Float(7.25),
                RowValues::Bool(false),
                RowValues::Null,
            ],
            vec![
                RowValues::Int(3),
                RowValues::Null,
                RowValues::Float(8.0),
                RowValues::Bool(true),
                RowValues::Timestamp(joined),
            ],
        ],
    )
}

#[test]
fn stub_echo_preserves_written_columns() -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::new()?;
    rt.block_on(async {
        let state = Arc::new(StubState::default());
        let service = Arc::new(LinkedService::with_connector(
            LinkedServiceSettings::new("postgresql://localhost/app"),
            StubConnector::new(Arc::clone(&state)),
        ));
        service.connect().await?;

        let input = people()?;
        let settings = DatasetSettings::new("people")
            .with_create(CreateSettings::new(WriteMode::Replace));
        let mut writer = Dataset::new(Arc::clone(&service), settings);
        writer.set_input(input.clone());
        writer.create().await?;

        let mut reader = Dataset::new(Arc::clone(&service), DatasetSettings::new("people"));
        reader.read().await?;
        let output = reader.output().expect("output after read");
        assert_eq!(output.column_names(), input.column_names());
        assert_eq!(output.num_rows(), 3);
        assert_eq!(reader.schema(), writer.schema());
        Ok(())
    })
}

fn sqlite_service() -> Arc<LinkedService> {
    Arc::new(LinkedService::new(
        LinkedServiceSettings::builder("sqlite::memory:")
            .pool_size(2)
            .max_overflow(0)
            .finish(),
    ))
}

#[test]
fn sqlite_replace_then_read_round_trip() -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::new()?;
    rt.block_on(async {
        let service = sqlite_service();
        service.connect().await?;

        let input = people()?;
        let mut writer = Dataset::new(
            Arc::clone(&service),
            DatasetSettings::new("people").with_create(CreateSettings::new(WriteMode::Replace)),
        );
        writer.set_input(input.clone());
        writer.create().await?;

        let mut reader = Dataset::new(Arc::clone(&service), DatasetSettings::new("people"))
            .with_chunk_size(2);
        reader.read().await?;
        let output = reader.output().expect("output after read");
        assert_eq!(output, &input);
        assert_eq!(reader.schema(), writer.schema());

        service.close();
        Ok(())
    })
}

#[test]
fn sqlite_read_settings_are_applied() -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::new()?;
    rt.block_on(async {
        let service = sqlite_service();
        service.connect().await?;

        let mut writer = Dataset::new(Arc::clone(&service), DatasetSettings::new("people"));
        writer.set_input(people()?);
        writer.create().await?;

        let read = ReadSettings::default()
            .with_columns(["name", "id"])
            .with_filter("active", RowValues::Bool(true))
            .with_order_by([OrderBy::desc("id")])
            .with_limit(5);
        let mut reader = Dataset::new(
            Arc::clone(&service),
            DatasetSettings::new("people").with_read(read),
        );
        reader.read().await?;
        let output = reader.output().expect("output after read");
        assert_eq!(output.column_names(), vec!["name", "id"]);
        assert_eq!(
            output.rows(),
            &[
                vec![RowValues::Null, RowValues::Int(3)],
                vec![RowValues::Text("ada".into()), RowValues::Int(1)],
            ]
        );

        let mut nulls = Dataset::new(
            Arc::clone(&service),
            DatasetSettings::new("people")
                .with_read(ReadSettings::default().with_filter("name", RowValues::Null)),
        );
        nulls.read().await?;
        assert_eq!(nulls.output().map(Frame::num_rows), Some(1));

        let mut missing = Dataset::new(
            Arc::clone(&service),
            DatasetSettings::new("people")
                .with_read(ReadSettings::default().with_columns(["nickname"])),
        );
        let err = missing.read().await.unwrap_err();
        assert!(matches!(
            err,
            DatasetError::ColumnNotFound { ref available, .. }
                if available == &["id", "name", "score", "active", "joined_at"]
        ));

        service.close();
        Ok(())
    })
}

#[test]
fn sqlite_write_modes() -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::new()?;
    rt.block_on(async {
        let service = sqlite_service();
        service.connect().await?;

        async fn write(
            service: &Arc<LinkedService>,
            mode: WriteMode,
            input: Frame,
        ) -> Result<(), DatasetError> {
            let settings =
                DatasetSettings::new("scores").with_create(CreateSettings::new(mode));
            let mut dataset = Dataset::new(Arc::clone(service), settings);
            dataset.set_input(input);
            dataset.create().await
        }

        async fn count(service: &Arc<LinkedService>) -> Result<usize, DatasetError> {
            let mut dataset = Dataset::new(Arc::clone(service), DatasetSettings::new("scores"));
            dataset.read().await?;
            Ok(dataset.output().map_or(0, Frame::num_rows))
        }

        let input = people()?;
        write(&service, WriteMode::Fail, input.clone()).await?;
        assert_eq!(count(&service).await?, 3);

        let err = write(&service, WriteMode::Fail, input.clone())
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), Some(500));
        assert!(err.to_string().contains("already exists"), "{err}");
        assert_eq!(count(&service).await?, 3);

        write(&service, WriteMode::Append, input.clone()).await?;
        assert_eq!(count(&service).await?, 6);

        write(&service, WriteMode::DeleteRows, input.clone()).await?;
        assert_eq!(count(&service).await?, 3);

        let narrow = Frame::from_rows(["only"], vec![vec![RowValues::Int(1)]])?;
        write(&service, WriteMode::Replace, narrow).await?;
        let mut reader = Dataset::new(Arc::clone(&service), DatasetSettings::new("scores"));
        reader.read().await?;
        assert_eq!(
            reader.output().map(Frame::column_names),
            Some(vec!["only"])
        );

        service.close();
        Ok(())
    })
}

#[test]
fn sqlite_index_column_is_written() -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::new()?;
    rt.block_on(async {
        let service = sqlite_service();
        service.connect().await?;

        let settings = DatasetSettings::new("indexed")
            .with_create(CreateSettings::new(WriteMode::Replace).with_index(true));
        let mut writer = Dataset::new(Arc::clone(&service), settings);
        writer.set_input(people()?);
        writer.create().await?;

        let read = ReadSettings::default()
            .with_columns(["index", "id"])
            .with_order_by([OrderBy::asc("index")]);
        let mut reader = Dataset::new(
            Arc::clone(&service),
            DatasetSettings::new("indexed").with_read(read),
        );
        reader.read().await?;
        let output = reader.output().expect("output after read");
        let positions: Vec<RowValues> = output
            .column_values("index")
            .expect("index column")
            .into_iter()
            .cloned()
            .collect();
        assert_eq!(
            positions,
            vec![RowValues::Int(0), RowValues::Int(1), RowValues::Int(2)]
        );

        service.close();
        Ok(())
    })
}

#[test]
fn sqlite_file_database_persists_across_services() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("datasets.db");
    let uri = format!("sqlite:///{}", path.display());

    let rt = Runtime::new()?;
    rt.block_on(async {
        let first = Arc::new(LinkedService::new(LinkedServiceSettings::new(uri.clone())));
        first.connect().await?;
        let mut writer = Dataset::new(Arc::clone(&first), DatasetSettings::new("people"));
        writer.set_input(people()?);
        writer.create().await?;
        first.close();

        let second = Arc::new(LinkedService::new(LinkedServiceSettings::new(uri)));
        let (ok, message) = second.test_connection().await;
        assert!(ok, "{message}");
        let mut reader = Dataset::new(Arc::clone(&second), DatasetSettings::new("people"));
        reader.read().await?;
        assert_eq!(reader.output().map(Frame::num_rows), Some(3));
        second.close();
        Ok(())
    })
}
