//! Dataset Store - owns the currently loaded table
//!
//! One CSV upload at a time: each load replaces the active table wholesale.
//! Generated SQL always references the table under the fixed name `data`.

use crate::error::{PipelineError, Result};
use chrono::{DateTime, Utc};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

/// Fixed name the active table is registered under in the SQL engine.
pub const TABLE_NAME: &str = "data";

/// Rows included in dataset previews.
pub const SAMPLE_ROW_COUNT: usize = 5;

/// The active in-memory dataset plus its load metadata.
#[derive(Debug, Clone)]
pub struct Table {
    pub df: DataFrame,
    pub dataset_id: Uuid,
    pub filename: String,
    pub loaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub dtype: String,
}

/// Ordered column -> declared type view of a [`Table`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schema {
    pub columns: Vec<ColumnInfo>,
}

impl Schema {
    pub fn from_dataframe(df: &DataFrame) -> Self {
        let columns = df
            .schema()
            .iter_fields()
            .map(|field| ColumnInfo {
                name: field.name().to_string(),
                dtype: format!("{:?}", field.data_type()),
            })
            .collect();
        Self { columns }
    }
}

/// Bounded snapshot of the active dataset for upload/info responses.
#[derive(Debug, Clone, Serialize)]
pub struct DatasetSummary {
    pub dataset_id: Uuid,
    pub filename: String,
    pub loaded_at: DateTime<Utc>,
    pub row_count: usize,
    pub columns: Vec<String>,
    pub dtypes: serde_json::Map<String, serde_json::Value>,
    pub sample_rows: Vec<serde_json::Map<String, serde_json::Value>>,
}

pub struct DatasetStore {
    table: Option<Table>,
    upload_dir: PathBuf,
}

impl DatasetStore {
    pub fn new(upload_dir: PathBuf) -> Self {
        Self {
            table: None,
            upload_dir,
        }
    }

    /// Persist uploaded bytes under the upload directory (sanitized name,
    /// same name overwrites), then load the written file as the active table.
    pub fn ingest(&mut self, bytes: &[u8], filename: &str) -> Result<DatasetSummary> {
        std::fs::create_dir_all(&self.upload_dir)?;
        let safe_name = sanitize_filename(filename);
        let path = self.upload_dir.join(&safe_name);
        std::fs::write(&path, bytes)?;
        info!("Saved upload to {}", path.display());
        self.load(&path)?;
        self.summary()
    }

    /// Read a CSV with type inference and replace the current table.
    pub fn load(&mut self, path: &Path) -> Result<&Table> {
        if !path.exists() {
            return Err(PipelineError::NotFound(path.display().to_string()));
        }

        let df = LazyCsvReader::new(path)
            .with_has_header(true)
            .with_try_parse_dates(true)
            .with_infer_schema_length(Some(1000))
            .finish()
            .map_err(|e| PipelineError::Parse(format!("Failed to read CSV: {}", e)))?
            .collect()
            .map_err(|e| PipelineError::Parse(format!("Failed to load CSV: {}", e)))?;

        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload.csv")
            .to_string();

        info!(
            "Loaded dataset '{}': {} rows, {} columns",
            filename,
            df.height(),
            df.width()
        );

        Ok(self.table.insert(Table {
            df,
            dataset_id: Uuid::new_v4(),
            filename,
            loaded_at: Utc::now(),
        }))
    }

    pub fn table(&self) -> Result<&Table> {
        self.table.as_ref().ok_or(PipelineError::NoDataLoaded)
    }

    pub fn is_loaded(&self) -> bool {
        self.table.is_some()
    }

    pub fn schema(&self) -> Result<Schema> {
        Ok(Schema::from_dataframe(&self.table()?.df))
    }

    /// Row count, columns in file order, dtypes and a head-N preview.
    pub fn summary(&self) -> Result<DatasetSummary> {
        let table = self.table()?;
        let df = &table.df;

        let preview = df.head(Some(SAMPLE_ROW_COUNT));
        let (_, sample_rows) = crate::executor::dataframe_to_rows(&preview)?;

        let mut dtypes = serde_json::Map::new();
        for field in df.schema().iter_fields() {
            dtypes.insert(
                field.name().to_string(),
                serde_json::Value::String(format!("{:?}", field.data_type())),
            );
        }

        Ok(DatasetSummary {
            dataset_id: table.dataset_id,
            filename: table.filename.clone(),
            loaded_at: table.loaded_at,
            row_count: df.height(),
            columns: df.get_column_names().iter().map(|s| s.to_string()).collect(),
            dtypes,
            sample_rows,
        })
    }
}

/// Strip path components and anything outside `[A-Za-z0-9._-]`.
fn sanitize_filename(filename: &str) -> String {
    let base = Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload.csv");

    regex::Regex::new(r"[^A-Za-z0-9._-]")
        .map(|re| re.replace_all(base, "_").into_owned())
        .unwrap_or_else(|_| base.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn test_dir() -> PathBuf {
        let dir = std::env::temp_dir().join("text2chart_dataset_tests");
        fs::create_dir_all(&dir).expect("create test dir");
        dir
    }

    fn write_csv(name: &str, contents: &str) -> PathBuf {
        let path = test_dir().join(name);
        fs::write(&path, contents).expect("write csv fixture");
        path
    }

    #[test]
    fn load_reports_rows_and_columns_in_file_order() {
        let path = write_csv(
            "sales.csv",
            "region,units,price\nnorth,10,1.5\nsouth,20,2.5\neast,30,3.5\nwest,40,4.5\ncentral,50,5.5\n",
        );

        let mut store = DatasetStore::new(test_dir());
        store.load(&path).expect("load should succeed");

        let summary = store.summary().expect("summary should succeed");
        assert_eq!(summary.row_count, 5);
        assert_eq!(summary.columns, vec!["region", "units", "price"]);
        assert_eq!(summary.sample_rows.len(), 5);
        assert_eq!(summary.filename, "sales.csv");
        assert!(summary.dtypes.contains_key("units"));
    }

    #[test]
    fn summary_serializes_to_json_with_load_metadata() {
        let path = write_csv("meta.csv", "a,b\n1,2\n");
        let mut store = DatasetStore::new(test_dir());
        store.load(&path).expect("load should succeed");

        let summary = store.summary().expect("summary should succeed");
        let serialized = serde_json::to_string(&summary).expect("summary serializes");
        let parsed: serde_json::Value =
            serde_json::from_str(&serialized).expect("summary round-trips");

        let id = parsed["dataset_id"].as_str().expect("dataset_id is a string");
        assert!(Uuid::parse_str(id).is_ok(), "dataset_id should be a uuid: {}", id);
        assert!(parsed["loaded_at"].is_string());
        assert_eq!(parsed["filename"], serde_json::json!("meta.csv"));
    }

    #[test]
    fn schema_preserves_column_order() {
        let path = write_csv("ordered.csv", "zebra,apple,mango\n1,2,3\n");
        let mut store = DatasetStore::new(test_dir());
        store.load(&path).expect("load should succeed");

        let schema = store.schema().expect("schema should succeed");
        let names: Vec<&str> = schema.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["zebra", "apple", "mango"]);
    }

    #[test]
    fn queries_before_load_fail_with_no_data_loaded() {
        let store = DatasetStore::new(test_dir());
        assert!(matches!(store.schema(), Err(PipelineError::NoDataLoaded)));
        assert!(matches!(store.summary(), Err(PipelineError::NoDataLoaded)));
        assert!(matches!(store.table(), Err(PipelineError::NoDataLoaded)));
    }

    #[test]
    fn missing_path_is_not_found() {
        let mut store = DatasetStore::new(test_dir());
        let err = store
            .load(Path::new("/nonexistent/never/here.csv"))
            .unwrap_err();
        assert!(matches!(err, PipelineError::NotFound(_)));
    }

    #[test]
    fn empty_file_is_a_parse_error() {
        let path = write_csv("empty.csv", "");
        let mut store = DatasetStore::new(test_dir());
        let err = store.load(&path).unwrap_err();
        assert!(matches!(err, PipelineError::Parse(_)));
        assert!(!store.is_loaded());
    }

    #[test]
    fn reload_replaces_the_table_wholesale() {
        let first = write_csv("first.csv", "a,b\n1,2\n3,4\n");
        let second = write_csv("second.csv", "x\n9\n");

        let mut store = DatasetStore::new(test_dir());
        store.load(&first).expect("first load");
        assert_eq!(store.summary().unwrap().row_count, 2);
        let first_id = store.table().unwrap().dataset_id;

        store.load(&second).expect("second load");
        let summary = store.summary().unwrap();
        assert_eq!(summary.row_count, 1);
        assert_eq!(summary.columns, vec!["x"]);
        assert_ne!(store.table().unwrap().dataset_id, first_id);
    }

    #[test]
    fn ingest_writes_then_loads() {
        let mut store = DatasetStore::new(test_dir().join("ingest"));
        let summary = store
            .ingest(b"name,score\nalpha,1\nbeta,2\n", "my scores (v2).csv")
            .expect("ingest should succeed");

        assert_eq!(summary.row_count, 2);
        assert_eq!(summary.filename, "my_scores__v2_.csv");
        assert!(test_dir().join("ingest").join("my_scores__v2_.csv").exists());
    }

    #[test]
    fn sanitize_strips_directories_and_odd_characters() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("plain.csv"), "plain.csv");
        assert_eq!(sanitize_filename("weird name!.csv"), "weird_name_.csv");
    }
}
