//! Request pipeline: Dataset Store -> Query Synthesizer -> Query Executor
//! -> Chart Renderer, with every stage failure folded into one uniform
//! response shape at the boundary.

use crate::chart::{self, ChartKind, ChartSpec};
use crate::dataset::{DatasetStore, DatasetSummary, Schema};
use crate::error::Result;
use crate::executor;
use crate::synthesizer::QuerySynthesizer;
use polars::prelude::DataFrame;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info};

/// The uniform response for `/api/query`. Failures keep `success: false`
/// plus `error`; every other field is absent rather than null.
#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<Vec<serde_json::Map<String, serde_json::Value>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chart_spec: Option<ChartSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chart_html: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueryResponse {
    fn failure(message: String) -> Self {
        Self {
            success: false,
            sql: None,
            explanation: None,
            rows: None,
            row_count: None,
            chart_spec: None,
            chart_html: None,
            execution_time_ms: None,
            error: Some(message),
        }
    }
}

/// Owns the session state and the synthesizer. The store sits behind a
/// read/write lock so an upload never swaps the table out from under a
/// running query; queries clone the frame and release the lock before
/// any await point.
pub struct QueryPipeline {
    store: Arc<RwLock<DatasetStore>>,
    synthesizer: QuerySynthesizer,
}

impl QueryPipeline {
    pub fn new(store: DatasetStore, synthesizer: QuerySynthesizer) -> Self {
        Self {
            store: Arc::new(RwLock::new(store)),
            synthesizer,
        }
    }

    pub async fn ingest(&self, bytes: &[u8], filename: &str) -> Result<DatasetSummary> {
        let mut store = self.store.write().await;
        let summary = store.ingest(bytes, filename)?;
        info!(
            filename = filename,
            rows = summary.row_count,
            columns = summary.columns.len(),
            "dataset loaded"
        );
        Ok(summary)
    }

    pub async fn dataset_info(&self) -> Result<DatasetSummary> {
        self.store.read().await.summary()
    }

    pub async fn is_loaded(&self) -> bool {
        self.store.read().await.is_loaded()
    }

    pub async fn suggest_chart(&self, question: &str) -> Result<ChartKind> {
        let schema = self.store.read().await.schema()?;
        self.synthesizer.suggest_chart(question, &schema).await
    }

    /// Never fails: any stage error becomes a `success: false` response and
    /// the session table stays loaded and queryable.
    pub async fn answer(&self, question: &str) -> QueryResponse {
        match self.run(question).await {
            Ok(response) => response,
            Err(err) => {
                error!(question = question, error = %err, "query failed");
                QueryResponse::failure(err.to_string())
            }
        }
    }

    async fn run(&self, question: &str) -> Result<QueryResponse> {
        let (df, schema) = self.snapshot().await?;

        let synthesis = self.synthesizer.synthesize(question, &schema).await?;
        info!(sql = synthesis.sql.as_str(), "executing synthesized SQL");

        let result = executor::execute(&synthesis.sql, &df)?;
        let chart_html = chart::render(&result, &synthesis.chart_spec)?;

        Ok(QueryResponse {
            success: true,
            sql: Some(synthesis.sql),
            explanation: Some(synthesis.explanation),
            row_count: Some(result.row_count),
            rows: Some(result.rows),
            chart_spec: Some(synthesis.chart_spec),
            chart_html: Some(chart_html),
            execution_time_ms: Some(result.execution_time_ms),
            error: None,
        })
    }

    async fn snapshot(&self) -> Result<(DataFrame, Schema)> {
        let store = self.store.read().await;
        let table = store.table()?;
        Ok((table.df.clone(), store.schema()?))
    }
}
