//! Query Synthesizer - natural-language question + table schema in,
//! SQL + chart spec out, via a pluggable completion provider.

use crate::chart::{ChartKind, ChartSpec};
use crate::config::AppConfig;
use crate::dataset::{Schema, TABLE_NAME};
use crate::error::{PipelineError, Result};
use crate::llm::{build_provider, CompletionProvider};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// What one synthesis call produces: the SQL to run and the chart to draw.
#[derive(Debug, Clone)]
pub struct Synthesis {
    pub sql: String,
    pub explanation: String,
    pub chart_spec: ChartSpec,
}

/// Raw shape of the provider's JSON reply. Everything beyond `sql` and
/// `chart_type` is optional; models routinely omit fields.
#[derive(Debug, Deserialize)]
struct GenerationOutput {
    sql: String,
    #[serde(default)]
    explanation: String,
    chart_type: String,
    #[serde(default)]
    x_column: Option<String>,
    #[serde(default)]
    y_column: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    x_label: Option<String>,
    #[serde(default)]
    y_label: Option<String>,
    #[serde(default)]
    color_column: Option<String>,
}

pub struct QuerySynthesizer {
    provider: Box<dyn CompletionProvider>,
    timeout: Duration,
}

impl QuerySynthesizer {
    pub fn new(provider: Box<dyn CompletionProvider>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let provider = build_provider(config)?;
        Ok(Self::new(provider, config.llm_timeout))
    }

    /// One provider call, one parse. No retries: the SQL came from a model,
    /// and re-asking with the same prompt rarely changes the answer.
    pub async fn synthesize(&self, question: &str, schema: &Schema) -> Result<Synthesis> {
        let prompt = build_prompt(question, schema);
        debug!(provider = self.provider.name(), "requesting SQL generation");

        let raw = self.complete_with_timeout(&prompt).await?;
        let output = parse_generation(&raw)?;
        let kind: ChartKind = output.chart_type.parse()?;

        Ok(Synthesis {
            sql: output.sql,
            explanation: output.explanation,
            chart_spec: ChartSpec {
                kind,
                x_column: output.x_column,
                y_column: output.y_column,
                title: output.title.unwrap_or_else(|| question.to_string()),
                x_label: output.x_label,
                y_label: output.y_label,
                color_column: output.color_column,
            },
        })
    }

    /// Ask the provider for a chart kind alone. An unusable reply falls back
    /// to a bar chart rather than failing the request.
    pub async fn suggest_chart(&self, question: &str, schema: &Schema) -> Result<ChartKind> {
        let prompt = build_suggestion_prompt(question, schema);
        let raw = self.complete_with_timeout(&prompt).await?;

        match raw.trim().trim_matches('"').parse::<ChartKind>() {
            Ok(kind) => Ok(kind),
            Err(_) => {
                warn!(reply = raw.as_str(), "unusable chart suggestion, defaulting to bar");
                Ok(ChartKind::Bar)
            }
        }
    }

    async fn complete_with_timeout(&self, prompt: &str) -> Result<String> {
        tokio::time::timeout(self.timeout, self.provider.complete(prompt))
            .await
            .map_err(|_| {
                PipelineError::Provider(format!(
                    "{} did not answer within {}s",
                    self.provider.name(),
                    self.timeout.as_secs()
                ))
            })?
    }
}

fn build_prompt(question: &str, schema: &Schema) -> String {
    let schema_lines = schema
        .columns
        .iter()
        .map(|column| format!("- {}: {}", column.name, column.dtype))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"You are a data analyst. A table named "{table}" has these columns:

{schema_lines}

Question: {question}

Return a single JSON object with exactly these fields:
{{
    "sql": "a SQL SELECT statement over the table {table}",
    "explanation": "one sentence describing what the query computes",
    "chart_type": "one of: bar, line, pie, scatter, histogram, area",
    "x_column": "column from the SQL projection to use for x, or null",
    "y_column": "column from the SQL projection to use for y, or null",
    "title": "short chart title"
}}

Rules:
- Reference only the table "{table}" and the columns listed above.
- Use column aliases in the SQL so x_column and y_column name projection columns.
- x_column may be null for single-value aggregates.
- Only return the JSON object, no other text."#,
        table = TABLE_NAME,
        schema_lines = schema_lines,
        question = question,
    )
}

fn build_suggestion_prompt(question: &str, schema: &Schema) -> String {
    let columns = schema
        .columns
        .iter()
        .map(|column| column.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r#"A table has columns: {columns}.
Question: {question}

Which chart type fits best? Answer with exactly one word from:
bar, line, pie, scatter, histogram, area"#,
        columns = columns,
        question = question,
    )
}

/// Two-phase parse: strict first, then the first balanced {{...}} substring.
/// Both failures surface the raw text so the caller can see what the model
/// actually said.
fn parse_generation(raw: &str) -> Result<GenerationOutput> {
    let cleaned = strip_code_fences(raw);

    if let Ok(output) = serde_json::from_str::<GenerationOutput>(cleaned) {
        return Ok(output);
    }

    if let Some(candidate) = extract_json_object(cleaned) {
        if let Ok(output) = serde_json::from_str::<GenerationOutput>(candidate) {
            return Ok(output);
        }
    }

    Err(PipelineError::GenerationParse {
        raw: raw.to_string(),
    })
}

fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let trimmed = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    trimmed.strip_suffix("```").unwrap_or(trimmed).trim()
}

/// First balanced brace-delimited substring, honoring string literals and
/// escapes so braces inside values do not end the scan early.
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::ColumnInfo;
    use async_trait::async_trait;

    struct Scripted(String);

    #[async_trait]
    impl CompletionProvider for Scripted {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn complete(&self, _prompt: &str) -> Result<String> {
            Ok(self.0.clone())
        }
    }

    struct Stalled;

    #[async_trait]
    impl CompletionProvider for Stalled {
        fn name(&self) -> &'static str {
            "stalled"
        }

        async fn complete(&self, _prompt: &str) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok(String::new())
        }
    }

    fn sales_schema() -> Schema {
        Schema {
            columns: vec![
                ColumnInfo { name: "region".to_string(), dtype: "String".to_string() },
                ColumnInfo { name: "units".to_string(), dtype: "Int64".to_string() },
            ],
        }
    }

    fn synthesizer(reply: &str) -> QuerySynthesizer {
        QuerySynthesizer::new(Box::new(Scripted(reply.to_string())), Duration::from_secs(5))
    }

    #[test]
    fn prompt_names_the_table_and_every_column() {
        let prompt = build_prompt("total units by region", &sales_schema());
        assert!(prompt.contains("\"data\""));
        assert!(prompt.contains("- region: String"));
        assert!(prompt.contains("- units: Int64"));
        assert!(prompt.contains("total units by region"));
        assert!(prompt.contains("Only return the JSON object"));
    }

    #[tokio::test]
    async fn clean_json_reply_becomes_a_synthesis() {
        let reply = r#"{"sql": "SELECT region, SUM(units) AS total FROM data GROUP BY region",
            "explanation": "Sums units per region", "chart_type": "bar",
            "x_column": "region", "y_column": "total", "title": "Units by Region"}"#;

        let synthesis = synthesizer(reply)
            .synthesize("total units by region", &sales_schema())
            .await
            .expect("synthesis should succeed");

        assert!(synthesis.sql.starts_with("SELECT region"));
        assert_eq!(synthesis.chart_spec.kind, ChartKind::Bar);
        assert_eq!(synthesis.chart_spec.x_column.as_deref(), Some("region"));
        assert_eq!(synthesis.chart_spec.title, "Units by Region");
    }

    #[tokio::test]
    async fn surrounding_prose_is_stripped_by_the_fallback_parse() {
        let reply = r#"prefix text {"sql":"SELECT 1","explanation":"x","chart_type":"bar","x_column":"a","y_column":"b","title":"t"} suffix"#;

        let synthesis = synthesizer(reply)
            .synthesize("anything", &sales_schema())
            .await
            .expect("fallback parse should recover the object");

        assert_eq!(synthesis.sql, "SELECT 1");
        assert_eq!(synthesis.explanation, "x");
        assert_eq!(synthesis.chart_spec.title, "t");
    }

    #[tokio::test]
    async fn fenced_replies_parse() {
        let reply = "```json\n{\"sql\": \"SELECT 1\", \"chart_type\": \"line\"}\n```";
        let synthesis = synthesizer(reply)
            .synthesize("anything", &sales_schema())
            .await
            .expect("fenced reply should parse");
        assert_eq!(synthesis.chart_spec.kind, ChartKind::Line);
    }

    #[tokio::test]
    async fn braces_inside_string_values_do_not_break_recovery() {
        let reply = r#"note {"sql":"SELECT '{' AS brace","explanation":"has { and } inside","chart_type":"bar"} end"#;
        let synthesis = synthesizer(reply)
            .synthesize("anything", &sales_schema())
            .await
            .expect("braces in strings should not end the scan");
        assert_eq!(synthesis.sql, "SELECT '{' AS brace");
    }

    #[tokio::test]
    async fn unparseable_reply_carries_the_raw_text() {
        let err = synthesizer("I cannot answer that.")
            .synthesize("anything", &sales_schema())
            .await
            .unwrap_err();
        match err {
            PipelineError::GenerationParse { raw } => {
                assert!(raw.contains("I cannot answer that."))
            }
            other => panic!("expected GenerationParse, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn unknown_chart_type_is_rejected() {
        let reply = r#"{"sql": "SELECT 1", "chart_type": "bubble"}"#;
        let err = synthesizer(reply)
            .synthesize("anything", &sales_schema())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::UnsupportedChartKind(kind) if kind == "bubble"));
    }

    #[tokio::test]
    async fn missing_title_falls_back_to_the_question() {
        let reply = r#"{"sql": "SELECT 1", "chart_type": "bar"}"#;
        let synthesis = synthesizer(reply)
            .synthesize("count the rows", &sales_schema())
            .await
            .expect("minimal reply should parse");
        assert_eq!(synthesis.chart_spec.title, "count the rows");
        assert!(synthesis.chart_spec.x_column.is_none());
    }

    #[tokio::test]
    async fn stalled_provider_times_out() {
        let synthesizer =
            QuerySynthesizer::new(Box::new(Stalled), Duration::from_millis(50));
        let err = synthesizer
            .synthesize("anything", &sales_schema())
            .await
            .unwrap_err();
        match err {
            PipelineError::Provider(message) => assert!(message.contains("stalled")),
            other => panic!("expected Provider timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn suggestion_accepts_a_single_word() {
        let kind = synthesizer("line")
            .suggest_chart("trend over time", &sales_schema())
            .await
            .expect("single word should parse");
        assert_eq!(kind, ChartKind::Line);
    }

    #[tokio::test]
    async fn unusable_suggestion_falls_back_to_bar() {
        let kind = synthesizer("maybe a treemap?")
            .suggest_chart("anything", &sales_schema())
            .await
            .expect("fallback should not error");
        assert_eq!(kind, ChartKind::Bar);
    }
}
