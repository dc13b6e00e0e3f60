//! Chart Renderer - turns a result row set plus a chart spec into a
//! self-contained HTML artifact (plotly.js from CDN, fixed-height div).

use crate::error::{PipelineError, Result};
use crate::executor::QueryRows;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;

pub const CHART_HEIGHT_PX: u32 = 500;
const PLOTLY_CDN: &str = "https://cdn.plot.ly/plotly-2.32.0.min.js";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    Bar,
    Line,
    Pie,
    Scatter,
    Histogram,
    Area,
}

impl FromStr for ChartKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "bar" => Ok(Self::Bar),
            "line" => Ok(Self::Line),
            "pie" => Ok(Self::Pie),
            "scatter" => Ok(Self::Scatter),
            "histogram" => Ok(Self::Histogram),
            "area" => Ok(Self::Area),
            other => Err(PipelineError::UnsupportedChartKind(other.to_string())),
        }
    }
}

impl fmt::Display for ChartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bar => "bar",
            Self::Line => "line",
            Self::Pie => "pie",
            Self::Scatter => "scatter",
            Self::Histogram => "histogram",
            Self::Area => "area",
        };
        write!(f, "{}", name)
    }
}

/// Declarative description of the chart to render from a result set.
/// Columns are not validated upstream; [`render`] checks them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartSpec {
    pub kind: ChartKind,
    #[serde(default)]
    pub x_column: Option<String>,
    #[serde(default)]
    pub y_column: Option<String>,
    pub title: String,
    #[serde(default)]
    pub x_label: Option<String>,
    #[serde(default)]
    pub y_label: Option<String>,
    #[serde(default)]
    pub color_column: Option<String>,
}

/// Render the result as a self-contained HTML document. Every column the
/// spec names must exist in the result; the result is never mutated.
pub fn render(result: &QueryRows, spec: &ChartSpec) -> Result<String> {
    for column in [&spec.x_column, &spec.y_column, &spec.color_column]
        .into_iter()
        .flatten()
    {
        if !result.columns.iter().any(|c| c == column) {
            return Err(PipelineError::Render(format!(
                "Column '{}' is not present in the query result (available: {})",
                column,
                result.columns.join(", ")
            )));
        }
    }

    let traces = match spec.kind {
        ChartKind::Bar => xy_traces(result, spec, "bar", None, None)?,
        ChartKind::Line => xy_traces(result, spec, "scatter", Some("lines+markers"), None)?,
        ChartKind::Area => xy_traces(result, spec, "scatter", Some("lines"), Some("tozeroy"))?,
        ChartKind::Scatter => {
            if spec.x_column.is_none() {
                return Err(PipelineError::Render(
                    "scatter charts require an x column".to_string(),
                ));
            }
            xy_traces(result, spec, "scatter", Some("markers"), None)?
        }
        ChartKind::Pie => pie_trace(result, spec)?,
        ChartKind::Histogram => histogram_traces(result, spec)?,
    };

    let figure = json!({"data": traces, "layout": build_layout(spec)});
    Ok(html_document(&spec.title, &figure))
}

/// One trace per color group; a single unnamed trace when no color column is
/// set. Absent x falls back to the row index, so single-row aggregates still
/// render as a degenerate chart.
fn xy_traces(
    result: &QueryRows,
    spec: &ChartSpec,
    trace_type: &str,
    mode: Option<&str>,
    fill: Option<&str>,
) -> Result<Vec<Value>> {
    let y_column = spec.y_column.as_deref().ok_or_else(|| {
        PipelineError::Render(format!("{} charts require a y column", spec.kind))
    })?;

    let mut traces = Vec::new();
    for (label, indices) in groups_of(result, spec.color_column.as_deref()) {
        let xs = match spec.x_column.as_deref() {
            Some(x) => values_at(result, x, &indices),
            None => indices.iter().map(|&i| Value::from(i as u64)).collect(),
        };
        let ys = values_at(result, y_column, &indices);

        let mut trace = json!({"type": trace_type, "x": xs, "y": ys});
        if let Some(mode) = mode {
            trace["mode"] = json!(mode);
        }
        if let Some(fill) = fill {
            trace["fill"] = json!(fill);
        }
        if let Some(label) = label {
            trace["name"] = json!(label);
        }
        traces.push(trace);
    }

    Ok(traces)
}

fn pie_trace(result: &QueryRows, spec: &ChartSpec) -> Result<Vec<Value>> {
    let labels_column = spec.x_column.as_deref().ok_or_else(|| {
        PipelineError::Render("pie charts require an x column for slice labels".to_string())
    })?;
    let values_column = spec.y_column.as_deref().ok_or_else(|| {
        PipelineError::Render("pie charts require a y column for slice values".to_string())
    })?;

    let all: Vec<usize> = (0..result.rows.len()).collect();
    Ok(vec![json!({
        "type": "pie",
        "labels": values_at(result, labels_column, &all),
        "values": values_at(result, values_column, &all),
    })])
}

fn histogram_traces(result: &QueryRows, spec: &ChartSpec) -> Result<Vec<Value>> {
    let x_column = spec.x_column.as_deref().ok_or_else(|| {
        PipelineError::Render("histogram charts require an x column".to_string())
    })?;

    let mut traces = Vec::new();
    for (label, indices) in groups_of(result, spec.color_column.as_deref()) {
        let mut trace = json!({"type": "histogram", "x": values_at(result, x_column, &indices)});
        if let Some(label) = label {
            trace["name"] = json!(label);
        }
        traces.push(trace);
    }

    Ok(traces)
}

/// Partition row indices by the color column's value, preserving first
/// appearance order. No color column means one group covering all rows.
fn groups_of(result: &QueryRows, color_column: Option<&str>) -> Vec<(Option<String>, Vec<usize>)> {
    let Some(column) = color_column else {
        return vec![(None, (0..result.rows.len()).collect())];
    };

    let mut groups: Vec<(Option<String>, Vec<usize>)> = Vec::new();
    for (idx, row) in result.rows.iter().enumerate() {
        let label = match row.get(column) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => "null".to_string(),
            Some(other) => other.to_string(),
        };
        match groups.iter_mut().find(|(l, _)| l.as_deref() == Some(label.as_str())) {
            Some((_, members)) => members.push(idx),
            None => groups.push((Some(label), vec![idx])),
        }
    }
    groups
}

fn values_at(result: &QueryRows, column: &str, indices: &[usize]) -> Vec<Value> {
    indices
        .iter()
        .filter_map(|&i| result.rows.get(i))
        .map(|row| row.get(column).cloned().unwrap_or(Value::Null))
        .collect()
}

fn build_layout(spec: &ChartSpec) -> Value {
    let mut layout = json!({
        "title": {"text": spec.title},
        "height": CHART_HEIGHT_PX,
        "margin": {"t": 60, "r": 30, "b": 50, "l": 60},
    });

    if let Some(label) = spec.x_label.as_deref().or(spec.x_column.as_deref()) {
        layout["xaxis"] = json!({"title": {"text": label}});
    }
    if let Some(label) = spec.y_label.as_deref().or(spec.y_column.as_deref()) {
        layout["yaxis"] = json!({"title": {"text": label}});
    }
    if spec.color_column.is_some() && spec.kind == ChartKind::Bar {
        layout["barmode"] = json!("group");
    }

    layout
}

fn html_document(title: &str, figure: &Value) -> String {
    // "</" must not appear inside the inline script block.
    let payload = figure.to_string().replace("</", "<\\/");

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8" />
<title>{title}</title>
<script src="{cdn}"></script>
</head>
<body>
<div id="chart" style="height:{height}px;width:100%;"></div>
<script>
var figure = {payload};
Plotly.newPlot("chart", figure.data, figure.layout, {{"responsive": true}});
</script>
</body>
</html>
"#,
        title = html_escape(title),
        cdn = PLOTLY_CDN,
        height = CHART_HEIGHT_PX,
        payload = payload,
    )
}

fn html_escape(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}
