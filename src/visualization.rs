//! Visualization Engine
//!
//! Looks at the shape of a result set and the question text and recommends
//! a chart, or `None` for a plain table. Rule order matters: list and
//! single-fact suppression run before any chart rule, and status breakdowns
//! are checked before rankings and categorical pies because those shapes
//! overlap.

use crate::result_set::ResultSet;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

/// Rows sampled when a column's first value is NULL.
const NULL_RESCAN_ROWS: usize = 10;
const PIE_MIN_ROWS: usize = 3;
const PIE_MAX_ROWS: usize = 8;

const LIST_KEYWORDS: &[&str] = &[
    "list", "show all", "display all", "get all", "fetch all", "all employees", "all users",
    "all departments", "all projects", "who are", "which employees", "which users",
];
const AGGREGATION_KEYWORDS: &[&str] = &["count", "sum", "total", "average", "max", "min", "how many"];
const STATUS_KEYWORDS: &[&str] = &[
    "completed", "pending", "done", "not done", "finished", "incomplete", "status", "progress",
    "complete vs", "completed vs", "done vs", "breakdown", "by status", "status count",
];
const STATUS_COLUMN_FRAGMENTS: &[&str] = &[
    "completed", "pending", "done", "not_done", "finished", "incomplete", "in_progress", "on_hold",
    "open", "hold", "progress",
];
const RANKING_KEYWORDS: &[&str] = &[
    "top ", "bottom ", "highest", "lowest", "most", "least", "best", "worst", "first", "last", "rank",
    "leading", "how many", "count of", "number of",
];
const TIME_KEYWORDS: &[&str] = &["date", "time", "month", "year", "day", "week"];
/// Name fragments that mark an all-NULL column as numeric.
const NUMERIC_NAME_PATTERNS: &[&str] = &[
    "count", "total", "sum", "avg", "task", "number", "amount", "ticket", "progress", "completed",
    "pending", "done", "hold", "open",
];
const PIE_EXCLUDED_COLUMNS: &[&str] = &["id", "user_id", "department_id"];
const SERIES_EXCLUDED_COLUMNS: &[&str] = &["id", "user_id"];

const STATUS_COLORS: &[(&str, &str)] = &[
    ("not_completed", "#ef4444"),
    ("not_done", "#ef4444"),
    ("incomplete", "#ef4444"),
    ("in_progress", "#3b82f6"),
    ("inprogress", "#3b82f6"),
    ("completed", "#10b981"),
    ("finished", "#10b981"),
    ("cancelled", "#6b7280"),
    ("canceled", "#6b7280"),
    ("inactive", "#6b7280"),
    ("progress", "#3b82f6"),
    ("pending", "#f59e0b"),
    ("on_hold", "#8b5cf6"),
    ("onhold", "#8b5cf6"),
    ("closed", "#10b981"),
    ("active", "#3b82f6"),
    ("open", "#f59e0b"),
    ("done", "#10b981"),
    ("hold", "#8b5cf6"),
];
const FALLBACK_PALETTE: &[&str] = &["#3b82f6", "#10b981", "#f59e0b", "#ef4444", "#8b5cf6"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartType {
    Pie,
    Bar,
    StackedBar,
    Line,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub label: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartConfig {
    pub chart_type: ChartType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x_axis: Option<String>,
    pub y_axis: Vec<String>,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stacked_keys: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_labels: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colors: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_points: Option<Vec<DataPoint>>,
}

impl ChartConfig {
    fn new(chart_type: ChartType, x_axis: Option<String>, y_axis: Vec<String>, title: String) -> Self {
        Self {
            chart_type,
            x_axis,
            y_axis,
            title,
            description: None,
            stacked_keys: None,
            data_labels: None,
            colors: None,
            data_points: None,
        }
    }

    fn described(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }
}

/// One result cell, typed once at ingestion.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Numeric(f64),
    Text(String),
    Null,
}

impl From<&Value> for Cell {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => Cell::Null,
            Value::Number(n) => n.as_f64().map(Cell::Numeric).unwrap_or(Cell::Null),
            Value::Bool(b) => Cell::Numeric(if *b { 1.0 } else { 0.0 }),
            Value::String(s) => match s.trim().parse::<f64>() {
                Ok(f) if f.is_finite() => Cell::Numeric(f),
                _ => Cell::Text(s.clone()),
            },
            other => Cell::Text(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Numeric,
    Text,
    /// Every sampled value was NULL and the name gave no hint.
    Unknown,
}

#[derive(Debug, Clone)]
struct Column {
    name: String,
    lower: String,
    kind: ColumnKind,
}

impl Column {
    fn named_one_of(&self, names: &[&str]) -> bool {
        names.contains(&self.lower.as_str())
    }
}

/// Result set converted into the tagged cell model.
struct Table {
    columns: Vec<Column>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    fn ingest(results: &ResultSet) -> Self {
        let rows: Vec<Vec<Cell>> = results
            .rows
            .iter()
            .map(|row| row.iter().map(Cell::from).collect())
            .collect();

        let columns = results
            .columns
            .iter()
            .enumerate()
            .map(|(idx, name)| {
                let lower = name.to_lowercase();
                let sampled = rows
                    .iter()
                    .take(NULL_RESCAN_ROWS)
                    .map(|row| row.get(idx).unwrap_or(&Cell::Null))
                    .find(|cell| **cell != Cell::Null);
                let kind = match sampled {
                    Some(Cell::Numeric(_)) => ColumnKind::Numeric,
                    Some(_) => ColumnKind::Text,
                    None if NUMERIC_NAME_PATTERNS.iter().any(|p| lower.contains(p)) => ColumnKind::Numeric,
                    None => ColumnKind::Unknown,
                };
                Column {
                    name: name.clone(),
                    lower,
                    kind,
                }
            })
            .collect();

        Self { columns, rows }
    }

    fn of_kind(&self, kind: ColumnKind) -> Vec<&Column> {
        self.columns.iter().filter(|c| c.kind == kind).collect()
    }
}

/// Recommend a chart for `results`, or `None` to render a table.
/// Deterministic: the same inputs always give the same configuration.
pub fn classify(query: &str, results: &ResultSet, _sql: &str) -> Option<ChartConfig> {
    if results.is_empty() || results.columns.is_empty() {
        return None;
    }

    let query_lower = query.to_lowercase();
    let table = Table::ingest(results);
    let numeric = table.of_kind(ColumnKind::Numeric);
    let strings = table.of_kind(ColumnKind::Text);
    let meaningful = meaningful_numeric(&numeric, &query_lower);
    let row_count = table.rows.len();

    debug!(
        "Classifying {} rows: {} numeric ({} meaningful), {} text columns",
        row_count,
        numeric.len(),
        meaningful.len(),
        strings.len()
    );

    if is_list_query(&query_lower, meaningful.len(), strings.len()) {
        return None;
    }

    if row_count <= 2 && meaningful.len() == 1 {
        return None;
    }

    if is_status_breakdown(&query_lower, &table) {
        if row_count == 1 {
            if let Some(pie) = status_pie(query, &table) {
                return Some(pie);
            }
        }
        return Some(stacked_bar(query, &table));
    }

    let has_ranking = contains_any(&query_lower, RANKING_KEYWORDS);
    if has_ranking && !meaningful.is_empty() && !strings.is_empty() {
        return Some(
            ChartConfig::new(
                ChartType::Bar,
                Some(strings[0].name.clone()),
                vec![meaningful[0].name.clone()],
                chart_title(query),
            )
            .described("Comparison chart"),
        );
    }

    if strings.len() == 1 && meaningful.len() == 1 && (PIE_MIN_ROWS..=PIE_MAX_ROWS).contains(&row_count) {
        return Some(
            ChartConfig::new(
                ChartType::Pie,
                Some(strings[0].name.clone()),
                vec![meaningful[0].name.clone()],
                chart_title(query),
            )
            .described("Distribution breakdown"),
        );
    }

    if let Some(time_col) = table.columns.iter().find(|c| contains_any(&c.lower, TIME_KEYWORDS)) {
        let series: Vec<String> = meaningful
            .iter()
            .filter(|c| c.name != time_col.name)
            .map(|c| c.name.clone())
            .collect();
        if !series.is_empty() {
            return Some(
                ChartConfig::new(ChartType::Line, Some(time_col.name.clone()), series, chart_title(query))
                    .described("Trend over time"),
            );
        }
    }

    if !meaningful.is_empty() && !strings.is_empty() && row_count > 1 {
        return Some(
            ChartConfig::new(
                ChartType::Bar,
                Some(strings[0].name.clone()),
                vec![meaningful[0].name.clone()],
                chart_title(query),
            )
            .described("Comparison chart"),
        );
    }

    None
}

/// Numeric columns minus a bare `id`, which is kept only when the question
/// mentions ids or nothing else is numeric.
fn meaningful_numeric<'a>(numeric: &[&'a Column], query_lower: &str) -> Vec<&'a Column> {
    let mentions_id = query_lower
        .split(|c: char| !c.is_ascii_alphanumeric() && c != '_')
        .any(|w| w == "id" || w == "ids");
    numeric
        .iter()
        .copied()
        .filter(|c| c.lower != "id" || mentions_id || numeric.len() == 1)
        .collect()
}

fn is_list_query(query_lower: &str, meaningful: usize, strings: usize) -> bool {
    if !contains_any(query_lower, LIST_KEYWORDS) {
        return false;
    }
    let has_aggregation = contains_any(query_lower, AGGREGATION_KEYWORDS);
    (!has_aggregation && strings >= 2) || meaningful == 0
}

fn is_status_breakdown(query_lower: &str, table: &Table) -> bool {
    let numeric_non_id = table
        .columns
        .iter()
        .filter(|c| c.kind == ColumnKind::Numeric && !c.named_one_of(SERIES_EXCLUDED_COLUMNS))
        .count();
    if numeric_non_id < 2 {
        return false;
    }
    let status_columns = table
        .columns
        .iter()
        .filter(|c| STATUS_COLUMN_FRAGMENTS.iter().any(|f| c.lower.contains(f)))
        .count();
    contains_any(query_lower, STATUS_KEYWORDS) || status_columns >= 2
}

/// Single-row breakdown: every numeric cell becomes a slice, zeros included.
fn status_pie(query: &str, table: &Table) -> Option<ChartConfig> {
    let row = table.rows.first()?;
    let points: Vec<DataPoint> = table
        .columns
        .iter()
        .zip(row)
        .filter(|(col, _)| !col.named_one_of(PIE_EXCLUDED_COLUMNS))
        .filter_map(|(col, cell)| match cell {
            Cell::Numeric(value) => Some(DataPoint {
                label: slice_label(&col.name),
                value: *value,
            }),
            _ => None,
        })
        .collect();

    if points.len() < 2 {
        return None;
    }

    let labels: Vec<String> = points.iter().map(|p| p.label.clone()).collect();
    let mut chart = ChartConfig::new(ChartType::Pie, None, labels.clone(), chart_title(query))
        .described("Status distribution");
    chart.data_labels = Some(true);
    chart.colors = Some(assign_colors(&labels));
    chart.data_points = Some(points);
    Some(chart)
}

fn stacked_bar(query: &str, table: &Table) -> ChartConfig {
    let category = table
        .columns
        .iter()
        .find(|c| c.kind == ColumnKind::Text)
        .map(|c| c.name.clone());
    let series: Vec<String> = table
        .columns
        .iter()
        .filter(|c| c.kind == ColumnKind::Numeric && !c.named_one_of(SERIES_EXCLUDED_COLUMNS))
        .map(|c| c.name.clone())
        .collect();

    let mut chart = ChartConfig::new(ChartType::StackedBar, category, series.clone(), chart_title(query))
        .described("Stacked bar chart showing completion status");
    chart.colors = Some(assign_colors(&series));
    chart.stacked_keys = Some(series);
    chart
}

/// Longest status keyword contained in the normalised name wins; anything
/// unmatched takes the palette colour for its position.
fn assign_colors(names: &[String]) -> BTreeMap<String, String> {
    let mut keys: Vec<(String, &str)> = STATUS_COLORS
        .iter()
        .map(|(key, color)| (normalise(key), *color))
        .collect();
    keys.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

    names
        .iter()
        .enumerate()
        .map(|(idx, name)| {
            let normalised = normalise(name);
            let color = keys
                .iter()
                .find(|(key, _)| normalised.contains(key.as_str()))
                .map(|(_, color)| *color)
                .unwrap_or(FALLBACK_PALETTE[idx % FALLBACK_PALETTE.len()]);
            (name.clone(), color.to_string())
        })
        .collect()
}

fn normalise(name: &str) -> String {
    name.to_lowercase().chars().filter(|c| *c != '_' && !c.is_whitespace()).collect()
}

/// `pending_tickets` -> `Pending`, `on_hold` -> `On Hold`.
fn slice_label(column: &str) -> String {
    let spaced = column.replace('_', " ");
    let words: Vec<String> = spaced
        .split_whitespace()
        .filter(|w| !matches!(w.to_lowercase().as_str(), "ticket" | "tickets"))
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(|c| c.to_lowercase())).collect(),
                None => String::new(),
            }
        })
        .collect();
    if words.is_empty() {
        column.to_string()
    } else {
        words.join(" ")
    }
}

/// First letter capitalised; a question keeps its '?', anything else loses
/// trailing '.'/'!' and gains " Analysis".
pub fn chart_title(query: &str) -> String {
    let trimmed = query.trim();
    let mut chars = trimmed.chars();
    let capitalised: String = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => return String::new(),
    };
    if capitalised.ends_with('?') {
        capitalised
    } else {
        format!("{} Analysis", capitalised.trim_end_matches(['.', '!']).trim_end())
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rs(columns: &[&str], rows: Vec<Vec<Value>>) -> ResultSet {
        ResultSet::from_columns(columns, rows)
    }

    #[test]
    fn test_empty_result_is_table() {
        assert_eq!(classify("how many tickets", &rs(&["n"], vec![]), ""), None);
    }

    #[test]
    fn test_single_row_status_pie() {
        let results = rs(&["completed_tickets", "pending_tickets"], vec![vec![json!(12), json!(5)]]);
        let chart = classify("ticket summary for Asha", &results, "").unwrap();
        assert_eq!(chart.chart_type, ChartType::Pie);
        assert_eq!(chart.y_axis, vec!["Completed", "Pending"]);
        let colors = chart.colors.unwrap();
        assert_eq!(colors["Completed"], "#10b981");
        assert_eq!(colors["Pending"], "#f59e0b");
        assert_eq!(chart.data_points.unwrap()[1], DataPoint { label: "Pending".into(), value: 5.0 });
    }

    #[test]
    fn test_status_pie_keeps_zero_slices() {
        let results = rs(
            &["user_id", "in_progress", "completed", "on_hold"],
            vec![vec![json!(7), json!(0), json!(3), json!(0)]],
        );
        let chart = classify("status breakdown for Ravi", &results, "").unwrap();
        assert_eq!(chart.chart_type, ChartType::Pie);
        assert_eq!(chart.y_axis, vec!["In Progress", "Completed", "On Hold"]);
        assert_eq!(chart.colors.unwrap()["In Progress"], "#3b82f6");
    }

    #[test]
    fn test_multi_row_status_is_stacked_bar() {
        let results = rs(
            &["user_name", "completed", "pending", "on_hold"],
            vec![
                vec![json!("Asha"), json!(4), json!(2), Value::Null],
                vec![json!("Ravi"), json!(1), json!(6), json!(1)],
            ],
        );
        let chart = classify("ticket status by user", &results, "").unwrap();
        assert_eq!(chart.chart_type, ChartType::StackedBar);
        assert_eq!(chart.x_axis.as_deref(), Some("user_name"));
        assert_eq!(chart.stacked_keys.unwrap(), vec!["completed", "pending", "on_hold"]);
        assert_eq!(chart.colors.unwrap()["on_hold"], "#8b5cf6");
    }

    #[test]
    fn test_null_first_value_rescanned() {
        let results = rs(
            &["department", "not_done", "done"],
            vec![
                vec![json!("IT"), Value::Null, json!(3)],
                vec![json!("HR"), json!(2), json!(1)],
            ],
        );
        let chart = classify("done vs not done per department", &results, "").unwrap();
        assert_eq!(chart.chart_type, ChartType::StackedBar);
        let colors = chart.colors.unwrap();
        assert_eq!(colors["not_done"], "#ef4444");
        assert_eq!(colors["done"], "#10b981");
    }

    #[test]
    fn test_list_query_without_numbers_is_table() {
        let results = rs(&["name", "email"], vec![vec![json!("Asha Rao"), json!("asha@pms.test")]]);
        assert_eq!(classify("list all users", &results, ""), None);
    }

    #[test]
    fn test_single_fact_is_table() {
        let results = rs(&["pending_count"], vec![vec![json!(42)]]);
        assert_eq!(classify("how many tickets are open", &results, ""), None);
    }

    #[test]
    fn test_ranking_beats_categorical_pie() {
        let rows = ["IT", "HR", "Sales", "Ops", "Finance"]
            .iter()
            .enumerate()
            .map(|(i, d)| vec![json!(d), json!(50 - i * 7)])
            .collect();
        let results = rs(&["department", "ticket_count"], rows);
        let chart = classify("top 5 departments by ticket count", &results, "").unwrap();
        assert_eq!(chart.chart_type, ChartType::Bar);
        assert_eq!(chart.x_axis.as_deref(), Some("department"));
        assert_eq!(chart.y_axis, vec!["ticket_count"]);
    }

    #[test]
    fn test_categorical_breakdown_is_pie() {
        let rows = ["IT", "HR", "Sales", "Ops"]
            .iter()
            .map(|d| vec![json!(d), json!(10)])
            .collect();
        let results = rs(&["department", "count"], rows);
        let chart = classify("users per department", &results, "").unwrap();
        assert_eq!(chart.chart_type, ChartType::Pie);
        assert_eq!(chart.title, "Users per department Analysis");
    }

    #[test]
    fn test_time_series_is_line() {
        let rows = (1..=12).map(|m| vec![json!(format!("2024-{:02}", m)), json!(m * 3)]).collect();
        let results = rs(&["month", "new_entries"], rows);
        let chart = classify("entries created per month in 2024", &results, "").unwrap();
        assert_eq!(chart.chart_type, ChartType::Line);
        assert_eq!(chart.x_axis.as_deref(), Some("month"));
        assert_eq!(chart.y_axis, vec!["new_entries"]);
    }

    #[test]
    fn test_fallback_bar_and_id_filter() {
        let rows = (0..12)
            .map(|i| vec![json!(i + 1), json!(format!("user{}", i)), json!(i * 2)])
            .collect();
        let results = rs(&["id", "user_name", "open_items"], rows);
        let chart = classify("workload per person", &results, "").unwrap();
        assert_eq!(chart.chart_type, ChartType::Bar);
        assert_eq!(chart.y_axis, vec!["open_items"]);
    }

    #[test]
    fn test_pending_by_all_users_is_bar() {
        let results = rs(
            &["user_name", "pending_tickets"],
            vec![
                vec![json!("Asha Rao"), json!(4)],
                vec![json!("Ravi Kumar"), json!(0)],
                vec![json!("Meera Iyer"), json!(2)],
            ],
        );
        let chart = classify("How many help tickets are pending by all users, give names", &results, "").unwrap();
        assert_eq!(chart.chart_type, ChartType::Bar);
        assert_eq!(chart.x_axis.as_deref(), Some("user_name"));
    }

    #[test]
    fn test_classification_is_idempotent() {
        let results = rs(
            &["user_name", "completed", "pending", "unlabelled"],
            vec![
                vec![json!("Asha"), json!(4), json!(2), json!(1)],
                vec![json!("Ravi"), json!(1), json!(6), json!(0)],
            ],
        );
        let first = classify("status by user", &results, "");
        let second = classify("status by user", &results, "");
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn test_chart_titles() {
        assert_eq!(chart_title("who has the most tickets?"), "Who has the most tickets?");
        assert_eq!(chart_title("show tickets by priority."), "Show tickets by priority Analysis");
        assert_eq!(chart_title("  tickets!! "), "Tickets Analysis");
    }

    #[test]
    fn test_wire_shape() {
        let chart = ChartConfig::new(ChartType::StackedBar, None, vec!["a".into()], "T".into());
        let json = serde_json::to_value(&chart).unwrap();
        assert_eq!(json["chart_type"], "stacked_bar");
        assert!(json.get("x_axis").is_none());
    }
}
