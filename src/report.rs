use crate::error::{Result, TrendError};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use std::path::Path;

/// One node of the metrics tool's JSON tree (directory, file, class, function...).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReportNode {
    pub name: Option<String>,
    pub nodetype: Option<String>,
    pub path: Option<String>,
    pub qualname: Option<String>,
    pub lineno: Option<u64>,
    pub end_lineno: Option<u64>,
    pub docstring: Option<String>,
    /// `None` unless the node has a non-empty `metrics` object.
    #[serde(deserialize_with = "metrics_object")]
    pub metrics: Option<NodeMetrics>,
    #[serde(deserialize_with = "null_as_empty")]
    pub children: Vec<ReportNode>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct NodeMetrics {
    pub lines: Option<f64>,
    pub statements: Option<f64>,
    pub expressions: Option<f64>,
    pub cyclomatic_complexity: Option<f64>,
    pub parameters: Option<f64>,
    pub type_coverage: Option<f64>,
    pub todo_comments: Option<f64>,
    pub duplication: Option<Duplication>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Duplication {
    pub score: Option<f64>,
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Vec<ReportNode>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<ReportNode>>::deserialize(deserializer)?.unwrap_or_default())
}

// presence is decided on the raw object: all-null or unknown-only metrics still count
fn metrics_object<'de, D>(deserializer: D) -> std::result::Result<Option<NodeMetrics>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Map<String, Value>>::deserialize(deserializer)? {
        Some(map) if !map.is_empty() => NodeMetrics::deserialize(Value::Object(map))
            .map(Some)
            .map_err(D::Error::custom),
        _ => Ok(None),
    }
}

/// A measured item, with nulls already filled in.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub qualname: String,
    pub has_docstring: bool,
    pub lines: i64,
    pub statements: i64,
    pub expressions: i64,
    pub cyclomatic_complexity: i64,
    pub parameters: i64,
    pub type_coverage: Option<f64>,
    pub todo_comments: i64,
    pub duplication_score: f64,
}

impl Item {
    fn from_node(node: &ReportNode, metrics: &NodeMetrics) -> Self {
        let count = |v: Option<f64>| v.unwrap_or(0.0) as i64;
        Self {
            qualname: node
                .qualname
                .clone()
                .filter(|q| !q.is_empty())
                .or_else(|| node.name.clone())
                .unwrap_or_default(),
            has_docstring: node.docstring.as_deref().is_some_and(|d| !d.is_empty()),
            lines: count(metrics.lines),
            statements: count(metrics.statements),
            expressions: count(metrics.expressions),
            cyclomatic_complexity: count(metrics.cyclomatic_complexity),
            parameters: count(metrics.parameters),
            type_coverage: metrics.type_coverage,
            todo_comments: count(metrics.todo_comments),
            duplication_score: metrics.duplication.as_ref().and_then(|d| d.score).unwrap_or(0.0),
        }
    }
}

pub fn parse_report(json: &str) -> Result<ReportNode> {
    serde_json::from_str(json).map_err(|e| TrendError::Report(e.to_string()))
}

pub fn load_report(path: &Path) -> Result<ReportNode> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| TrendError::Report(format!("cannot read {}: {e}", path.display())))?;
    parse_report(&text)
}

/// Pre-order walk keeping only nodes that carry metrics.
pub fn measured_items(root: &ReportNode) -> Vec<Item> {
    let mut items = Vec::new();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if let Some(metrics) = &node.metrics {
            items.push(Item::from_node(node, metrics));
        }
        stack.extend(node.children.iter().rev());
    }
    items
}
