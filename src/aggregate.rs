use crate::error::{Result, TrendError};
use crate::model::{AggregateRow, SnapshotId};
use crate::report::Item;

/// Every column `aggregate` produces, in output order.
pub const REQUIRED_COLUMNS: [&str; 26] = [
    "docstring coverage",
    "docstring missing",
    "lines mean",
    "lines max",
    "lines 90th-percentile",
    "statements mean",
    "statements max",
    "statements 90th-percentile",
    "expressions mean",
    "expressions max",
    "expressions 90th-percentile",
    "cyclomatic_complexity mean",
    "cyclomatic_complexity max",
    "cyclomatic_complexity 90th-percentile",
    "parameters mean",
    "parameters max",
    "parameters 90th-percentile",
    "type_coverage mean",
    "type_coverage min",
    "type_coverage 50th-percentile",
    "todo_comments total",
    "duplication.score mean",
    "duplication.score max",
    "duplication.score 90th-percentile",
    "duplication.score 50th-percentile",
    "duplication.duplicated-lines total",
];

/// Reduce measured items to one aggregate row.
pub fn aggregate(items: &[Item], snapshot: SnapshotId) -> Result<AggregateRow> {
    if items.is_empty() {
        return Err(TrendError::EmptyReport);
    }

    let mut row = AggregateRow::new(snapshot);
    let total = items.len() as f64;

    let documented = items.iter().filter(|i| i.has_docstring).count();
    row.insert("docstring coverage", round4(documented as f64 / total));
    row.insert("docstring missing", (items.len() - documented) as i64);

    let counters: [(&str, fn(&Item) -> i64); 5] = [
        ("lines", |i| i.lines),
        ("statements", |i| i.statements),
        ("expressions", |i| i.expressions),
        ("cyclomatic_complexity", |i| i.cyclomatic_complexity),
        ("parameters", |i| i.parameters),
    ];
    for (name, field) in counters {
        let values: Vec<f64> = items.iter().map(|i| field(i) as f64).collect();
        row.insert(&format!("{name} mean"), round4(mean(&values)));
        row.insert(&format!("{name} max"), max(&values) as i64);
        row.insert(&format!("{name} 90th-percentile"), quantile(&values, 0.9) as i64);
    }

    // Items the tool could not type-check carry no coverage at all.
    let coverage: Vec<f64> = items.iter().filter_map(|i| i.type_coverage).collect();
    if coverage.is_empty() {
        row.insert("type_coverage mean", 0.0);
        row.insert("type_coverage min", 0i64);
        row.insert("type_coverage 50th-percentile", 0i64);
    } else {
        row.insert("type_coverage mean", round4(mean(&coverage)));
        row.insert("type_coverage min", min(&coverage) as i64);
        row.insert("type_coverage 50th-percentile", quantile(&coverage, 0.5) as i64);
    }

    row.insert("todo_comments total", items.iter().map(|i| i.todo_comments).sum::<i64>());

    let scores: Vec<f64> = items.iter().map(|i| i.duplication_score).collect();
    row.insert("duplication.score mean", round4(mean(&scores)));
    row.insert("duplication.score max", max(&scores));
    row.insert("duplication.score 90th-percentile", quantile(&scores, 0.9));
    row.insert("duplication.score 50th-percentile", quantile(&scores, 0.5));

    let duplicated: f64 = items
        .iter()
        .map(|i| i.lines as f64 * i.duplication_score)
        .sum();
    row.insert("duplication.duplicated-lines total", duplicated.round_ties_even() as i64);

    Ok(row)
}

fn round4(v: f64) -> f64 {
    (v * 10_000.0).round_ties_even() / 10_000.0
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn max(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}

fn min(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::INFINITY, f64::min)
}

/// Quantile with linear interpolation between closest ranks.
fn quantile(values: &[f64], q: f64) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}
