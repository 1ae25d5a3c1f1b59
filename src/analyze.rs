use crate::aggregate::aggregate;
use crate::cli::{AnalyzeArgs, CommonArgs};
use crate::cloc::{add_cloc_columns, cloc_counts};
use crate::dataset::{Dataset, MergeOutcome};
use crate::error::{Result, TrendError};
use crate::git::GitRepo;
use crate::model::{AggregateRow, MetricSchema, SnapshotId};
use crate::report::measured_items;
use crate::tool::{MetricsTool, ReportFile, ToolCommand};
use anyhow::{bail, Context};
use console::style;
use std::path::Path;
use tracing::info;

pub fn exec(common: CommonArgs, args: AnalyzeArgs) -> anyhow::Result<()> {
    let repo = match &args.repo {
        Some(path) => Some(GitRepo::open(Some(path)).context("Failed to open git repository")?),
        None => None,
    };
    let snapshot = resolve_snapshot(args.date.as_deref(), repo.as_ref())?;

    let tool: Box<dyn MetricsTool> = match (&args.report, &args.tool) {
        (Some(report), _) => Box::new(ReportFile(report.clone())),
        (None, Some(command)) => Box::new(command.parse::<ToolCommand>()?),
        (None, None) => bail!("either a REPORT file or --tool (or CODETREND_TOOL) is required"),
    };
    let src = Some(args.src_path.as_path());

    let schema = MetricSchema::standard();
    let Some(store) = common.open_store()? else {
        let row = compute_row(tool.as_ref(), src, snapshot, &common.cloc_language)
            .with_context(|| format!("Failed to compute metrics for {snapshot}"))?;
        let mut single = Dataset::new();
        single.merge(row, &schema, false)?;
        print!("{}", single.to_csv_string()?);
        return Ok(());
    };

    let mut dataset = store
        .load()
        .with_context(|| format!("Failed to load dataset from {}", store.describe()))?;

    if dataset.contains(snapshot) && !args.force {
        info!(%snapshot, "snapshot already recorded, nothing to do (use --force to recompute)");
        println!("{} {} already has a row for {}", style("Unchanged").yellow(), store.describe(), snapshot);
        return Ok(());
    }

    let row = compute_row(tool.as_ref(), src, snapshot, &common.cloc_language)
        .with_context(|| format!("Failed to compute metrics for {snapshot}"))?;
    let outcome = dataset
        .merge(row, &schema, args.force)
        .context("Row does not match the dataset schema")?;

    let revision = store
        .save(&dataset, &format!("Append metrics for {snapshot}"))
        .with_context(|| format!("Failed to upload dataset to {}", store.describe()))?;

    let verb = match outcome {
        MergeOutcome::Replaced => "Replaced",
        _ => "Added",
    };
    info!(%snapshot, rows = dataset.len(), %revision, "dataset updated");
    println!(
        "{} row for {} in {}. Commit: {}",
        style(verb).green().bold(),
        snapshot,
        store.describe(),
        style(revision).dim()
    );
    Ok(())
}

/// Run the tool, reduce its report, and add cloc counts when a source directory is known.
pub fn compute_row(
    tool: &dyn MetricsTool,
    src: Option<&Path>,
    snapshot: SnapshotId,
    cloc_language: &str,
) -> Result<AggregateRow> {
    let report = tool.report(src.unwrap_or_else(|| Path::new(".")))?;
    let items = measured_items(&report);
    let mut row = aggregate(&items, snapshot)?;

    if let Some(counts) = src.and_then(|s| cloc_counts(s, cloc_language)) {
        add_cloc_columns(&mut row, counts);
    }
    Ok(row)
}

/// Today by default; with a repository, revisions are accepted and dates must fall inside its history.
pub fn resolve_snapshot(input: Option<&str>, repo: Option<&GitRepo>) -> Result<SnapshotId> {
    let snapshot = match (input, repo) {
        (None, _) => SnapshotId::today(),
        (Some(s), Some(repo)) => repo.resolve_snapshot(s)?,
        (Some(s), None) => s.parse()?,
    };

    if snapshot > SnapshotId::today() {
        return Err(TrendError::InvalidSnapshot(format!("{snapshot} is in the future")));
    }
    if let Some(repo) = repo {
        let history = repo.first_parent_history("HEAD")?;
        if let Some(first) = history.last() {
            let first_day = SnapshotId::from_timestamp(&first.timestamp);
            if snapshot < first_day {
                return Err(TrendError::InvalidSnapshot(format!(
                    "{snapshot} predates the first commit ({first_day})"
                )));
            }
        }
    }
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{parse_report, ReportNode};
    use pretty_assertions::assert_eq;

    struct Fixed(&'static str);

    impl MetricsTool for Fixed {
        fn report(&self, _src: &Path) -> Result<ReportNode> {
            parse_report(self.0)
        }
    }

    #[test]
    fn computes_row_with_every_required_column() {
        let tool = Fixed(r#"{"children": [{"docstring": "x", "metrics": {"lines": 4}}]}"#);
        let snapshot: SnapshotId = "2024-03-01".parse().unwrap();
        let row = compute_row(&tool, None, snapshot, "Python").unwrap();
        assert_eq!(row.snapshot, snapshot);
        assert!(MetricSchema::standard().validate(&row).is_ok());
    }

    #[test]
    fn report_without_measured_items_fails() {
        let tool = Fixed(r#"{"name": "empty", "children": []}"#);
        let err = compute_row(&tool, None, SnapshotId::today(), "Python").unwrap_err();
        assert!(matches!(err, TrendError::EmptyReport));
    }

    #[test]
    fn snapshot_defaults_to_today_and_rejects_future() {
        assert_eq!(resolve_snapshot(None, None).unwrap(), SnapshotId::today());
        assert!(matches!(
            resolve_snapshot(Some("2999-01-01"), None),
            Err(TrendError::InvalidSnapshot(_))
        ));
        assert!(matches!(
            resolve_snapshot(Some("last tuesday"), None),
            Err(TrendError::InvalidSnapshot(_))
        ));
    }
}
