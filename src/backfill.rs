use crate::analyze::compute_row;
use crate::cli::{BackfillArgs, CommonArgs};
use crate::dataset::{Dataset, MergeOutcome};
use crate::error::{Result, TrendError};
use crate::git::{commit_as_of, CommitPoint, GitRepo};
use crate::model::{AggregateRow, MetricSchema, SnapshotId};
use crate::tool::ToolCommand;
use crate::util::month_starts;
use anyhow::{bail, Context};
use chrono::NaiveDate;
use console::style;
use gix::ObjectId;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Produces the aggregate row for a month boundary.
pub trait SnapshotSource {
    fn row_for(&mut self, snapshot: SnapshotId) -> Result<AggregateRow>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Record the failure and move on to the next month.
    Continue,
    /// Stop at the first failure.
    FailFast,
}

#[derive(Debug, Default)]
pub struct BackfillReport {
    pub added: Vec<SnapshotId>,
    pub skipped: Vec<SnapshotId>,
    pub failed: Vec<(SnapshotId, String)>,
    pub aborted: bool,
}

/// Merge a row for every snapshot missing from `dataset`.
pub fn run_backfill(
    dataset: &mut Dataset,
    snapshots: &[SnapshotId],
    source: &mut dyn SnapshotSource,
    schema: &MetricSchema,
    policy: FailurePolicy,
    progress: &ProgressBar,
) -> BackfillReport {
    let mut report = BackfillReport::default();

    for &snapshot in snapshots {
        progress.set_message(snapshot.to_string());
        if dataset.contains(snapshot) {
            debug!(%snapshot, "already recorded");
            report.skipped.push(snapshot);
            progress.inc(1);
            continue;
        }

        let merged = source
            .row_for(snapshot)
            .and_then(|row| dataset.merge(row, schema, false));
        progress.inc(1);

        match merged {
            Ok(MergeOutcome::Added) | Ok(MergeOutcome::Replaced) => {
                info!(%snapshot, "row computed");
                report.added.push(snapshot);
            }
            Ok(MergeOutcome::Skipped) => report.skipped.push(snapshot),
            Err(e) => {
                warn!(%snapshot, error = %e, "month failed");
                report.failed.push((snapshot, e.to_string()));
                if policy == FailurePolicy::FailFast {
                    report.aborted = true;
                    break;
                }
            }
        }
    }

    report
}

/// Snapshots of a git branch, exported to a scratch directory and fed to the metrics tool.
pub struct RepoSource {
    repo: GitRepo,
    history: Vec<CommitPoint>,
    tool: ToolCommand,
    src_subdir: PathBuf,
    cloc_language: String,
    rows_by_commit: HashMap<ObjectId, AggregateRow>,
}

impl RepoSource {
    pub fn new(repo: GitRepo, branch: &str, tool: ToolCommand, src_subdir: PathBuf, cloc_language: String) -> Result<Self> {
        let history = repo.first_parent_history(branch)?;
        Ok(Self {
            repo,
            history,
            tool,
            src_subdir,
            cloc_language,
            rows_by_commit: HashMap::new(),
        })
    }

    pub fn first_commit_date(&self) -> Option<NaiveDate> {
        self.history.last().map(|c| c.timestamp.date_naive())
    }
}

impl SnapshotSource for RepoSource {
    fn row_for(&mut self, snapshot: SnapshotId) -> Result<AggregateRow> {
        let commit = *commit_as_of(&self.history, snapshot.end_of_day())
            .ok_or_else(|| TrendError::InvalidSnapshot(format!("{snapshot} predates the branch history")))?;

        // quiet months resolve to the same commit
        if let Some(row) = self.rows_by_commit.get(&commit.id) {
            debug!(%snapshot, commit = %commit.id, "reusing row of unchanged commit");
            return Ok(row.with_snapshot(snapshot));
        }

        let scratch = tempfile::tempdir()?;
        let files = self.repo.export_tree(commit.id, scratch.path())?;
        debug!(%snapshot, commit = %commit.id, files, "exported snapshot");

        let src = scratch.path().join(&self.src_subdir);
        if !src.is_dir() {
            return Err(TrendError::Tool(format!(
                "{} does not exist at commit {}",
                self.src_subdir.display(),
                commit.id
            )));
        }

        let row = compute_row(&self.tool, Some(&src), snapshot, &self.cloc_language)?;
        self.rows_by_commit.insert(commit.id, row.clone());
        Ok(row)
    }
}

pub fn exec(common: CommonArgs, args: BackfillArgs) -> anyhow::Result<()> {
    let repo = GitRepo::open(args.repo.as_ref()).context("Failed to open git repository")?;
    let tool: ToolCommand = args.tool.parse()?;
    let mut source = RepoSource::new(repo, &args.branch, tool, args.src_subdir.clone(), common.cloc_language.clone())
        .context("Failed to read branch history")?;

    let store = common.open_store()?;
    let mut dataset = match &store {
        Some(store) => store
            .load()
            .with_context(|| format!("Failed to load dataset from {}", store.describe()))?,
        None => Dataset::new(),
    };

    let first_commit = source
        .first_commit_date()
        .context("Branch has no commits")?;
    let since = args.since.as_deref().map(parse_bound).transpose()?;
    let until = match &args.until {
        Some(s) => parse_bound(s)?,
        None => SnapshotId::today().date(),
    };
    let months = backfill_months(since, until, first_commit, dataset.earliest(), args.max_months)?;
    info!(months = months.len(), %first_commit, to = %until, "backfilling");

    let pb = ProgressBar::new(months.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{bar:40.green} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    let policy = if args.fail_fast {
        FailurePolicy::FailFast
    } else {
        FailurePolicy::Continue
    };
    let report = run_backfill(
        &mut dataset,
        &months,
        &mut source,
        &MetricSchema::standard(),
        policy,
        &pb,
    );
    pb.finish_and_clear();

    if report.added.is_empty() {
        println!("{} nothing to backfill ({} months already recorded)", style("Unchanged").yellow(), report.skipped.len());
    } else {
        match &store {
            Some(store) => {
                let message = format!(
                    "Backfill metrics for {}..{} ({} rows)",
                    report.added[0],
                    report.added[report.added.len() - 1],
                    report.added.len()
                );
                let revision = store
                    .save(&dataset, &message)
                    .with_context(|| format!("Failed to upload dataset to {}", store.describe()))?;
                println!(
                    "{} {} rows to {}. Commit: {}",
                    style("Added").green().bold(),
                    report.added.len(),
                    store.describe(),
                    style(revision).dim()
                );
            }
            None => print!("{}", dataset.to_csv_string()?),
        }
    }

    if !report.failed.is_empty() {
        for (snapshot, error) in &report.failed {
            eprintln!("{} {}: {}", style("failed").red(), snapshot, error);
        }
        let dates: Vec<String> = report.failed.iter().map(|(s, _)| s.to_string()).collect();
        if report.aborted {
            bail!("Backfill aborted at {}", dates.join(", "));
        }
        bail!("{} month(s) failed: {}", dates.len(), dates.join(", "));
    }

    Ok(())
}

/// Month boundaries to fill.
///
/// `since` defaults to the earliest recorded snapshot, then to the first commit, and never
/// precedes the first commit. A boundary before the first commit has no commit as of that
/// day, so the first commit's own month is left out unless the commit lands on the 1st.
/// `max_months` keeps the most recent boundaries.
pub fn backfill_months(
    since: Option<NaiveDate>,
    until: NaiveDate,
    first_commit: NaiveDate,
    earliest: Option<SnapshotId>,
    max_months: Option<usize>,
) -> anyhow::Result<Vec<SnapshotId>> {
    let since = since.or_else(|| earliest.map(|s| s.date())).unwrap_or(first_commit);
    if since > until {
        bail!("Invalid range: since ({since}) is after until ({until})");
    }
    if since < first_commit {
        info!(%since, %first_commit, "range starts before the branch history, clamping");
    }

    let mut months = month_starts(since.max(first_commit), until);
    if let Some(max) = max_months {
        let excess = months.len().saturating_sub(max);
        months.drain(..excess);
    }
    Ok(months)
}

fn parse_bound(input: &str) -> anyhow::Result<NaiveDate> {
    let snapshot: SnapshotId = input
        .parse()
        .with_context(|| format!("Invalid date bound '{input}'"))?;
    Ok(snapshot.date())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MetricValue;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    struct FakeSource {
        failing: Vec<SnapshotId>,
        calls: Vec<SnapshotId>,
    }

    impl FakeSource {
        fn new(failing: &[&str]) -> Self {
            Self {
                failing: failing.iter().map(|s| s.parse().unwrap()).collect(),
                calls: Vec::new(),
            }
        }
    }

    impl SnapshotSource for FakeSource {
        fn row_for(&mut self, snapshot: SnapshotId) -> Result<AggregateRow> {
            self.calls.push(snapshot);
            if self.failing.contains(&snapshot) {
                return Err(TrendError::Tool("tool crashed".to_string()));
            }
            let mut row = AggregateRow::new(snapshot);
            row.insert("lines mean", snapshot.date().format("%m").to_string().parse::<f64>().unwrap());
            Ok(row)
        }
    }

    fn schema() -> MetricSchema {
        MetricSchema::new(["lines mean"], Vec::<String>::new())
    }

    fn months(from: &str, to: &str) -> Vec<SnapshotId> {
        let d = |s: &str| NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap();
        month_starts(d(from), d(to))
    }

    fn existing(dates: &[(&str, f64)]) -> Dataset {
        let mut ds = Dataset::new();
        for (date, value) in dates {
            let mut row = AggregateRow::new(date.parse().unwrap());
            row.insert("lines mean", *value);
            ds.merge(row, &schema(), false).unwrap();
        }
        ds
    }

    fn dates(ds: &Dataset) -> Vec<String> {
        ds.rows().iter().map(|r| r.snapshot.to_string()).collect()
    }

    #[test]
    fn fills_only_missing_months() {
        let mut ds = existing(&[("2023-01-01", 100.0), ("2023-02-01", 200.0)]);
        let mut source = FakeSource::new(&[]);
        let report = run_backfill(
            &mut ds,
            &months("2023-01-01", "2023-03-01"),
            &mut source,
            &schema(),
            FailurePolicy::Continue,
            &ProgressBar::hidden(),
        );

        assert_eq!(dates(&ds), vec!["2023-01-01", "2023-02-01", "2023-03-01"]);
        assert_eq!(source.calls, vec!["2023-03-01".parse::<SnapshotId>().unwrap()]);
        assert_eq!(report.added.len(), 1);
        assert_eq!(report.skipped.len(), 2);
        // existing rows untouched
        assert_eq!(ds.rows()[0].get("lines mean"), Some(MetricValue::Float(100.0)));
        assert_eq!(ds.rows()[1].get("lines mean"), Some(MetricValue::Float(200.0)));
    }

    #[test]
    fn second_run_is_a_no_op() {
        let mut ds = Dataset::new();
        let range = months("2023-01-01", "2023-06-01");
        run_backfill(&mut ds, &range, &mut FakeSource::new(&[]), &schema(), FailurePolicy::Continue, &ProgressBar::hidden());
        let after_first = ds.clone();

        let mut source = FakeSource::new(&[]);
        let report = run_backfill(&mut ds, &range, &mut source, &schema(), FailurePolicy::Continue, &ProgressBar::hidden());
        assert!(source.calls.is_empty());
        assert!(report.added.is_empty());
        assert_eq!(ds, after_first);
        assert_eq!(ds.len(), 6);
    }

    #[test]
    fn continues_past_a_failed_month() {
        let mut ds = Dataset::new();
        let mut source = FakeSource::new(&["2023-02-01"]);
        let report = run_backfill(
            &mut ds,
            &months("2023-01-01", "2023-04-01"),
            &mut source,
            &schema(),
            FailurePolicy::Continue,
            &ProgressBar::hidden(),
        );

        assert_eq!(dates(&ds), vec!["2023-01-01", "2023-03-01", "2023-04-01"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0.to_string(), "2023-02-01");
        assert!(!report.aborted);
    }

    #[test]
    fn fail_fast_stops_at_first_failure() {
        let mut ds = Dataset::new();
        let mut source = FakeSource::new(&["2023-02-01"]);
        let report = run_backfill(
            &mut ds,
            &months("2023-01-01", "2023-04-01"),
            &mut source,
            &schema(),
            FailurePolicy::FailFast,
            &ProgressBar::hidden(),
        );

        assert_eq!(dates(&ds), vec!["2023-01-01"]);
        assert_eq!(source.calls.len(), 2);
        assert!(report.aborted);
    }

    #[test]
    fn schema_mismatch_counts_as_failure() {
        let mut ds = Dataset::new();
        let strict = MetricSchema::new(["lines mean", "lines max"], Vec::<String>::new());
        let report = run_backfill(
            &mut ds,
            &months("2023-01-01", "2023-01-01"),
            &mut FakeSource::new(&[]),
            &strict,
            FailurePolicy::Continue,
            &ProgressBar::hidden(),
        );
        assert!(ds.is_empty());
        assert!(report.failed[0].1.contains("lines max"));
    }

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn strings(ids: &[SnapshotId]) -> Vec<String> {
        ids.iter().map(|i| i.to_string()).collect()
    }

    #[test]
    fn range_defaults_to_earliest_recorded_snapshot() {
        let months = backfill_months(
            None,
            day("2023-04-10"),
            day("2020-06-03"),
            Some("2023-02-01".parse().unwrap()),
            None,
        )
        .unwrap();
        assert_eq!(strings(&months), vec!["2023-02-01", "2023-03-01", "2023-04-01"]);
    }

    #[test]
    fn range_without_data_starts_after_first_commit() {
        // the commit lands mid-month, so its own month has nothing to analyze yet
        let months = backfill_months(None, day("2023-03-01"), day("2022-12-15"), None, None).unwrap();
        assert_eq!(strings(&months), vec!["2023-01-01", "2023-02-01", "2023-03-01"]);

        let months = backfill_months(None, day("2023-02-01"), day("2022-12-01"), None, None).unwrap();
        assert_eq!(strings(&months), vec!["2022-12-01", "2023-01-01", "2023-02-01"]);
    }

    #[test]
    fn explicit_since_is_clamped_to_first_commit() {
        let months = backfill_months(
            Some(day("2019-01-01")),
            day("2023-02-01"),
            day("2022-12-15"),
            Some("2018-01-01".parse().unwrap()),
            None,
        )
        .unwrap();
        assert_eq!(strings(&months), vec!["2023-01-01", "2023-02-01"]);
    }

    #[test]
    fn max_months_keeps_the_most_recent() {
        let months = backfill_months(
            Some(day("2023-01-01")),
            day("2023-06-01"),
            day("2022-01-01"),
            None,
            Some(2),
        )
        .unwrap();
        assert_eq!(strings(&months), vec!["2023-05-01", "2023-06-01"]);

        let all = backfill_months(Some(day("2023-01-01")), day("2023-02-01"), day("2022-01-01"), None, Some(10))
            .unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn inverted_range_is_rejected() {
        assert!(backfill_months(Some(day("2023-05-01")), day("2023-01-01"), day("2022-01-01"), None, None).is_err());
    }
}
