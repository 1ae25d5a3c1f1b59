use crate::hub::{resolve_token, HubClient, HubTarget, RepoType, DEFAULT_ENDPOINT};
use crate::store::{DatasetStore, HubStore, LocalStore};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "codetrend")]
#[command(about = "Aggregate code-quality reports into a hosted CSV and backfill monthly history")]
#[command(version)]
pub struct Cli {
    #[clap(flatten)]
    pub common: CommonArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Clone)]
pub struct CommonArgs {
    #[arg(long, env = "CODETREND_HUB_REPO", help = "Hub repository id holding the dataset, e.g. 'username/space-name'")]
    pub hub_repo: Option<String>,

    #[arg(long, help = "Path of the CSV inside the Hub repository", default_value = "metrics.csv")]
    pub hub_file: String,

    #[arg(long, help = "Branch to read and write", default_value = "main")]
    pub hub_branch: String,

    #[arg(long, value_enum, help = "Hub repository type", default_value_t = RepoType::Space)]
    pub hub_repo_type: RepoType,

    #[arg(long, env = "HF_TOKEN", hide_env_values = true, help = "Hub token (otherwise read from the Hugging Face token file)")]
    pub hub_token: Option<String>,

    #[arg(long, env = "HF_ENDPOINT", help = "Hub endpoint", default_value = DEFAULT_ENDPOINT)]
    pub hub_endpoint: String,

    #[arg(
        long,
        env = "CODETREND_DATASET",
        conflicts_with = "hub_repo",
        help = "Local CSV file to use as the dataset instead of the Hub"
    )]
    pub dataset: Option<PathBuf>,

    #[arg(long, help = "Language whose cloc line counts are recorded", default_value = "Python")]
    pub cloc_language: String,

    #[arg(short, long, help = "Log debug output")]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Aggregate one report and merge the row into the dataset
    Analyze(AnalyzeArgs),
    /// Fill in one row per month from the monitored repository's history
    Backfill(BackfillArgs),
}

#[derive(Args, Clone)]
pub struct AnalyzeArgs {
    #[arg(help = "JSON report produced by the metrics tool")]
    pub report: Option<PathBuf>,

    #[arg(
        long,
        env = "CODETREND_TOOL",
        help = "Metrics tool command; '{src}' and '{report}' are substituted. Ignored when REPORT is given"
    )]
    pub tool: Option<String>,

    #[arg(long, help = "Source directory (tool input and cloc line counts)", default_value = ".")]
    pub src_path: PathBuf,

    #[arg(long, help = "Snapshot date (YYYY-MM-DD, RFC3339, or a revision with --repo); defaults to today")]
    pub date: Option<String>,

    #[arg(long, help = "Monitored git repository, used to resolve and validate the snapshot")]
    pub repo: Option<PathBuf>,

    #[arg(long, help = "Recompute the row even if the snapshot is already recorded")]
    pub force: bool,
}

#[derive(Args, Clone)]
pub struct BackfillArgs {
    #[arg(long, help = "Path to the monitored git repository")]
    pub repo: Option<PathBuf>,

    #[arg(long, help = "Branch whose first-parent history is sampled", default_value = "main")]
    pub branch: String,

    #[arg(long, help = "Subdirectory of the repository to analyze", default_value = ".")]
    pub src_subdir: PathBuf,

    #[arg(long, env = "CODETREND_TOOL", help = "Metrics tool command; '{src}' and '{report}' are substituted")]
    pub tool: String,

    #[arg(long, help = "First month to fill (YYYY-MM-DD); defaults to the earliest recorded snapshot")]
    pub since: Option<String>,

    #[arg(long, help = "Last month to fill (YYYY-MM-DD); defaults to today")]
    pub until: Option<String>,

    #[arg(long, help = "Only fill the most recent N months")]
    pub max_months: Option<usize>,

    #[arg(long, help = "Stop at the first month that fails instead of continuing")]
    pub fail_fast: bool,
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    pub fn execute(self) -> Result<()> {
        match self.command {
            Commands::Analyze(args) => crate::analyze::exec(self.common, args),
            Commands::Backfill(args) => crate::backfill::exec(self.common, args),
        }
    }
}

impl CommonArgs {
    /// The configured dataset, or `None` when rows should only be printed.
    pub fn open_store(&self) -> Result<Option<Box<dyn DatasetStore>>> {
        if let Some(path) = &self.dataset {
            return Ok(Some(Box::new(LocalStore::new(path.clone()))));
        }
        let Some(repo_id) = &self.hub_repo else {
            return Ok(None);
        };

        let client = HubClient::new(&self.hub_endpoint, resolve_token(self.hub_token.clone()))
            .context("Failed to build Hub client")?;
        let target = HubTarget {
            repo_id: repo_id.clone(),
            file: self.hub_file.clone(),
            branch: self.hub_branch.clone(),
            repo_type: self.hub_repo_type,
        };
        Ok(Some(Box::new(HubStore::new(client, target))))
    }
}
