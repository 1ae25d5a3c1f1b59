use crate::error::{Result, TrendError};
use crate::report::{load_report, ReportNode};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::str::FromStr;
use tracing::debug;

const SRC_PLACEHOLDER: &str = "{src}";
const REPORT_PLACEHOLDER: &str = "{report}";

/// Source of fine-grained metrics for a source tree.
pub trait MetricsTool {
    fn report(&self, src: &Path) -> Result<ReportNode>;
}

/// A report produced ahead of time; `src` is ignored.
pub struct ReportFile(pub PathBuf);

impl MetricsTool for ReportFile {
    fn report(&self, _src: &Path) -> Result<ReportNode> {
        load_report(&self.0)
    }
}

/// The external tool as a command line, e.g. `python main.py {src} -o {report}`.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl FromStr for ToolCommand {
    type Err = TrendError;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = shlex::split(s)
            .ok_or_else(|| TrendError::Tool(format!("unbalanced quotes in tool command '{s}'")))?
            .into_iter();
        let program = parts
            .next()
            .ok_or_else(|| TrendError::Tool("empty tool command".to_string()))?;
        let mut args: Vec<String> = parts.collect();
        if !args
            .iter()
            .any(|a| a.contains(SRC_PLACEHOLDER) || a.contains(REPORT_PLACEHOLDER))
        {
            args.extend([SRC_PLACEHOLDER.to_string(), "-o".to_string(), REPORT_PLACEHOLDER.to_string()]);
        }
        Ok(Self { program, args })
    }
}

impl ToolCommand {
    fn expand(&self, src: &Path, report: &Path) -> Vec<String> {
        let src = src.to_string_lossy();
        let report = report.to_string_lossy();
        self.args
            .iter()
            .map(|a| a.replace(SRC_PLACEHOLDER, &src).replace(REPORT_PLACEHOLDER, &report))
            .collect()
    }
}

impl MetricsTool for ToolCommand {
    fn report(&self, src: &Path) -> Result<ReportNode> {
        let scratch = tempfile::tempdir()?;
        let report_path = scratch.path().join("report.json");
        let args = self.expand(src, &report_path);
        debug!(program = %self.program, ?args, "running metrics tool");

        let output = Command::new(&self.program)
            .args(&args)
            .output()
            .map_err(|e| TrendError::Tool(format!("cannot run '{}': {e}", self.program)))?;
        if !output.status.success() {
            return Err(TrendError::Tool(format!(
                "'{}' exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        if !report_path.exists() {
            return Err(TrendError::Tool(format!(
                "'{}' did not write {}",
                self.program,
                report_path.display()
            )));
        }

        load_report(&report_path)
    }
}
