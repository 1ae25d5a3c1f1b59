use crate::model::AggregateRow;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::process::Command;
use tracing::{debug, warn};

pub const CLOC_COLUMNS: [&str; 4] = ["files", "lines blank", "lines comment", "lines code"];

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct LanguageCounts {
    #[serde(rename = "nFiles")]
    pub files: i64,
    pub blank: i64,
    pub comment: i64,
    pub code: i64,
}

/// Parse `cloc --json` output and pick one language's counts.
pub fn parse_cloc(json: &str, language: &str) -> Option<LanguageCounts> {
    let mut by_language: HashMap<String, serde_json::Value> = serde_json::from_str(json).ok()?;
    let entry = by_language.remove(language)?;
    serde_json::from_value(entry).ok()
}

/// Run `cloc` on `src`. A missing or failing `cloc` only costs the optional columns.
pub fn cloc_counts(src: &Path, language: &str) -> Option<LanguageCounts> {
    let output = match Command::new("cloc").arg("--json").arg(src).output() {
        Ok(output) => output,
        Err(e) => {
            warn!(error = %e, "cloc is not available, skipping line counts");
            return None;
        }
    };
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        warn!(status = %output.status, stderr = %stderr.trim(), "cloc failed, skipping line counts");
        return None;
    }

    let counts = parse_cloc(&String::from_utf8_lossy(&output.stdout), language);
    if counts.is_none() {
        debug!(language, path = %src.display(), "cloc reported no files for language");
    }
    counts
}

pub fn add_cloc_columns(row: &mut AggregateRow, counts: LanguageCounts) {
    row.insert("files", counts.files);
    row.insert("lines blank", counts.blank);
    row.insert("lines comment", counts.comment);
    row.insert("lines code", counts.code);
}
