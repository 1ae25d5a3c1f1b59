use crate::error::{Result, TrendError};
use crate::model::SnapshotId;
use chrono::{DateTime, NaiveDate, Utc};
use gix::objs::tree::EntryKind;
use gix::{discover, ObjectId, Repository};
use std::path::{Path, PathBuf};

/// A commit on a first-parent walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitPoint {
    pub id: ObjectId,
    pub timestamp: DateTime<Utc>,
}

pub struct GitRepo {
    repo: Repository,
    path: PathBuf,
}

impl GitRepo {
    /// Open a repository at `path`, or current dir if `None`
    pub fn open<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        let repo_path = path
            .map(|p| p.as_ref().to_path_buf())
            .unwrap_or(std::env::current_dir()?);

        let repo = discover(&repo_path)?;
        let path = repo.workdir().unwrap_or_else(|| repo.path()).to_path_buf();

        Ok(Self { repo, path })
    }

    /// A `YYYY-MM-DD` date, an RFC3339 timestamp, or any revision (resolved to its commit date).
    pub fn resolve_snapshot(&self, input: &str) -> Result<SnapshotId> {
        if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
            return Ok(SnapshotId::new(date));
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
            return Ok(SnapshotId::from_timestamp(&dt.with_timezone(&Utc)));
        }

        let commit = self.commit_point(input)?;
        Ok(SnapshotId::from_timestamp(&commit.timestamp))
    }

    pub fn commit_point(&self, rev: &str) -> Result<CommitPoint> {
        let id = self
            .repo
            .rev_parse_single(rev)
            .map_err(|e| TrendError::InvalidSnapshot(format!("unknown revision '{rev}': {e}")))?;

        let commit = id
            .object()?
            .try_into_commit()
            .map_err(|_| TrendError::InvalidSnapshot(format!("not a commit: {rev}")))?;

        let secs = commit.time()?.seconds;
        let timestamp = DateTime::<Utc>::from_timestamp(secs, 0)
            .ok_or_else(|| TrendError::GitRepo(format!("invalid timestamp: {secs}")))?;

        Ok(CommitPoint {
            id: commit.id,
            timestamp,
        })
    }

    /// First-parent history of `rev`, newest first.
    pub fn first_parent_history(&self, rev: &str) -> Result<Vec<CommitPoint>> {
        let tip = self
            .commit_point(rev)
            .map_err(|_| TrendError::GitRepo(format!("branch '{rev}' not found in {}", self.path.display())))?;

        let mut history = Vec::new();
        let mut next: Option<ObjectId> = Some(tip.id);
        while let Some(id) = next {
            let commit = self.repo.find_commit(id)?;
            let secs = commit.time()?.seconds;
            let timestamp = DateTime::from_timestamp(secs, 0)
                .ok_or_else(|| TrendError::GitRepo(format!("invalid timestamp: {secs}")))?;

            next = commit.parent_ids().next().map(Into::into);
            history.push(CommitPoint { id, timestamp });
        }

        Ok(history)
    }

    /// Write the files of `commit`'s tree under `dest`. Returns the number of files written.
    pub fn export_tree(&self, commit: ObjectId, dest: &Path) -> Result<usize> {
        let tree = self.repo.find_commit(commit)?.tree()?;
        let mut recorder = gix::traverse::tree::Recorder::default();
        tree.traverse()
            .breadthfirst(&mut recorder)
            .map_err(|e| TrendError::GitRepo(format!("cannot traverse tree of {commit}: {e}")))?;

        let mut written = 0;
        for entry in recorder.records {
            // submodules and symlinks are not part of the analyzed sources
            if !matches!(entry.mode.kind(), EntryKind::Blob | EntryKind::BlobExecutable) {
                continue;
            }
            let target = dest.join(entry.filepath.to_string());
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let object = self.repo.find_object(entry.oid)?;
            std::fs::write(&target, &object.data)?;
            written += 1;
        }

        Ok(written)
    }
}

/// The commit that was the branch tip at `at`, given newest-first history.
pub fn commit_as_of(history: &[CommitPoint], at: DateTime<Utc>) -> Option<&CommitPoint> {
    history.iter().find(|c| c.timestamp <= at)
}
