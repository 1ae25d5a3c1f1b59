use crate::dataset::Dataset;
use crate::error::Result;
use crate::hub::{HubClient, HubTarget};
use std::path::PathBuf;
use tracing::info;

/// Where the aggregate dataset lives. Load, merge in memory, then save.
pub trait DatasetStore {
    fn load(&self) -> Result<Dataset>;

    /// Persist the whole dataset, returning a reference to the saved revision.
    fn save(&self, dataset: &Dataset, message: &str) -> Result<String>;

    fn describe(&self) -> String;
}

/// A CSV file hosted in a Hub repository.
pub struct HubStore {
    client: HubClient,
    target: HubTarget,
}

impl HubStore {
    pub fn new(client: HubClient, target: HubTarget) -> Self {
        Self { client, target }
    }
}

impl DatasetStore for HubStore {
    fn load(&self) -> Result<Dataset> {
        match self.client.download(&self.target)? {
            Some(text) => Dataset::parse(&text),
            None => {
                info!(dataset = %self.target.describe(), "no dataset yet, starting empty");
                Ok(Dataset::new())
            }
        }
    }

    fn save(&self, dataset: &Dataset, message: &str) -> Result<String> {
        let csv = dataset.to_csv_string()?;
        let commit = self.client.commit(&self.target, csv.as_bytes(), message)?;
        Ok(commit.commit_oid)
    }

    fn describe(&self) -> String {
        self.target.describe()
    }
}

/// A CSV file on local disk.
pub struct LocalStore {
    path: PathBuf,
}

impl LocalStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl DatasetStore for LocalStore {
    fn load(&self) -> Result<Dataset> {
        if !self.path.exists() {
            return Ok(Dataset::new());
        }
        Dataset::parse(&std::fs::read_to_string(&self.path)?)
    }

    fn save(&self, dataset: &Dataset, _message: &str) -> Result<String> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        // a failed write leaves the previous file in place
        let tmp = self.path.with_extension("csv.tmp");
        std::fs::write(&tmp, dataset.to_csv_string()?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(self.path.display().to_string())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
