mod repo;

pub use repo::{commit_as_of, CommitPoint, GitRepo};
