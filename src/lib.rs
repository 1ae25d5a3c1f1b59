pub mod aggregate;
pub mod analyze;
pub mod backfill;
pub mod cli;
pub mod cloc;
pub mod dataset;
pub mod error;
pub mod git;
pub mod hub;
pub mod model;
pub mod report;
pub mod store;
pub mod tool;
pub mod util;
