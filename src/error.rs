use thiserror::Error;

pub type Result<T> = std::result::Result<T, TrendError>;

#[derive(Error, Debug)]
pub enum TrendError {
    #[error("Git repository error: {0}")]
    GitRepo(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Hub returned {status}: {message}")]
    Hub { status: u16, message: String },
    #[error("Authentication error: {0}")]
    Auth(String),
    #[error("Metrics tool failed: {0}")]
    Tool(String),
    #[error("Malformed report: {0}")]
    Report(String),
    #[error("Report contains no measured items")]
    EmptyReport,
    #[error("Invalid snapshot: {0}")]
    InvalidSnapshot(String),
    #[error("Dataset error: {0}")]
    Dataset(String),
    #[error("Schema mismatch: missing [{}], unexpected [{}]", missing.join(", "), unexpected.join(", "))]
    SchemaMismatch {
        missing: Vec<String>,
        unexpected: Vec<String>,
    },
    #[error("Object find error: {0}")]
    ObjectFind(#[from] Box<gix::object::find::existing::Error>),
    #[error("Commit error: {0}")]
    Commit(#[from] Box<gix::object::commit::Error>),
    #[error("Object find with conversion error: {0}")]
    ObjectFindConv(#[from] Box<gix::object::find::existing::with_conversion::Error>),
    #[error("Object decode error: {0}")]
    ObjectDecode(#[from] Box<gix::objs::decode::Error>),
    #[error("Git discover error: {0}")]
    GitDiscover(#[from] Box<gix::discover::Error>),
}

// Manual From implementations for unboxed to boxed conversions
impl From<gix::object::find::existing::Error> for TrendError {
    fn from(err: gix::object::find::existing::Error) -> Self {
        TrendError::ObjectFind(Box::new(err))
    }
}

impl From<gix::object::commit::Error> for TrendError {
    fn from(err: gix::object::commit::Error) -> Self {
        TrendError::Commit(Box::new(err))
    }
}

impl From<gix::object::find::existing::with_conversion::Error> for TrendError {
    fn from(err: gix::object::find::existing::with_conversion::Error) -> Self {
        TrendError::ObjectFindConv(Box::new(err))
    }
}

impl From<gix::objs::decode::Error> for TrendError {
    fn from(err: gix::objs::decode::Error) -> Self {
        TrendError::ObjectDecode(Box::new(err))
    }
}

impl From<gix::discover::Error> for TrendError {
    fn from(err: gix::discover::Error) -> Self {
        TrendError::GitDiscover(Box::new(err))
    }
}
