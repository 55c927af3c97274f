use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("no data: {0}")]
    NoData(String),
    #[error("config file invalid or unreadable: {0}")]
    InvalidConfig(String),
    #[error("invalid report window: {0}")]
    InvalidWindow(String),
}

/// Failure of a single oracle call. Every call site maps this to exactly one
/// fallback and never lets it escape the pipeline.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OracleError {
    #[error("oracle timed out after {secs}s")]
    Timeout { secs: u64 },
    #[error("oracle process failed: {0}")]
    Process(String),
    #[error("oracle returned empty output")]
    EmptyOutput,
    #[error("oracle http call failed: {0}")]
    Http(String),
    #[error("oracle unavailable: {0}")]
    Unavailable(String),
}

impl OracleError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "ORACLE_TIMEOUT",
            Self::Process(_) => "ORACLE_PROCESS",
            Self::EmptyOutput => "ORACLE_EMPTY",
            Self::Http(_) => "ORACLE_HTTP",
            Self::Unavailable(_) => "ORACLE_UNAVAILABLE",
        }
    }
}
