pub mod aggregate;
pub mod audit;
pub mod chunker;
pub mod classify;
pub mod config;
pub mod consolidate;
pub mod context;
pub mod extract;
pub mod log_store;
pub mod oracle;
pub mod paths;
pub mod report;
pub mod scheduler;
pub mod session;
pub mod util;
pub mod warn;
pub mod weekly;
pub mod window;
