//! Idempotent batch synchronization of issue-tracker attachments into a local directory.

pub mod cli;
pub mod commands;
pub mod downloader;
pub mod error;
pub mod hashing;
pub mod http_status;
pub mod logging;
pub mod session;
pub mod state;
#[cfg(test)]
mod test_server;
pub mod utils;

pub use downloader::{SyncOptions, Synchronizer};
pub use error::{FetchError, SyncError};
pub use session::{FetchClient, FetchResponse, HttpSession, SessionOptions};
pub use state::{pair_requests, FetchOutcome, FetchRequest, FetchState, SkipReason, Summary};
