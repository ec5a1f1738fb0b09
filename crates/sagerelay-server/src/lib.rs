//! SageRelay Server Library
//!
//! HTTP relay that turns streamed CSV datasets into managed linear-learner
//! training jobs, plus the OAuth credential exchange some destinations need.
//!
//! # Overview
//!
//! - **Training pipeline**: validate form selections, stream the dataset to
//!   the caller's S3 bucket, create the training job, and poll it to a
//!   terminal state on a detached task
//! - **Notification**: exactly one email per job at the terminal transition
//! - **OAuth**: sealed-state authorization round trip, code redemption for
//!   a long-lived token, and token liveness checks
//! - **Configuration**: environment-based, with development defaults
//!
//! # Example
//!
//! ```no_run
//! use sagerelay_server::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     println!("binding {}:{}", config.server.host, config.server.port);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod notify;
pub mod oauth;
pub mod storage;
pub mod training;

// Re-export commonly used types
pub use error::{AppError, AppResult};
