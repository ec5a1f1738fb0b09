//! Linear-learner training job pipeline: parameter validation, dataset
//! upload, job submission, background polling, and the HTTP surface that
//! ties them together.

pub mod images;
pub mod orchestrator;
pub mod params;
pub mod poller;
pub mod routes;
pub mod submitter;
pub mod types;

pub use orchestrator::{ExecuteResponse, JobOrchestrator, RequestAuth};
pub use types::{JobStatus, JobTransaction, RemoteJobState, RemoteJobStatus};
