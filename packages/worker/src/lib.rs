pub mod config;
pub mod dedup;
pub mod error;
pub mod handlers;
pub mod poller;
pub mod runner;
pub mod services;
pub mod social;
pub mod templates;

pub use config::WorkerAppConfig;
pub use error::{Result, WorkerError};
pub use runner::{Disposition, JobContext, JobError, JobHandler, JobOutcome, QueueRunner};
