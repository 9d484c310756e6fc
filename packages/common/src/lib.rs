pub mod config;
pub mod dlq;
pub mod jobs;
pub mod mention;
pub mod price;
pub mod resource_status;
pub mod retry;

pub use jobs::{IngestionJob, Job, ReplyJob, ReplyTarget, VerificationJob};
pub use resource_status::{PurchaseStatus, ResourceStatus};
