pub mod ingestion;
pub mod reply;
pub mod verification;

pub use ingestion::IngestionHandler;
pub use reply::ReplyHandler;
pub use verification::VerificationHandler;
