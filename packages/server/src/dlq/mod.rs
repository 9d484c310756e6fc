mod service;
mod stuck;

pub use service::{DlqService, DlqStats, ResolveResult, dlq_service};
pub use stuck::{detect_stuck_purchases, run_stuck_purchase_detector};
