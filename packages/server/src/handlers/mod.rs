pub mod dlq;
pub mod resource;
