pub mod dlq;
pub mod resource;
pub mod shared;
