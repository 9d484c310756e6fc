pub mod purchase;
pub mod resource;
