pub mod dead_letters;

pub use dead_letters::{consume_dead_letters, persist_envelope};
