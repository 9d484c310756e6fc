pub mod error;
pub mod models;
pub mod sink;

pub use models::{BrokerMessage, BroccoliError, MqBuilder, MqConfig, MqQueue, init_mq};
pub use sink::{JobSink, JobSinkExt, MemoryJobSink};

pub type Mq = MqQueue;
