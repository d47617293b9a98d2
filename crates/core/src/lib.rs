pub mod config;
pub mod error;
pub mod id;
pub mod priority;

pub use config::{load_dotenv, SchedulerConfig};
pub use error::*;
pub use id::{IdGenerator, SequentialIdGenerator, TaskId, UuidGenerator};
pub use priority::Priority;
