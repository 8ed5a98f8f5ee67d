mod pool;
mod scheduler;
pub mod error;

pub use pool::WorkerPool;
pub use scheduler::BatchScheduler;
pub use error::{WorkerError, WorkerResult};
