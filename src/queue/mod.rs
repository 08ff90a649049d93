//! Queue module: pending downloads in memory and on disk
//!
//! - `WorkQueue`: the in-memory FIFO workers take from
//! - `QueueStore`: JSON snapshot of the untaken queue for restart recovery

mod persistence;
mod work_queue;

pub use persistence::{PersistError, QueueStore};
pub use work_queue::WorkQueue;
