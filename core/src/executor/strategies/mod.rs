mod hybrid;
mod pool;
mod sequential;

pub use hybrid::{is_heavy, Hybrid};
pub use pool::WorkerPool;
pub use sequential::Sequential;
