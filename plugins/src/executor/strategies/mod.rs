pub mod concurrency;

pub use concurrency::{AdaptiveConcurrency, FixedConcurrency};
