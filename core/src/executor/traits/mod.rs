pub mod isolation;
pub mod strategy;

pub use isolation::*;
pub use strategy::*;
