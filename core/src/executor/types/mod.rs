pub mod config;
pub mod result;
pub mod store;

pub use config::*;
pub use result::*;
pub use store::*;
