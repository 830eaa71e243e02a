pub mod cache_store;
pub mod markers;
pub mod service;

pub use cache_store::*;
pub use markers::*;
pub use service::*;
