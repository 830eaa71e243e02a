pub mod engine;
pub mod request;
pub mod result;

pub use engine::*;
pub use request::*;
pub use result::*;
