pub mod operator;
pub mod filter;
pub mod criteria;
pub mod repository;

pub use operator::{apply_logical_operator, Operator};
pub use filter::*;
pub use criteria::*;
pub use repository::*;
