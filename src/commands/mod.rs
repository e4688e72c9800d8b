pub mod booth;

pub use booth::*;
