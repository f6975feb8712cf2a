//! Core types for turnwise.

pub mod history;
pub mod request;
pub mod stream;
pub mod tool;
pub mod usage;

pub use history::*;
pub use request::*;
pub use stream::*;
pub use tool::*;
pub use usage::*;
