//! Utility modules: retry and templating.

pub mod retry;
pub mod template;
