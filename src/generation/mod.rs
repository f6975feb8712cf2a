//! Multi-turn orchestration: the operate and stream loops.

mod dispatch;
pub mod operate;
pub mod options;
pub mod response;
pub(crate) mod state;
pub mod stream;

pub use operate::operate;
pub use options::OperateOptions;
pub use response::{ErrorDetail, OperateError, OperateResponse, ResponseBuilder};
pub use stream::stream_operate;
