//! 核心编排层：错误分类、进度上报、收件人解析、批次主控循环

pub mod batch;
pub mod error;
pub mod progress;
pub mod resolver;

pub use batch::{
    start_batch, BatchDeps, BatchHandle, BatchReport, BatchSettings, ChannelFlags,
    MessageTemplate, Recipient,
};
pub use error::{BatchError, SendError};
pub use progress::{ChannelOutcome, Delivery, ProgressEvent, ProgressReporter};
