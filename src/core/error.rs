//! 错误类型：按影响范围分为两层
//!
//! - [`SendError`]：单个收件人级别的可恢复错误，在批次循环边界捕获并通过进度通道上报，
//!   不会越过当前迭代传播。
//! - [`BatchError`]：批次级别的致命错误（会话不可用、配置错误），直接终止或阻止批次。

use thiserror::Error;

/// 单个收件人处理过程中的可恢复错误（不中断批次）
#[derive(Error, Debug)]
pub enum SendError {
    /// 个性化数据查询失败（如待缴罚单数）
    #[error("Data unavailable: {0}")]
    DataUnavailable(String),

    /// 邮件传输失败
    #[error("Email transport error: {0}")]
    Transport(String),

    /// WhatsApp 单条消息发送失败（含脚本点击兜底也失败的情况）
    #[error("WhatsApp send failed: {0}")]
    SendFailed(String),
}

/// 批次级致命错误
#[derive(Error, Debug)]
pub enum BatchError {
    /// 自动化会话启动失败（浏览器启动 / 页面加载 / 就绪标记超时）。
    /// 若邮件通道同时启用，编排器只禁用 WhatsApp 通道继续执行；
    /// 若 WhatsApp 是唯一通道，则整个批次以此错误终止。
    #[error("Automation session unavailable: {0}")]
    SessionUnavailable(String),

    /// 启动前校验失败（未启用任何通道、启用通道缺少模板内容等），不会发送任何消息
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// 后台工作任务异常退出
    #[error("Batch worker failed: {0}")]
    Worker(String),
}
