//! Aviso - 联系人与罚单（multa）批量通知引擎
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 批次编排、进度事件、收件人解析、错误分类
//! - **template**: 占位符模板引擎（纯函数）
//! - **store**: 联系人 / 罚单数据访问（窄接口 + SQLite 实现）
//! - **channels**: 邮件（SMTP）与 WhatsApp Web 自动化两个发送通道
//! - **observability**: tracing 初始化

pub mod channels;
pub mod config;
pub mod core;
pub mod observability;
pub mod store;
pub mod template;

pub use crate::core::{start_batch, BatchDeps, BatchHandle, ChannelFlags, MessageTemplate, Recipient};
