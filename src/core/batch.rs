//! 批次编排器：批量发送的主控循环
//!
//! 状态机 `Idle → SessionInit → Running → Draining → Done`：
//! - SessionInit：仅在 WhatsApp 通道启用时进入，获取一个自动化会话。启动失败时若邮件
//!   通道同时启用则降级为仅邮件继续；若 WhatsApp 是唯一通道则在处理任何收件人之前
//!   以失败终止整个批次。
//! - Running：严格按给定顺序逐个处理收件人，无并发（自动化会话是单一串行资源）。
//!   每个收件人：解析上下文 → 渲染模板 → 按通道分发 → 产出进度事件 → 可中断的
//!   消息间延迟。任何单收件人错误都被隔离在当次迭代内。
//! - Draining：无论循环如何结束，已获取的会话必定释放。
//! - Done：发出 0/0 复位事件，句柄随之失效。
//!
//! 每个批次一个后台 tokio 任务；调用方通过进度通道观察，通过 [`BatchHandle`] 取消或
//! 等待。同一会话不可被两个批次共享：调用方需保证系统内同时至多一个活跃批次。

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::channels::email::EmailChannel;
use crate::channels::whatsapp::{AutomationSession, SessionLauncher};
use crate::core::error::{BatchError, SendError};
use crate::core::progress::{ChannelOutcome, Delivery, ProgressEvent, ProgressReporter};
use crate::core::resolver;
use crate::store::ContactStore;
use crate::template;

/// 收件人：批次开始前由调用方选定，批次期间不可变
#[derive(Debug, Clone)]
pub struct Recipient {
    /// 联系人唯一键（cedula/RIF）
    pub id: String,
    pub name: String,
    /// 缺失时该收件人的邮件通道静默跳过，不计为错误
    pub email: Option<String>,
    /// 缺失时该收件人的 WhatsApp 通道静默跳过，不计为错误
    pub phone: Option<String>,
}

impl Recipient {
    /// 「测试发送」用的合成收件人；测试发送与真实批次走同一条路径
    pub fn test(email: Option<String>, phone: Option<String>) -> Self {
        Self {
            id: "TEST".into(),
            name: "Prueba".into(),
            email,
            phone,
        }
    }
}

/// 消息模板：三段各自可选（去空白后为空视为缺失），占位符为字面量 token
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageTemplate {
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub email_body: String,
    #[serde(default)]
    pub whatsapp_body: String,
}

impl MessageTemplate {
    /// 邮件通道要求主题或正文至少其一非空
    pub fn has_email_content(&self) -> bool {
        !self.subject.trim().is_empty() || !self.email_body.trim().is_empty()
    }

    pub fn has_whatsapp_content(&self) -> bool {
        !self.whatsapp_body.trim().is_empty()
    }
}

/// 本次批次启用的通道
#[derive(Debug, Clone, Copy)]
pub struct ChannelFlags {
    pub email: bool,
    pub whatsapp: bool,
}

impl ChannelFlags {
    pub fn any(self) -> bool {
        self.email || self.whatsapp
    }
}

/// 编排器消费的外部协作者，均为窄接口注入
#[derive(Clone)]
pub struct BatchDeps {
    pub store: Arc<dyn ContactStore>,
    pub email: Arc<dyn EmailChannel>,
    pub launcher: Arc<dyn SessionLauncher>,
}

/// 批次运行参数
#[derive(Debug, Clone)]
pub struct BatchSettings {
    /// 消息间延迟：限制自动化通道节奏，规避反自动化检测；可被取消信号打断
    pub inter_message_delay: Duration,
}

/// 批次终报
#[derive(Debug)]
pub struct BatchReport {
    /// 恒等于循环实际走过的收件人数；未被取消时等于 total
    pub processed: usize,
    pub total: usize,
    /// 出现过至少一个错误（解析或任一通道）的收件人数
    pub failed: usize,
    /// 会话启动失败但批次降级继续时的通道级错误
    pub session_error: Option<String>,
    pub cancelled: bool,
}

/// 批次句柄：取消与等待
pub struct BatchHandle {
    id: Uuid,
    cancel: CancellationToken,
    join: JoinHandle<Result<BatchReport, BatchError>>,
}

impl BatchHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// 请求取消：循环在下一次迭代边界或延迟中直接转入 Draining（会话仍会释放）
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// 取消令牌的克隆，供信号处理等外部触发方持有
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// 等待批次结束并取回终报
    pub async fn wait(self) -> Result<BatchReport, BatchError> {
        self.join
            .await
            .map_err(|e| BatchError::Worker(e.to_string()))?
    }
}

/// 启动一个批次（或单收件人的测试发送，机制相同）
///
/// 启动前校验失败（未启用通道、启用通道缺模板内容）立即返回 `Configuration` 错误，
/// 不发送任何消息。校验通过后在后台任务中运行循环并立即返回句柄。
pub fn start_batch(
    deps: BatchDeps,
    recipients: Vec<Recipient>,
    template: MessageTemplate,
    flags: ChannelFlags,
    settings: BatchSettings,
    reporter: ProgressReporter,
) -> Result<BatchHandle, BatchError> {
    validate(&template, flags)?;

    let id = Uuid::new_v4();
    let cancel = CancellationToken::new();
    let token = cancel.clone();

    tracing::info!(batch_id = %id, total = recipients.len(), "batch started");
    let join = tokio::spawn(async move {
        let result = run_batch(deps, recipients, template, flags, settings, &reporter, token).await;
        match &result {
            Ok(report) => tracing::info!(
                batch_id = %id,
                processed = report.processed,
                failed = report.failed,
                cancelled = report.cancelled,
                "batch finished"
            ),
            Err(e) => tracing::error!(batch_id = %id, error = %e, "batch aborted"),
        }
        result
    });

    Ok(BatchHandle { id, cancel, join })
}

fn validate(template: &MessageTemplate, flags: ChannelFlags) -> Result<(), BatchError> {
    if !flags.any() {
        return Err(BatchError::Configuration("No channel enabled".into()));
    }
    if flags.email && !template.has_email_content() {
        return Err(BatchError::Configuration(
            "Email channel enabled but subject and body are both empty".into(),
        ));
    }
    if flags.whatsapp && !template.has_whatsapp_content() {
        return Err(BatchError::Configuration(
            "WhatsApp channel enabled but message is empty".into(),
        ));
    }
    Ok(())
}

async fn run_batch(
    deps: BatchDeps,
    recipients: Vec<Recipient>,
    template: MessageTemplate,
    flags: ChannelFlags,
    settings: BatchSettings,
    reporter: &ProgressReporter,
    cancel: CancellationToken,
) -> Result<BatchReport, BatchError> {
    let total = recipients.len();

    // 空批次立即完成，不获取任何通道
    if total == 0 {
        reporter.emit(ProgressEvent::reset());
        return Ok(BatchReport {
            processed: 0,
            total: 0,
            failed: 0,
            session_error: None,
            cancelled: false,
        });
    }

    // SessionInit：仅在需要时获取一次自动化会话
    let mut session: Option<Box<dyn AutomationSession>> = None;
    let mut session_error: Option<String> = None;
    if flags.whatsapp {
        match deps.launcher.launch().await {
            Ok(s) => session = Some(s),
            Err(e) => {
                if !flags.email {
                    // WhatsApp 是唯一通道：在处理任何收件人之前终止
                    reporter.emit(ProgressEvent::reset());
                    return Err(e);
                }
                tracing::warn!(error = %e, "automation channel disabled for this batch, continuing email-only");
                session_error = Some(e.to_string());
            }
        }
    }

    // Running：严格串行
    let mut processed = 0usize;
    let mut failed = 0usize;
    let mut cancelled = false;

    for recipient in &recipients {
        if cancel.is_cancelled() {
            cancelled = true;
            break;
        }

        let outcome = process_recipient(&deps, recipient, &template, flags, session.as_deref()).await;
        if outcome.has_failure() {
            failed += 1;
        }
        processed += 1;
        reporter.emit(ProgressEvent {
            processed,
            total,
            label: recipient.name.clone(),
            outcome,
        });

        // 消息间延迟（最后一个收件人之后没有下一个，无需等待）；取消信号可打断
        if processed < total && !settings.inter_message_delay.is_zero() {
            tokio::select! {
                () = cancel.cancelled() => {
                    cancelled = true;
                    break;
                }
                () = tokio::time::sleep(settings.inter_message_delay) => {}
            }
        }
    }

    // Draining：无条件释放会话
    if let Some(session) = session.take() {
        session.close().await;
    }

    // Done：计数复位
    reporter.emit(ProgressEvent::reset());

    Ok(BatchReport {
        processed,
        total,
        failed,
        session_error,
        cancelled,
    })
}

/// 处理单个收件人：所有错误都收敛为该收件人的 `ChannelOutcome`
async fn process_recipient(
    deps: &BatchDeps,
    recipient: &Recipient,
    template: &MessageTemplate,
    flags: ChannelFlags,
    session: Option<&dyn AutomationSession>,
) -> ChannelOutcome {
    let mut outcome = ChannelOutcome::default();

    // 每收件人恰好构建一次上下文；失败则跳过全部分发
    let ctx = match resolver::resolve(recipient, deps.store.as_ref()).await {
        Ok(ctx) => ctx,
        Err(e) => {
            tracing::warn!(recipient = %recipient.name, error = %e, "personalization failed");
            outcome.resolve_error = Some(e.to_string());
            return outcome;
        }
    };

    let subject = template::render(&template.subject, &ctx);
    let email_body = template::render(&template.email_body, &ctx);
    let whatsapp_body = template::render(&template.whatsapp_body, &ctx);

    if flags.email {
        if let Some(address) = recipient.email.as_deref() {
            outcome.email = Some(match deps.email.send(address, &subject, &email_body).await {
                Ok(()) => Delivery::Sent,
                Err(e) => {
                    tracing::warn!(recipient = %recipient.name, error = %e, "email send failed");
                    Delivery::Failed(e.to_string())
                }
            });
        }
    }

    if let Some(session) = session {
        if let Some(phone) = recipient.phone.as_deref() {
            outcome.whatsapp = Some(match session.send(phone, &whatsapp_body).await {
                Ok(()) => Delivery::Sent,
                Err(e) => {
                    tracing::warn!(recipient = %recipient.name, error = %e, "whatsapp send failed");
                    Delivery::Failed(e.to_string())
                }
            });
        }
    }

    outcome
}
