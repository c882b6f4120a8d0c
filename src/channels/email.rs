//! 邮件通道：无状态 SMTP 发送，一次调用一封
//!
//! 通过 lettre 的 `AsyncSmtpTransport`（TLS + 登录凭据）投递纯文本邮件，
//! 对应原配置的 `[smtp]` 段。传输错误逐收件人隔离，不影响批次其余部分。

use async_trait::async_trait;
use lettre::{
    message::header::ContentType,
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use crate::config::SmtpSection;
use crate::core::error::{BatchError, SendError};

/// 邮件发送接口（编排器消费；测试时用 mock 实现替换）
#[async_trait]
pub trait EmailChannel: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), SendError>;
}

/// 基于 lettre 的 SMTP 实现
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    sender: String,
}

impl SmtpMailer {
    /// 由 `[smtp]` 配置构建传输；主机名不合法时在批次开始前即失败
    pub fn new(cfg: &SmtpSection) -> Result<Self, BatchError> {
        let creds = Credentials::new(cfg.sender_email.clone(), cfg.password.clone());
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&cfg.server)
            .map_err(|e| BatchError::Configuration(format!("SMTP relay {}: {}", cfg.server, e)))?
            .port(cfg.port)
            .credentials(creds)
            .build();
        Ok(Self {
            transport,
            sender: cfg.sender_email.clone(),
        })
    }
}

#[async_trait]
impl EmailChannel for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), SendError> {
        let message = Message::builder()
            .from(
                self.sender
                    .parse()
                    .map_err(|e| SendError::Transport(format!("Bad sender address: {e}")))?,
            )
            .to(to
                .parse()
                .map_err(|e| SendError::Transport(format!("Bad recipient address: {e}")))?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| SendError::Transport(format!("Message build failed: {e}")))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| SendError::Transport(e.to_string()))?;

        tracing::info!(to = %to, "email sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mailer_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SmtpMailer>();
    }

    #[tokio::test]
    async fn test_mailer_builds_from_config() {
        let cfg = SmtpSection {
            server: "smtp.example.com".into(),
            port: 465,
            sender_email: "multas@example.com".into(),
            password: "secret".into(),
        };
        assert!(SmtpMailer::new(&cfg).is_ok());
    }
}
