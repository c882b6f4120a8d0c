//! 发送通道：无状态的邮件通道与有状态的 WhatsApp 自动化通道

pub mod email;
pub mod whatsapp;

pub use email::{EmailChannel, SmtpMailer};
pub use whatsapp::{
    AutomationOptions, AutomationSession, SessionLauncher, WhatsappLauncher, WhatsappWebSession,
};
