//! Aviso - 批量通知引擎 CLI 驱动
//!
//! 入口：初始化日志、加载配置与存储、装配通道，然后对存储中的全部联系人
//! （或 `--test` 时对配置的测试收件人）运行一个批次，并把进度事件打到控制台。
//!
//! 用法：`aviso <template.toml> [--test] [--no-email] [--no-whatsapp]`

use std::sync::Arc;

use anyhow::{bail, Context};

use aviso::channels::{SmtpMailer, WhatsappLauncher};
use aviso::config::load_config;
use aviso::core::{BatchSettings, ProgressReporter};
use aviso::store::SqliteStore;
use aviso::{start_batch, BatchDeps, ChannelFlags, MessageTemplate, Recipient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    aviso::observability::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let template_path = args
        .iter()
        .find(|a| !a.starts_with("--"))
        .cloned()
        .context("Usage: aviso <template.toml> [--test] [--no-email] [--no-whatsapp]")?;
    let test_send = args.iter().any(|a| a == "--test");
    let no_email = args.iter().any(|a| a == "--no-email");
    let no_whatsapp = args.iter().any(|a| a == "--no-whatsapp");

    let cfg = load_config(None).context("Config load failed")?;

    let template_src = std::fs::read_to_string(&template_path)
        .with_context(|| format!("Template file not readable: {template_path}"))?;
    let template: MessageTemplate =
        toml::from_str(&template_src).context("Template file parse failed")?;

    let flags = ChannelFlags {
        email: !no_email,
        whatsapp: !no_whatsapp && cfg.automation.enabled(),
    };

    let store = Arc::new(
        SqliteStore::open(&cfg.storage.database_path).with_context(|| {
            format!("Store open failed: {}", cfg.storage.database_path.display())
        })?,
    );

    let recipients: Vec<Recipient> = if test_send {
        let tr = &cfg.test_recipient;
        if tr.email.is_none() && tr.phone.is_none() {
            bail!("[test_recipient] is not configured");
        }
        vec![Recipient::test(tr.email.clone(), tr.phone.clone())]
    } else {
        store.list_contacts().context("Contact listing failed")?
    };
    if recipients.is_empty() {
        tracing::warn!("No recipients to process");
    }

    let deps = BatchDeps {
        store: store.clone(),
        email: Arc::new(SmtpMailer::new(&cfg.smtp).context("SMTP setup failed")?),
        launcher: Arc::new(WhatsappLauncher::new(cfg.automation.options())),
    };
    let settings = BatchSettings {
        inter_message_delay: cfg.automation.inter_message_delay(),
    };

    let (reporter, mut events) = ProgressReporter::channel();
    let consumer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if event.is_reset() {
                tracing::info!("Progreso: 0/0");
            } else if let Ok(line) = serde_json::to_string(&event) {
                tracing::info!("Progreso: {}/{} {}", event.processed, event.total, line);
            }
        }
    });

    let handle = start_batch(deps, recipients, template, flags, settings, reporter)
        .context("Batch start rejected")?;

    // Ctrl+C 触发取消：循环转入 Draining，会话仍会释放
    let cancel = handle.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Ctrl+C received, draining batch");
            cancel.cancel();
        }
    });

    let report = handle.wait().await.context("Batch failed")?;
    let _ = consumer.await;

    if let Some(ref e) = report.session_error {
        tracing::warn!("Automation channel was unavailable: {}", e);
    }
    tracing::info!(
        processed = report.processed,
        total = report.total,
        failed = report.failed,
        cancelled = report.cancelled,
        "batch done"
    );
    Ok(())
}
