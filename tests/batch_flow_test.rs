//! 批次端到端测试：真实 SQLite 存储 + mock 通道走完整公开 API

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use aviso::channels::{AutomationSession, EmailChannel, SessionLauncher};
use aviso::core::{
    BatchError, BatchSettings, ChannelFlags, Delivery, ProgressReporter, SendError,
};
use aviso::store::SqliteStore;
use aviso::{start_batch, BatchDeps, MessageTemplate, Recipient};

#[derive(Default)]
struct RecordingEmail {
    sent: Mutex<Vec<(String, String, String)>>,
}

#[async_trait]
impl EmailChannel for RecordingEmail {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), SendError> {
        self.sent
            .lock()
            .unwrap()
            .push((to.into(), subject.into(), body.into()));
        Ok(())
    }
}

#[derive(Default)]
struct RecordingSession {
    sent: Mutex<Vec<(String, String)>>,
    closes: AtomicUsize,
}

struct SharedSession(Arc<RecordingSession>);

#[async_trait]
impl AutomationSession for SharedSession {
    async fn send(&self, phone: &str, message: &str) -> Result<(), SendError> {
        self.0.sent.lock().unwrap().push((phone.into(), message.into()));
        Ok(())
    }

    async fn close(&self) {
        self.0.closes.fetch_add(1, Ordering::SeqCst);
    }
}

struct SharedLauncher(Arc<RecordingSession>);

#[async_trait]
impl SessionLauncher for SharedLauncher {
    async fn launch(&self) -> Result<Box<dyn AutomationSession>, BatchError> {
        Ok(Box::new(SharedSession(Arc::clone(&self.0))))
    }
}

fn seeded_store() -> SqliteStore {
    let store = SqliteStore::open_in_memory().unwrap();
    store
        .insert_contact("V-1", "Ana", Some("a@x.com"), Some("04121234567"))
        .unwrap();
    store
        .insert_contact("V-2", "Beto", Some("b@x.com"), Some("N/A"))
        .unwrap();
    store.insert_fine("EXP-1", "V-1", true).unwrap();
    store.insert_fine("EXP-2", "V-1", true).unwrap();
    store.insert_fine("EXP-3", "V-2", false).unwrap();
    store
}

#[tokio::test]
async fn test_full_batch_over_sqlite_store() {
    let store = Arc::new(seeded_store());
    let recipients = store.list_contacts().unwrap();
    assert_eq!(recipients.len(), 2);

    let email = Arc::new(RecordingEmail::default());
    let session = Arc::new(RecordingSession::default());
    let deps = BatchDeps {
        store: store.clone(),
        email: email.clone() as Arc<dyn EmailChannel>,
        launcher: Arc::new(SharedLauncher(Arc::clone(&session))),
    };
    let template = MessageTemplate {
        subject: "Multas pendientes de {name}".into(),
        email_body: "Estimado {name} ({id}): tiene {pending_count} multas pendientes.".into(),
        whatsapp_body: "Hola {name}, tienes {pending_count} pendientes.".into(),
    };

    let (reporter, mut events) = ProgressReporter::channel();
    let handle = start_batch(
        deps,
        recipients,
        template,
        ChannelFlags {
            email: true,
            whatsapp: true,
        },
        BatchSettings {
            inter_message_delay: std::time::Duration::ZERO,
        },
        reporter,
    )
    .unwrap();
    let report = handle.wait().await.unwrap();

    assert_eq!(report.processed, 2);
    assert_eq!(report.failed, 0);
    assert!(report.session_error.is_none());

    // Ana 两条待缴，两通道都送达
    let ana = events.recv().await.unwrap();
    assert_eq!(ana.label, "Ana");
    assert_eq!(ana.outcome.email, Some(Delivery::Sent));
    assert_eq!(ana.outcome.whatsapp, Some(Delivery::Sent));

    // Beto 电话为 N/A（归一化为 None）：WhatsApp 跳过且不算错误
    let beto = events.recv().await.unwrap();
    assert_eq!(beto.label, "Beto");
    assert_eq!(beto.outcome.email, Some(Delivery::Sent));
    assert_eq!(beto.outcome.whatsapp, None);
    assert!(!beto.outcome.has_failure());

    // 终态复位事件
    assert!(events.recv().await.unwrap().is_reset());

    // 渲染使用了存储中的真实待缴数
    let emails = email.sent.lock().unwrap();
    assert_eq!(emails[0].1, "Multas pendientes de Ana");
    assert_eq!(emails[0].2, "Estimado Ana (V-1): tiene 2 multas pendientes.");
    assert_eq!(emails[1].2, "Estimado Beto (V-2): tiene 0 multas pendientes.");

    let whatsapp = session.sent.lock().unwrap();
    assert_eq!(whatsapp.len(), 1);
    assert_eq!(whatsapp[0].0, "04121234567");

    // 会话恰好关闭一次
    assert_eq!(session.closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_test_send_uses_same_machinery() {
    let store = Arc::new(seeded_store());
    let email = Arc::new(RecordingEmail::default());
    let session = Arc::new(RecordingSession::default());
    let deps = BatchDeps {
        store,
        email: email.clone() as Arc<dyn EmailChannel>,
        launcher: Arc::new(SharedLauncher(Arc::clone(&session))),
    };
    let template = MessageTemplate {
        subject: "Prueba".into(),
        email_body: "Hola {name}, tienes {pending_count} pendientes.".into(),
        ..MessageTemplate::default()
    };

    let handle = start_batch(
        deps,
        vec![Recipient::test(Some("t@x.com".into()), None)],
        template,
        ChannelFlags {
            email: true,
            whatsapp: false,
        },
        BatchSettings {
            inter_message_delay: std::time::Duration::ZERO,
        },
        ProgressReporter::sink(),
    )
    .unwrap();
    let report = handle.wait().await.unwrap();

    assert_eq!(report.processed, 1);
    assert_eq!(report.failed, 0);

    let emails = email.sent.lock().unwrap();
    assert_eq!(emails.len(), 1);
    assert_eq!(emails[0].0, "t@x.com");
    // 合成收件人无罚单记录，{pending_count} 解析为 0
    assert_eq!(emails[0].2, "Hola Prueba, tienes 0 pendientes.");
}
