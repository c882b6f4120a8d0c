//! 进度事件：批次循环在每次迭代边界产出的显式事件结构
//!
//! 取代「闭包捕获循环变量再回投 UI」的做法：事件是纯数据，经 mpsc 通道送达观察者
//! （CLI 控制台、GUI 事件循环等），工作线程从不直接触碰调用方状态。

use serde::Serialize;
use tokio::sync::mpsc;

/// 单个通道对单个收件人的投递结果
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum Delivery {
    Sent,
    Failed(String),
}

/// 单个收件人的各通道结果；`None` 表示该通道未尝试（未启用 / 地址缺失 / 会话不在线）
#[derive(Clone, Debug, Default, Serialize)]
pub struct ChannelOutcome {
    pub email: Option<Delivery>,
    pub whatsapp: Option<Delivery>,
    /// 个性化数据解析失败时整个收件人跳过分发，此处记录原因
    pub resolve_error: Option<String>,
}

impl ChannelOutcome {
    /// 该收件人是否出现过任一失败（解析失败或任一通道投递失败）
    pub fn has_failure(&self) -> bool {
        self.resolve_error.is_some()
            || matches!(self.email, Some(Delivery::Failed(_)))
            || matches!(self.whatsapp, Some(Delivery::Failed(_)))
    }
}

/// 进度事件：`(已处理数, 总数, 收件人标签, 各通道结果)`
///
/// 批次结束时会额外发出一条 0/0 的复位事件，供观察者把进度显示归零。
#[derive(Clone, Debug, Serialize)]
pub struct ProgressEvent {
    pub processed: usize,
    pub total: usize,
    pub label: String,
    pub outcome: ChannelOutcome,
}

impl ProgressEvent {
    /// 终态复位事件（Done 状态：计数归零，句柄失效）
    pub fn reset() -> Self {
        Self {
            processed: 0,
            total: 0,
            label: String::new(),
            outcome: ChannelOutcome::default(),
        }
    }

    pub fn is_reset(&self) -> bool {
        self.total == 0 && self.processed == 0 && self.label.is_empty()
    }
}

/// 进度上报器：对发送端的轻量包装，观察者掉线（接收端被丢弃）时静默忽略
#[derive(Clone)]
pub struct ProgressReporter {
    tx: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

impl ProgressReporter {
    /// 创建上报器及配套的事件接收端
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// 不上报任何事件的哑上报器（测试或无人观察的场景）
    pub fn sink() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: ProgressEvent) {
        tracing::debug!(
            processed = event.processed,
            total = event.total,
            label = %event.label,
            "batch progress"
        );
        if let Some(ref tx) = self.tx {
            let _ = tx.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_has_failure() {
        let mut outcome = ChannelOutcome::default();
        assert!(!outcome.has_failure());

        outcome.email = Some(Delivery::Sent);
        assert!(!outcome.has_failure());

        outcome.whatsapp = Some(Delivery::Failed("timeout".into()));
        assert!(outcome.has_failure());

        let resolve_failed = ChannelOutcome {
            resolve_error: Some("db down".into()),
            ..ChannelOutcome::default()
        };
        assert!(resolve_failed.has_failure());
    }

    #[test]
    fn test_reset_event() {
        let event = ProgressEvent::reset();
        assert!(event.is_reset());
        assert_eq!(event.processed, 0);
        assert_eq!(event.total, 0);
    }

    #[tokio::test]
    async fn test_reporter_delivers_events() {
        let (reporter, mut rx) = ProgressReporter::channel();
        reporter.emit(ProgressEvent {
            processed: 1,
            total: 2,
            label: "Ana".into(),
            outcome: ChannelOutcome::default(),
        });
        let event = rx.recv().await.unwrap();
        assert_eq!(event.processed, 1);
        assert_eq!(event.label, "Ana");
    }

    #[test]
    fn test_sink_reporter_does_not_panic() {
        ProgressReporter::sink().emit(ProgressEvent::reset());
    }
}
