//! WhatsApp 自动化通道：驱动一个 WhatsApp Web 浏览器会话
//!
//! 有状态通道：一次启动的会话顺序服务多条消息。生命周期
//! `Unacquired → Launching → Ready → InUse → Closed`：
//! - 启动：按配置（二进制路径、用户数据目录、是否无头）拉起 Chrome，打开
//!   WhatsApp Web 并在限时内等待就绪标记元素；超时或导航失败即转 Closed 并报
//!   `SessionUnavailable`。
//! - 发送：构造携带手机号与预填文本的深链接，限时等待发送控件可交互后点击；
//!   普通点击被遮挡时改用脚本点击兜底，兜底仍失败记 `SendFailed`（逐收件人隔离）。
//! - 关闭：幂等，恰好释放一次底层浏览器进程；对已关闭会话再调用是空操作。
//!
//! headless_chrome 是阻塞式 API，所有浏览器交互都包在 `spawn_blocking` 里执行。

use std::ffi::{OsStr, OsString};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions, Tab};

use crate::core::error::{BatchError, SendError};

/// WhatsApp Web 入口
pub const WHATSAPP_WEB_URL: &str = "https://web.whatsapp.com/";

/// 登录完成后出现的侧边栏，作为页面就绪标记
const READY_MARKER: &str = "#side";

/// 发送按钮：兼容英文 / 西文界面的 aria-label 以及图标节点
const SEND_BUTTON: &str =
    "button[aria-label='Send'], button[aria-label='Enviar'], span[data-icon='send']";

/// 控件可交互后、点击前的短暂停顿，确保按钮真正可点
const SETTLE_PAUSE: Duration = Duration::from_secs(1);

/// 普通点击被遮挡时的脚本点击兜底
const FALLBACK_CLICK_JS: &str = r#"
(function () {
    const el = document.querySelector(
        "button[aria-label='Send'], button[aria-label='Enviar'], span[data-icon='send']"
    );
    if (!el) { return 'missing'; }
    el.click();
    return 'clicked';
})()
"#;

/// 会话启动选项（来自 `[automation]` 配置段）
#[derive(Debug, Clone)]
pub struct AutomationOptions {
    /// 浏览器二进制路径；`None` 时由 headless_chrome 自行探测
    pub binary_path: Option<PathBuf>,
    /// Chrome 用户数据目录（复用已登录的 WhatsApp 会话）
    pub user_data_dir: Option<PathBuf>,
    /// 用户数据目录下的 profile 名（默认 "Default"）
    pub profile_directory: Option<String>,
    pub headless: bool,
    /// WhatsApp Web 首页加载 + 就绪标记等待上限
    pub page_load_timeout: Duration,
    /// 单次发送中等待发送控件的上限
    pub element_wait: Duration,
}

/// 自动化会话接口：一个活跃会话顺序处理多次发送，编排器独占持有
#[async_trait]
pub trait AutomationSession: Send + Sync {
    /// 向一个号码发送一条消息；失败只影响该收件人
    async fn send(&self, phone: &str, message: &str) -> Result<(), SendError>;

    /// 释放底层浏览器进程；幂等
    async fn close(&self);
}

/// 会话工厂：编排器在 SessionInit 阶段调用一次
#[async_trait]
pub trait SessionLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn AutomationSession>, BatchError>;
}

/// 手机号只保留数字（去掉 `+`、空格、连字符等）
fn digits_only(phone: &str) -> String {
    phone.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// 构造深链接：`…/send?phone=<digits>&text=<urlencoded>`
fn deep_link(phone_digits: &str, message: &str) -> String {
    format!(
        "{}send?phone={}&text={}",
        WHATSAPP_WEB_URL,
        phone_digits,
        urlencoding::encode(message)
    )
}

/// 基于 headless_chrome 的 WhatsApp Web 会话
pub struct WhatsappWebSession {
    /// `Some` = 进程存活；close 时 take 掉，保证恰好释放一次
    browser: Mutex<Option<Browser>>,
    tab: std::sync::Arc<Tab>,
    element_wait: Duration,
}

impl WhatsappWebSession {
    /// 启动浏览器、打开 WhatsApp Web 并等待就绪标记
    pub async fn launch(options: AutomationOptions) -> Result<Self, BatchError> {
        let element_wait = options.element_wait;
        let result = tokio::task::spawn_blocking(move || Self::launch_blocking(&options))
            .await
            .map_err(|e| BatchError::SessionUnavailable(format!("Launch task join: {e}")))?;

        let (browser, tab) = result.map_err(BatchError::SessionUnavailable)?;
        tracing::info!("WhatsApp Web session ready");
        Ok(Self {
            browser: Mutex::new(Some(browser)),
            tab,
            element_wait,
        })
    }

    fn launch_blocking(
        options: &AutomationOptions,
    ) -> Result<(Browser, std::sync::Arc<Tab>), String> {
        let profile_arg: Option<OsString> = options
            .profile_directory
            .as_ref()
            .map(|p| OsString::from(format!("--profile-directory={p}")));
        let mut args: Vec<&OsStr> = Vec::new();
        if let Some(ref arg) = profile_arg {
            args.push(arg.as_os_str());
        }

        let launch_options = LaunchOptions::default_builder()
            .headless(options.headless)
            .path(options.binary_path.clone())
            .user_data_dir(options.user_data_dir.clone())
            .args(args)
            // 消息间延迟可能很长，放宽空闲超时避免浏览器被判定闲置而回收
            .idle_browser_timeout(Duration::from_secs(3600))
            .build()
            .map_err(|e| format!("Launch options: {e}"))?;

        let browser = Browser::new(launch_options).map_err(|e| format!("Chrome launch failed: {e}"))?;
        let tab = browser.new_tab().map_err(|e| format!("Browser tab failed: {e}"))?;
        tab.navigate_to(WHATSAPP_WEB_URL)
            .map_err(|e| format!("Navigate failed: {e}"))?;
        tab.wait_for_element_with_custom_timeout(READY_MARKER, options.page_load_timeout)
            .map_err(|e| format!("WhatsApp Web not ready (is the session logged in?): {e}"))?;
        Ok((browser, tab))
    }

    fn send_blocking(
        tab: &Tab,
        url: &str,
        element_wait: Duration,
    ) -> Result<(), String> {
        tab.navigate_to(url).map_err(|e| format!("Navigate failed: {e}"))?;
        let button = tab
            .wait_for_element_with_custom_timeout(SEND_BUTTON, element_wait)
            .map_err(|e| format!("Send control not interactable: {e}"))?;

        std::thread::sleep(SETTLE_PAUSE);

        if let Err(first) = button.click() {
            tracing::warn!("Normal click intercepted ({first}), trying scripted fallback");
            let result = tab
                .evaluate(FALLBACK_CLICK_JS, false)
                .map_err(|e| format!("Click intercepted ({first}); scripted fallback: {e}"))?;
            let clicked = result
                .value
                .as_ref()
                .and_then(|v| v.as_str())
                .map(|s| s == "clicked")
                .unwrap_or(false);
            if !clicked {
                return Err(format!("Click intercepted ({first}); scripted fallback missed the control"));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl AutomationSession for WhatsappWebSession {
    async fn send(&self, phone: &str, message: &str) -> Result<(), SendError> {
        let digits = digits_only(phone);
        if digits.is_empty() {
            return Err(SendError::SendFailed(format!("Phone has no digits: {phone}")));
        }
        let live = self.browser.lock().map(|guard| guard.is_some()).unwrap_or(false);
        if !live {
            return Err(SendError::SendFailed("Session already closed".into()));
        }

        let url = deep_link(&digits, message);
        let tab = std::sync::Arc::clone(&self.tab);
        let element_wait = self.element_wait;

        tokio::task::spawn_blocking(move || Self::send_blocking(&tab, &url, element_wait))
            .await
            .map_err(|e| SendError::SendFailed(format!("Send task join: {e}")))?
            .map_err(SendError::SendFailed)?;

        tracing::info!(phone = %digits, "whatsapp message sent");
        Ok(())
    }

    async fn close(&self) {
        let browser = self.browser.lock().ok().and_then(|mut guard| guard.take());
        if let Some(browser) = browser {
            // Browser 在 drop 时结束 Chrome 进程；进程等待是阻塞操作
            let _ = tokio::task::spawn_blocking(move || drop(browser)).await;
            tracing::info!("WhatsApp Web session closed");
        }
    }
}

/// 标准会话工厂：持有配置，按需启动 [`WhatsappWebSession`]
pub struct WhatsappLauncher {
    options: AutomationOptions,
}

impl WhatsappLauncher {
    pub fn new(options: AutomationOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl SessionLauncher for WhatsappLauncher {
    async fn launch(&self) -> Result<Box<dyn AutomationSession>, BatchError> {
        let session = WhatsappWebSession::launch(self.options.clone()).await?;
        Ok(Box::new(session))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digits_only_strips_formatting() {
        assert_eq!(digits_only("+58 412-123.45.67"), "584121234567");
        assert_eq!(digits_only("0412 1234567"), "04121234567");
        assert_eq!(digits_only("sin numero"), "");
    }

    #[test]
    fn test_deep_link_encodes_message() {
        let url = deep_link("584121234567", "Hola Ana, tienes 3 pendientes & más");
        assert!(url.starts_with("https://web.whatsapp.com/send?phone=584121234567&text="));
        assert!(url.contains("Hola%20Ana"));
        assert!(url.contains("%26"));
        assert!(!url.contains(' '));
    }
}
