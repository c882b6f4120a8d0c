//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `AVISO__*` 覆盖（双下划线表示嵌套，
//! 如 `AVISO__SMTP__SERVER=smtp.example.com`）。本引擎只消费键值，不关心来源格式。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::channels::whatsapp::AutomationOptions;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub smtp: SmtpSection,
    pub automation: AutomationSection,
    pub test_recipient: TestRecipientSection,
    pub storage: StorageSection,
}

/// [smtp] 段：SMTP 服务器与发件人凭据
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SmtpSection {
    pub server: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    pub sender_email: String,
    pub password: String,
}

impl Default for SmtpSection {
    fn default() -> Self {
        Self {
            server: String::new(),
            port: default_smtp_port(),
            sender_email: String::new(),
            password: String::new(),
        }
    }
}

fn default_smtp_port() -> u16 {
    465
}

/// [automation] 段：浏览器选择、路径与各项超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AutomationSection {
    /// "chrome" / "chromium"；"none" 表示整体禁用自动化通道
    #[serde(default = "default_browser")]
    pub browser: String,
    pub binary_path: Option<PathBuf>,
    /// Chrome 用户数据目录（复用已登录的 WhatsApp Web 会话）
    pub user_data_dir: Option<PathBuf>,
    #[serde(default = "default_profile_directory")]
    pub profile_directory: String,
    /// WhatsApp Web 需要已登录会话，默认窗口模式便于人工扫码
    #[serde(default)]
    pub headless: bool,
    #[serde(default = "default_page_load_timeout_secs")]
    pub page_load_timeout_secs: f64,
    #[serde(default = "default_element_wait_secs")]
    pub element_wait_secs: f64,
    #[serde(default = "default_inter_message_delay_secs")]
    pub inter_message_delay_secs: f64,
}

impl Default for AutomationSection {
    fn default() -> Self {
        Self {
            browser: default_browser(),
            binary_path: None,
            user_data_dir: None,
            profile_directory: default_profile_directory(),
            headless: false,
            page_load_timeout_secs: default_page_load_timeout_secs(),
            element_wait_secs: default_element_wait_secs(),
            inter_message_delay_secs: default_inter_message_delay_secs(),
        }
    }
}

fn default_browser() -> String {
    "chrome".to_string()
}

fn default_profile_directory() -> String {
    "Default".to_string()
}

fn default_page_load_timeout_secs() -> f64 {
    60.0
}

fn default_element_wait_secs() -> f64 {
    30.0
}

fn default_inter_message_delay_secs() -> f64 {
    8.0
}

impl AutomationSection {
    /// 自动化通道是否启用（`browser = "none"` 时禁用）
    pub fn enabled(&self) -> bool {
        !self.browser.eq_ignore_ascii_case("none")
    }

    /// 转为会话启动选项
    pub fn options(&self) -> AutomationOptions {
        AutomationOptions {
            binary_path: self.binary_path.clone(),
            user_data_dir: self.user_data_dir.clone(),
            profile_directory: Some(self.profile_directory.clone()),
            headless: self.headless,
            page_load_timeout: Duration::from_secs_f64(self.page_load_timeout_secs),
            element_wait: Duration::from_secs_f64(self.element_wait_secs),
        }
    }

    pub fn inter_message_delay(&self) -> Duration {
        Duration::from_secs_f64(self.inter_message_delay_secs)
    }
}

/// [test_recipient] 段：「测试发送」的目标
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TestRecipientSection {
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// [storage] 段：SQLite 数据库位置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

fn default_database_path() -> PathBuf {
    PathBuf::from("aviso.db")
}

/// 从 config 目录加载配置，环境变量 AVISO__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 AVISO__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("AVISO")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
