//! 消息模板引擎：纯函数式占位符替换
//!
//! 对模板中的每个字面量 token（如 `{name}`）做大小写敏感的整体替换，
//! 不做任何模板语言求值；模板中未出现在上下文里的 token 原样保留，不报错。

/// 每个收件人一份的占位符上下文：token -> 已解析的字符串值
///
/// 构建后不可变；同一收件人在任何通道分发前恰好构建一次（由 resolver 保证）。
#[derive(Debug, Clone, Default)]
pub struct PlaceholderContext {
    entries: Vec<(String, String)>,
}

impl PlaceholderContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册一个 token 及其替换值。token 需互不为前缀（如 `{name}` 与 `{name_x}` 不可共存），
    /// 使替换顺序不可观测。
    pub fn insert(&mut self, token: impl Into<String>, value: impl Into<String>) {
        self.entries.push((token.into(), value.into()));
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// 渲染模板：替换上下文中每个 token 的所有出现
pub fn render(template: &str, context: &PlaceholderContext) -> String {
    let mut out = template.to_string();
    for (token, value) in context.iter() {
        out = out.replace(token, value);
    }
    out
}
