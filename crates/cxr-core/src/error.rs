//! 错误定义模块
//!
//! 错误分类对应客户端的恢复方式：
//! - 校验错误：请求发出前拦截，界面内联提示
//! - 服务端拒绝：原样展示服务端返回的 detail 信息
//! - 认证失效：静默清除凭证并跳转登录页，不弹错误
//! - 传输失败：展示通用的连接错误

use thiserror::Error;

/// 客户端统一错误类型
#[derive(Error, Debug)]
pub enum CxrError {
    /// 表单校验失败，消息直接展示给用户
    #[error("{0}")]
    Validation(String),

    /// 服务端拒绝请求（4xx/5xx），消息为服务端 detail 或本地化兜底文案
    #[error("{message}")]
    Rejected { status: u16, message: String },

    /// 受保护接口返回 401，凭证已被清除并已跳转登录页
    #[error("认证已失效，请重新登录")]
    Unauthorized,

    /// 本地没有凭证，请求未发出即跳转登录页
    #[error("未登录")]
    NotAuthenticated,

    /// 没有收到任何响应（连接失败、超时等）
    #[error("{0}")]
    Transport(String),

    #[error("凭证存储错误: {0}")]
    Storage(String),

    #[error("配置错误: {0}")]
    Config(String),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("无效状态转换: 从 {from} 到 {event}")]
    InvalidStateTransition { from: String, event: String },
}

impl CxrError {
    /// 构造校验错误
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// 界面上应展示的文案
    ///
    /// 认证类错误返回 `None`：跳转登录页本身就是恢复手段。
    pub fn user_message(&self) -> Option<String> {
        match self {
            Self::Unauthorized | Self::NotAuthenticated => None,
            other => Some(other.to_string()),
        }
    }

    /// 是否因认证问题被重定向到登录页
    pub fn is_auth_redirect(&self) -> bool {
        matches!(self, Self::Unauthorized | Self::NotAuthenticated)
    }
}

/// 客户端统一结果类型
pub type Result<T> = std::result::Result<T, CxrError>;
