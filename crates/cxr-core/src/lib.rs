//! # CXR Core
//!
//! 胸部X光辅助诊断客户端的核心模块，提供数据模型、错误定义、本地化文案和通用工具。

pub mod error;
pub mod messages;
pub mod models;
pub mod utils;

pub use error::{CxrError, Result};
pub use models::*;

/// 密码最小长度
pub const MIN_PASSWORD_LEN: usize = 6;

/// 患者年龄上限（含）
pub const MAX_PATIENT_AGE: u32 = 150;
