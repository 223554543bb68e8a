//! # CXR配置模块
//!
//! 分层配置（内置默认值 → TOML 文件 → `CXR__` 环境变量）与日志初始化。

pub mod config;
pub mod logging;

pub use self::config::{
    ApiConfig, ClientConfig, ConfigValidator, ListingConfig, LoggingConfig, ProfileConfig,
    SessionConfig, ALLOWED_PATIENT_PAGE_SIZES,
};
pub use logging::init_logging;
