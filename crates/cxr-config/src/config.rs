//! 配置管理
//!
//! 按优先级从低到高叠加：内置默认值、可选的 TOML 文件、
//! 以 `CXR__` 为前缀的环境变量（如 `CXR__API__BASE_URL`）。

use ::config::{Config, Environment, File, FileFormat};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info};

/// 患者列表允许的每页条数
pub const ALLOWED_PATIENT_PAGE_SIZES: [u32; 4] = [5, 10, 20, 50];

/// 客户端完整配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ClientConfig {
    /// 服务端接口配置
    pub api: ApiConfig,
    /// 会话配置
    pub session: SessionConfig,
    /// 列表配置
    pub listing: ListingConfig,
    /// 个人资料配置
    pub profile: ProfileConfig,
    /// 日志配置
    pub logging: LoggingConfig,
}

/// 服务端接口配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApiConfig {
    /// 服务端根地址
    pub base_url: String,
    /// 单次请求超时（秒）
    pub request_timeout_secs: u64,
    pub user_agent: String,
}

/// 会话配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// 凭证文件路径
    pub credential_file: PathBuf,
    /// 凭证在文件中的键名
    pub credential_key: String,
}

/// 列表配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ListingConfig {
    pub patient_page_size: u32,
    pub diagnosis_page_size: u32,
    /// 诊断页患者下拉框一次获取的患者数
    pub roster_page_size: u32,
}

/// 个人资料配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProfileConfig {
    /// 成功提示自动消失的秒数
    pub notice_ttl_secs: u64,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别或 env-filter 指令
    pub level: String,
    /// 彩色输出
    pub ansi: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            request_timeout_secs: 30,
            user_agent: format!("cxr/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            credential_file: PathBuf::from(".cxr/credentials.json"),
            credential_key: "access_token".to_string(),
        }
    }
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            patient_page_size: 10,
            diagnosis_page_size: 10,
            roster_page_size: 100,
        }
    }
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self { notice_ttl_secs: 3 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            ansi: true,
        }
    }
}

impl ClientConfig {
    /// 加载并校验配置
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = Self::load_unvalidated(path)?;
        ConfigValidator::new().validate(&config)?;
        Ok(config)
    }

    fn load_unvalidated(path: Option<&Path>) -> Result<Self> {
        let defaults = Config::try_from(&ClientConfig::default())
            .context("Failed to build default configuration")?;

        let mut builder = Config::builder().add_source(defaults);
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
        }
        let settings = builder
            .add_source(
                Environment::with_prefix("CXR")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read configuration sources")?;

        let config: ClientConfig = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        match path {
            Some(path) => info!("Configuration loaded from: {}", path.display()),
            None => debug!("Configuration loaded from defaults and environment"),
        }
        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.request_timeout_secs)
    }

    pub fn notice_ttl(&self) -> Duration {
        Duration::from_secs(self.profile.notice_ttl_secs)
    }
}

/// 配置验证器
#[derive(Debug)]
pub struct ConfigValidator {
    validation_rules: Vec<ValidationRule>,
}

/// 验证规则
#[derive(Debug)]
struct ValidationRule {
    /// 字段路径
    field_path: &'static str,
    validator: fn(&ClientConfig) -> Result<()>,
    error_message: &'static str,
}

impl ConfigValidator {
    pub fn new() -> Self {
        let validation_rules = vec![
            ValidationRule {
                field_path: "api.base_url",
                validator: |config| {
                    let url = config.api.base_url.trim();
                    if url.starts_with("http://") || url.starts_with("https://") {
                        Ok(())
                    } else {
                        Err(anyhow::anyhow!("Base URL must start with http:// or https://, got '{}'", url))
                    }
                },
                error_message: "Invalid API base URL",
            },
            ValidationRule {
                field_path: "api.request_timeout_secs",
                validator: |config| {
                    if config.api.request_timeout_secs == 0 {
                        Err(anyhow::anyhow!("Request timeout cannot be 0"))
                    } else {
                        Ok(())
                    }
                },
                error_message: "Invalid request timeout",
            },
            ValidationRule {
                field_path: "listing.patient_page_size",
                validator: |config| {
                    if ALLOWED_PATIENT_PAGE_SIZES.contains(&config.listing.patient_page_size) {
                        Ok(())
                    } else {
                        Err(anyhow::anyhow!(
                            "Patient page size must be one of {:?}",
                            ALLOWED_PATIENT_PAGE_SIZES
                        ))
                    }
                },
                error_message: "Invalid patient page size",
            },
            ValidationRule {
                field_path: "listing.diagnosis_page_size",
                validator: |config| {
                    if config.listing.diagnosis_page_size == 0 {
                        Err(anyhow::anyhow!("Diagnosis page size cannot be 0"))
                    } else {
                        Ok(())
                    }
                },
                error_message: "Invalid diagnosis page size",
            },
            ValidationRule {
                field_path: "listing.roster_page_size",
                validator: |config| {
                    if config.listing.roster_page_size == 0 {
                        Err(anyhow::anyhow!("Roster page size cannot be 0"))
                    } else {
                        Ok(())
                    }
                },
                error_message: "Invalid roster page size",
            },
            ValidationRule {
                field_path: "session.credential_key",
                validator: |config| {
                    if config.session.credential_key.trim().is_empty() {
                        Err(anyhow::anyhow!("Credential key cannot be empty"))
                    } else {
                        Ok(())
                    }
                },
                error_message: "Invalid credential key",
            },
        ];

        Self { validation_rules }
    }

    /// 验证配置
    pub fn validate(&self, config: &ClientConfig) -> Result<()> {
        for rule in &self.validation_rules {
            if let Err(e) = (rule.validator)(config) {
                error!("Configuration validation failed for {}: {}", rule.field_path, e);
                return Err(anyhow::anyhow!("{}: {}", rule.error_message, e));
            }
        }

        debug!("Configuration validation passed");
        Ok(())
    }
}

impl Default for ConfigValidator {
    fn default() -> Self {
        Self::new()
    }
}
