//! 核心数据模型定义
//!
//! 字段名与服务端 REST 契约保持一致（snake_case JSON）。

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::messages;
use crate::utils::{number, timestamp};

/// 不透明的 Bearer 凭证
///
/// 客户端只负责携带，不解析也不校验。`Debug` 输出已脱敏。
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `Authorization` 头的取值
    pub fn header_value(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BearerToken(***)")
    }
}

/// 性别枚举
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum Gender {
    #[default]
    #[serde(rename = "M")]
    Male,
    #[serde(rename = "F")]
    Female,
    #[serde(rename = "O")]
    Other,
}

impl Gender {
    pub fn code(&self) -> &'static str {
        match self {
            Gender::Male => "M",
            Gender::Female => "F",
            Gender::Other => "O",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Gender::Male => "Masculino",
            Gender::Female => "Femenino",
            Gender::Other => "Otro",
        }
    }
}

impl FromStr for Gender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "M" | "MALE" => Ok(Gender::Male),
            "F" | "FEMALE" => Ok(Gender::Female),
            "O" | "OTHER" => Ok(Gender::Other),
            other => Err(format!("Unknown gender: {}", other)),
        }
    }
}

/// 患者基本信息
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Patient {
    pub id: i64,
    pub full_name: String,
    pub age: u8,
    pub gender: Gender,
    #[serde(default, with = "timestamp::option")]
    pub created_at: Option<DateTime<Utc>>,
}

/// 创建/更新患者的请求体
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatientPayload {
    pub full_name: String,
    pub age: u8,
    pub gender: Gender,
}

/// 诊断结果标签
///
/// 输入时兼容预测引擎的 `NORMAL`，展示时统一为 `COVID` / `NO COVID`。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "String", into = "String")]
pub enum DiagnosisLabel {
    Positive,
    Negative,
}

impl DiagnosisLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Positive => "COVID",
            Self::Negative => "NO COVID",
        }
    }

    /// 人类可读的结论句
    pub fn interpretation(&self) -> &'static str {
        match self {
            Self::Positive => messages::INTERPRETATION_POSITIVE,
            Self::Negative => messages::INTERPRETATION_NEGATIVE,
        }
    }
}

impl TryFrom<&str> for DiagnosisLabel {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_uppercase().replace(['_', '-'], " ");
        match normalized.as_str() {
            "COVID" | "POSITIVE" | "POSITIVO" => Ok(Self::Positive),
            "NO COVID" | "NORMAL" | "NEGATIVE" | "NEGATIVO" => Ok(Self::Negative),
            _ => Err(format!("Unknown diagnosis result: {}", value)),
        }
    }
}

impl TryFrom<String> for DiagnosisLabel {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

impl From<DiagnosisLabel> for String {
    fn from(label: DiagnosisLabel) -> Self {
        label.as_str().to_string()
    }
}

impl FromStr for DiagnosisLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(s)
    }
}

impl fmt::Display for DiagnosisLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 诊断记录（创建后不可变）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Diagnosis {
    pub id: i64,
    pub patient_id: i64,
    #[serde(default)]
    pub patient_name: Option<String>,
    #[serde(alias = "image_path")]
    pub image_url: String,
    pub result: DiagnosisLabel,
    #[serde(deserialize_with = "number::flexible_f64")]
    pub confidence: f64,
    #[serde(default, alias = "heatmap_path")]
    pub heatmap_url: Option<String>,
    #[serde(default, with = "timestamp::option")]
    pub created_at: Option<DateTime<Utc>>,
}

/// 诊断列表过滤条件
///
/// 未设置的字段不会出现在查询参数中。日期区间为闭区间。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosisFilter {
    pub patient_id: Option<i64>,
    pub result: Option<DiagnosisLabel>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
}

impl DiagnosisFilter {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(patient_id) = self.patient_id {
            pairs.push(("patient_id", patient_id.to_string()));
        }
        if let Some(result) = self.result {
            pairs.push(("result", result.as_str().to_string()));
        }
        if let Some(date_from) = self.date_from {
            pairs.push(("date_from", date_from.format("%Y-%m-%d").to_string()));
        }
        if let Some(date_to) = self.date_to {
            pairs.push(("date_to", date_to.format("%Y-%m-%d").to_string()));
        }
        pairs
    }
}

/// 预测接口的响应
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PredictionResponse {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub patient_id: Option<i64>,
    pub result: DiagnosisLabel,
    #[serde(deserialize_with = "number::flexible_f64")]
    pub confidence: f64,
    pub image_url: String,
    #[serde(default)]
    pub heatmap_url: Option<String>,
    #[serde(default, with = "timestamp::option")]
    pub created_at: Option<DateTime<Utc>>,
}

/// 分页列表响应
///
/// 患者接口返回 `page`/`pages`，诊断接口只返回 `total`/`per_page`。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub per_page: Option<u32>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub pages: Option<u32>,
}

/// 当前用户资料
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct UserProfile {
    #[serde(default)]
    pub id: Option<i64>,
    pub full_name: String,
    pub email: String,
}

/// 个人资料更新请求
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub full_name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_password: Option<String>,
}

/// 登录请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// 注册请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub full_name: String,
    pub email: String,
    pub password: String,
}

/// 登录/注册接口返回的凭证
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
}

/// 患者统计
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PatientStats {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub male: u64,
    #[serde(default)]
    pub female: u64,
    #[serde(default)]
    pub other: u64,
    #[serde(default, deserialize_with = "number::flexible_f64")]
    pub average_age: f64,
}

/// 诊断统计
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct DiagnosisStats {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub covid_positive: u64,
    #[serde(default)]
    pub covid_negative: u64,
    #[serde(default, deserialize_with = "number::flexible_f64")]
    pub positive_rate: f64,
}

/// 近期活动
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RecentActivity {
    #[serde(default)]
    pub diagnoses_last_7_days: u64,
}

/// 仪表盘汇总快照
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct DashboardSummary {
    #[serde(default)]
    pub patients: PatientStats,
    #[serde(default)]
    pub diagnoses: DiagnosisStats,
    #[serde(default)]
    pub recent_activity: RecentActivity,
}
