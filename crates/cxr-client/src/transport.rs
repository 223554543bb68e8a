//! HTTP传输层
//!
//! 请求描述与具体 HTTP 实现解耦：业务代码只构造 [`ApiRequest`]，
//! 由 [`HttpTransport`] 负责发送。生产环境使用 reqwest，测试使用脚本化实现。

use async_trait::async_trait;
use cxr_core::{BearerToken, CxrError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

/// HTTP方法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

/// 上传的文件片段
#[derive(Clone, PartialEq)]
pub struct FilePart {
    pub field: String,
    pub file_name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl fmt::Debug for FilePart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilePart")
            .field("field", &self.field)
            .field("file_name", &self.file_name)
            .field("mime", &self.mime)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// multipart 表单
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MultipartForm {
    pub fields: Vec<(String, String)>,
    pub files: Vec<FilePart>,
}

impl MultipartForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    pub fn file(mut self, part: FilePart) -> Self {
        self.files.push(part);
        self
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    fn into_reqwest(self) -> Result<reqwest::multipart::Form> {
        let mut form = reqwest::multipart::Form::new();
        for (name, value) in self.fields {
            form = form.text(name, value);
        }
        for part in self.files {
            let body = reqwest::multipart::Part::bytes(part.bytes)
                .file_name(part.file_name)
                .mime_str(&part.mime)
                .map_err(|e| CxrError::validation(format!("invalid MIME type: {}", e)))?;
            form = form.part(part.field, body);
        }
        Ok(form)
    }
}

/// 请求体
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(serde_json::Value),
    Multipart(MultipartForm),
}

/// 请求描述
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: HttpMethod,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
    /// 受保护接口需要 Bearer 凭证，401 视为会话失效
    pub protected: bool,
}

impl ApiRequest {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: RequestBody::Empty,
            protected: true,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Put, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, path)
    }

    /// 标记为公开接口（登录、注册）
    pub fn public(mut self) -> Self {
        self.protected = false;
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self> {
        self.body = RequestBody::Json(serde_json::to_value(body)?);
        Ok(self)
    }

    pub fn multipart(mut self, form: MultipartForm) -> Self {
        self.body = RequestBody::Multipart(form);
        self
    }

    /// 附加 `Authorization` 头，覆盖已有值
    pub fn bearer(mut self, token: &BearerToken) -> Self {
        self.headers
            .retain(|(name, _)| !name.eq_ignore_ascii_case("authorization"));
        self.headers
            .push(("Authorization".to_string(), token.header_value()));
        self
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, value)| value.as_str())
    }
}

/// 原始响应
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn json(status: u16, value: &serde_json::Value) -> Self {
        Self::new(status, value.to_string())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }

    /// 按声明的形状解析响应体；空响应体按 `null` 处理
    pub fn parse<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        if self.body.iter().all(u8::is_ascii_whitespace) {
            serde_json::from_str("null")
        } else {
            serde_json::from_slice(&self.body)
        }
    }

    /// 错误响应中的人类可读信息（`detail` 优先，其次 `error`）
    pub fn detail(&self) -> Option<String> {
        let value: serde_json::Value = serde_json::from_slice(&self.body).ok()?;
        ["detail", "error"].iter().find_map(|key| {
            value
                .get(*key)
                .and_then(|v| v.as_str())
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        })
    }
}

/// HTTP传输接口
///
/// `Err` 只表示没有收到任何响应；收到的任何状态码都以 `Ok` 返回。
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse>;
}

/// 基于 reqwest 的传输实现
pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: String,
}

impl ReqwestTransport {
    pub fn new(base_url: impl Into<String>, timeout: Duration, user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| CxrError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse> {
        let method = match request.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
        };
        let url = self.url(&request.path);

        let mut builder = self.client.request(method, &url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(&value),
            RequestBody::Multipart(form) => builder.multipart(form.into_reqwest()?),
        };

        let response = builder.send().await.map_err(|e| {
            warn!("Request to {} failed before a response arrived: {}", url, e);
            CxrError::Transport(e.to_string())
        })?;

        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(|e| {
            warn!("Failed to read response body from {}: {}", url, e);
            CxrError::Transport(e.to_string())
        })?;

        debug!("{} {} -> {}", request.method.as_str(), url, status);
        Ok(ApiResponse::new(status, body.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_detail_prefers_detail_over_error() {
        let response = ApiResponse::json(400, &json!({"detail": "A", "error": "B"}));
        assert_eq!(response.detail().as_deref(), Some("A"));

        let response = ApiResponse::json(400, &json!({"error": "El email ya está registrado"}));
        assert_eq!(response.detail().as_deref(), Some("El email ya está registrado"));

        let response = ApiResponse::new(500, "<html>Internal Server Error</html>");
        assert!(response.detail().is_none());

        let response = ApiResponse::json(400, &json!({"detail": "   "}));
        assert!(response.detail().is_none());
    }

    #[test]
    fn test_bearer_replaces_existing_authorization() {
        let request = ApiRequest::get("/api/dashboard/summary")
            .header("authorization", "Bearer stale")
            .bearer(&BearerToken::new("fresh"));

        assert_eq!(request.header_value("Authorization"), Some("Bearer fresh"));
        assert_eq!(request.headers.len(), 1);
    }

    #[test]
    fn test_empty_body_parses_as_unit() {
        let response = ApiResponse::new(204, Vec::new());
        let parsed: Option<serde_json::Value> = response.parse().unwrap();
        assert!(parsed.is_none());
    }

    #[test]
    fn test_requests_are_protected_by_default() {
        assert!(ApiRequest::get("/api/patients/").protected);
        assert!(!ApiRequest::post("/api/auth/login").public().protected);
    }
}
