//! 测试用的脚本化传输层
//!
//! 按 (方法, 路径) 依次匹配预置的响应，并记录收到的全部请求。
//! 带闸门的响应会一直挂起，直到测试调用 [`Gate::release`]，用于模拟乱序返回。

use async_trait::async_trait;
use cxr_core::{CxrError, Result};
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::oneshot;

use crate::transport::{ApiRequest, ApiResponse, HttpMethod, HttpTransport};

enum Reply {
    Response(ApiResponse),
    ConnectionError,
}

struct Scripted {
    method: HttpMethod,
    path: String,
    reply: Reply,
    gate: Option<oneshot::Receiver<()>>,
}

/// 挂起响应的闸门
pub struct Gate(oneshot::Sender<()>);

impl Gate {
    pub fn release(self) {
        let _ = self.0.send(());
    }
}

/// 脚本化传输层
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Scripted>>,
    log: Mutex<Vec<ApiRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, method: HttpMethod, path: &str, reply: Reply, gate: Option<oneshot::Receiver<()>>) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Scripted {
                method,
                path: path.to_string(),
                reply,
                gate,
            });
        }
    }

    /// 预置 JSON 响应
    pub fn respond(&self, method: HttpMethod, path: &str, status: u16, body: serde_json::Value) {
        self.push(method, path, Reply::Response(ApiResponse::json(status, &body)), None);
    }

    /// 预置原始文本响应
    pub fn respond_raw(&self, method: HttpMethod, path: &str, status: u16, body: &str) {
        self.push(method, path, Reply::Response(ApiResponse::new(status, body)), None);
    }

    /// 预置挂起的 JSON 响应
    pub fn respond_gated(
        &self,
        method: HttpMethod,
        path: &str,
        status: u16,
        body: serde_json::Value,
    ) -> Gate {
        let (tx, rx) = oneshot::channel();
        self.push(method, path, Reply::Response(ApiResponse::json(status, &body)), Some(rx));
        Gate(tx)
    }

    /// 预置一次连接失败
    pub fn fail_connection(&self, method: HttpMethod, path: &str) {
        self.push(method, path, Reply::ConnectionError, None);
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.log.lock().map(|log| log.clone()).unwrap_or_default()
    }

    pub fn request_count(&self) -> usize {
        self.log.lock().map(|log| log.len()).unwrap_or_default()
    }

    pub fn requests_to(&self, method: HttpMethod, path: &str) -> Vec<ApiRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method && r.path == path)
            .collect()
    }

    /// 尚未被消费的预置响应数
    pub fn pending(&self) -> usize {
        self.script.lock().map(|s| s.len()).unwrap_or_default()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse> {
        if let Ok(mut log) = self.log.lock() {
            log.push(request.clone());
        }

        let entry = self.script.lock().ok().and_then(|mut script| {
            let index = script
                .iter()
                .position(|s| s.method == request.method && s.path == request.path)?;
            script.remove(index)
        });

        let Some(entry) = entry else {
            return Ok(ApiResponse::json(
                500,
                &serde_json::json!({
                    "detail": format!("unscripted request: {} {}", request.method.as_str(), request.path)
                }),
            ));
        };

        if let Some(gate) = entry.gate {
            let _ = gate.await;
        }

        match entry.reply {
            Reply::Response(response) => Ok(response),
            Reply::ConnectionError => Err(CxrError::Transport("connection refused".to_string())),
        }
    }
}
