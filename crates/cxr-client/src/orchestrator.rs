//! 请求编排器
//!
//! 为每次远程调用套上统一的生命周期：加载标志、响应分类、错误文案。
//!
//! | 结果 | 处理 |
//! |---|---|
//! | 2xx | 按声明的形状解析响应体 |
//! | 401（受保护接口） | 交给会话守卫清除凭证并跳转，不展示错误 |
//! | 其他 4xx/5xx | 原样展示服务端 detail，缺失时使用本地化兜底文案 |
//! | 无响应 | 通用连接错误 |

use cxr_core::{messages, CxrError, Result};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

use crate::session::SessionContext;
use crate::transport::{ApiRequest, ApiResponse, HttpTransport};

/// 一次调用的最终结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    Success,
    /// 失败；附带应展示给用户的文案（认证跳转时为 `None`）
    Failure(Option<String>),
}

/// 可观察的加载状态
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LoadState {
    #[default]
    Idle,
    InFlight,
    Settled(Settlement),
}

/// 调用方声明的失败兜底文案
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fallbacks {
    pub rejected: &'static str,
    pub transport: &'static str,
}

impl Fallbacks {
    pub const fn new(rejected: &'static str) -> Self {
        Self {
            rejected,
            transport: messages::CONNECTION_ERROR,
        }
    }

    pub const fn with_transport(mut self, transport: &'static str) -> Self {
        self.transport = transport;
        self
    }
}

/// 一次进行中的调用
///
/// 在 drop 时减少计数，调用方中途放弃 future 也不会让加载标志停留在进行中。
struct CallGuard<'a> {
    orchestrator: &'a RequestOrchestrator,
    settlement: Option<Settlement>,
}

impl<'a> CallGuard<'a> {
    fn enter(orchestrator: &'a RequestOrchestrator) -> Self {
        orchestrator.in_flight.fetch_add(1, Ordering::SeqCst);
        orchestrator.state.send_replace(LoadState::InFlight);
        Self {
            orchestrator,
            settlement: None,
        }
    }
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        // 并发调用时，只有最后一个结束的调用负责落定状态；被放弃的调用回到空闲
        if self.orchestrator.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            let state = match self.settlement.take() {
                Some(settlement) => LoadState::Settled(settlement),
                None => LoadState::Idle,
            };
            self.orchestrator.state.send_replace(state);
        }
    }
}

/// 请求编排器
///
/// `clone()` 共享同一个加载标志；[`RequestOrchestrator::scoped`] 为另一个组件
/// 创建独立的加载标志，但共享会话和传输层。
#[derive(Clone)]
pub struct RequestOrchestrator {
    session: Arc<SessionContext>,
    transport: Arc<dyn HttpTransport>,
    state: Arc<watch::Sender<LoadState>>,
    in_flight: Arc<AtomicUsize>,
}

impl RequestOrchestrator {
    pub fn new(session: Arc<SessionContext>, transport: Arc<dyn HttpTransport>) -> Self {
        let (state, _) = watch::channel(LoadState::Idle);
        Self {
            session,
            transport,
            state: Arc::new(state),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// 独立加载标志的编排器
    pub fn scoped(&self) -> Self {
        Self::new(self.session.clone(), self.transport.clone())
    }

    pub fn session(&self) -> &Arc<SessionContext> {
        &self.session
    }

    pub fn state(&self) -> LoadState {
        self.state.borrow().clone()
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }

    pub fn subscribe(&self) -> watch::Receiver<LoadState> {
        self.state.subscribe()
    }

    /// 执行请求并解析响应体
    pub async fn execute<T: DeserializeOwned>(
        &self,
        request: ApiRequest,
        fallbacks: Fallbacks,
    ) -> Result<T> {
        self.track(async {
            let response = self.run(request, fallbacks).await?;
            response.parse::<T>().map_err(|e| {
                error!("Unexpected response shape (status {}): {}", response.status, e);
                CxrError::Rejected {
                    status: response.status,
                    message: fallbacks.rejected.to_string(),
                }
            })
        })
        .await
    }

    /// 执行请求，忽略响应体
    pub async fn execute_unit(&self, request: ApiRequest, fallbacks: Fallbacks) -> Result<()> {
        self.track(async { self.run(request, fallbacks).await.map(|_| ()) })
            .await
    }

    async fn track<T, F>(&self, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let mut guard = CallGuard::enter(self);
        let result = call.await;
        guard.settlement = Some(match &result {
            Ok(_) => Settlement::Success,
            Err(e) => Settlement::Failure(e.user_message()),
        });
        result
    }

    async fn run(&self, request: ApiRequest, fallbacks: Fallbacks) -> Result<ApiResponse> {
        let request_id = Uuid::new_v4();
        let span = tracing::debug_span!(
            "api_request",
            %request_id,
            method = request.method.as_str(),
            path = %request.path
        );

        async move {
            let protected = request.protected;
            let request = if protected {
                self.session.authorize(request).await?
            } else {
                request
            };

            debug!("Dispatching request");
            let response = match self.transport.execute(request).await {
                Ok(response) => response,
                Err(e) => {
                    warn!("No response received: {}", e);
                    return Err(CxrError::Transport(fallbacks.transport.to_string()));
                }
            };

            let response = if protected {
                self.session.on_response(response).await?
            } else {
                response
            };

            if response.is_success() {
                debug!(status = response.status, "Request succeeded");
                return Ok(response);
            }

            let message = response
                .detail()
                .unwrap_or_else(|| fallbacks.rejected.to_string());
            info!(status = response.status, "Request rejected: {}", message);
            Err(CxrError::Rejected {
                status: response.status,
                message,
            })
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedTransport;
    use crate::transport::HttpMethod;
    use crate::Route;
    use cxr_core::{BearerToken, DashboardSummary};
    use serde_json::json;

    const SUMMARY_FALLBACKS: Fallbacks = Fallbacks::new(messages::SUMMARY_LOAD_FAILED);

    async fn authenticated(transport: Arc<ScriptedTransport>) -> RequestOrchestrator {
        let session = Arc::new(SessionContext::in_memory());
        session.store_credential(BearerToken::new("tok")).await.unwrap();
        RequestOrchestrator::new(session, transport)
    }

    #[tokio::test]
    async fn test_success_parses_declared_shape() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(
            HttpMethod::Get,
            "/api/dashboard/summary",
            200,
            json!({"patients": {"total": 3}, "diagnoses": {"total": 2}}),
        );
        let orchestrator = authenticated(transport.clone()).await;

        let summary: DashboardSummary = orchestrator
            .execute(ApiRequest::get("/api/dashboard/summary"), SUMMARY_FALLBACKS)
            .await
            .unwrap();

        assert_eq!(summary.patients.total, 3);
        assert_eq!(orchestrator.state(), LoadState::Settled(Settlement::Success));
        assert_eq!(
            transport.requests()[0].header_value("Authorization"),
            Some("Bearer tok")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_call_releases_loading_flag() {
        let transport = Arc::new(ScriptedTransport::new());
        let _gate = transport.respond_gated(HttpMethod::Get, "/api/dashboard/summary", 200, json!({}));
        let orchestrator = authenticated(transport.clone()).await;

        let call = orchestrator.execute::<DashboardSummary>(
            ApiRequest::get("/api/dashboard/summary"),
            SUMMARY_FALLBACKS,
        );
        let abandoned = tokio::time::timeout(std::time::Duration::from_secs(1), call).await;

        assert!(abandoned.is_err());
        assert_eq!(transport.request_count(), 1);
        assert!(!orchestrator.is_loading());
        assert_eq!(orchestrator.state(), LoadState::Idle);
    }

    #[tokio::test]
    async fn test_rejection_surfaces_detail_or_fallback() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(HttpMethod::Get, "/api/dashboard/summary", 422, json!({"detail": "Filtro inválido"}));
        transport.respond_raw(HttpMethod::Get, "/api/dashboard/summary", 500, "oops");
        let orchestrator = authenticated(transport).await;

        let err = orchestrator
            .execute_unit(ApiRequest::get("/api/dashboard/summary"), SUMMARY_FALLBACKS)
            .await
            .unwrap_err();
        assert_eq!(err.user_message().as_deref(), Some("Filtro inválido"));

        let err = orchestrator
            .execute_unit(ApiRequest::get("/api/dashboard/summary"), SUMMARY_FALLBACKS)
            .await
            .unwrap_err();
        assert_eq!(err.user_message().as_deref(), Some(messages::SUMMARY_LOAD_FAILED));
        assert_eq!(
            orchestrator.state(),
            LoadState::Settled(Settlement::Failure(Some(messages::SUMMARY_LOAD_FAILED.to_string())))
        );
    }

    #[tokio::test]
    async fn test_unauthorized_is_silent_and_redirects() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(HttpMethod::Get, "/api/dashboard/summary", 401, json!({"msg": "Token has expired"}));
        let orchestrator = authenticated(transport).await;

        let err = orchestrator
            .execute_unit(ApiRequest::get("/api/dashboard/summary"), SUMMARY_FALLBACKS)
            .await
            .unwrap_err();

        assert!(matches!(err, CxrError::Unauthorized));
        assert!(err.user_message().is_none());
        assert!(!orchestrator.session().is_authenticated().await);
        assert_eq!(orchestrator.session().current_route(), Route::Login);
        assert_eq!(orchestrator.state(), LoadState::Settled(Settlement::Failure(None)));
    }

    #[tokio::test]
    async fn test_public_401_is_plain_rejection() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(HttpMethod::Post, "/api/auth/login", 401, json!({"error": "Credenciales inválidas"}));
        let orchestrator = authenticated(transport).await;

        let err = orchestrator
            .execute_unit(
                ApiRequest::post("/api/auth/login").public(),
                Fallbacks::new(messages::LOGIN_FAILED),
            )
            .await
            .unwrap_err();

        assert_eq!(err.user_message().as_deref(), Some("Credenciales inválidas"));
        assert!(orchestrator.session().is_authenticated().await);
    }

    #[tokio::test]
    async fn test_missing_credential_never_reaches_transport() {
        let transport = Arc::new(ScriptedTransport::new());
        let session = Arc::new(SessionContext::in_memory());
        let orchestrator = RequestOrchestrator::new(session.clone(), transport.clone());

        let err = orchestrator
            .execute_unit(ApiRequest::get("/api/patients/"), SUMMARY_FALLBACKS)
            .await
            .unwrap_err();

        assert!(matches!(err, CxrError::NotAuthenticated));
        assert_eq!(transport.request_count(), 0);
        assert_eq!(session.current_route(), Route::Login);
    }

    #[tokio::test]
    async fn test_transport_failure_uses_connection_message() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.fail_connection(HttpMethod::Post, "/api/auth/login");
        let orchestrator = authenticated(transport).await;

        let err = orchestrator
            .execute_unit(
                ApiRequest::post("/api/auth/login").public(),
                Fallbacks::new(messages::LOGIN_FAILED)
                    .with_transport(messages::SERVER_CONNECTION_ERROR),
            )
            .await
            .unwrap_err();

        assert_eq!(err.user_message().as_deref(), Some(messages::SERVER_CONNECTION_ERROR));
        assert!(!orchestrator.is_loading());
    }

    #[tokio::test]
    async fn test_scoped_orchestrators_have_independent_flags() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(HttpMethod::Get, "/api/dashboard/summary", 200, json!({}));
        let orchestrator = authenticated(transport).await;
        let other = orchestrator.scoped();

        orchestrator
            .execute_unit(ApiRequest::get("/api/dashboard/summary"), SUMMARY_FALLBACKS)
            .await
            .unwrap();

        assert_eq!(other.state(), LoadState::Idle);
    }
}
