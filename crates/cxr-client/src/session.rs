//! 会话守卫
//!
//! 持有进程内唯一的 Bearer 凭证，负责：
//! - 发送前附加凭证（每次发送时读取，不在构造请求时缓存）
//! - 受保护视图进入前的同步检查，没有凭证时直接跳转登录页
//! - 收到 401 时清除凭证并跳转登录页
//!
//! 凭证只能通过 [`SessionContext::store_credential`] 和
//! [`SessionContext::evict`] 修改。

use cxr_core::{BearerToken, CxrError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info, warn};

use crate::credentials::{CredentialStore, MemoryCredentialStore, CREDENTIAL_KEY};
use crate::transport::{ApiRequest, ApiResponse};

/// 客户端路由
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Route {
    Landing,
    Register,
    Login,
    Dashboard,
}

impl Route {
    pub fn path(&self) -> &'static str {
        match self {
            Route::Landing => "/",
            Route::Register => "/registro",
            Route::Login => "/login",
            Route::Dashboard => "/dashboard",
        }
    }
}

/// 会话上下文
///
/// 显式注入到每个需要发请求的组件中，取代全局可变状态。
pub struct SessionContext {
    store: Arc<dyn CredentialStore>,
    key: String,
    credential: RwLock<Option<BearerToken>>,
    route: watch::Sender<Route>,
}

impl SessionContext {
    /// 从持久化存储恢复会话
    pub async fn restore(store: Arc<dyn CredentialStore>, key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        let credential = store.load(&key).await?.map(BearerToken::new);
        if credential.is_some() {
            debug!("Restored persisted credential");
        }

        let (route, _) = watch::channel(Route::Landing);
        Ok(Self {
            store,
            key,
            credential: RwLock::new(credential),
            route,
        })
    }

    /// 纯内存会话（无持久化凭证）
    pub fn in_memory() -> Self {
        let (route, _) = watch::channel(Route::Landing);
        Self {
            store: Arc::new(MemoryCredentialStore::new()),
            key: CREDENTIAL_KEY.to_string(),
            credential: RwLock::new(None),
            route,
        }
    }

    pub async fn credential(&self) -> Option<BearerToken> {
        self.credential.read().await.clone()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.credential.read().await.is_some()
    }

    /// 保存新凭证；先持久化，成功后才生效
    pub async fn store_credential(&self, token: BearerToken) -> Result<()> {
        self.store.save(&self.key, token.as_str()).await?;
        *self.credential.write().await = Some(token);
        info!("Session credential stored");
        Ok(())
    }

    /// 清除凭证；持久化失败时内存中的凭证仍然会被清除
    pub async fn evict(&self) {
        self.credential.write().await.take();
        if let Err(e) = self.store.remove(&self.key).await {
            warn!("Failed to remove persisted credential: {}", e);
        }
        info!("Session credential evicted");
    }

    /// 附加凭证（存在时）
    pub async fn attach(&self, request: ApiRequest) -> ApiRequest {
        match self.credential.read().await.as_ref() {
            Some(token) => request.bearer(token),
            None => request,
        }
    }

    /// 受保护视图/请求的前置检查：没有凭证则跳转登录页
    pub async fn require_credential(&self) -> Result<BearerToken> {
        match self.credential().await {
            Some(token) => Ok(token),
            None => {
                debug!("No credential present, redirecting to login");
                self.navigate(Route::Login);
                Err(CxrError::NotAuthenticated)
            }
        }
    }

    /// 检查凭证并附加到请求上
    pub async fn authorize(&self, request: ApiRequest) -> Result<ApiRequest> {
        let token = self.require_credential().await?;
        Ok(request.bearer(&token))
    }

    /// 响应检查：401 时清除凭证并跳转登录页，其余原样放行
    pub async fn on_response(&self, response: ApiResponse) -> Result<ApiResponse> {
        if response.is_unauthorized() {
            warn!("Protected request rejected with 401, ending session");
            self.evict().await;
            self.navigate(Route::Login);
            return Err(CxrError::Unauthorized);
        }
        Ok(response)
    }

    /// 退出登录
    pub async fn logout(&self) {
        self.evict().await;
        self.navigate(Route::Login);
    }

    pub fn navigate(&self, route: Route) {
        let previous = self.route.send_replace(route);
        if previous != route {
            debug!("Route changed {} -> {}", previous.path(), route.path());
        }
    }

    pub fn current_route(&self) -> Route {
        *self.route.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Route> {
        self.route.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_restore_reads_well_known_key() {
        let store = Arc::new(MemoryCredentialStore::with_entry(CREDENTIAL_KEY, "persisted"));
        let session = SessionContext::restore(store, CREDENTIAL_KEY).await.unwrap();

        assert_eq!(
            session.credential().await,
            Some(BearerToken::new("persisted"))
        );
    }

    #[tokio::test]
    async fn test_attach_reads_credential_at_dispatch() {
        let session = SessionContext::in_memory();
        let request = ApiRequest::get("/api/dashboard/summary");

        let unauthenticated = session.attach(request.clone()).await;
        assert!(unauthenticated.header_value("Authorization").is_none());

        session.store_credential(BearerToken::new("abc")).await.unwrap();
        let authenticated = session.attach(request).await;
        assert_eq!(authenticated.header_value("Authorization"), Some("Bearer abc"));
    }

    #[tokio::test]
    async fn test_missing_credential_redirects_before_request() {
        let session = SessionContext::in_memory();
        let err = session.require_credential().await.unwrap_err();

        assert!(matches!(err, CxrError::NotAuthenticated));
        assert_eq!(session.current_route(), Route::Login);
    }

    #[tokio::test]
    async fn test_unauthorized_response_evicts_and_redirects() {
        let store = Arc::new(MemoryCredentialStore::new());
        let session = SessionContext::restore(store.clone(), CREDENTIAL_KEY).await.unwrap();
        session.store_credential(BearerToken::new("expired")).await.unwrap();
        session.navigate(Route::Dashboard);

        let err = session
            .on_response(ApiResponse::new(401, "{}"))
            .await
            .unwrap_err();

        assert!(matches!(err, CxrError::Unauthorized));
        assert!(!session.is_authenticated().await);
        assert!(store.load(CREDENTIAL_KEY).await.unwrap().is_none());
        assert_eq!(session.current_route(), Route::Login);
    }

    #[tokio::test]
    async fn test_other_statuses_pass_through() {
        let session = SessionContext::in_memory();
        session.store_credential(BearerToken::new("ok")).await.unwrap();

        let response = session
            .on_response(ApiResponse::new(403, r#"{"detail":"Prohibido"}"#))
            .await
            .unwrap();
        assert_eq!(response.status, 403);
        assert!(session.is_authenticated().await);
    }

    #[tokio::test]
    async fn test_route_subscription_sees_redirect() {
        let session = SessionContext::in_memory();
        let mut routes = session.subscribe();
        session.navigate(Route::Dashboard);
        session.logout().await;

        routes.changed().await.unwrap();
        assert_eq!(*routes.borrow_and_update(), Route::Login);
    }
}
