//! 登录与注册流程
//!
//! 登录/注册是公开接口：401 只代表凭据错误，不会触发会话清除。

use cxr_client::{endpoints, Fallbacks, RequestOrchestrator, Route, SessionContext};
use cxr_core::utils::is_plausible_email;
use cxr_core::{
    messages, BearerToken, CxrError, LoginRequest, RegisterRequest, Result, TokenResponse,
    UserProfile, MIN_PASSWORD_LEN,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

const LOGIN_FALLBACKS: Fallbacks =
    Fallbacks::new(messages::LOGIN_FAILED).with_transport(messages::SERVER_CONNECTION_ERROR);
const REGISTER_FALLBACKS: Fallbacks =
    Fallbacks::new(messages::REGISTER_FAILED).with_transport(messages::SERVER_CONNECTION_ERROR);
const VERIFY_FALLBACKS: Fallbacks = Fallbacks::new(messages::PROFILE_LOAD_FAILED);

/// 注册表单
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationForm {
    pub full_name: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

impl RegistrationForm {
    pub fn validate(&self) -> Result<RegisterRequest> {
        let full_name = self.full_name.trim();
        let email = self.email.trim();
        if full_name.is_empty()
            || email.is_empty()
            || self.password.is_empty()
            || self.confirm_password.is_empty()
        {
            return Err(CxrError::validation(messages::ALL_FIELDS_REQUIRED));
        }
        if !is_plausible_email(email) {
            return Err(CxrError::validation(messages::INVALID_EMAIL));
        }
        if self.password != self.confirm_password {
            return Err(CxrError::validation(messages::PASSWORDS_DO_NOT_MATCH));
        }
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(CxrError::validation(messages::PASSWORD_TOO_SHORT));
        }

        Ok(RegisterRequest {
            full_name: full_name.to_string(),
            email: email.to_string(),
            password: self.password.clone(),
        })
    }
}

/// 注册结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationOutcome {
    /// 服务端直接签发了凭证，已进入仪表盘
    SignedIn,
    /// 需要再登录一次，附带提示文案
    LoginRequired { notice: &'static str },
}

/// 登录/注册/退出
pub struct AuthFlows {
    orchestrator: RequestOrchestrator,
}

impl AuthFlows {
    pub fn new(orchestrator: RequestOrchestrator) -> Self {
        Self { orchestrator }
    }

    fn session(&self) -> &Arc<SessionContext> {
        self.orchestrator.session()
    }

    /// 登录并保存凭证，成功后进入仪表盘
    pub async fn login(&self, email: &str, password: &str) -> Result<()> {
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            return Err(CxrError::validation(messages::ALL_FIELDS_REQUIRED));
        }

        let request = endpoints::login(&LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        })?;
        let response: TokenResponse = self.orchestrator.execute(request, LOGIN_FALLBACKS).await?;

        let token = response
            .access_token
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| CxrError::Rejected {
                status: 200,
                message: messages::LOGIN_FAILED.to_string(),
            })?;
        self.session().store_credential(BearerToken::new(token)).await?;
        info!("Login succeeded");
        self.session().navigate(Route::Dashboard);
        Ok(())
    }

    /// 注册；服务端返回凭证时直接登录，否则回到登录页
    pub async fn register(&self, form: &RegistrationForm) -> Result<RegistrationOutcome> {
        let request = endpoints::register(&form.validate()?)?;
        let response: TokenResponse = self.orchestrator.execute(request, REGISTER_FALLBACKS).await?;

        match response.access_token.filter(|t| !t.trim().is_empty()) {
            Some(token) => {
                self.session().store_credential(BearerToken::new(token)).await?;
                info!("Registration succeeded, signed in");
                self.session().navigate(Route::Dashboard);
                Ok(RegistrationOutcome::SignedIn)
            }
            None => {
                info!("Registration succeeded, login required");
                self.session().navigate(Route::Login);
                Ok(RegistrationOutcome::LoginRequired {
                    notice: messages::REGISTER_SUCCEEDED,
                })
            }
        }
    }

    /// 登录页的预检：已有凭证时调用受保护接口验证
    ///
    /// 验证通过则直接进入仪表盘并返回资料；任何失败都清除凭证并停留在登录页。
    pub async fn check_existing_login(&self) -> Option<UserProfile> {
        if !self.session().is_authenticated().await {
            return None;
        }

        match self
            .orchestrator
            .execute::<UserProfile>(endpoints::profile(), VERIFY_FALLBACKS)
            .await
        {
            Ok(profile) => {
                debug!("Existing credential still valid");
                self.session().navigate(Route::Dashboard);
                Some(profile)
            }
            Err(e) => {
                warn!("Existing credential rejected: {}", e);
                self.session().evict().await;
                self.session().navigate(Route::Login);
                None
            }
        }
    }

    /// 注册页的预检：只要存在凭证就进入仪表盘，不做验证
    pub async fn check_existing_registration(&self) -> bool {
        if self.session().is_authenticated().await {
            self.session().navigate(Route::Dashboard);
            true
        } else {
            false
        }
    }

    pub async fn logout(&self) {
        self.session().logout().await;
        info!("Logged out");
    }
}
