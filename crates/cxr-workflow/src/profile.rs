//! 个人资料
//!
//! 获取、编辑与删除当前用户自己的账户。编辑时的草稿从最近一次获取的
//! 资料复制而来，取消即丢弃；保存成功后整体重新获取，并显示一条
//! 会自动消失的提示。

use cxr_client::{endpoints, Fallbacks, RequestOrchestrator};
use cxr_core::{messages, CxrError, ProfileUpdate, Result, UserProfile, MIN_PASSWORD_LEN};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::Confirm;

const LOAD_FALLBACKS: Fallbacks = Fallbacks::new(messages::PROFILE_LOAD_FAILED);
const UPDATE_FALLBACKS: Fallbacks = Fallbacks::new(messages::PROFILE_UPDATE_FAILED);
const DELETE_FALLBACKS: Fallbacks = Fallbacks::new(messages::PROFILE_DELETE_FAILED);

pub const DEFAULT_NOTICE_TTL: Duration = Duration::from_secs(3);

/// 编辑草稿
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileDraft {
    pub full_name: String,
    pub email: String,
    pub current_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

impl ProfileDraft {
    fn from_profile(profile: &UserProfile) -> Self {
        Self {
            full_name: profile.full_name.clone(),
            email: profile.email.clone(),
            ..Default::default()
        }
    }

    /// 校验并生成请求体；只有设置新密码时才携带当前密码
    pub fn validate(&self) -> Result<ProfileUpdate> {
        let full_name = self.full_name.trim();
        let email = self.email.trim();
        if full_name.is_empty() || email.is_empty() {
            return Err(CxrError::validation(messages::PROFILE_NAME_AND_EMAIL_REQUIRED));
        }

        let changes_password = !self.new_password.is_empty();
        if changes_password {
            if self.new_password != self.confirm_password {
                return Err(CxrError::validation(messages::PASSWORDS_DO_NOT_MATCH));
            }
            if self.new_password.chars().count() < MIN_PASSWORD_LEN {
                return Err(CxrError::validation(messages::PASSWORD_TOO_SHORT));
            }
        }

        Ok(ProfileUpdate {
            full_name: full_name.to_string(),
            email: email.to_string(),
            current_password: changes_password.then(|| self.current_password.clone()),
            new_password: changes_password.then(|| self.new_password.clone()),
        })
    }
}

/// 个人资料控制器
pub struct ProfileController {
    orchestrator: RequestOrchestrator,
    profile: RwLock<Option<UserProfile>>,
    draft: RwLock<Option<ProfileDraft>>,
    error: RwLock<Option<String>>,
    notice: Arc<RwLock<Option<String>>>,
    notice_seq: Arc<AtomicU64>,
    notice_ttl: Duration,
}

impl ProfileController {
    pub fn new(orchestrator: RequestOrchestrator, notice_ttl: Duration) -> Self {
        Self {
            orchestrator,
            profile: RwLock::new(None),
            draft: RwLock::new(None),
            error: RwLock::new(None),
            notice: Arc::new(RwLock::new(None)),
            notice_seq: Arc::new(AtomicU64::new(0)),
            notice_ttl,
        }
    }

    pub async fn load(&self) -> Result<UserProfile> {
        match self
            .orchestrator
            .execute::<UserProfile>(endpoints::profile(), LOAD_FALLBACKS)
            .await
        {
            Ok(profile) => {
                *self.profile.write().await = Some(profile.clone());
                self.error.write().await.take();
                Ok(profile)
            }
            Err(e) => {
                *self.error.write().await = e.user_message();
                Err(e)
            }
        }
    }

    pub async fn profile(&self) -> Option<UserProfile> {
        self.profile.read().await.clone()
    }

    pub async fn error(&self) -> Option<String> {
        self.error.read().await.clone()
    }

    pub async fn notice(&self) -> Option<String> {
        self.notice.read().await.clone()
    }

    pub async fn is_editing(&self) -> bool {
        self.draft.read().await.is_some()
    }

    pub async fn draft(&self) -> Option<ProfileDraft> {
        self.draft.read().await.clone()
    }

    /// 进入编辑模式，草稿复制最近一次获取的资料
    pub async fn begin_edit(&self) {
        let profile = self.profile.read().await.clone().unwrap_or_default();
        *self.draft.write().await = Some(ProfileDraft::from_profile(&profile));
        self.error.write().await.take();
    }

    pub async fn edit_draft<F>(&self, edit: F) -> bool
    where
        F: FnOnce(&mut ProfileDraft),
    {
        match self.draft.write().await.as_mut() {
            Some(draft) => {
                edit(draft);
                true
            }
            None => false,
        }
    }

    /// 放弃草稿，显示值恢复为最近一次获取的资料
    pub async fn cancel_edit(&self) {
        self.draft.write().await.take();
        self.error.write().await.take();
    }

    /// 保存草稿
    pub async fn submit(&self) -> Result<()> {
        let Some(draft) = self.draft().await else {
            return Err(CxrError::InvalidStateTransition {
                from: "Viewing".to_string(),
                event: "Submit".to_string(),
            });
        };
        self.error.write().await.take();

        let result = self.save(&draft).await;
        if let Err(e) = &result {
            *self.error.write().await = e.user_message();
        }
        result
    }

    async fn save(&self, draft: &ProfileDraft) -> Result<()> {
        let update = draft.validate()?;
        let changes_password = update.new_password.is_some();

        self.orchestrator
            .execute_unit(endpoints::update_profile(&update)?, UPDATE_FALLBACKS)
            .await?;
        info!(changes_password, "Profile updated");

        self.draft.write().await.take();
        self.load().await?;
        self.show_notice(messages::PROFILE_UPDATED).await;
        Ok(())
    }

    async fn show_notice(&self, text: &str) {
        let seq = self.notice_seq.fetch_add(1, Ordering::SeqCst) + 1;
        *self.notice.write().await = Some(text.to_string());

        let notice = self.notice.clone();
        let notice_seq = self.notice_seq.clone();
        let ttl = self.notice_ttl;
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            // 期间显示了新提示则由新的任务负责清除
            if notice_seq.load(Ordering::SeqCst) == seq {
                notice.write().await.take();
                debug!("Profile notice cleared");
            }
        });
    }

    /// 删除账户；确认后清除凭证并跳转登录页
    pub async fn delete_account(&self, confirm: &dyn Confirm) -> Result<bool> {
        if !confirm.confirm(messages::CONFIRM_ACCOUNT_DELETE) {
            return Ok(false);
        }

        if let Err(e) = self
            .orchestrator
            .execute_unit(endpoints::delete_profile(), DELETE_FALLBACKS)
            .await
        {
            *self.error.write().await = e.user_message();
            return Err(e);
        }

        info!("Account deleted");
        self.profile.write().await.take();
        self.draft.write().await.take();
        self.orchestrator.session().logout().await;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cxr_client::testing::ScriptedTransport;
    use cxr_client::{HttpMethod, RequestBody, Route, SessionContext};
    use cxr_core::BearerToken;
    use serde_json::json;

    async fn controller(transport: Arc<ScriptedTransport>) -> ProfileController {
        let session = Arc::new(SessionContext::in_memory());
        session.store_credential(BearerToken::new("tok")).await.unwrap();
        ProfileController::new(RequestOrchestrator::new(session, transport), DEFAULT_NOTICE_TTL)
    }

    fn profile(name: &str) -> serde_json::Value {
        json!({"id": 1, "full_name": name, "email": "medico@hospital.es"})
    }

    #[test]
    fn test_password_rules() {
        let mut draft = ProfileDraft {
            full_name: "Dra. López".to_string(),
            email: "lopez@hospital.es".to_string(),
            ..Default::default()
        };
        let update = draft.validate().unwrap();
        assert!(update.current_password.is_none());
        assert!(update.new_password.is_none());

        draft.new_password = "abc".to_string();
        draft.confirm_password = "abd".to_string();
        assert_eq!(
            draft.validate().unwrap_err().user_message().as_deref(),
            Some(messages::PASSWORDS_DO_NOT_MATCH)
        );

        draft.confirm_password = "abc".to_string();
        assert_eq!(
            draft.validate().unwrap_err().user_message().as_deref(),
            Some(messages::PASSWORD_TOO_SHORT)
        );

        draft.email = " ".to_string();
        assert_eq!(
            draft.validate().unwrap_err().user_message().as_deref(),
            Some(messages::PROFILE_NAME_AND_EMAIL_REQUIRED)
        );
    }

    #[tokio::test]
    async fn test_short_password_is_rejected_locally() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(HttpMethod::Get, "/api/auth/profile", 200, profile("Dra. López"));
        let controller = controller(transport.clone()).await;

        controller.load().await.unwrap();
        controller.begin_edit().await;
        controller
            .edit_draft(|d| {
                d.current_password = "old-secret".to_string();
                d.new_password = "abc".to_string();
                d.confirm_password = "abc".to_string();
            })
            .await;

        assert!(controller.submit().await.is_err());
        assert_eq!(controller.error().await.as_deref(), Some(messages::PASSWORD_TOO_SHORT));
        assert_eq!(transport.request_count(), 1);
        assert!(controller.is_editing().await);
    }

    #[tokio::test]
    async fn test_successful_reload_clears_previous_error() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(HttpMethod::Get, "/api/auth/profile", 500, json!({}));
        transport.respond(HttpMethod::Get, "/api/auth/profile", 200, profile("Dra. López"));
        let controller = controller(transport.clone()).await;

        assert!(controller.load().await.is_err());
        assert_eq!(controller.error().await.as_deref(), Some(messages::PROFILE_LOAD_FAILED));

        controller.load().await.unwrap();
        assert!(controller.error().await.is_none());
        assert_eq!(controller.profile().await.unwrap().full_name, "Dra. López");
    }

    #[tokio::test]
    async fn test_cancel_reverts_to_fetched_values() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(HttpMethod::Get, "/api/auth/profile", 200, profile("Dra. López"));
        let controller = controller(transport).await;

        controller.load().await.unwrap();
        controller.begin_edit().await;
        controller.edit_draft(|d| d.full_name = "Otro Nombre".to_string()).await;
        controller.cancel_edit().await;
        assert!(!controller.is_editing().await);

        controller.begin_edit().await;
        assert_eq!(controller.draft().await.unwrap().full_name, "Dra. López");
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_refetches_and_notice_expires() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(HttpMethod::Get, "/api/auth/profile", 200, profile("Dra. López"));
        transport.respond(HttpMethod::Put, "/api/auth/profile", 200, json!({"message": "ok"}));
        transport.respond(HttpMethod::Get, "/api/auth/profile", 200, profile("Dra. López Vidal"));
        let controller = controller(transport.clone()).await;

        controller.load().await.unwrap();
        controller.begin_edit().await;
        controller
            .edit_draft(|d| {
                d.full_name = "Dra. López Vidal".to_string();
                d.current_password = "old-secret".to_string();
                d.new_password = "new-secret".to_string();
                d.confirm_password = "new-secret".to_string();
            })
            .await;
        controller.submit().await.unwrap();

        let put = &transport.requests_to(HttpMethod::Put, "/api/auth/profile")[0];
        assert_eq!(
            put.body,
            RequestBody::Json(json!({
                "full_name": "Dra. López Vidal",
                "email": "medico@hospital.es",
                "current_password": "old-secret",
                "new_password": "new-secret"
            }))
        );
        assert_eq!(transport.requests_to(HttpMethod::Get, "/api/auth/profile").len(), 2);
        assert_eq!(controller.profile().await.unwrap().full_name, "Dra. López Vidal");
        assert!(!controller.is_editing().await);
        assert_eq!(controller.notice().await.as_deref(), Some(messages::PROFILE_UPDATED));

        tokio::time::sleep(DEFAULT_NOTICE_TTL + Duration::from_millis(10)).await;
        assert!(controller.notice().await.is_none());
    }

    #[tokio::test]
    async fn test_delete_account_evicts_and_redirects() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(HttpMethod::Delete, "/api/auth/profile", 200, json!({}));
        let controller = controller(transport.clone()).await;

        assert!(!controller.delete_account(&|_: &str| false).await.unwrap());
        assert_eq!(transport.request_count(), 0);

        assert!(controller.delete_account(&|_: &str| true).await.unwrap());
        let session = controller.orchestrator.session();
        assert!(!session.is_authenticated().await);
        assert_eq!(session.current_route(), Route::Login);
    }
}
