//! 仪表盘外壳
//!
//! 组装各个视图控制器，负责进入受保护区域前的会话检查与标签页切换。
//! 每次切换都会重新加载目标视图（统计概览在每次重新进入时刷新）。

use cxr_client::{RequestOrchestrator, Route};
use cxr_core::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::info;

use crate::auth::AuthFlows;
use crate::diagnoses::{DiagnosisHistory, DEFAULT_ROSTER_SIZE, DIAGNOSIS_PAGE_SIZE};
use crate::patients::{PatientDirectory, DEFAULT_PATIENT_PAGE_SIZE};
use crate::profile::{ProfileController, DEFAULT_NOTICE_TTL};
use crate::submission::SubmissionWorkflow;
use crate::summary::SummaryView;

/// 仪表盘中的视图
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DashboardView {
    #[default]
    Summary,
    Patients,
    Diagnoses,
    Profile,
}

/// 工作流参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowSettings {
    pub patient_page_size: u32,
    pub diagnosis_page_size: u32,
    pub roster_page_size: u32,
    pub notice_ttl: Duration,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            patient_page_size: DEFAULT_PATIENT_PAGE_SIZE,
            diagnosis_page_size: DIAGNOSIS_PAGE_SIZE,
            roster_page_size: DEFAULT_ROSTER_SIZE,
            notice_ttl: DEFAULT_NOTICE_TTL,
        }
    }
}

/// 仪表盘外壳
///
/// 每个视图使用独立加载标志的编排器，共享同一个会话。
pub struct DashboardShell {
    orchestrator: RequestOrchestrator,
    pub auth: AuthFlows,
    pub summary: SummaryView,
    pub patients: PatientDirectory,
    pub diagnoses: Arc<DiagnosisHistory>,
    pub submission: SubmissionWorkflow,
    pub profile: ProfileController,
    active: RwLock<DashboardView>,
}

impl DashboardShell {
    pub fn new(orchestrator: RequestOrchestrator, settings: &WorkflowSettings) -> Result<Self> {
        let diagnoses = Arc::new(DiagnosisHistory::new(
            orchestrator.scoped(),
            settings.diagnosis_page_size,
            settings.roster_page_size,
        )?);

        Ok(Self {
            auth: AuthFlows::new(orchestrator.scoped()),
            summary: SummaryView::new(orchestrator.scoped()),
            patients: PatientDirectory::new(orchestrator.scoped(), settings.patient_page_size)?,
            submission: SubmissionWorkflow::new(orchestrator.scoped(), diagnoses.clone()),
            profile: ProfileController::new(orchestrator.scoped(), settings.notice_ttl),
            diagnoses,
            orchestrator,
            active: RwLock::new(DashboardView::default()),
        })
    }

    pub async fn active_view(&self) -> DashboardView {
        *self.active.read().await
    }

    /// 进入仪表盘：没有凭证时在任何请求之前跳转登录页
    pub async fn enter(&self) -> Result<()> {
        self.ensure_session().await?;
        let view = self.active_view().await;
        self.load(view).await
    }

    /// 只做会话检查，不加载任何视图
    pub async fn ensure_session(&self) -> Result<()> {
        let session = self.orchestrator.session();
        session.require_credential().await?;
        session.navigate(Route::Dashboard);
        Ok(())
    }

    /// 切换视图并加载其数据
    pub async fn switch_to(&self, view: DashboardView) -> Result<()> {
        self.orchestrator.session().require_credential().await?;
        *self.active.write().await = view;
        info!(?view, "Switched dashboard view");
        self.load(view).await
    }

    async fn load(&self, view: DashboardView) -> Result<()> {
        match view {
            DashboardView::Summary => self.summary.load().await.map(|_| ()),
            DashboardView::Patients => self.patients.load().await.map(|_| ()),
            DashboardView::Diagnoses => self.diagnoses.load().await.map(|_| ()),
            DashboardView::Profile => self.profile.load().await.map(|_| ()),
        }
    }

    pub async fn logout(&self) {
        self.auth.logout().await;
    }
}
