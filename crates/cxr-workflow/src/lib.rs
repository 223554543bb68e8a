//! # CXR工作流模块
//!
//! 提供诊断客户端各个视图背后的控制逻辑，包括：
//! - 分页集合控制器：患者列表与诊断历史共用的分页/过滤协议
//! - 诊断提交状态机：选择图片、上传、等待预测、展示结果
//! - 统计概览、个人资料、登录/注册流程
//! - 仪表盘外壳：视图切换与进入时的会话检查

pub mod auth;
pub mod collection;
pub mod diagnoses;
pub mod patients;
pub mod profile;
pub mod shell;
pub mod state_machine;
pub mod submission;
pub mod summary;

// 重新导出主要类型
pub use auth::{AuthFlows, RegistrationForm, RegistrationOutcome};
pub use collection::{CollectionController, CollectionPage, CollectionSource, FetchOutcome, PageData};
pub use diagnoses::{DiagnosisDetail, DiagnosisHistory, DiagnosisSource, DIAGNOSIS_PAGE_SIZE};
pub use patients::{PatientDirectory, PatientForm, PatientSource, PATIENT_PAGE_SIZES};
pub use profile::{ProfileController, ProfileDraft};
pub use shell::{DashboardShell, DashboardView, WorkflowSettings};
pub use state_machine::{SubmissionEvent, SubmissionState, SubmissionStateMachine};
pub use submission::{
    DiagnosisListing, DiagnosisResult, ImageFile, PreviewHandle, SubmissionDraft, SubmissionWorkflow,
    SubmitOutcome,
};
pub use summary::{SummaryFigures, SummaryView};

/// 破坏性操作前的用户确认
pub trait Confirm: Send + Sync {
    fn confirm(&self, prompt: &str) -> bool;
}

impl<F> Confirm for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn confirm(&self, prompt: &str) -> bool {
        self(prompt)
    }
}
