//! 诊断提交工作流
//!
//! "新建诊断"弹窗：选择患者和胸片，上传给预测服务，展示结果。
//! 状态转换由 [`SubmissionStateMachine`] 约束；每次打开/关闭弹窗都会
//! 推进代次，关闭后才返回的预测结果不会再显示，但诊断列表仍会刷新。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cxr_client::{endpoints, FilePart, Fallbacks, RequestOrchestrator};
use cxr_core::utils::is_image_mime;
use cxr_core::{messages, CxrError, DiagnosisLabel, PredictionResponse, Result};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::state_machine::{SubmissionEvent, SubmissionState, SubmissionStateMachine};

const PREDICT_FALLBACKS: Fallbacks = Fallbacks::new(messages::DIAGNOSIS_SUBMIT_FAILED);

/// 提交成功后需要通知的诊断列表
#[async_trait]
pub trait DiagnosisListing: Send + Sync {
    /// 本地已知的患者姓名
    async fn patient_name(&self, patient_id: i64) -> Option<String>;

    /// 重新获取当前页
    async fn refresh_listing(&self) -> Result<()>;
}

/// 用户选择的图片文件
#[derive(Clone, PartialEq)]
pub struct ImageFile {
    pub file_name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl ImageFile {
    pub fn new(file_name: impl Into<String>, mime: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            mime: mime.into(),
            bytes,
        }
    }

    fn to_part(&self) -> FilePart {
        FilePart {
            field: "image".to_string(),
            file_name: self.file_name.clone(),
            mime: self.mime.clone(),
            bytes: self.bytes.clone(),
        }
    }
}

impl fmt::Debug for ImageFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageFile")
            .field("file_name", &self.file_name)
            .field("mime", &self.mime)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// 图片预览句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct PreviewHandle(pub Uuid);

impl PreviewHandle {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

/// 提交草稿（只在弹窗打开期间存在）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubmissionDraft {
    pub patient_id: Option<i64>,
    pub image: Option<ImageFile>,
    pub preview: Option<PreviewHandle>,
}

impl SubmissionDraft {
    pub fn is_complete(&self) -> bool {
        self.patient_id.is_some() && self.image.is_some()
    }
}

/// 结果页展示的诊断
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagnosisResult {
    pub id: Option<i64>,
    pub patient_id: i64,
    pub patient_name: Option<String>,
    pub image_url: String,
    pub heatmap_url: Option<String>,
    pub result: DiagnosisLabel,
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
    pub interpretation: &'static str,
}

/// 一次提交的结局
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    Shown(DiagnosisResult),
    /// 预测期间弹窗已被关闭，结果不再显示
    Dropped,
}

#[derive(Debug, Default)]
struct Inner {
    state: SubmissionState,
    draft: SubmissionDraft,
    result: Option<DiagnosisResult>,
    error: Option<String>,
    generation: u64,
}

/// 诊断提交工作流
pub struct SubmissionWorkflow {
    orchestrator: RequestOrchestrator,
    listing: Arc<dyn DiagnosisListing>,
    machine: SubmissionStateMachine,
    inner: Mutex<Inner>,
}

impl SubmissionWorkflow {
    pub fn new(orchestrator: RequestOrchestrator, listing: Arc<dyn DiagnosisListing>) -> Self {
        Self {
            orchestrator,
            listing,
            machine: SubmissionStateMachine::new(),
            inner: Mutex::new(Inner::default()),
        }
    }

    pub async fn state(&self) -> SubmissionState {
        self.inner.lock().await.state
    }

    pub async fn draft(&self) -> SubmissionDraft {
        self.inner.lock().await.draft.clone()
    }

    pub async fn result(&self) -> Option<DiagnosisResult> {
        self.inner.lock().await.result.clone()
    }

    pub async fn error(&self) -> Option<String> {
        self.inner.lock().await.error.clone()
    }

    pub async fn can_submit(&self) -> bool {
        self.machine.can_transition(self.state().await, SubmissionEvent::Submit)
    }

    pub fn is_submitting(&self) -> bool {
        self.orchestrator.is_loading()
    }

    /// 打开弹窗，总是从空草稿开始
    pub async fn open(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.state = self.machine.transition(inner.state, SubmissionEvent::Open)?;
        inner.draft = SubmissionDraft::default();
        inner.result = None;
        inner.error = None;
        inner.generation += 1;
        debug!(generation = inner.generation, "Submission modal opened");
        Ok(())
    }

    pub async fn select_patient(&self, patient_id: Option<i64>) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let mut draft = inner.draft.clone();
        draft.patient_id = patient_id;
        self.apply_draft(&mut inner, draft)
    }

    /// 选择图片；非图片文件被拒绝，已选的图片保持不变
    pub async fn select_image(&self, image: ImageFile) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if !is_image_mime(&image.mime) {
            self.machine
                .transition(inner.state, SubmissionEvent::DraftIncomplete)?;
            debug!(mime = %image.mime, "Rejected non-image selection");
            inner.error = Some(messages::INVALID_IMAGE.to_string());
            return Err(CxrError::validation(messages::INVALID_IMAGE));
        }

        let mut draft = inner.draft.clone();
        draft.image = Some(image);
        draft.preview = Some(PreviewHandle::new());
        self.apply_draft(&mut inner, draft)
    }

    fn apply_draft(&self, inner: &mut Inner, draft: SubmissionDraft) -> Result<()> {
        let event = if draft.is_complete() {
            SubmissionEvent::DraftComplete
        } else {
            SubmissionEvent::DraftIncomplete
        };
        inner.state = self.machine.transition(inner.state, event)?;
        inner.draft = draft;
        inner.error = None;
        Ok(())
    }

    /// 提交草稿
    ///
    /// 患者或图片缺失时不发请求。成功后补全患者姓名、在服务端未返回时
    /// 打上本地时间戳，进入结果页并刷新诊断列表。
    pub async fn submit(&self) -> Result<SubmitOutcome> {
        let (generation, patient_id, image) = {
            let mut inner = self.inner.lock().await;
            let (patient_id, image) = match (inner.draft.patient_id, inner.draft.image.clone()) {
                (Some(patient_id), Some(image)) => (patient_id, image),
                _ => {
                    inner.error = Some(messages::PATIENT_AND_IMAGE_REQUIRED.to_string());
                    return Err(CxrError::validation(messages::PATIENT_AND_IMAGE_REQUIRED));
                }
            };
            inner.state = self.machine.transition(inner.state, SubmissionEvent::Submit)?;
            inner.error = None;
            (inner.generation, patient_id, image)
        };

        info!(patient_id, file = %image.file_name, "Submitting image for prediction");
        let response = self
            .orchestrator
            .execute::<PredictionResponse>(endpoints::predict(patient_id, image.to_part()), PREDICT_FALLBACKS)
            .await;

        let result = match response {
            Ok(prediction) => Ok(self.denormalize(patient_id, prediction).await),
            Err(e) => Err(e),
        };
        let persisted = result.is_ok();

        let outcome = {
            let mut inner = self.inner.lock().await;
            let current = inner.generation == generation && inner.state == SubmissionState::Submitting;
            match (result, current) {
                (Ok(diagnosis), true) => {
                    inner.state = self.machine.transition(inner.state, SubmissionEvent::Succeed)?;
                    inner.result = Some(diagnosis.clone());
                    inner.draft = SubmissionDraft::default();
                    Ok(SubmitOutcome::Shown(diagnosis))
                }
                (Ok(_), false) => {
                    debug!(generation, "Modal dismissed during prediction, dropping result");
                    Ok(SubmitOutcome::Dropped)
                }
                (Err(e), true) => {
                    inner.state = self.machine.transition(inner.state, SubmissionEvent::Fail)?;
                    inner.error = e.user_message();
                    Err(e)
                }
                (Err(e), false) => Err(e),
            }
        };

        // 服务端已保存该诊断，即使结果被丢弃也要刷新列表
        if persisted {
            if let Err(e) = self.listing.refresh_listing().await {
                warn!("Failed to refresh diagnosis listing after submission: {}", e);
            }
        }
        outcome
    }

    async fn denormalize(&self, patient_id: i64, prediction: PredictionResponse) -> DiagnosisResult {
        let patient_id = prediction.patient_id.unwrap_or(patient_id);
        DiagnosisResult {
            id: prediction.id,
            patient_id,
            patient_name: self.listing.patient_name(patient_id).await,
            image_url: prediction.image_url,
            heatmap_url: prediction.heatmap_url,
            result: prediction.result,
            confidence: prediction.confidence,
            created_at: prediction.created_at.unwrap_or_else(Utc::now),
            interpretation: prediction.result.interpretation(),
        }
    }

    /// 显式关闭按钮：提交中不可用
    pub async fn close(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.state == SubmissionState::Idle {
            return Ok(());
        }
        inner.state = self.machine.transition(inner.state, SubmissionEvent::Close)?;
        Self::discard(&mut inner);
        Ok(())
    }

    /// 点击遮罩层关闭：任何状态都可以
    pub async fn dismiss(&self) {
        let mut inner = self.inner.lock().await;
        if inner.state == SubmissionState::Idle {
            return;
        }
        if inner.state == SubmissionState::Submitting {
            warn!("Submission modal dismissed while prediction is in flight");
        }
        inner.state = SubmissionState::Idle;
        Self::discard(&mut inner);
    }

    fn discard(inner: &mut Inner) {
        inner.draft = SubmissionDraft::default();
        inner.result = None;
        inner.error = None;
        inner.generation += 1;
    }
}
