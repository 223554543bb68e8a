//! 诊断历史
//!
//! 分页集合控制器的诊断实例（每页固定 10 条），服务端过滤条件为
//! 患者、结果标签和闭区间日期。同时获取一份患者名册，用于过滤下拉框
//! 以及补全诊断记录中的患者姓名。

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use cxr_client::{endpoints, Fallbacks, RequestOrchestrator};
use cxr_core::{
    messages, Diagnosis, DiagnosisFilter, DiagnosisLabel, ListResponse, Patient, Result,
};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::collection::{CollectionController, CollectionPage, CollectionSource, FetchOutcome, PageData};
use crate::submission::DiagnosisListing;

pub const DIAGNOSIS_PAGE_SIZE: u32 = 10;
pub const DEFAULT_ROSTER_SIZE: u32 = 100;

const LOAD_FALLBACKS: Fallbacks = Fallbacks::new(messages::DIAGNOSES_LOAD_FAILED);
const ROSTER_FALLBACKS: Fallbacks = Fallbacks::new(messages::PATIENTS_LOAD_FAILED);

/// 诊断数据源
pub struct DiagnosisSource {
    orchestrator: RequestOrchestrator,
}

impl DiagnosisSource {
    pub fn new(orchestrator: RequestOrchestrator) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl CollectionSource for DiagnosisSource {
    type Item = Diagnosis;
    type Filter = DiagnosisFilter;

    async fn fetch(&self, page: u32, per_page: u32, filter: &DiagnosisFilter) -> Result<PageData<Diagnosis>> {
        let response: ListResponse<Diagnosis> = self
            .orchestrator
            .execute(endpoints::list_diagnoses(page, per_page, filter), LOAD_FALLBACKS)
            .await?;
        Ok(response.into())
    }
}

/// 诊断详情（只读投影，不发请求）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagnosisDetail {
    pub id: i64,
    pub patient_id: i64,
    pub patient_name: Option<String>,
    pub image_url: String,
    pub heatmap_url: Option<String>,
    pub result: DiagnosisLabel,
    pub confidence: f64,
    pub created_at: Option<DateTime<Utc>>,
    pub interpretation: &'static str,
}

impl DiagnosisDetail {
    pub fn from_diagnosis(diagnosis: &Diagnosis) -> Self {
        Self {
            id: diagnosis.id,
            patient_id: diagnosis.patient_id,
            patient_name: diagnosis.patient_name.clone(),
            image_url: diagnosis.image_url.clone(),
            heatmap_url: diagnosis.heatmap_url.clone(),
            result: diagnosis.result,
            confidence: diagnosis.confidence,
            created_at: diagnosis.created_at,
            interpretation: diagnosis.result.interpretation(),
        }
    }

    /// 置信度文本，如 `87.25%`
    pub fn confidence_label(&self) -> String {
        format!("{:.2}%", self.confidence)
    }
}

/// 诊断历史
pub struct DiagnosisHistory {
    listing: CollectionController<DiagnosisSource>,
    orchestrator: RequestOrchestrator,
    roster: RwLock<Vec<Patient>>,
    roster_size: u32,
}

impl DiagnosisHistory {
    pub fn new(orchestrator: RequestOrchestrator, page_size: u32, roster_size: u32) -> Result<Self> {
        let listing = CollectionController::fixed(
            "diagnoses",
            DiagnosisSource::new(orchestrator.scoped()),
            page_size,
        )?;
        Ok(Self {
            listing,
            orchestrator,
            roster: RwLock::new(Vec::new()),
            roster_size,
        })
    }

    pub fn listing(&self) -> &CollectionController<DiagnosisSource> {
        &self.listing
    }

    /// 同时获取患者名册与当前页；名册失败只记录日志
    pub async fn load(&self) -> Result<FetchOutcome> {
        let (roster, listing) = tokio::join!(self.load_roster(), self.listing.refresh());
        if let Err(e) = roster {
            warn!("Failed to load patient roster: {}", e);
        }
        listing
    }

    pub async fn load_roster(&self) -> Result<Vec<Patient>> {
        let response: ListResponse<Patient> = self
            .orchestrator
            .execute(endpoints::list_patients(1, self.roster_size), ROSTER_FALLBACKS)
            .await?;
        debug!(count = response.data.len(), "Patient roster loaded");
        *self.roster.write().await = response.data.clone();
        Ok(response.data)
    }

    pub async fn roster(&self) -> Vec<Patient> {
        self.roster.read().await.clone()
    }

    pub async fn set_filter(&self, filter: DiagnosisFilter) -> Result<FetchOutcome> {
        self.listing.set_filter(filter).await
    }

    pub async fn set_patient_filter(&self, patient_id: Option<i64>) -> Result<FetchOutcome> {
        self.listing.update_filter(|f| f.patient_id = patient_id).await
    }

    pub async fn set_result_filter(&self, result: Option<DiagnosisLabel>) -> Result<FetchOutcome> {
        self.listing.update_filter(|f| f.result = result).await
    }

    pub async fn set_date_range(&self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Result<FetchOutcome> {
        self.listing
            .update_filter(|f| {
                f.date_from = from;
                f.date_to = to;
            })
            .await
    }

    /// 清除全部过滤条件并回到第一页（一次请求）
    pub async fn clear_filters(&self) -> Result<FetchOutcome> {
        if self.listing.filter().await.is_empty() {
            self.listing.set_page(1).await
        } else {
            self.listing.set_filter(DiagnosisFilter::default()).await
        }
    }

    pub async fn set_page(&self, page: u32) -> Result<FetchOutcome> {
        self.listing.set_page(page).await
    }

    pub async fn next_page(&self) -> Result<FetchOutcome> {
        self.listing.next_page().await
    }

    pub async fn previous_page(&self) -> Result<FetchOutcome> {
        self.listing.previous_page().await
    }

    pub async fn page(&self) -> CollectionPage<Diagnosis, DiagnosisFilter> {
        self.listing.snapshot().await
    }

    /// 当前页记录，缺失的患者姓名从名册补全
    pub async fn rows(&self) -> Vec<Diagnosis> {
        let roster = self.roster.read().await;
        self.listing
            .items()
            .await
            .into_iter()
            .map(|mut diagnosis| {
                if diagnosis.patient_name.is_none() {
                    diagnosis.patient_name = roster
                        .iter()
                        .find(|p| p.id == diagnosis.patient_id)
                        .map(|p| p.full_name.clone());
                }
                diagnosis
            })
            .collect()
    }

    /// 查看已获取的某条诊断
    pub async fn detail(&self, diagnosis_id: i64) -> Option<DiagnosisDetail> {
        self.rows()
            .await
            .iter()
            .find(|d| d.id == diagnosis_id)
            .map(DiagnosisDetail::from_diagnosis)
    }
}

#[async_trait]
impl DiagnosisListing for DiagnosisHistory {
    async fn patient_name(&self, patient_id: i64) -> Option<String> {
        self.roster
            .read()
            .await
            .iter()
            .find(|p| p.id == patient_id)
            .map(|p| p.full_name.clone())
    }

    async fn refresh_listing(&self) -> Result<()> {
        self.listing.refresh().await.map(|_| ())
    }
}
