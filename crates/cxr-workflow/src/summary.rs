//! 统计概览
//!
//! 只读视图：获取一次汇总快照，所有百分比都在本地由快照推导。

use cxr_client::{endpoints, Fallbacks, RequestOrchestrator};
use cxr_core::utils::{percentage, round1};
use cxr_core::{messages, DashboardSummary, Result};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::info;

const SUMMARY_FALLBACKS: Fallbacks = Fallbacks::new(messages::SUMMARY_LOAD_FAILED);

/// 由快照推导的展示数据
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryFigures {
    pub total_patients: u64,
    pub male_share: f64,
    pub female_share: f64,
    pub other_share: f64,
    pub average_age: f64,
    pub total_diagnoses: u64,
    pub positive_share: f64,
    pub negative_share: f64,
    /// 服务端给出的阳性率
    pub positive_rate: f64,
    pub diagnoses_last_7_days: u64,
}

impl SummaryFigures {
    pub fn derive(summary: &DashboardSummary) -> Self {
        let patients = &summary.patients;
        let diagnoses = &summary.diagnoses;
        Self {
            total_patients: patients.total,
            male_share: percentage(patients.male, patients.total),
            female_share: percentage(patients.female, patients.total),
            other_share: percentage(patients.other, patients.total),
            average_age: round1(patients.average_age),
            total_diagnoses: diagnoses.total,
            positive_share: percentage(diagnoses.covid_positive, diagnoses.total),
            negative_share: percentage(diagnoses.covid_negative, diagnoses.total),
            positive_rate: round1(diagnoses.positive_rate),
            diagnoses_last_7_days: summary.recent_activity.diagnoses_last_7_days,
        }
    }
}

/// 统计概览视图
pub struct SummaryView {
    orchestrator: RequestOrchestrator,
    snapshot: RwLock<Option<DashboardSummary>>,
    error: RwLock<Option<String>>,
}

impl SummaryView {
    pub fn new(orchestrator: RequestOrchestrator) -> Self {
        Self {
            orchestrator,
            snapshot: RwLock::new(None),
            error: RwLock::new(None),
        }
    }

    /// 获取快照；每次进入视图都会调用
    pub async fn load(&self) -> Result<SummaryFigures> {
        match self
            .orchestrator
            .execute::<DashboardSummary>(endpoints::dashboard_summary(), SUMMARY_FALLBACKS)
            .await
        {
            Ok(summary) => {
                let figures = SummaryFigures::derive(&summary);
                info!(
                    patients = figures.total_patients,
                    diagnoses = figures.total_diagnoses,
                    "Dashboard summary loaded"
                );
                *self.snapshot.write().await = Some(summary);
                self.error.write().await.take();
                Ok(figures)
            }
            Err(e) => {
                *self.error.write().await = e.user_message();
                Err(e)
            }
        }
    }

    pub async fn snapshot(&self) -> Option<DashboardSummary> {
        self.snapshot.read().await.clone()
    }

    pub async fn figures(&self) -> Option<SummaryFigures> {
        self.snapshot.read().await.as_ref().map(SummaryFigures::derive)
    }

    pub async fn error(&self) -> Option<String> {
        self.error.read().await.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.orchestrator.is_loading()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cxr_client::testing::ScriptedTransport;
    use cxr_client::{HttpMethod, SessionContext};
    use cxr_core::BearerToken;
    use serde_json::json;
    use std::sync::Arc;

    async fn view(transport: Arc<ScriptedTransport>) -> SummaryView {
        let session = Arc::new(SessionContext::in_memory());
        session.store_credential(BearerToken::new("tok")).await.unwrap();
        SummaryView::new(RequestOrchestrator::new(session, transport))
    }

    #[test]
    fn test_figures_derive_shares() {
        let summary: DashboardSummary = serde_json::from_value(json!({
            "patients": {"total": 3, "male": 1, "female": 2, "other": 0, "average_age": 45.666},
            "diagnoses": {"total": 8, "covid_positive": 3, "covid_negative": 5, "positive_rate": "37.5"},
            "recent_activity": {"diagnoses_last_7_days": 4}
        }))
        .unwrap();

        let figures = SummaryFigures::derive(&summary);
        assert_eq!(figures.male_share, 33.3);
        assert_eq!(figures.female_share, 66.7);
        assert_eq!(figures.other_share, 0.0);
        assert_eq!(figures.average_age, 45.7);
        assert_eq!(figures.positive_share, 37.5);
        assert_eq!(figures.negative_share, 62.5);
        assert_eq!(figures.positive_rate, 37.5);
        assert_eq!(figures.diagnoses_last_7_days, 4);
    }

    #[test]
    fn test_empty_snapshot_has_zero_shares() {
        let figures = SummaryFigures::derive(&DashboardSummary::default());
        assert_eq!(figures.male_share, 0.0);
        assert_eq!(figures.positive_share, 0.0);
    }

    #[tokio::test]
    async fn test_load_failure_keeps_previous_snapshot() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(HttpMethod::Get, "/api/dashboard/summary", 200, json!({"patients": {"total": 2}}));
        transport.fail_connection(HttpMethod::Get, "/api/dashboard/summary");
        let view = view(transport).await;

        view.load().await.unwrap();
        let err = view.load().await.unwrap_err();

        assert_eq!(err.user_message().as_deref(), Some(messages::CONNECTION_ERROR));
        assert_eq!(view.error().await.as_deref(), Some(messages::CONNECTION_ERROR));
        assert_eq!(view.figures().await.unwrap().total_patients, 2);
    }
}
