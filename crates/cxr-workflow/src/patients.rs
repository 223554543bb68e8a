//! 患者管理
//!
//! 分页集合控制器的患者实例：可选每页条数、当前页内的姓名搜索、
//! 新建/编辑共用的表单，以及需要确认的删除。

use async_trait::async_trait;
use cxr_client::{endpoints, Fallbacks, RequestOrchestrator};
use cxr_core::{messages, CxrError, Gender, ListResponse, Patient, PatientPayload, Result, MAX_PATIENT_AGE};
use tokio::sync::RwLock;
use tracing::info;

use crate::collection::{CollectionController, CollectionPage, CollectionSource, FetchOutcome, PageData};
use crate::Confirm;

/// 患者列表允许的每页条数
pub const PATIENT_PAGE_SIZES: [u32; 4] = [5, 10, 20, 50];
pub const DEFAULT_PATIENT_PAGE_SIZE: u32 = 10;

const LOAD_FALLBACKS: Fallbacks = Fallbacks::new(messages::PATIENTS_LOAD_FAILED);
const SAVE_FALLBACKS: Fallbacks = Fallbacks::new(messages::PATIENT_SAVE_FAILED);
const DELETE_FALLBACKS: Fallbacks = Fallbacks::new(messages::PATIENT_DELETE_FAILED);

/// 患者数据源
pub struct PatientSource {
    orchestrator: RequestOrchestrator,
}

impl PatientSource {
    pub fn new(orchestrator: RequestOrchestrator) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl CollectionSource for PatientSource {
    type Item = Patient;
    type Filter = ();

    async fn fetch(&self, page: u32, per_page: u32, _filter: &()) -> Result<PageData<Patient>> {
        let response: ListResponse<Patient> = self
            .orchestrator
            .execute(endpoints::list_patients(page, per_page), LOAD_FALLBACKS)
            .await?;
        Ok(response.into())
    }
}

/// 患者表单
///
/// `editing` 为空时提交即新建，否则更新对应患者。
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PatientForm {
    pub editing: Option<i64>,
    pub full_name: String,
    /// 原样保存输入框中的文本，提交时再解析
    pub age: String,
    pub gender: Gender,
}

impl PatientForm {
    pub fn blank() -> Self {
        Self::default()
    }

    pub fn from_patient(patient: &Patient) -> Self {
        Self {
            editing: Some(patient.id),
            full_name: patient.full_name.clone(),
            age: patient.age.to_string(),
            gender: patient.gender,
        }
    }

    pub fn is_edit(&self) -> bool {
        self.editing.is_some()
    }

    /// 校验并生成请求体
    pub fn validate(&self) -> Result<PatientPayload> {
        let full_name = self.full_name.trim();
        let age = self.age.trim();
        if full_name.is_empty() || age.is_empty() {
            return Err(CxrError::validation(messages::PATIENT_NAME_AND_AGE_REQUIRED));
        }

        let age = age
            .parse::<u32>()
            .ok()
            .filter(|age| *age <= MAX_PATIENT_AGE)
            .and_then(|age| u8::try_from(age).ok())
            .ok_or_else(|| CxrError::validation(messages::PATIENT_AGE_OUT_OF_RANGE))?;

        Ok(PatientPayload {
            full_name: full_name.to_string(),
            age,
            gender: self.gender,
        })
    }
}

/// 患者目录
pub struct PatientDirectory {
    orchestrator: RequestOrchestrator,
    listing: CollectionController<PatientSource>,
    search: RwLock<String>,
    form: RwLock<Option<PatientForm>>,
    form_error: RwLock<Option<String>>,
}

impl PatientDirectory {
    pub fn new(orchestrator: RequestOrchestrator, page_size: u32) -> Result<Self> {
        let listing = CollectionController::new(
            "patients",
            PatientSource::new(orchestrator.scoped()),
            page_size,
            PATIENT_PAGE_SIZES.to_vec(),
        )?;
        Ok(Self {
            orchestrator,
            listing,
            search: RwLock::new(String::new()),
            form: RwLock::new(None),
            form_error: RwLock::new(None),
        })
    }

    pub fn listing(&self) -> &CollectionController<PatientSource> {
        &self.listing
    }

    pub async fn load(&self) -> Result<FetchOutcome> {
        self.listing.refresh().await
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

    pub async fn set_page_size(&self, page_size: u32) -> Result<FetchOutcome> {
        self.listing.set_page_size(page_size).await
    }

    pub async fn page(&self) -> CollectionPage<Patient, ()> {
        self.listing.snapshot().await
    }

    /// 设置搜索词；只过滤已获取的当前页，不发请求
    pub async fn set_search(&self, term: impl Into<String>) {
        *self.search.write().await = term.into();
    }

    /// 当前页中姓名包含搜索词（不区分大小写）的患者
    pub async fn visible(&self) -> Vec<Patient> {
        let term = self.search.read().await.trim().to_lowercase();
        let items = self.listing.items().await;
        if term.is_empty() {
            return items;
        }
        items
            .into_iter()
            .filter(|p| p.full_name.to_lowercase().contains(&term))
            .collect()
    }

    pub async fn open_create(&self) {
        *self.form.write().await = Some(PatientForm::blank());
        self.form_error.write().await.take();
    }

    pub async fn open_edit(&self, patient: &Patient) {
        *self.form.write().await = Some(PatientForm::from_patient(patient));
        self.form_error.write().await.take();
    }

    pub async fn close_form(&self) {
        self.form.write().await.take();
        self.form_error.write().await.take();
    }

    pub async fn form(&self) -> Option<PatientForm> {
        self.form.read().await.clone()
    }

    pub async fn form_error(&self) -> Option<String> {
        self.form_error.read().await.clone()
    }

    /// 修改打开中的表单；表单未打开时返回 `false`
    pub async fn edit_form<F>(&self, edit: F) -> bool
    where
        F: FnOnce(&mut PatientForm),
    {
        match self.form.write().await.as_mut() {
            Some(form) => {
                edit(form);
                true
            }
            None => false,
        }
    }

    /// 提交表单：新建或更新，成功后关闭表单并刷新当前页
    pub async fn submit_form(&self) -> Result<()> {
        let Some(form) = self.form().await else {
            return Err(CxrError::InvalidStateTransition {
                from: "Closed".to_string(),
                event: "Submit".to_string(),
            });
        };

        let result = self.save(&form).await;
        match &result {
            Ok(()) => self.close_form().await,
            Err(e) => *self.form_error.write().await = e.user_message(),
        }
        result?;

        self.listing.refresh_after_mutation().await?;
        Ok(())
    }

    async fn save(&self, form: &PatientForm) -> Result<()> {
        let payload = form.validate()?;
        let request = match form.editing {
            Some(id) => endpoints::update_patient(id, &payload)?,
            None => endpoints::create_patient(&payload)?,
        };
        self.orchestrator.execute_unit(request, SAVE_FALLBACKS).await?;

        match form.editing {
            Some(id) => info!(patient_id = id, "Patient updated"),
            None => info!("Patient created"),
        }
        Ok(())
    }

    /// 删除患者；用户取消时返回 `Ok(false)` 且不发请求
    pub async fn delete(&self, patient_id: i64, confirm: &dyn Confirm) -> Result<bool> {
        if !confirm.confirm(messages::CONFIRM_PATIENT_DELETE) {
            return Ok(false);
        }

        self.orchestrator
            .execute_unit(endpoints::delete_patient(patient_id), DELETE_FALLBACKS)
            .await?;
        info!(patient_id, "Patient deleted");

        self.listing.refresh_after_mutation().await?;
        Ok(true)
    }
}
