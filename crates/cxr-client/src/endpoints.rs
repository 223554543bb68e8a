//! REST 接口目录
//!
//! 路径与服务端契约一一对应；除登录/注册外均为受保护接口。

use cxr_core::{
    DiagnosisFilter, LoginRequest, PatientPayload, ProfileUpdate, RegisterRequest, Result,
};

use crate::transport::{ApiRequest, FilePart, MultipartForm};

pub const REGISTER: &str = "/api/auth/register";
pub const LOGIN: &str = "/api/auth/login";
pub const PROFILE: &str = "/api/auth/profile";
pub const DASHBOARD_SUMMARY: &str = "/api/dashboard/summary";
pub const PATIENTS: &str = "/api/patients/";
pub const DIAGNOSES: &str = "/api/diagnoses/";
pub const PREDICT: &str = "/api/diagnoses/predict";

pub fn register(body: &RegisterRequest) -> Result<ApiRequest> {
    ApiRequest::post(REGISTER).public().json(body)
}

pub fn login(body: &LoginRequest) -> Result<ApiRequest> {
    ApiRequest::post(LOGIN).public().json(body)
}

pub fn profile() -> ApiRequest {
    ApiRequest::get(PROFILE)
}

pub fn update_profile(body: &ProfileUpdate) -> Result<ApiRequest> {
    ApiRequest::put(PROFILE).json(body)
}

pub fn delete_profile() -> ApiRequest {
    ApiRequest::delete(PROFILE)
}

pub fn dashboard_summary() -> ApiRequest {
    ApiRequest::get(DASHBOARD_SUMMARY)
}

pub fn list_patients(page: u32, per_page: u32) -> ApiRequest {
    ApiRequest::get(PATIENTS)
        .query("page", page)
        .query("per_page", per_page)
}

pub fn patient_path(id: i64) -> String {
    format!("{}{}", PATIENTS, id)
}

pub fn create_patient(body: &PatientPayload) -> Result<ApiRequest> {
    ApiRequest::post(PATIENTS).json(body)
}

pub fn update_patient(id: i64, body: &PatientPayload) -> Result<ApiRequest> {
    ApiRequest::put(patient_path(id)).json(body)
}

pub fn delete_patient(id: i64) -> ApiRequest {
    ApiRequest::delete(patient_path(id))
}

pub fn list_diagnoses(page: u32, per_page: u32, filter: &DiagnosisFilter) -> ApiRequest {
    filter.query_pairs().into_iter().fold(
        ApiRequest::get(DIAGNOSES)
            .query("page", page)
            .query("per_page", per_page),
        |request, (key, value)| request.query(key, value),
    )
}

/// 预测请求：multipart 表单，字段 `image` 与 `patient_id`
pub fn predict(patient_id: i64, image: FilePart) -> ApiRequest {
    let form = MultipartForm::new()
        .text("patient_id", patient_id.to_string())
        .file(FilePart {
            field: "image".to_string(),
            ..image
        });
    ApiRequest::post(PREDICT).multipart(form)
}
