//! 诊断提交流程演示程序
//!
//! 使用脚本化传输层离线演示：进入仪表盘、加载患者名单、
//! 上传胸片、展示预测结果并刷新诊断历史。

use cxr_client::testing::ScriptedTransport;
use cxr_client::{HttpMethod, RequestOrchestrator, SessionContext};
use cxr_core::BearerToken;
use cxr_workflow::{DashboardShell, DashboardView, ImageFile, SubmitOutcome, WorkflowSettings};
use serde_json::json;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt::init();

    let transport = Arc::new(ScriptedTransport::new());
    script_server(&transport);

    let session = Arc::new(SessionContext::in_memory());
    session.store_credential(BearerToken::new("demo-token")).await?;
    let shell = DashboardShell::new(
        RequestOrchestrator::new(session.clone(), transport.clone()),
        &WorkflowSettings::default(),
    )?;

    println!("🩻 CXR 诊断提交流程演示\n");

    // 1. 进入诊断页：名单与历史并行加载
    shell.switch_to(DashboardView::Diagnoses).await?;
    println!("✅ 患者名单: {} 人", shell.diagnoses.roster().await.len());
    println!("✅ 诊断历史: {} 条", shell.diagnoses.page().await.total_count);

    // 2. 打开弹窗并填写草稿
    let submission = &shell.submission;
    submission.open().await?;
    submission.select_patient(Some(7)).await?;
    submission
        .select_image(ImageFile::new("torax.png", "image/png", vec![0x89, b'P', b'N', b'G']))
        .await?;
    println!("📋 草稿状态: {:?}", submission.state().await);

    // 3. 提交并展示结果
    match submission.submit().await? {
        SubmitOutcome::Shown(result) => {
            println!("\n📊 预测结果:");
            println!("   患者: {}", result.patient_name.as_deref().unwrap_or("-"));
            println!("   结论: {} ({:.2}%)", result.result, result.confidence);
            println!("   {}", result.interpretation);
        }
        SubmitOutcome::Dropped => println!("⚠️ 结果已被丢弃"),
    }

    // 4. 列表已在提交后刷新
    println!("\n✅ 刷新后的诊断历史: {} 条", shell.diagnoses.page().await.total_count);
    submission.close().await?;
    println!("📡 共发出 {} 个请求", transport.request_count());

    Ok(())
}

fn script_server(transport: &ScriptedTransport) {
    let roster = json!({
        "data": [{"id": 7, "full_name": "María López", "age": 54, "gender": "F"}],
        "total": 1, "page": 1, "pages": 1, "per_page": 100
    });
    transport.respond(HttpMethod::Get, "/api/patients/", 200, roster);
    transport.respond(HttpMethod::Get, "/api/diagnoses/", 200, json!({"data": [], "total": 0, "per_page": 10}));
    transport.respond(
        HttpMethod::Post,
        "/api/diagnoses/predict",
        200,
        json!({
            "id": 31,
            "patient_id": 7,
            "result": "COVID",
            "confidence": 92.4,
            "image_url": "http://localhost:5000/media/uploads/x-ray/torax.png",
            "heatmap_url": "http://localhost:5000/media/heatmaps/torax.png"
        }),
    );
    transport.respond(
        HttpMethod::Get,
        "/api/diagnoses/",
        200,
        json!({
            "data": [{
                "id": 31, "patient_id": 7, "result": "COVID", "confidence": 92.4,
                "image_url": "http://localhost:5000/media/uploads/x-ray/torax.png"
            }],
            "total": 1, "per_page": 10
        }),
    );
}
