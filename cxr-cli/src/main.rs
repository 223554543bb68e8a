//! CXR 命令行客户端

mod commands;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use cxr_client::{FileCredentialStore, ReqwestTransport, RequestOrchestrator, SessionContext};
use cxr_config::{init_logging, ClientConfig};
use cxr_core::{CxrError, DiagnosisFilter, DiagnosisLabel, Gender};
use cxr_workflow::{DashboardShell, WorkflowSettings};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, error};

/// 命令行参数
#[derive(Parser, Debug)]
#[command(name = "cxr", version)]
#[command(about = "胸部X光 COVID-19 辅助诊断客户端")]
struct Cli {
    /// 配置文件路径 (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// 覆盖服务端根地址
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// 日志级别或 env-filter 指令
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 注册新账户
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        /// 再次输入密码
        #[arg(long)]
        confirm: String,
    },
    /// 登录并保存凭证
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// 清除本地凭证
    Logout,
    /// 验证已保存的凭证并显示当前用户
    Whoami,
    /// 统计概览
    Summary,
    /// 患者管理
    #[command(subcommand)]
    Patients(PatientCommand),
    /// 诊断历史与新诊断
    #[command(subcommand)]
    Diagnoses(DiagnosisCommand),
    /// 个人资料
    #[command(subcommand)]
    Profile(ProfileCommand),
}

#[derive(Subcommand, Debug)]
enum PatientCommand {
    /// 分页列出患者
    List {
        #[arg(long, default_value_t = 1)]
        page: u32,
        /// 每页条数：5、10、20 或 50
        #[arg(long)]
        per_page: Option<u32>,
        /// 只显示当前页中姓名包含该词的患者
        #[arg(long)]
        search: Option<String>,
    },
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        age: String,
        /// M、F 或 O
        #[arg(long)]
        gender: Gender,
    },
    Update {
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        age: Option<String>,
        #[arg(long)]
        gender: Option<Gender>,
    },
    Delete {
        id: i64,
        /// 跳过确认
        #[arg(long)]
        yes: bool,
    },
}

/// 诊断列表的过滤参数
#[derive(Args, Debug, Clone, Default)]
struct DiagnosisFilterArgs {
    #[arg(long, default_value_t = 1)]
    page: u32,
    #[arg(long)]
    patient: Option<i64>,
    /// COVID 或 "NO COVID"
    #[arg(long)]
    result: Option<DiagnosisLabel>,
    /// 起始日期 (YYYY-MM-DD)
    #[arg(long)]
    from: Option<NaiveDate>,
    /// 截止日期 (YYYY-MM-DD)，包含当天
    #[arg(long)]
    to: Option<NaiveDate>,
}

impl DiagnosisFilterArgs {
    fn filter(&self) -> DiagnosisFilter {
        DiagnosisFilter {
            patient_id: self.patient,
            result: self.result,
            date_from: self.from,
            date_to: self.to,
        }
    }
}

#[derive(Subcommand, Debug)]
enum DiagnosisCommand {
    List {
        #[command(flatten)]
        filters: DiagnosisFilterArgs,
    },
    /// 显示当前页中某条诊断的详情
    Show {
        id: i64,
        #[command(flatten)]
        filters: DiagnosisFilterArgs,
    },
    /// 上传胸片并获取预测
    Predict {
        #[arg(long)]
        patient: i64,
        #[arg(long)]
        image: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
enum ProfileCommand {
    Show,
    Update {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long, requires = "new_password")]
        current_password: Option<String>,
        #[arg(long, requires = "confirm")]
        new_password: Option<String>,
        #[arg(long)]
        confirm: Option<String>,
    },
    Delete {
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report(&e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = ClientConfig::load(cli.config.as_deref())?;
    if let Some(base_url) = &cli.base_url {
        config.api.base_url = base_url.clone();
    }
    init_logging(&config.logging, cli.log_level.as_deref())?;
    debug!(base_url = %config.api.base_url, "Starting cxr client");

    let shell = build_shell(&config).await?;
    commands::dispatch(&shell, cli.command).await
}

async fn build_shell(config: &ClientConfig) -> Result<DashboardShell> {
    let store = Arc::new(FileCredentialStore::new(&config.session.credential_file));
    let session = SessionContext::restore(store, config.session.credential_key.clone())
        .await
        .context("Failed to restore session")?;
    let transport = ReqwestTransport::new(
        config.api.base_url.clone(),
        config.request_timeout(),
        &config.api.user_agent,
    )?;
    let orchestrator = RequestOrchestrator::new(Arc::new(session), Arc::new(transport));

    let settings = WorkflowSettings {
        patient_page_size: config.listing.patient_page_size,
        diagnosis_page_size: config.listing.diagnosis_page_size,
        roster_page_size: config.listing.roster_page_size,
        notice_ttl: config.notice_ttl(),
    };
    Ok(DashboardShell::new(orchestrator, &settings)?)
}

/// 向用户报告失败：领域错误显示其界面文案，认证失败提示重新登录
fn report(e: &anyhow::Error) {
    match e.downcast_ref::<CxrError>() {
        Some(err) if err.is_auth_redirect() => {
            eprintln!("Sesión no válida o expirada. Ejecuta `cxr login` para continuar.");
        }
        Some(err) => {
            error!("Command failed: {:?}", err);
            eprintln!("{}", err.user_message().unwrap_or_else(|| err.to_string()));
        }
        None => eprintln!("Error: {:#}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_diagnosis_filters() {
        let cli = Cli::try_parse_from([
            "cxr", "diagnoses", "list", "--patient", "7", "--result", "NO COVID", "--from", "2024-03-01",
        ])
        .unwrap();
        let Command::Diagnoses(DiagnosisCommand::List { filters }) = cli.command else {
            panic!("unexpected command");
        };
        let filter = filters.filter();
        assert_eq!(filter.patient_id, Some(7));
        assert_eq!(filter.result, Some(DiagnosisLabel::Negative));
        assert_eq!(filter.date_from, NaiveDate::from_ymd_opt(2024, 3, 1));
        assert!(filter.date_to.is_none());
        assert_eq!(filters.page, 1);
    }

    #[test]
    fn test_parse_rejects_unknown_gender() {
        let parsed = Cli::try_parse_from([
            "cxr", "patients", "create", "--name", "Ana", "--age", "30", "--gender", "X",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_new_password_requires_confirmation() {
        let parsed = Cli::try_parse_from(["cxr", "profile", "update", "--new-password", "abcdef"]);
        assert!(parsed.is_err());
    }
}
