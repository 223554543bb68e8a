//! 各子命令的执行逻辑
//!
//! 每个命令都通过 `DashboardShell` 中对应的视图控制器完成，
//! 输出为面向用户的西班牙语文本。

use anyhow::{Context, Result};
use cxr_core::{messages, Patient};
use cxr_workflow::{
    Confirm, DashboardShell, DashboardView, DiagnosisDetail, ImageFile, RegistrationForm,
    RegistrationOutcome, SubmitOutcome,
};
use std::io::{self, BufRead, Write};
use std::path::Path;
use tracing::{info, warn};

use crate::{Command, DiagnosisCommand, DiagnosisFilterArgs, PatientCommand, ProfileCommand};

/// 终端确认：`--yes` 时直接通过，否则从标准输入读取回答
struct TerminalConfirm {
    assume_yes: bool,
}

impl Confirm for TerminalConfirm {
    fn confirm(&self, prompt: &str) -> bool {
        if self.assume_yes {
            return true;
        }
        eprint!("{} [s/N] ", prompt);
        let _ = io::stderr().flush();

        let mut answer = String::new();
        if io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }
        is_affirmative(&answer)
    }
}

fn is_affirmative(answer: &str) -> bool {
    matches!(
        answer.trim().to_lowercase().as_str(),
        "s" | "si" | "sí" | "y" | "yes"
    )
}

pub(crate) async fn dispatch(shell: &DashboardShell, command: Command) -> Result<()> {
    match command {
        Command::Register {
            name,
            email,
            password,
            confirm,
        } => register(shell, name, email, password, confirm).await,
        Command::Login { email, password } => {
            shell.auth.login(&email, &password).await?;
            println!("Sesión iniciada como {}", email.trim());
            Ok(())
        }
        Command::Logout => {
            shell.logout().await;
            println!("Sesión cerrada");
            Ok(())
        }
        Command::Whoami => {
            match shell.auth.check_existing_login().await {
                Some(profile) => println!("{} <{}>", profile.full_name, profile.email),
                None => println!("No hay una sesión activa"),
            }
            Ok(())
        }
        Command::Summary => summary(shell).await,
        Command::Patients(command) => patients(shell, command).await,
        Command::Diagnoses(command) => diagnoses(shell, command).await,
        Command::Profile(command) => profile(shell, command).await,
    }
}

async fn register(
    shell: &DashboardShell,
    full_name: String,
    email: String,
    password: String,
    confirm_password: String,
) -> Result<()> {
    if shell.auth.check_existing_registration().await {
        println!("Ya hay una sesión activa. Ejecuta `cxr logout` para registrar otra cuenta.");
        return Ok(());
    }

    let form = RegistrationForm {
        full_name,
        email,
        password,
        confirm_password,
    };
    match shell.auth.register(&form).await? {
        RegistrationOutcome::SignedIn => println!("Cuenta creada. Sesión iniciada."),
        RegistrationOutcome::LoginRequired { notice } => println!("{}", notice),
    }
    Ok(())
}

async fn summary(shell: &DashboardShell) -> Result<()> {
    shell.switch_to(DashboardView::Summary).await?;
    let Some(figures) = shell.summary.figures().await else {
        return Ok(());
    };

    println!("Pacientes:            {}", figures.total_patients);
    println!("  Masculino:          {:.1}%", figures.male_share);
    println!("  Femenino:           {:.1}%", figures.female_share);
    println!("  Otro:               {:.1}%", figures.other_share);
    println!("  Edad promedio:      {:.1}", figures.average_age);
    println!("Diagnósticos:         {}", figures.total_diagnoses);
    println!("  COVID:              {:.1}%", figures.positive_share);
    println!("  NO COVID:           {:.1}%", figures.negative_share);
    println!("  Tasa de positivos:  {:.1}%", figures.positive_rate);
    println!("Últimos 7 días:       {}", figures.diagnoses_last_7_days);
    Ok(())
}

async fn patients(shell: &DashboardShell, command: PatientCommand) -> Result<()> {
    let directory = &shell.patients;
    match command {
        PatientCommand::List {
            page,
            per_page,
            search,
        } => {
            shell.ensure_session().await?;
            if let Some(per_page) = per_page {
                directory.set_page_size(per_page).await?;
            }
            if page > 1 {
                directory.set_page(page).await?;
            }
            if !directory.page().await.is_fetched() {
                directory.load().await?;
            }
            if let Some(term) = search {
                directory.set_search(term).await;
            }

            let snapshot = directory.page().await;
            for patient in directory.visible().await {
                print_patient(&patient);
            }
            println!(
                "Página {} de {} ({} pacientes, {} por página)",
                snapshot.page,
                snapshot.total_pages.max(1),
                snapshot.total_count,
                snapshot.page_size
            );
            Ok(())
        }
        PatientCommand::Create { name, age, gender } => {
            directory.open_create().await;
            directory
                .edit_form(|form| {
                    form.full_name = name;
                    form.age = age;
                    form.gender = gender;
                })
                .await;
            directory.submit_form().await?;
            println!("Paciente creado");
            Ok(())
        }
        PatientCommand::Update {
            id,
            name,
            age,
            gender,
        } => {
            let patient = find_patient(shell, id)
                .await?
                .with_context(|| format!("Paciente {} no encontrado", id))?;

            directory.open_edit(&patient).await;
            directory
                .edit_form(|form| {
                    if let Some(name) = name {
                        form.full_name = name;
                    }
                    if let Some(age) = age {
                        form.age = age;
                    }
                    if let Some(gender) = gender {
                        form.gender = gender;
                    }
                })
                .await;
            directory.submit_form().await?;
            println!("Paciente {} actualizado", id);
            Ok(())
        }
        PatientCommand::Delete { id, yes } => {
            let confirm = TerminalConfirm { assume_yes: yes };
            if directory.delete(id, &confirm).await? {
                println!("Paciente {} eliminado", id);
            } else {
                println!("Operación cancelada");
            }
            Ok(())
        }
    }
}

/// 逐页查找患者；服务端没有单个患者的查询接口
async fn find_patient(shell: &DashboardShell, patient_id: i64) -> Result<Option<Patient>> {
    let directory = &shell.patients;
    directory.load().await?;
    loop {
        let page = directory.page().await;
        if let Some(patient) = page.items.iter().find(|p| p.id == patient_id) {
            return Ok(Some(patient.clone()));
        }
        if !page.has_next() {
            return Ok(None);
        }
        directory.next_page().await?;
    }
}

fn print_patient(patient: &Patient) {
    println!(
        "{:>6}  {:<32}  {:>3}  {}",
        patient.id,
        patient.full_name,
        patient.age,
        patient.gender.label()
    );
}

async fn diagnoses(shell: &DashboardShell, command: DiagnosisCommand) -> Result<()> {
    match command {
        DiagnosisCommand::List { filters } => {
            load_history(shell, &filters).await?;
            let history = &shell.diagnoses;
            let snapshot = history.page().await;
            for diagnosis in history.rows().await {
                println!(
                    "{:>6}  {:<28}  {:<8}  {:>7.2}%  {}",
                    diagnosis.id,
                    diagnosis
                        .patient_name
                        .unwrap_or_else(|| format!("#{}", diagnosis.patient_id)),
                    diagnosis.result.as_str(),
                    diagnosis.confidence,
                    diagnosis
                        .created_at
                        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                        .unwrap_or_default()
                );
            }
            println!(
                "Página {} de {} ({} diagnósticos)",
                snapshot.page,
                snapshot.total_pages.max(1),
                snapshot.total_count
            );
            Ok(())
        }
        DiagnosisCommand::Show { id, filters } => {
            load_history(shell, &filters).await?;
            let detail = shell
                .diagnoses
                .detail(id)
                .await
                .with_context(|| format!("Diagnóstico {} no está en la página actual", id))?;
            print_detail(&detail);
            Ok(())
        }
        DiagnosisCommand::Predict { patient, image } => predict(shell, patient, &image).await,
    }
}

/// 加载患者名单与带过滤条件的诊断页
async fn load_history(shell: &DashboardShell, args: &DiagnosisFilterArgs) -> Result<()> {
    let history = &shell.diagnoses;
    shell.ensure_session().await?;
    if let Err(e) = history.load_roster().await {
        warn!("Patient roster unavailable: {}", e);
    }

    let filter = args.filter();
    if !filter.is_empty() {
        history.set_filter(filter).await?;
    }
    if args.page > 1 {
        history.set_page(args.page).await?;
    }
    if !history.page().await.is_fetched() {
        history.listing().refresh().await?;
    }
    Ok(())
}

fn print_detail(detail: &DiagnosisDetail) {
    println!("Diagnóstico #{}", detail.id);
    println!(
        "  Paciente:    {}",
        detail
            .patient_name
            .clone()
            .unwrap_or_else(|| format!("#{}", detail.patient_id))
    );
    println!("  Resultado:   {}", detail.result);
    println!("  Confianza:   {}", detail.confidence_label());
    println!("  Imagen:      {}", detail.image_url);
    if let Some(heatmap) = &detail.heatmap_url {
        println!("  Mapa calor:  {}", heatmap);
    }
    if let Some(created_at) = detail.created_at {
        println!("  Fecha:       {}", created_at.format("%Y-%m-%d %H:%M"));
    }
    println!("  {}", detail.interpretation);
}

async fn predict(shell: &DashboardShell, patient_id: i64, path: &Path) -> Result<()> {
    shell.ensure_session().await?;
    let image = read_image(path).await?;

    if let Err(e) = shell.diagnoses.load_roster().await {
        warn!("Patient roster unavailable: {}", e);
    }

    let submission = &shell.submission;
    submission.open().await?;
    submission.select_patient(Some(patient_id)).await?;
    submission.select_image(image).await?;

    info!(patient_id, "Waiting for prediction");
    match submission.submit().await? {
        SubmitOutcome::Shown(result) => {
            println!(
                "Paciente:   {}",
                result
                    .patient_name
                    .clone()
                    .unwrap_or_else(|| format!("#{}", result.patient_id))
            );
            println!("Resultado:  {}", result.result);
            println!("Confianza:  {:.2}%", result.confidence);
            println!("Imagen:     {}", result.image_url);
            if let Some(heatmap) = &result.heatmap_url {
                println!("Mapa calor: {}", heatmap);
            }
            println!("{}", result.interpretation);
        }
        SubmitOutcome::Dropped => {}
    }
    submission.close().await?;
    Ok(())
}

async fn read_image(path: &Path) -> Result<ImageFile> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("No se pudo leer {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    Ok(ImageFile::new(file_name, mime.essence_str(), bytes))
}

async fn profile(shell: &DashboardShell, command: ProfileCommand) -> Result<()> {
    let controller = &shell.profile;
    match command {
        ProfileCommand::Show => {
            shell.switch_to(DashboardView::Profile).await?;
            if let Some(profile) = controller.profile().await {
                println!("Nombre: {}", profile.full_name);
                println!("Correo: {}", profile.email);
            }
            Ok(())
        }
        ProfileCommand::Update {
            name,
            email,
            current_password,
            new_password,
            confirm,
        } => {
            shell.switch_to(DashboardView::Profile).await?;
            controller.begin_edit().await;
            controller
                .edit_draft(|draft| {
                    if let Some(name) = name {
                        draft.full_name = name;
                    }
                    if let Some(email) = email {
                        draft.email = email;
                    }
                    draft.current_password = current_password.unwrap_or_default();
                    draft.new_password = new_password.unwrap_or_default();
                    draft.confirm_password = confirm.unwrap_or_default();
                })
                .await;
            controller.submit().await?;
            println!(
                "{}",
                controller
                    .notice()
                    .await
                    .unwrap_or_else(|| messages::PROFILE_UPDATED.to_string())
            );
            Ok(())
        }
        ProfileCommand::Delete { yes } => {
            shell.ensure_session().await?;
            let confirm = TerminalConfirm { assume_yes: yes };
            if controller.delete_account(&confirm).await? {
                println!("{}", messages::ACCOUNT_DELETED);
            } else {
                println!("Operación cancelada");
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_affirmative_answers() {
        assert!(is_affirmative("s\n"));
        assert!(is_affirmative(" Sí "));
        assert!(is_affirmative("YES"));
        assert!(!is_affirmative("\n"));
        assert!(!is_affirmative("no"));
    }

    #[test]
    fn test_assume_yes_skips_prompt() {
        let confirm = TerminalConfirm { assume_yes: true };
        assert!(confirm.confirm(messages::CONFIRM_PATIENT_DELETE));
    }
}
