use std::path::{Path, PathBuf};

use anyhow::{Context as _, anyhow};
use serde_json::{Value, json};

use campus_client::UploadFile;
use campus_enroll::{AttachmentPolicy, EnrollmentRequest, EnrollmentWorkflow, TaskService};

use super::{Context, Output};

pub struct EnrollArgs {
    pub student: String,
    pub grade: String,
    pub classroom: Option<String>,
    pub voucher: Option<PathBuf>,
    pub user_id: Option<String>,
}

pub async fn enroll(config_path: &Path, args: EnrollArgs, output: Output) -> anyhow::Result<()> {
    let ctx = Context::open(config_path)?;
    let workflow = EnrollmentWorkflow::new(ctx.api.clone(), ctx.storage.clone(), ctx.sync.clone());

    let mut request = EnrollmentRequest::new(json!({
        "student": args.student,
        "grade": args.grade,
    }));
    if let Some(classroom) = &args.classroom {
        request = request.classroom(classroom);
    }
    if let Some(path) = &args.voucher {
        let user_id = args.user_id.clone().or_else(|| ctx.user_id()).unwrap_or_default();
        request = request.voucher(read_upload(path)?, &user_id);
    }

    let outcome = workflow
        .enroll(&request)
        .await
        .map_err(|e| anyhow!(e.user_message()))?;
    ctx.sync.shutdown();

    for warning in &outcome.warnings {
        eprintln!("⚠ {warning}");
    }
    output.print(&json!({
        "enrollmentId": outcome.enrollment_id,
        "state": outcome.state,
        "voucherUrl": outcome.voucher.url(),
        "pending": outcome.state.pending_steps(),
    }))
}

pub async fn assign(
    config_path: &Path,
    id: &str,
    classroom: &str,
    output: Output,
) -> anyhow::Result<()> {
    let ctx = Context::open(config_path)?;
    let workflow = EnrollmentWorkflow::new(ctx.api.clone(), ctx.storage.clone(), ctx.sync.clone());
    let response = workflow
        .assign_classroom(id, classroom)
        .await
        .map_err(|e| anyhow!(e.user_message()))?;
    ctx.sync.shutdown();
    output.print(&response)
}

pub async fn pay(
    config_path: &Path,
    id: &str,
    registrar: &str,
    receipt: Option<&str>,
    output: Output,
) -> anyhow::Result<()> {
    let ctx = Context::open(config_path)?;
    let workflow = EnrollmentWorkflow::new(ctx.api.clone(), ctx.storage.clone(), ctx.sync.clone());
    let payment = workflow
        .register_payment(id, receipt, registrar)
        .await
        .map_err(|e| anyhow!(e.user_message()))?;
    ctx.sync.shutdown();
    output.print(&serde_json::to_value(&payment)?)
}

pub async fn task(
    config_path: &Path,
    title: &str,
    description: Option<&str>,
    attachment: Option<&Path>,
    output: Output,
) -> anyhow::Result<()> {
    let ctx = Context::open(config_path)?;
    let service = TaskService::new(ctx.api.clone(), ctx.storage.clone(), ctx.sync.clone());

    let file = attachment.map(read_upload).transpose()?;
    let user_id = ctx.user_id().unwrap_or_default();
    let mut body = json!({ "titulo": title });
    if let Some(description) = description {
        body["descripcion"] = Value::String(description.to_string());
    }

    let created = service
        .create(&body, file.as_ref(), &user_id, AttachmentPolicy::Optional)
        .await
        .map_err(|e| anyhow!(e.user_message()))?;
    ctx.sync.shutdown();
    output.print(&created)
}

fn read_upload(path: &Path) -> anyhow::Result<UploadFile> {
    UploadFile::from_path(path).with_context(|| format!("reading {}", path.display()))
}
