//! Enrollment saga — create, assign a classroom, register payment.
//!
//! The three steps are independent backend calls with no compensating
//! endpoint, so a later failure never undoes an earlier success:
//!
//! ```text
//! [voucher upload] ─▶ Step1 create ─▶ (id?) ─▶ Step2 assign (if classroom given)
//!                                                    Step3 pay (manual only)
//! ```
//!
//! A failed Step 2 leaves the enrollment `EnrolledOnly` and is reported as
//! a [`WorkflowWarning`], not an error.

use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{info, warn};

use campus_client::{ApiError, Backend, UploadFile, resource_path};
use campus_core::Domain;
use campus_sync::{InvalidationPolicy, MutationRequest, SyncCoordinator, SyncError, unwrap_record};

use crate::attachment::{
    Attachment, AttachmentError, AttachmentPolicy, discard_attachment, prepare_attachment,
};
use crate::state::{EnrollmentState, WorkflowStep};
use crate::storage::Storage;

/// Storage folder for payment vouchers.
pub const VOUCHER_FOLDER: &str = "vouchers";
/// Payload field carrying the voucher URL.
pub const VOUCHER_FIELD: &str = "voucherUrl";

/// Where the new enrollment id may sit in a create response, in priority
/// order.
const ID_PATHS: &[&[&str]] = &[
    &["id"],
    &["data", "id"],
    &["info", "data", "id"],
    &["matricula", "id"],
    &["data", "matricula", "id"],
    &["idMatricula"],
    &["data", "idMatricula"],
];

/// Input to [`EnrollmentWorkflow::enroll`]. Borrowed, so a failed attempt
/// can be resubmitted unchanged.
#[derive(Debug, Clone, Default)]
pub struct EnrollmentRequest {
    /// Enrollment payload as the backend expects it.
    pub data: Value,
    /// Classroom to assign right after creation.
    pub classroom_id: Option<String>,
    pub voucher: Option<UploadFile>,
    /// Uploader id sent to the storage service.
    pub user_id: String,
}

impl EnrollmentRequest {
    pub fn new(data: Value) -> Self {
        Self {
            data,
            ..Default::default()
        }
    }

    pub fn classroom(mut self, classroom_id: &str) -> Self {
        self.classroom_id = Some(classroom_id.to_string());
        self
    }

    pub fn voucher(mut self, file: UploadFile, user_id: &str) -> Self {
        self.voucher = Some(file);
        self.user_id = user_id.to_string();
        self
    }

    fn target_classroom(&self) -> Option<&str> {
        self.classroom_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

/// Non-fatal outcome the operator must act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowWarning {
    /// Step 1 succeeded but its response carried no id; Steps 2-3 skipped.
    ManualAssignmentRequired,
    /// Step 2 was rejected; the enrollment itself stands.
    AssignmentFailed {
        enrollment_id: String,
        classroom_id: String,
        error: ApiError,
    },
}

impl WorkflowWarning {
    pub fn step(&self) -> WorkflowStep {
        WorkflowStep::ClassroomAssignment
    }

    pub fn remedy(&self) -> &'static str {
        self.step().remedy()
    }
}

impl fmt::Display for WorkflowWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowWarning::ManualAssignmentRequired => write!(
                f,
                "Enrollment saved, but its id was not returned. {}",
                self.remedy()
            ),
            WorkflowWarning::AssignmentFailed {
                enrollment_id,
                classroom_id,
                error,
            } => write!(
                f,
                "Enrollment {enrollment_id} saved, but assigning classroom {classroom_id} failed: {} {}",
                error.user_message(),
                self.remedy()
            ),
        }
    }
}

/// Terminal observable result of [`EnrollmentWorkflow::enroll`].
#[derive(Debug, Clone, PartialEq)]
pub struct EnrollmentOutcome {
    /// `None` when the create response carried no recognizable id.
    pub enrollment_id: Option<String>,
    pub state: EnrollmentState,
    /// The created record, envelope removed.
    pub record: Value,
    pub voucher: Attachment,
    pub warnings: Vec<WorkflowWarning>,
}

impl EnrollmentOutcome {
    /// Step 1 succeeded but something still needs manual follow-up.
    pub fn is_partial(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Result of Step 3.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    pub enrollment_id: String,
    pub receipt_number: String,
    pub response: Value,
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    /// The voucher upload failed; nothing was created.
    #[error("voucher upload failed: {0}")]
    Upload(#[source] AttachmentError),

    /// Step 1 failed; nothing was created.
    #[error("enrollment could not be created: {0}")]
    Create(#[source] SyncError),

    /// A follow-up step failed; the enrollment exists.
    #[error("{step} failed for enrollment {enrollment_id}: {source}")]
    PartialWorkflow {
        step: WorkflowStep,
        enrollment_id: String,
        #[source]
        source: SyncError,
    },

    /// A follow-up step was requested without a Step 1 id.
    #[error("{0} needs an enrollment id")]
    MissingEnrollmentId(WorkflowStep),

    #[error("could not generate a receipt number: {0}")]
    Receipt(String),
}

impl WorkflowError {
    pub fn step(&self) -> WorkflowStep {
        match self {
            WorkflowError::Upload(_) | WorkflowError::Create(_) => WorkflowStep::Create,
            WorkflowError::PartialWorkflow { step, .. } => *step,
            WorkflowError::MissingEnrollmentId(step) => *step,
            WorkflowError::Receipt(_) => WorkflowStep::PaymentRegistration,
        }
    }

    /// Notification text naming the failed step and the remedy.
    pub fn user_message(&self) -> String {
        match self {
            WorkflowError::Upload(e) => e.user_message(),
            WorkflowError::Create(e) => e.user_message(),
            WorkflowError::PartialWorkflow {
                step,
                enrollment_id,
                source,
            } => format!(
                "Enrollment {enrollment_id} is saved, but {step} failed: {} {}",
                source.user_message(),
                step.remedy()
            ),
            WorkflowError::MissingEnrollmentId(step) => {
                format!("Select a saved enrollment before {step}.")
            }
            WorkflowError::Receipt(_) => "Enter a receipt number manually.".to_string(),
        }
    }
}

/// Drives the saga through the cache so every write invalidates the
/// enrollment and classroom views.
pub struct EnrollmentWorkflow<B, S> {
    backend: Arc<B>,
    storage: Arc<S>,
    sync: SyncCoordinator,
    policy: InvalidationPolicy,
}

impl<B: Backend, S: Storage> EnrollmentWorkflow<B, S> {
    pub fn new(backend: Arc<B>, storage: Arc<S>, sync: SyncCoordinator) -> Self {
        Self {
            backend,
            storage,
            sync,
            policy: InvalidationPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: InvalidationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Run Step 1 and, if a classroom was given, Step 2.
    ///
    /// Errors only when nothing was created. Step 2 problems come back as
    /// warnings on an `Ok` outcome.
    pub async fn enroll(
        &self,
        request: &EnrollmentRequest,
    ) -> Result<EnrollmentOutcome, WorkflowError> {
        let voucher = prepare_attachment(
            self.storage.as_ref(),
            request.voucher.as_ref(),
            VOUCHER_FOLDER,
            &request.user_id,
            AttachmentPolicy::Optional,
        )
        .await
        .map_err(WorkflowError::Upload)?;

        let mut payload = request.data.clone();
        if let Value::Object(fields) = &mut payload {
            fields.insert(VOUCHER_FIELD.to_string(), voucher.url_value());
        }

        let mutation =
            MutationRequest::on_domain("enrollment.create", Domain::Enrollments, &self.policy);
        let created = match self
            .sync
            .mutate(mutation, self.backend.post(Domain::Enrollments.path(), &payload))
            .await
        {
            Ok(created) => created,
            Err(e) => {
                warn!(error = %e, "enrollment creation failed");
                discard_attachment(self.storage.as_ref(), &voucher).await;
                return Err(WorkflowError::Create(e));
            }
        };

        let record = unwrap_record(&created);
        let mut state = EnrollmentState::derive(&record);
        let Some(enrollment_id) = extract_enrollment_id(&created) else {
            warn!("enrollment created without a recognizable id; classroom must be assigned manually");
            return Ok(EnrollmentOutcome {
                enrollment_id: None,
                state,
                record,
                voucher,
                warnings: vec![WorkflowWarning::ManualAssignmentRequired],
            });
        };
        info!(enrollment = %enrollment_id, "enrollment created");

        let mut warnings = Vec::new();
        if let Some(classroom_id) = request.target_classroom() {
            match self.assign_classroom(&enrollment_id, classroom_id).await {
                Ok(_) => state = state.with_classroom(),
                Err(e) => {
                    warn!(
                        enrollment = %enrollment_id,
                        classroom = %classroom_id,
                        error = %e,
                        "classroom assignment failed, enrollment kept"
                    );
                    let error = match e {
                        WorkflowError::PartialWorkflow {
                            source: SyncError::Api(api),
                            ..
                        } => api,
                        other => ApiError::InvalidRequest(other.to_string()),
                    };
                    warnings.push(WorkflowWarning::AssignmentFailed {
                        enrollment_id: enrollment_id.clone(),
                        classroom_id: classroom_id.to_string(),
                        error,
                    });
                }
            }
        }

        Ok(EnrollmentOutcome {
            enrollment_id: Some(enrollment_id),
            state,
            record,
            voucher,
            warnings,
        })
    }

    /// Step 2, also the manual retry entry point.
    pub async fn assign_classroom(
        &self,
        enrollment_id: &str,
        classroom_id: &str,
    ) -> Result<Value, WorkflowError> {
        let step = WorkflowStep::ClassroomAssignment;
        let enrollment_id = require_id(enrollment_id, step)?;
        if classroom_id.trim().is_empty() {
            return Err(WorkflowError::PartialWorkflow {
                step,
                enrollment_id: enrollment_id.to_string(),
                source: SyncError::Api(ApiError::InvalidRequest(
                    "a classroom must be selected".to_string(),
                )),
            });
        }

        let path =
            resource_path(&[Domain::Enrollments.path(), enrollment_id, "asignar-aula"]);
        let body = json!({ "idAula": classroom_id });
        let mutation = MutationRequest::on_domain(
            "enrollment.assign_classroom",
            Domain::Enrollments,
            &self.policy,
        );
        let response = self
            .sync
            .mutate(mutation, self.backend.post(&path, &body))
            .await
            .map_err(|source| WorkflowError::PartialWorkflow {
                step,
                enrollment_id: enrollment_id.to_string(),
                source,
            })?;

        info!(enrollment = %enrollment_id, classroom = %classroom_id, "classroom assigned");
        Ok(response)
    }

    /// Step 3. Never chained automatically. A missing receipt number is
    /// generated fresh for every attempt.
    pub async fn register_payment(
        &self,
        enrollment_id: &str,
        receipt_number: Option<&str>,
        registrar_id: &str,
    ) -> Result<PaymentRecord, WorkflowError> {
        let step = WorkflowStep::PaymentRegistration;
        let enrollment_id = require_id(enrollment_id, step)?;
        let receipt_number = match receipt_number.map(str::trim).filter(|r| !r.is_empty()) {
            Some(receipt) => receipt.to_string(),
            None => generate_receipt_number().map_err(|e| WorkflowError::Receipt(e.to_string()))?,
        };

        let path =
            resource_path(&[Domain::Enrollments.path(), enrollment_id, "registrar-en-caja"]);
        let body = json!({
            "numeroRecibo": receipt_number,
            "idRegistrador": registrar_id,
        });
        let mutation = MutationRequest::on_domain(
            "enrollment.register_payment",
            Domain::Enrollments,
            &self.policy,
        );
        let response = self
            .sync
            .mutate(mutation, self.backend.post(&path, &body))
            .await
            .map_err(|source| WorkflowError::PartialWorkflow {
                step,
                enrollment_id: enrollment_id.to_string(),
                source,
            })?;

        info!(enrollment = %enrollment_id, receipt = %receipt_number, "payment registered");
        Ok(PaymentRecord {
            enrollment_id: enrollment_id.to_string(),
            receipt_number,
            response,
        })
    }
}

fn require_id(enrollment_id: &str, step: WorkflowStep) -> Result<&str, WorkflowError> {
    let id = enrollment_id.trim();
    if id.is_empty() {
        return Err(WorkflowError::MissingEnrollmentId(step));
    }
    Ok(id)
}

/// Pull the new enrollment id out of a create response. Numbers and
/// non-blank strings are accepted.
pub fn extract_enrollment_id(response: &Value) -> Option<String> {
    ID_PATHS.iter().find_map(|path| {
        let value = path
            .iter()
            .try_fold(response, |current, segment| current.get(segment))?;
        match value {
            Value::Number(n) => Some(n.to_string()),
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            _ => None,
        }
    })
}

/// `REC-<unix millis>-<6 hex>`.
pub fn generate_receipt_number() -> Result<String, getrandom::Error> {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let mut suffix = [0u8; 3];
    getrandom::getrandom(&mut suffix)?;
    let hex: String = suffix.iter().map(|b| format!("{b:02x}")).collect();
    Ok(format!("REC-{millis}-{hex}"))
}
