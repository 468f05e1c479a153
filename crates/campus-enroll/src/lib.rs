//! campus-enroll — the enrollment saga and attachment-carrying writes.
//!
//! Enrolling a student is three independent backend calls (create, assign
//! a classroom, register the payment) with no compensating endpoint. This
//! crate sequences them through the [`campus_sync::SyncCoordinator`],
//! derives the resulting [`EnrollmentState`] from the record, and reports
//! partial completion as warnings rather than failures.
//!
//! # Components
//!
//! - **`workflow`** — `EnrollmentWorkflow`: Step 1-3, id extraction, receipt numbers
//! - **`state`** — `EnrollmentState` / `WorkflowStep`
//! - **`attachment`** — upload pre-step and orphan cleanup
//! - **`storage`** — `Storage` seam over the object-storage client
//! - **`tasks`** — `TaskService`: task creation with an attachment

pub mod attachment;
pub mod state;
pub mod storage;
pub mod tasks;
pub mod workflow;

#[cfg(test)]
mod testing;

pub use attachment::{
    Attachment, AttachmentError, AttachmentPolicy, discard_attachment, prepare_attachment,
};
pub use state::{EnrollmentState, WorkflowStep};
pub use storage::{Storage, StorageFuture};
pub use tasks::{TaskError, TaskService};
pub use workflow::{
    EnrollmentOutcome, EnrollmentRequest, EnrollmentWorkflow, PaymentRecord, WorkflowError,
    WorkflowWarning, extract_enrollment_id, generate_receipt_number,
};
