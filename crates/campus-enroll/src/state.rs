//! Enrollment progress derived from the enrollment record.

use std::fmt;

use serde::Serialize;
use serde_json::Value;

use campus_sync::unwrap_record;

/// One backend call of the enrollment saga.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStep {
    /// Step 1: `POST /matricula`.
    Create,
    /// Step 2: `POST /matricula/{id}/asignar-aula`.
    ClassroomAssignment,
    /// Step 3: `POST /matricula/{id}/registrar-en-caja`.
    PaymentRegistration,
}

impl WorkflowStep {
    /// What the operator can do after this step failed.
    pub fn remedy(&self) -> &'static str {
        match self {
            WorkflowStep::Create => "Review the form and submit the enrollment again.",
            WorkflowStep::ClassroomAssignment => {
                "Assign the classroom manually from the enrollment detail."
            }
            WorkflowStep::PaymentRegistration => {
                "Register the payment again from the cashier view."
            }
        }
    }
}

impl fmt::Display for WorkflowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WorkflowStep::Create => "enrollment creation",
            WorkflowStep::ClassroomAssignment => "classroom assignment",
            WorkflowStep::PaymentRegistration => "payment registration",
        })
    }
}

/// How far an enrollment got through the saga.
///
/// Steps 2 and 3 are independent, so a record can be paid before it has a
/// classroom. There is no rollback between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentState {
    EnrolledOnly,
    EnrolledAndAssigned,
    EnrolledAndPaid,
    FullyRegistered,
}

impl EnrollmentState {
    /// Derive the state from an enrollment record (envelopes tolerated).
    pub fn derive(record: &Value) -> Self {
        let record = unwrap_record(record);
        let assigned = has_value(&record, &["idAula"]) || has_value(&record, &["aula", "id"]);
        let paid = has_value(&record, &["numeroRecibo"])
            || has_value(&record, &["pago", "numeroRecibo"]);
        Self::from_flags(assigned, paid)
    }

    fn from_flags(assigned: bool, paid: bool) -> Self {
        match (assigned, paid) {
            (false, false) => EnrollmentState::EnrolledOnly,
            (true, false) => EnrollmentState::EnrolledAndAssigned,
            (false, true) => EnrollmentState::EnrolledAndPaid,
            (true, true) => EnrollmentState::FullyRegistered,
        }
    }

    pub fn has_classroom(&self) -> bool {
        matches!(
            self,
            EnrollmentState::EnrolledAndAssigned | EnrollmentState::FullyRegistered
        )
    }

    pub fn is_paid(&self) -> bool {
        matches!(
            self,
            EnrollmentState::EnrolledAndPaid | EnrollmentState::FullyRegistered
        )
    }

    /// State after a successful classroom assignment.
    pub fn with_classroom(self) -> Self {
        Self::from_flags(true, self.is_paid())
    }

    /// State after a successful payment registration.
    pub fn with_payment(self) -> Self {
        Self::from_flags(self.has_classroom(), true)
    }

    /// Steps still outstanding, in saga order.
    pub fn pending_steps(&self) -> Vec<WorkflowStep> {
        let mut steps = Vec::new();
        if !self.has_classroom() {
            steps.push(WorkflowStep::ClassroomAssignment);
        }
        if !self.is_paid() {
            steps.push(WorkflowStep::PaymentRegistration);
        }
        steps
    }
}

impl fmt::Display for EnrollmentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EnrollmentState::EnrolledOnly => "enrolled",
            EnrollmentState::EnrolledAndAssigned => "enrolled, classroom assigned",
            EnrollmentState::EnrolledAndPaid => "enrolled, payment registered",
            EnrollmentState::FullyRegistered => "fully registered",
        })
    }
}

fn has_value(record: &Value, path: &[&str]) -> bool {
    let mut current = record;
    for segment in path {
        match current.get(segment) {
            Some(next) => current = next,
            None => return false,
        }
    }
    match current {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn derives_from_record_fields() {
        assert_eq!(
            EnrollmentState::derive(&json!({"id": 1, "idAula": null})),
            EnrollmentState::EnrolledOnly
        );
        assert_eq!(
            EnrollmentState::derive(&json!({"id": 1, "idAula": "C-101"})),
            EnrollmentState::EnrolledAndAssigned
        );
        assert_eq!(
            EnrollmentState::derive(&json!({"id": 1, "numeroRecibo": "REC-1"})),
            EnrollmentState::EnrolledAndPaid
        );
        assert_eq!(
            EnrollmentState::derive(&json!({
                "id": 1,
                "aula": {"id": 4},
                "pago": {"numeroRecibo": "R"}
            })),
            EnrollmentState::FullyRegistered
        );
    }

    #[test]
    fn blank_fields_do_not_count() {
        assert_eq!(
            EnrollmentState::derive(&json!({"idAula": "  ", "numeroRecibo": ""})),
            EnrollmentState::EnrolledOnly
        );
    }

    #[test]
    fn envelopes_are_tolerated() {
        assert_eq!(
            EnrollmentState::derive(&json!({"info": {"data": {"idAula": 3}}})),
            EnrollmentState::EnrolledAndAssigned
        );
    }

    #[test]
    fn transitions() {
        let state = EnrollmentState::EnrolledOnly;
        assert_eq!(state.with_payment(), EnrollmentState::EnrolledAndPaid);
        assert_eq!(state.with_payment().with_classroom(), EnrollmentState::FullyRegistered);
        assert_eq!(
            state.pending_steps(),
            vec![WorkflowStep::ClassroomAssignment, WorkflowStep::PaymentRegistration]
        );
        assert!(EnrollmentState::FullyRegistered.pending_steps().is_empty());
    }
}
