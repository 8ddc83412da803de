use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cqrs_es::Aggregate;
use serde::{Deserialize, Serialize};

use crate::errors::Error;

use super::{Command, Event};

/// Visit workflow status
#[derive(Clone, Copy, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum VisitStatus {
    /// Checked in, waiting for consultation
    Waiting,
    /// Currently with the doctor
    InConsultation,
    /// Consultation done, procedures and/or pharmacy outstanding
    ServicesPending,
    /// All required stages done, eligible for billing
    Completed,
    /// Invoice generated - terminal
    Billed,
    /// Visit cancelled - terminal
    Cancelled,
}

impl Default for VisitStatus {
    fn default() -> Self {
        Self::Waiting
    }
}

impl fmt::Display for VisitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VisitStatus::Waiting => "waiting",
            VisitStatus::InConsultation => "in_consultation",
            VisitStatus::ServicesPending => "services_pending",
            VisitStatus::Completed => "completed",
            VisitStatus::Billed => "billed",
            VisitStatus::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Workflow stages a staff member can complete against a visit.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Consultation,
    Procedures,
    Pharmacy,
    Billing,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Consultation => "consultation",
            Stage::Procedures => "procedures",
            Stage::Pharmacy => "pharmacy",
            Stage::Billing => "billing",
        };
        f.write_str(name)
    }
}

/// One dispensed medicine line, carried on the pharmacy completion event so
/// the inventory projector can deduct stock.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct DispensedItem {
    pub medicine_id: String,
    pub name: String,
    pub quantity: u32,
}

/// Which stage-exit timestamps are set, derived purely from the visit record.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct CompletionState {
    pub consultation: bool,
    pub procedures: bool,
    pub pharmacy: bool,
}

impl CompletionState {
    /// Consultation is always required; procedures and pharmacy only when the
    /// corresponding flag was set during consultation. Order of completion is
    /// irrelevant, only the union of required stamps counts.
    pub fn all_required_done(&self, requires_procedures: bool, requires_medicines: bool) -> bool {
        self.consultation
            && (self.procedures || !requires_procedures)
            && (self.pharmacy || !requires_medicines)
    }
}

/// Visit aggregate: one patient's journey for one day, check-in to billing
#[derive(Clone, Debug, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct Visit {
    pub id: String,
    pub patient_id: String,
    pub doctor_id: String,
    pub department: String,
    pub created_by: String,
    pub visit_date: String,
    pub token_number: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status: VisitStatus,

    // Treatment plan, fixed when the consultation completes
    pub requires_procedures: bool,
    pub requires_medicines: bool,

    // Stage-exit timestamps, each stamped at most once
    pub consultation_completed_at: Option<DateTime<Utc>>,
    pub procedures_completed_at: Option<DateTime<Utc>>,
    pub pharmacy_completed_at: Option<DateTime<Utc>>,

    // Billing outcome
    pub invoice_id: Option<String>,
    pub invoice_issued_by: Option<String>,
}

pub const AGGREGATE_TYPE: &str = "Visit";

#[derive(Clone, Default)]
pub struct Services {}

#[async_trait]
impl Aggregate for Visit {
    type Command = Command;
    type Event = Event;
    type Error = Error;
    type Services = Services;

    fn aggregate_type() -> String {
        AGGREGATE_TYPE.to_string()
    }

    async fn handle(
        &self,
        command: Self::Command,
        _services: &Self::Services,
    ) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            Command::CheckIn {
                id,
                patient_id,
                doctor_id,
                department,
                token_number,
                visit_date,
                created_by,
            } => {
                self.validate_new()?;
                if token_number == 0 {
                    return Err(Error::Validation {
                        message: "Token number must be positive".to_string(),
                    });
                }

                Ok(vec![Event::CheckedIn {
                    id,
                    patient_id,
                    doctor_id,
                    department,
                    token_number,
                    visit_date,
                    created_by,
                    created_at: Utc::now(),
                    status: VisitStatus::Waiting,
                }])
            }

            Command::StartConsultation => {
                self.validate_existing()?;
                if self.status != VisitStatus::Waiting {
                    return Err(self.invalid_transition(Stage::Consultation));
                }

                Ok(vec![Event::ConsultationStarted {
                    id: self.id.clone(),
                    visit_date: self.visit_date.clone(),
                    started_at: Utc::now(),
                }])
            }

            Command::CompleteConsultation {
                requires_procedures,
                requires_medicines,
            } => {
                self.validate_existing()?;
                if self.consultation_completed_at.is_some() {
                    return Err(Error::AlreadyCompleted {
                        stage: Stage::Consultation.to_string(),
                    });
                }
                if self.status != VisitStatus::InConsultation {
                    return Err(self.invalid_transition(Stage::Consultation));
                }

                let status = if requires_procedures || requires_medicines {
                    VisitStatus::ServicesPending
                } else {
                    VisitStatus::Completed
                };

                Ok(vec![Event::ConsultationCompleted {
                    id: self.id.clone(),
                    visit_date: self.visit_date.clone(),
                    requires_procedures,
                    requires_medicines,
                    completed_at: Utc::now(),
                    status,
                }])
            }

            Command::CompleteProcedures => {
                self.validate_existing()?;
                if self.procedures_completed_at.is_some() {
                    return Err(Error::AlreadyCompleted {
                        stage: Stage::Procedures.to_string(),
                    });
                }
                if !self.requires_procedures || self.status != VisitStatus::ServicesPending {
                    return Err(self.invalid_transition(Stage::Procedures));
                }

                let mut done = self.completion_state();
                done.procedures = true;

                Ok(vec![Event::ProceduresCompleted {
                    id: self.id.clone(),
                    visit_date: self.visit_date.clone(),
                    completed_at: Utc::now(),
                    status: self.route_after(done),
                }])
            }

            Command::CompletePharmacy { items } => {
                self.validate_existing()?;
                if self.pharmacy_completed_at.is_some() {
                    return Err(Error::AlreadyCompleted {
                        stage: Stage::Pharmacy.to_string(),
                    });
                }
                if !self.requires_medicines || self.status != VisitStatus::ServicesPending {
                    return Err(self.invalid_transition(Stage::Pharmacy));
                }

                let mut done = self.completion_state();
                done.pharmacy = true;

                Ok(vec![Event::PharmacyCompleted {
                    id: self.id.clone(),
                    visit_date: self.visit_date.clone(),
                    items,
                    completed_at: Utc::now(),
                    status: self.route_after(done),
                }])
            }

            Command::GenerateInvoice {
                invoice_id,
                issued_by,
            } => {
                self.validate_existing()?;
                if self.invoice_id.is_some() {
                    return Err(Error::AlreadyCompleted {
                        stage: Stage::Billing.to_string(),
                    });
                }
                if !self.is_billable() {
                    return Err(self.invalid_transition(Stage::Billing));
                }

                Ok(vec![Event::InvoiceGenerated {
                    id: self.id.clone(),
                    visit_date: self.visit_date.clone(),
                    invoice_id,
                    issued_by,
                    generated_at: Utc::now(),
                }])
            }

            Command::Cancel => {
                self.validate_existing()?;
                if matches!(self.status, VisitStatus::Billed | VisitStatus::Cancelled) {
                    return Err(Error::InvalidTransition {
                        current: self.status.to_string(),
                        attempted: "cancel".to_string(),
                    });
                }

                Ok(vec![Event::VisitCancelled {
                    id: self.id.clone(),
                    visit_date: self.visit_date.clone(),
                    previous_status: self.status,
                    cancelled_at: Utc::now(),
                }])
            }
        }
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            Event::CheckedIn {
                id,
                patient_id,
                doctor_id,
                department,
                token_number,
                visit_date,
                created_by,
                created_at,
                status,
            } => {
                self.id = id;
                self.patient_id = patient_id;
                self.doctor_id = doctor_id;
                self.department = department;
                self.token_number = token_number;
                self.visit_date = visit_date;
                self.created_by = created_by;
                self.created_at = created_at;
                self.updated_at = created_at;
                self.status = status;
            }

            Event::ConsultationStarted { started_at, .. } => {
                self.status = VisitStatus::InConsultation;
                self.updated_at = started_at;
            }

            Event::ConsultationCompleted {
                requires_procedures,
                requires_medicines,
                completed_at,
                status,
                ..
            } => {
                self.requires_procedures = requires_procedures;
                self.requires_medicines = requires_medicines;
                self.consultation_completed_at = Some(completed_at);
                self.status = status;
                self.updated_at = completed_at;
            }

            Event::ProceduresCompleted {
                completed_at,
                status,
                ..
            } => {
                self.procedures_completed_at = Some(completed_at);
                self.status = status;
                self.updated_at = completed_at;
            }

            Event::PharmacyCompleted {
                completed_at,
                status,
                ..
            } => {
                self.pharmacy_completed_at = Some(completed_at);
                self.status = status;
                self.updated_at = completed_at;
            }

            Event::InvoiceGenerated {
                invoice_id,
                issued_by,
                generated_at,
                ..
            } => {
                self.invoice_id = Some(invoice_id);
                self.invoice_issued_by = Some(issued_by);
                self.status = VisitStatus::Billed;
                self.updated_at = generated_at;
            }

            Event::VisitCancelled { cancelled_at, .. } => {
                self.status = VisitStatus::Cancelled;
                self.updated_at = cancelled_at;
            }
        }
    }
}

impl Visit {
    /// Stage completion tracker: pure read of the stage-exit timestamps.
    pub fn completion_state(&self) -> CompletionState {
        CompletionState {
            consultation: self.consultation_completed_at.is_some(),
            procedures: self.procedures_completed_at.is_some(),
            pharmacy: self.pharmacy_completed_at.is_some(),
        }
    }

    /// Billing trigger predicate: every required stage done, no invoice yet.
    pub fn is_billable(&self) -> bool {
        self.status == VisitStatus::Completed && self.invoice_id.is_none()
    }

    /// Next status once `done` reflects a just-stamped stage.
    fn route_after(&self, done: CompletionState) -> VisitStatus {
        if done.all_required_done(self.requires_procedures, self.requires_medicines) {
            VisitStatus::Completed
        } else {
            VisitStatus::ServicesPending
        }
    }

    fn invalid_transition(&self, attempted: Stage) -> Error {
        Error::InvalidTransition {
            current: self.status.to_string(),
            attempted: attempted.to_string(),
        }
    }

    fn validate_new(&self) -> Result<(), Error> {
        if !self.id.is_empty() {
            return Err(Error::Uniqueness {
                field: "id".to_string(),
            });
        }
        Ok(())
    }

    fn validate_existing(&self) -> Result<(), Error> {
        if self.id.is_empty() {
            return Err(Error::NotFound {
                entity: AGGREGATE_TYPE.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check_in() -> Command {
        Command::CheckIn {
            id: "01J000000000000000000VISIT".to_string(),
            patient_id: "patient-1".to_string(),
            doctor_id: "doctor-1".to_string(),
            department: "general".to_string(),
            token_number: 7,
            visit_date: "2025-03-14".to_string(),
            created_by: "reception-1".to_string(),
        }
    }

    async fn run(visit: &mut Visit, command: Command) -> Result<Vec<Event>, Error> {
        let events = visit.handle(command, &Services::default()).await?;
        for event in events.clone() {
            visit.apply(event);
        }
        Ok(events)
    }

    async fn visit_in_consultation() -> Visit {
        let mut visit = Visit::default();
        run(&mut visit, check_in()).await.unwrap();
        run(&mut visit, Command::StartConsultation).await.unwrap();
        visit
    }

    async fn visit_in_services(requires_procedures: bool, requires_medicines: bool) -> Visit {
        let mut visit = visit_in_consultation().await;
        run(
            &mut visit,
            Command::CompleteConsultation {
                requires_procedures,
                requires_medicines,
            },
        )
        .await
        .unwrap();
        visit
    }

    #[tokio::test]
    async fn check_in_creates_waiting_visit() {
        let mut visit = Visit::default();
        run(&mut visit, check_in()).await.unwrap();

        assert_eq!(visit.status, VisitStatus::Waiting);
        assert_eq!(visit.token_number, 7);
        assert_eq!(visit.visit_date, "2025-03-14");
        assert_eq!(visit.completion_state(), CompletionState::default());
    }

    #[tokio::test]
    async fn check_in_rejects_existing_visit() {
        let mut visit = Visit::default();
        run(&mut visit, check_in()).await.unwrap();

        let err = run(&mut visit, check_in()).await.unwrap_err();
        assert!(matches!(err, Error::Uniqueness { .. }));
    }

    #[tokio::test]
    async fn consultation_cannot_start_twice() {
        let mut visit = visit_in_consultation().await;

        let err = run(&mut visit, Command::StartConsultation).await.unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn consultation_routes_to_services_when_treatment_required() {
        let visit = visit_in_services(true, false).await;

        assert_eq!(visit.status, VisitStatus::ServicesPending);
        assert!(visit.consultation_completed_at.is_some());
        assert!(visit.requires_procedures);
        assert!(!visit.requires_medicines);
    }

    #[tokio::test]
    async fn consultation_routes_straight_to_completed_when_nothing_required() {
        let visit = visit_in_services(false, false).await;

        assert_eq!(visit.status, VisitStatus::Completed);
        assert!(visit.procedures_completed_at.is_none());
        assert!(visit.pharmacy_completed_at.is_none());
        assert!(visit.is_billable());
    }

    #[tokio::test]
    async fn procedures_only_flow_reaches_completed() {
        // waiting -> in_consultation -> services_pending -> completed,
        // pharmacy never stamped
        let mut visit = visit_in_services(true, false).await;
        run(&mut visit, Command::CompleteProcedures).await.unwrap();

        assert_eq!(visit.status, VisitStatus::Completed);
        assert!(visit.procedures_completed_at.is_some());
        assert!(visit.pharmacy_completed_at.is_none());
    }

    #[tokio::test]
    async fn pharmacy_rejected_when_medicines_not_required() {
        let mut visit = visit_in_services(true, false).await;

        let err = run(&mut visit, Command::CompletePharmacy { items: vec![] })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
        assert!(visit.pharmacy_completed_at.is_none());
    }

    #[tokio::test]
    async fn stages_complete_in_either_order() {
        let mut visit = visit_in_services(true, true).await;

        run(&mut visit, Command::CompletePharmacy { items: vec![] })
            .await
            .unwrap();
        assert_eq!(visit.status, VisitStatus::ServicesPending);

        run(&mut visit, Command::CompleteProcedures).await.unwrap();
        assert_eq!(visit.status, VisitStatus::Completed);
    }

    #[tokio::test]
    async fn stage_completion_is_stamped_once() {
        let mut visit = visit_in_services(true, true).await;
        run(&mut visit, Command::CompleteProcedures).await.unwrap();
        let stamped = visit.procedures_completed_at;

        let err = run(&mut visit, Command::CompleteProcedures).await.unwrap_err();
        assert!(matches!(err, Error::AlreadyCompleted { .. }));
        assert_eq!(visit.procedures_completed_at, stamped);
    }

    #[tokio::test]
    async fn repeat_consultation_completion_reports_already_completed() {
        let mut visit = visit_in_services(true, false).await;

        // Status has moved on, but the stamp check must win over the
        // status precondition.
        let err = run(
            &mut visit,
            Command::CompleteConsultation {
                requires_procedures: false,
                requires_medicines: false,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::AlreadyCompleted { .. }));
        assert!(visit.requires_procedures);
    }

    #[tokio::test]
    async fn invoice_requires_completed_status() {
        let mut visit = Visit::default();
        run(&mut visit, check_in()).await.unwrap();

        let err = run(
            &mut visit,
            Command::GenerateInvoice {
                invoice_id: "inv-1".to_string(),
                issued_by: "reception-1".to_string(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn invoice_generated_exactly_once_and_billed_is_terminal() {
        let mut visit = visit_in_services(false, false).await;
        run(
            &mut visit,
            Command::GenerateInvoice {
                invoice_id: "inv-1".to_string(),
                issued_by: "reception-1".to_string(),
            },
        )
        .await
        .unwrap();

        assert_eq!(visit.status, VisitStatus::Billed);
        assert!(!visit.is_billable());

        let err = run(
            &mut visit,
            Command::GenerateInvoice {
                invoice_id: "inv-2".to_string(),
                issued_by: "reception-1".to_string(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::AlreadyCompleted { .. }));
        assert_eq!(visit.invoice_id.as_deref(), Some("inv-1"));

        let err = run(&mut visit, Command::Cancel).await.unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn cancelled_is_terminal() {
        let mut visit = visit_in_services(true, true).await;
        run(&mut visit, Command::Cancel).await.unwrap();
        assert_eq!(visit.status, VisitStatus::Cancelled);

        let err = run(&mut visit, Command::CompleteProcedures).await.unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));

        let err = run(&mut visit, Command::Cancel).await.unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn commands_against_unknown_visit_report_not_found() {
        let mut visit = Visit::default();
        let err = run(&mut visit, Command::StartConsultation).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn pharmacy_completion_carries_dispensed_items() {
        let mut visit = visit_in_services(false, true).await;
        let items = vec![DispensedItem {
            medicine_id: "med-1".to_string(),
            name: "Paracetamol 500mg".to_string(),
            quantity: 10,
        }];

        let events = run(&mut visit, Command::CompletePharmacy { items: items.clone() })
            .await
            .unwrap();

        assert_eq!(visit.status, VisitStatus::Completed);
        match &events[0] {
            Event::PharmacyCompleted { items: carried, .. } => assert_eq!(carried, &items),
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
