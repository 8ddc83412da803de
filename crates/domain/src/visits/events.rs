use chrono::{DateTime, Utc};
use cqrs_es::DomainEvent;
use serde::{Deserialize, Serialize};

use super::aggregate::{DispensedItem, VisitStatus};

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(tag = "type")]
pub enum Event {
    CheckedIn {
        id: String,
        patient_id: String,
        doctor_id: String,
        department: String,
        token_number: u32,
        visit_date: String,
        created_by: String,
        created_at: DateTime<Utc>,
        status: VisitStatus,
    },

    ConsultationStarted {
        id: String,
        visit_date: String,
        started_at: DateTime<Utc>,
    },

    ConsultationCompleted {
        id: String,
        visit_date: String,
        requires_procedures: bool,
        requires_medicines: bool,
        completed_at: DateTime<Utc>,
        /// Routing outcome: services_pending or completed
        status: VisitStatus,
    },

    ProceduresCompleted {
        id: String,
        visit_date: String,
        completed_at: DateTime<Utc>,
        status: VisitStatus,
    },

    PharmacyCompleted {
        id: String,
        visit_date: String,
        items: Vec<DispensedItem>,
        completed_at: DateTime<Utc>,
        status: VisitStatus,
    },

    InvoiceGenerated {
        id: String,
        visit_date: String,
        invoice_id: String,
        issued_by: String,
        generated_at: DateTime<Utc>,
    },

    VisitCancelled {
        id: String,
        visit_date: String,
        previous_status: VisitStatus,
        cancelled_at: DateTime<Utc>,
    },
}

impl DomainEvent for Event {
    fn event_type(&self) -> String {
        match self {
            Event::CheckedIn { .. } => "Visit:CheckedIn".to_string(),
            Event::ConsultationStarted { .. } => "Visit:ConsultationStarted".to_string(),
            Event::ConsultationCompleted { .. } => "Visit:ConsultationCompleted".to_string(),
            Event::ProceduresCompleted { .. } => "Visit:ProceduresCompleted".to_string(),
            Event::PharmacyCompleted { .. } => "Visit:PharmacyCompleted".to_string(),
            Event::InvoiceGenerated { .. } => "Visit:InvoiceGenerated".to_string(),
            Event::VisitCancelled { .. } => "Visit:Cancelled".to_string(),
        }
    }

    fn event_version(&self) -> String {
        "1.0".to_string()
    }
}
