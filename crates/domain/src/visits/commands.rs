use serde::{Deserialize, Serialize};

use super::aggregate::DispensedItem;

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub enum Command {
    /// Check the patient in at reception, with a token already allocated
    /// for the day
    CheckIn {
        id: String,
        patient_id: String,
        doctor_id: String,
        department: String,
        token_number: u32,
        visit_date: String,
        created_by: String,
    },

    /// Doctor calls the patient in
    StartConsultation,

    /// Doctor finishes, recording which later stages the treatment plan
    /// requires
    CompleteConsultation {
        requires_procedures: bool,
        requires_medicines: bool,
    },

    /// Service attendant finishes the assigned procedures
    CompleteProcedures,

    /// Pharmacist dispenses the prescribed medicines
    CompletePharmacy { items: Vec<DispensedItem> },

    /// Receptionist generates the invoice for a billable visit
    GenerateInvoice { invoice_id: String, issued_by: String },

    /// Cancel the visit (terminal, never a deletion)
    Cancel,
}
