use serde::{Deserialize, Serialize};

use super::aggregate::DispensedItem;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckInInput {
    pub patient_id: String,
    pub doctor_id: String,
    /// Falls back to the configured default department when absent
    pub department: Option<String>,
}

/// Body of the complete-stage endpoint. Only the fields relevant to the
/// addressed stage are read; consultation takes the requires flags,
/// pharmacy the dispensed lines.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CompleteStageInput {
    #[serde(default)]
    pub requires_procedures: bool,
    #[serde(default)]
    pub requires_medicines: bool,
    #[serde(default)]
    pub items: Vec<DispensedItem>,
}
