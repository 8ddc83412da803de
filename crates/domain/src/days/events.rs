use chrono::{DateTime, Utc};
use cqrs_es::DomainEvent;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(tag = "type")]
pub enum Event {
    TokenAllocated {
        date: String,
        visit_id: String,
        token_number: u32,
        allocated_at: DateTime<Utc>,
    },
}

impl DomainEvent for Event {
    fn event_type(&self) -> String {
        match self {
            Event::TokenAllocated { .. } => "VisitDay:TokenAllocated".to_string(),
        }
    }

    fn event_version(&self) -> String {
        "1.0".to_string()
    }
}
