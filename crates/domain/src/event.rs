use derive_new::new;
use serde::{Deserialize, Serialize};

/// A committed domain event as forwarded on the event stream.
///
/// The payload and metadata are the JSON strings persisted in the event log;
/// downstream consumers deserialize the payload into the concrete event enum
/// for the aggregate named by `aggregate_type`.
#[derive(Clone, Debug, Serialize, Deserialize, new)]
pub struct DomainEvent {
    pub id: String,
    pub aggregate_type: String,
    pub sequence: usize,
    pub event_type: String,
    pub event_version: String,
    pub payload: String,
    pub metadata: String,
}
