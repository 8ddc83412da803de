use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use cqrs_es::Aggregate;
use serde::{Deserialize, Serialize};

use crate::errors::Error;

use super::{Command, Event};

/// One calendar day of check-ins, identified by the `YYYY-MM-DD` date.
///
/// Token numbers are handed out here rather than by a read-then-write query
/// against existing visits: appending the allocation event is guarded by the
/// event log's optimistic concurrency, so two simultaneous check-ins can
/// never receive the same token.
#[derive(Clone, Debug, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct VisitDay {
    pub date: String,
    pub last_token: u32,
    /// visit id -> token number handed to it
    pub assignments: HashMap<String, u32>,
}

pub const AGGREGATE_TYPE: &str = "VisitDay";

#[derive(Clone, Default)]
pub struct Services {}

#[async_trait]
impl Aggregate for VisitDay {
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
            Command::AllocateToken { date, visit_id } => {
                if visit_id.is_empty() {
                    return Err(Error::Validation {
                        message: "Visit id is required to allocate a token".to_string(),
                    });
                }
                if self.assignments.contains_key(&visit_id) {
                    return Err(Error::Uniqueness {
                        field: "visit_id".to_string(),
                    });
                }

                Ok(vec![Event::TokenAllocated {
                    date,
                    visit_id,
                    token_number: self.last_token + 1,
                    allocated_at: Utc::now(),
                }])
            }
        }
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            Event::TokenAllocated {
                date,
                visit_id,
                token_number,
                ..
            } => {
                self.date = date;
                self.last_token = token_number;
                self.assignments.insert(visit_id, token_number);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn allocate(day: &mut VisitDay, visit_id: &str) -> Result<u32, Error> {
        let events = day
            .handle(
                Command::AllocateToken {
                    date: "2025-03-14".to_string(),
                    visit_id: visit_id.to_string(),
                },
                &Services::default(),
            )
            .await?;
        let Event::TokenAllocated { token_number, .. } = &events[0];
        let token = *token_number;
        for event in events {
            day.apply(event);
        }
        Ok(token)
    }

    #[tokio::test]
    async fn tokens_are_sequential_within_a_day() {
        let mut day = VisitDay::default();

        assert_eq!(allocate(&mut day, "visit-a").await.unwrap(), 1);
        assert_eq!(allocate(&mut day, "visit-b").await.unwrap(), 2);
        assert_eq!(allocate(&mut day, "visit-c").await.unwrap(), 3);
        assert_eq!(day.last_token, 3);
    }

    #[tokio::test]
    async fn a_visit_gets_at_most_one_token() {
        let mut day = VisitDay::default();
        allocate(&mut day, "visit-a").await.unwrap();

        let err = allocate(&mut day, "visit-a").await.unwrap_err();
        assert!(matches!(err, Error::Uniqueness { .. }));
        assert_eq!(day.assignments.get("visit-a"), Some(&1));
        assert_eq!(day.last_token, 1);
    }
}
