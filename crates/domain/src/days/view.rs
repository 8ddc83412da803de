use std::sync::Arc;

use async_trait::async_trait;
use cqrs_es::{
    persist::{PersistenceError, ViewContext, ViewRepository},
    Aggregate, EventEnvelope, View as CqrsView,
};
use serde::{Deserialize, Serialize};

use super::{VisitDay, AGGREGATE_TYPE};

#[derive(Clone, Debug, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct View {
    pub aggregate_type: String,
    pub command_id: String,
    pub id: String,
    pub day: VisitDay,
}

impl CqrsView<VisitDay> for View {
    fn update(&mut self, event: &EventEnvelope<VisitDay>) {
        self.id.clone_from(&event.aggregate_id);
        self.aggregate_type = AGGREGATE_TYPE.to_string();
        self.command_id = event
            .metadata
            .get("command_id")
            .unwrap_or(&"".to_string())
            .to_string();
        self.day.apply(event.payload.clone());
    }
}

pub struct Query {
    repo: Arc<Box<dyn ViewRepository<View, VisitDay>>>,
}

impl Query {
    pub fn new(repo: Arc<Box<dyn ViewRepository<View, VisitDay>>>) -> Self {
        Self { repo }
    }

    async fn update(
        &self,
        date: &str,
        events: &[EventEnvelope<VisitDay>],
    ) -> Result<(), PersistenceError> {
        let (mut view, view_context) = match self.repo.load_with_context(date).await? {
            None => {
                let view_context = ViewContext::new(date.to_string(), 0);
                (Default::default(), view_context)
            }
            Some((view, context)) => (view, context),
        };

        for event in events {
            view.update(event);
        }

        self.repo.update_view(view, view_context).await
    }
}

#[async_trait]
impl cqrs_es::Query<VisitDay> for Query {
    async fn dispatch(&self, date: &str, events: &[EventEnvelope<VisitDay>]) {
        if let Err(err) = self.update(date, events).await {
            eprintln!("VisitDayQuery error for {}: {}", date, err);
        }
    }
}
