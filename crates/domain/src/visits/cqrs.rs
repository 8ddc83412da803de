use std::{env, sync::Arc};

use cqrs_es::{
    persist::{PersistedEventStore, ViewRepository},
    CqrsFramework,
};
use dynamo_es::{DynamoEventRepository, DynamoViewRepository};

use super::{Query, Services, View, Visit};

pub fn init(
    client: aws_sdk_dynamodb::Client,
    repo: Arc<Box<dyn ViewRepository<View, Visit>>>,
) -> Arc<CqrsFramework<Visit, PersistedEventStore<DynamoEventRepository, Visit>>> {
    let event_log_table =
        env::var("DYNAMODB_EVENT_LOG_TABLE").unwrap_or("opd-event-log".to_string());

    let event_snapshots_table =
        env::var("DYNAMODB_EVENT_SNAPSHOTS_TABLE").unwrap_or("opd-event-snapshots".to_string());

    let store: PersistedEventStore<DynamoEventRepository, Visit> =
        PersistedEventStore::new_snapshot_store(
            DynamoEventRepository::new(client).with_tables(&event_log_table, &event_snapshots_table),
            5,
        );

    let query = Box::new(Query::new(repo));

    Arc::new(CqrsFramework::new(store, vec![query], Services::default()))
}

pub fn init_repo(client: aws_sdk_dynamodb::Client) -> Arc<Box<dyn ViewRepository<View, Visit>>> {
    let view_table = env::var("DYNAMODB_VISITS_VIEW_TABLE").unwrap_or("opd-visits-view".to_string());

    Arc::new(Box::new(DynamoViewRepository::new(&view_table, client)))
}
