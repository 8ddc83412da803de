use aws_config::BehaviorVersion;
use aws_lambda_events::{
    kinesis::{KinesisEvent, KinesisEventRecord},
    streams::{KinesisBatchItemFailure, KinesisEventResponse},
};
use aws_sdk_dynamodb::types::AttributeValue;
use domain::{
    visits::{self, VisitStatus},
    DomainEvent,
};
use lambda_runtime::{service_fn, Error, LambdaEvent};

#[tokio::main]
async fn main() -> Result<(), Error> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .without_time()
        .init();

    let config = aws_config::defaults(BehaviorVersion::latest()).load().await;
    let dynamodb_client = aws_sdk_dynamodb::Client::new(&config);

    let summary_table =
        std::env::var("DYNAMODB_SUMMARY_TABLE").unwrap_or("opd-workflow-summary".to_string());

    lambda_runtime::run(service_fn(|event: LambdaEvent<KinesisEvent>| async {
        handle(event, &dynamodb_client, &summary_table).await
    }))
    .await
}

async fn handle(
    event: LambdaEvent<KinesisEvent>,
    dynamodb_client: &aws_sdk_dynamodb::Client,
    summary_table: &str,
) -> Result<KinesisEventResponse, Error> {
    tracing::info!("Processing {} Kinesis records", event.payload.records.len());

    let mut batch_item_failures = Vec::new();

    for record in event.payload.records.iter() {
        let sequence = record.kinesis.sequence_number.clone();

        if let Err(e) = handle_record(record, dynamodb_client, summary_table).await {
            tracing::error!("Failed to process: {}", e);
            batch_item_failures.push(KinesisBatchItemFailure {
                item_identifier: sequence,
            });
        }
    }

    Ok(KinesisEventResponse { batch_item_failures })
}

/// Counter movement caused by one visit event: the status the visit entered
/// and the one it left, if any.
struct StatusDelta {
    visit_date: String,
    entered: Option<VisitStatus>,
    exited: Option<VisitStatus>,
}

fn delta_for(event: &visits::Event) -> StatusDelta {
    match event {
        visits::Event::CheckedIn { visit_date, .. } => StatusDelta {
            visit_date: visit_date.clone(),
            entered: Some(VisitStatus::Waiting),
            exited: None,
        },
        visits::Event::ConsultationStarted { visit_date, .. } => StatusDelta {
            visit_date: visit_date.clone(),
            entered: Some(VisitStatus::InConsultation),
            exited: Some(VisitStatus::Waiting),
        },
        visits::Event::ConsultationCompleted {
            visit_date, status, ..
        } => StatusDelta {
            visit_date: visit_date.clone(),
            entered: Some(*status),
            exited: Some(VisitStatus::InConsultation),
        },
        // Procedures and pharmacy only move the counters once the visit
        // leaves services_pending
        visits::Event::ProceduresCompleted {
            visit_date, status, ..
        }
        | visits::Event::PharmacyCompleted {
            visit_date, status, ..
        } => StatusDelta {
            visit_date: visit_date.clone(),
            entered: (*status == VisitStatus::Completed).then_some(VisitStatus::Completed),
            exited: (*status == VisitStatus::Completed).then_some(VisitStatus::ServicesPending),
        },
        visits::Event::InvoiceGenerated { visit_date, .. } => StatusDelta {
            visit_date: visit_date.clone(),
            entered: Some(VisitStatus::Billed),
            exited: Some(VisitStatus::Completed),
        },
        visits::Event::VisitCancelled {
            visit_date,
            previous_status,
            ..
        } => StatusDelta {
            visit_date: visit_date.clone(),
            entered: Some(VisitStatus::Cancelled),
            exited: Some(*previous_status),
        },
    }
}

async fn handle_record(
    record: &KinesisEventRecord,
    dynamodb_client: &aws_sdk_dynamodb::Client,
    summary_table: &str,
) -> Result<(), Error> {
    let data = std::str::from_utf8(&record.kinesis.data)?;
    let event: DomainEvent = serde_json::from_str(data)?;

    if event.aggregate_type != visits::AGGREGATE_TYPE {
        return Ok(());
    }

    let visit_event: visits::Event = serde_json::from_str(&event.payload)?;
    let delta = delta_for(&visit_event);

    if delta.entered.is_none() && delta.exited.is_none() {
        return Ok(());
    }

    tracing::info!(
        "Applying {} to summary for {}",
        event.event_type,
        delta.visit_date
    );

    let mut expressions = Vec::new();
    let mut request = dynamodb_client
        .update_item()
        .table_name(summary_table)
        .key("visit_date", AttributeValue::S(delta.visit_date.clone()));

    if let Some(entered) = delta.entered {
        expressions.push("#entered :one".to_string());
        request = request
            .expression_attribute_names("#entered", entered.to_string())
            .expression_attribute_values(":one", AttributeValue::N("1".to_string()));
    }
    if let Some(exited) = delta.exited {
        expressions.push("#exited :minus_one".to_string());
        request = request
            .expression_attribute_names("#exited", exited.to_string())
            .expression_attribute_values(":minus_one", AttributeValue::N("-1".to_string()));
    }

    request
        .update_expression(format!("ADD {}", expressions.join(", ")))
        .send()
        .await?;

    Ok(())
}
