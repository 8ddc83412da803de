use aws_config::BehaviorVersion;
use aws_lambda_events::{
    kinesis::{KinesisEvent, KinesisEventRecord},
    streams::{KinesisBatchItemFailure, KinesisEventResponse},
};
use aws_sdk_dynamodb::types::AttributeValue;
use domain::{
    visits::{self, DispensedItem},
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

    let inventory_table =
        std::env::var("DYNAMODB_INVENTORY_TABLE").unwrap_or("opd-inventory".to_string());

    lambda_runtime::run(service_fn(|event: LambdaEvent<KinesisEvent>| async {
        handle(event, &dynamodb_client, &inventory_table).await
    }))
    .await
}

async fn handle(
    event: LambdaEvent<KinesisEvent>,
    dynamodb_client: &aws_sdk_dynamodb::Client,
    inventory_table: &str,
) -> Result<KinesisEventResponse, Error> {
    tracing::info!("Processing {} Kinesis records", event.payload.records.len());

    let mut batch_item_failures = Vec::new();

    for record in event.payload.records.iter() {
        let sequence = record.kinesis.sequence_number.clone();

        if let Err(e) = handle_record(record, dynamodb_client, inventory_table).await {
            tracing::error!("Failed to process: {}", e);
            batch_item_failures.push(KinesisBatchItemFailure {
                item_identifier: sequence,
            });
        }
    }

    Ok(KinesisEventResponse { batch_item_failures })
}

async fn handle_record(
    record: &KinesisEventRecord,
    dynamodb_client: &aws_sdk_dynamodb::Client,
    inventory_table: &str,
) -> Result<(), Error> {
    let data = std::str::from_utf8(&record.kinesis.data)?;
    let event: DomainEvent = serde_json::from_str(data)?;

    if event.event_type != "Visit:PharmacyCompleted" {
        return Ok(());
    }

    let visit_event: visits::Event = serde_json::from_str(&event.payload)?;
    let visits::Event::PharmacyCompleted { id, items, .. } = visit_event else {
        return Ok(());
    };

    tracing::info!("Deducting stock for {} item(s) of visit {}", items.len(), id);

    for item in &items {
        deduct_stock(dynamodb_client, inventory_table, item).await?;
    }

    Ok(())
}

/// Conditional decrement: the row is only touched when enough stock is on
/// hand, so a replayed record can never drive a quantity negative.
async fn deduct_stock(
    dynamodb_client: &aws_sdk_dynamodb::Client,
    inventory_table: &str,
    item: &DispensedItem,
) -> Result<(), Error> {
    let quantity = AttributeValue::N(item.quantity.to_string());

    let result = dynamodb_client
        .update_item()
        .table_name(inventory_table)
        .key("medicine_id", AttributeValue::S(item.medicine_id.clone()))
        .update_expression("SET stock_quantity = stock_quantity - :quantity")
        .condition_expression("stock_quantity >= :quantity")
        .expression_attribute_values(":quantity", quantity)
        .send()
        .await;

    match result {
        Ok(_) => {
            tracing::info!("Deducted {} x {}", item.quantity, item.name);
            Ok(())
        }
        Err(err) => {
            let service_err = err.into_service_error();
            if service_err.is_conditional_check_failed_exception() {
                // Matches the dispensing desk behaviour: flag the shortfall,
                // keep going
                tracing::warn!(
                    "Insufficient stock for {} ({}), skipping deduction",
                    item.name,
                    item.medicine_id
                );
                Ok(())
            } else {
                Err(service_err.into())
            }
        }
    }
}
