use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::types::AttributeValue;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use domain::{
    days::{self, VisitDay},
    visits::{self, Stage, Visit, VisitStatus},
};
use serde::Serialize;
use std::{collections::HashMap, sync::Arc};
use ulid::Ulid;

mod config;

use config::Config;

#[derive(Clone)]
struct AppState {
    visits_repo: Arc<Box<dyn cqrs_es::persist::ViewRepository<visits::View, Visit>>>,
    visits_cqrs: Arc<
        cqrs_es::CqrsFramework<
            Visit,
            cqrs_es::persist::PersistedEventStore<dynamo_es::DynamoEventRepository, Visit>,
        >,
    >,
    days_repo: Arc<Box<dyn cqrs_es::persist::ViewRepository<days::View, VisitDay>>>,
    days_cqrs: Arc<
        cqrs_es::CqrsFramework<
            VisitDay,
            cqrs_es::persist::PersistedEventStore<dynamo_es::DynamoEventRepository, VisitDay>,
        >,
    >,
    dynamodb_client: aws_sdk_dynamodb::Client,
    config: Arc<Config>,
}

#[tokio::main]
async fn main() -> Result<(), lambda_http::Error> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .without_time()
        .init();

    let config = Arc::new(Config::from_env());

    let aws_config = aws_config::defaults(BehaviorVersion::latest()).load().await;
    let dynamodb_client = aws_sdk_dynamodb::Client::new(&aws_config);

    let visits_repo = visits::cqrs::init_repo(dynamodb_client.clone());
    let visits_cqrs = visits::cqrs::init(dynamodb_client.clone(), visits_repo.clone());
    let days_repo = days::cqrs::init_repo(dynamodb_client.clone());
    let days_cqrs = days::cqrs::init(dynamodb_client.clone(), days_repo.clone());

    let state = AppState {
        visits_repo,
        visits_cqrs,
        days_repo,
        days_cqrs,
        dynamodb_client,
        config,
    };

    let app = Router::new()
        .route("/visits", post(check_in))
        .route("/visits/:id", get(get_visit).delete(cancel_visit))
        .route("/visits/:id/consultation", post(start_consultation))
        .route("/visits/:id/stages/:stage/complete", post(complete_stage))
        .route("/days/:date", get(get_day))
        .route("/summary/:date", get(get_summary))
        .with_state(state);

    let app = tower::ServiceBuilder::new()
        .layer(axum_aws_lambda::LambdaLayer::default())
        .service(app);

    lambda_http::run(app).await?;
    Ok(())
}

/// Staff identifier supplied by the session collaborator in front of us.
fn staff_id(headers: &HeaderMap) -> String {
    headers
        .get("x-staff-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

fn command_metadata() -> HashMap<String, String> {
    let mut metadata = HashMap::new();
    metadata.insert("command_id".to_string(), Ulid::new().to_string());
    metadata
}

fn map_error(err: cqrs_es::AggregateError<domain::Error>) -> (StatusCode, String) {
    match err {
        cqrs_es::AggregateError::UserError(domain_err) => {
            let status = match &domain_err {
                domain::Error::NotFound { .. } => StatusCode::NOT_FOUND,
                domain::Error::Validation { .. } => StatusCode::BAD_REQUEST,
                domain::Error::InvalidTransition { .. }
                | domain::Error::AlreadyCompleted { .. }
                | domain::Error::Uniqueness { .. } => StatusCode::CONFLICT,
            };
            (status, domain_err.to_string())
        }
        cqrs_es::AggregateError::AggregateConflict => (
            StatusCode::CONFLICT,
            "Record was modified concurrently, please retry".to_string(),
        ),
        other => (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
    }
}

fn routing_message(status: VisitStatus) -> &'static str {
    match status {
        VisitStatus::Waiting => "Checked in, waiting for consultation",
        VisitStatus::InConsultation => "Consultation in progress",
        VisitStatus::ServicesPending => "Treatment stages pending",
        VisitStatus::Completed => "All treatments completed, patient ready for billing",
        VisitStatus::Billed => "Payment recorded, patient discharged",
        VisitStatus::Cancelled => "Visit cancelled",
    }
}

#[derive(Serialize)]
struct StageResponse {
    status: VisitStatus,
    message: String,
    visit: visits::View,
}

// Check in: allocate today's next token, then create the visit
async fn check_in(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<visits::inputs::CheckInInput>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let visit_id = Ulid::new().to_string();
    let visit_date = Utc::now().format("%Y-%m-%d").to_string();

    let allocate = days::Command::AllocateToken {
        date: visit_date.clone(),
        visit_id: visit_id.clone(),
    };

    state
        .days_cqrs
        .execute_with_metadata(&visit_date, allocate, command_metadata())
        .await
        .map_err(map_error)?;

    let day = state
        .days_repo
        .load(&visit_date)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .ok_or((StatusCode::NOT_FOUND, "Day record not found".to_string()))?;

    let token_number = *day.day.assignments.get(&visit_id).ok_or((
        StatusCode::INTERNAL_SERVER_ERROR,
        "Allocated token not visible yet".to_string(),
    ))?;

    let command = visits::Command::CheckIn {
        id: visit_id.clone(),
        patient_id: input.patient_id,
        doctor_id: input.doctor_id,
        department: input
            .department
            .unwrap_or_else(|| state.config.default_department.clone()),
        token_number,
        visit_date,
        created_by: staff_id(&headers),
    };

    state
        .visits_cqrs
        .execute_with_metadata(&visit_id, command, command_metadata())
        .await
        .map_err(map_error)?;

    let view = state
        .visits_repo
        .load(&visit_id)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .ok_or((StatusCode::NOT_FOUND, "Not found".to_string()))?;

    Ok((StatusCode::CREATED, Json(view)))
}

// Get visit
async fn get_visit(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let view = state
        .visits_repo
        .load(&id)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .ok_or((StatusCode::NOT_FOUND, "Not found".to_string()))?;

    Ok(Json(view))
}

// Doctor calls the patient in
async fn start_consultation(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    state
        .visits_cqrs
        .execute_with_metadata(&id, visits::Command::StartConsultation, command_metadata())
        .await
        .map_err(map_error)?;

    stage_response(&state, &id).await
}

// Single entry point for stage completion: consultation, procedures,
// pharmacy or billing
async fn complete_stage(
    Path((id, stage)): Path<(String, Stage)>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<visits::inputs::CompleteStageInput>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let command = match stage {
        Stage::Consultation => visits::Command::CompleteConsultation {
            requires_procedures: input.requires_procedures,
            requires_medicines: input.requires_medicines,
        },
        Stage::Procedures => visits::Command::CompleteProcedures,
        Stage::Pharmacy => visits::Command::CompletePharmacy { items: input.items },
        Stage::Billing => visits::Command::GenerateInvoice {
            invoice_id: Ulid::new().to_string(),
            issued_by: staff_id(&headers),
        },
    };

    let result = state
        .visits_cqrs
        .execute_with_metadata(&id, command, command_metadata())
        .await;

    // An already-stamped stage is a warning, not a failure: nothing was
    // overwritten and the caller can carry on.
    if let Err(cqrs_es::AggregateError::UserError(domain::Error::AlreadyCompleted { stage })) =
        &result
    {
        tracing::warn!("Stage {} already completed for visit {}", stage, id);
        return Ok((
            StatusCode::OK,
            Json(serde_json::json!({
                "warning": format!("Stage {} was already completed; no changes made", stage),
            })),
        )
            .into_response());
    }
    result.map_err(map_error)?;

    Ok(stage_response(&state, &id).await?.into_response())
}

async fn stage_response(
    state: &AppState,
    id: &str,
) -> Result<(StatusCode, Json<StageResponse>), (StatusCode, String)> {
    let view = state
        .visits_repo
        .load(id)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .ok_or((StatusCode::NOT_FOUND, "Not found".to_string()))?;

    let status = view.visit.status;
    Ok((
        StatusCode::OK,
        Json(StageResponse {
            status,
            message: routing_message(status).to_string(),
            visit: view,
        }),
    ))
}

// Cancel visit (terminal status, the record is never deleted)
async fn cancel_visit(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    state
        .visits_cqrs
        .execute_with_metadata(&id, visits::Command::Cancel, command_metadata())
        .await
        .map_err(map_error)?;

    stage_response(&state, &id).await
}

// Token allocations for a day
async fn get_day(
    Path(date): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let view = state
        .days_repo
        .load(&date)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .ok_or((StatusCode::NOT_FOUND, "Not found".to_string()))?;

    Ok(Json(view))
}

#[derive(Serialize)]
struct SummaryResponse {
    visit_date: String,
    waiting: i64,
    in_consultation: i64,
    services_pending: i64,
    completed: i64,
    billed: i64,
    cancelled: i64,
}

fn counter(item: &HashMap<String, AttributeValue>, status: &str) -> i64 {
    item.get(status)
        .and_then(|value| value.as_n().ok())
        .and_then(|n| n.parse().ok())
        .unwrap_or(0)
}

// Per-status visit counts for a day, maintained by the summary projector
async fn get_summary(
    Path(date): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let output = state
        .dynamodb_client
        .get_item()
        .table_name(&state.config.summary_table)
        .key("visit_date", AttributeValue::S(date.clone()))
        .send()
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    let item = output.item.unwrap_or_default();

    Ok(Json(SummaryResponse {
        visit_date: date,
        waiting: counter(&item, "waiting"),
        in_consultation: counter(&item, "in_consultation"),
        services_pending: counter(&item, "services_pending"),
        completed: counter(&item, "completed"),
        billed: counter(&item, "billed"),
        cancelled: counter(&item, "cancelled"),
    }))
}
