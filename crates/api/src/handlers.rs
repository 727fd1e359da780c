//! API Handlers

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use gryork_audit::{AuditQuery, ExportFormat};
use gryork_core::{CaseStatus, LifecycleError, MilestoneKey, NewCase, SlaEntityType};
use gryork_store::CaseFilter;
use gryork_workflow::TransitionRequest;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::extract::CurrentActor;
use crate::state::AppState;

// ============ Response Types ============

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ErrorBody>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }

    pub fn error(kind: impl Into<String>, message: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: false,
            data: None,
            error: Some(ErrorBody {
                kind: kind.into(),
                message: message.into(),
            }),
        })
    }
}

// ============ Request Types ============

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseListParams {
    pub status: Option<CaseStatus>,
    pub sub_contractor_id: Option<String>,
    pub epc_id: Option<String>,
    /// Only non-terminal cases
    #[serde(default)]
    pub open: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceBidRequest {
    pub case_id: String,
    pub bid_amount: Decimal,
    pub funding_duration_days: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartTrackerRequest {
    pub case_id: String,
    pub entity_type: SlaEntityType,
    pub entity_id: String,
    pub sla_class: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct VersionParams {
    pub version: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StatsParams {
    pub days: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExportParams {
    pub format: Option<String>,
}

const DEFAULT_STATS_DAYS: u32 = 30;

fn require_supervisor(actor: &CurrentActor, action: &str) -> ApiResult<()> {
    if actor.0.role.is_supervisor() {
        Ok(())
    } else {
        Err(LifecycleError::forbidden(actor.0.role, action).into())
    }
}

// ============ Health ============

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": state.clock.now().to_rfc3339(),
        "auditFailedWrites": state.audit.failed_writes(),
    }))
}

// ============ Cases ============

pub async fn create_case(
    State(state): State<AppState>,
    actor: CurrentActor,
    Json(payload): Json<NewCase>,
) -> ApiResult<impl IntoResponse> {
    let case = state.authority.create_case(payload, &actor.0)?;
    Ok((StatusCode::CREATED, ApiResponse::success(case)))
}

pub async fn list_cases(
    State(state): State<AppState>,
    _actor: CurrentActor,
    Query(params): Query<CaseListParams>,
) -> ApiResult<impl IntoResponse> {
    let filter = CaseFilter {
        status: params.status,
        sub_contractor_id: params.sub_contractor_id,
        epc_id: params.epc_id,
        exclude_terminal: params.open,
    };
    let cases = state.authority.list_cases(&filter)?;
    Ok(ApiResponse::success(cases))
}

pub async fn get_case(
    State(state): State<AppState>,
    _actor: CurrentActor,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let case = state.authority.get_case(&id)?;
    Ok(ApiResponse::success(case))
}

/// Statuses the caller may move the case to
pub async fn available_transitions(
    State(state): State<AppState>,
    actor: CurrentActor,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let targets = state.authority.available_transitions(&id, &actor.0)?;
    Ok(ApiResponse::success(targets))
}

pub async fn transition_case(
    State(state): State<AppState>,
    actor: CurrentActor,
    Path(id): Path<String>,
    Json(request): Json<TransitionRequest>,
) -> ApiResult<impl IntoResponse> {
    let case = state.authority.transition_with(&id, request, &actor.0)?;
    Ok(ApiResponse::success(case))
}

// ============ Bids ============

pub async fn place_bid(
    State(state): State<AppState>,
    actor: CurrentActor,
    Json(payload): Json<PlaceBidRequest>,
) -> ApiResult<impl IntoResponse> {
    let bid = state.ledger.place_bid(
        &payload.case_id,
        payload.bid_amount,
        payload.funding_duration_days,
        &actor.0,
    )?;
    Ok((StatusCode::CREATED, ApiResponse::success(bid)))
}

pub async fn bids_for_case(
    State(state): State<AppState>,
    _actor: CurrentActor,
    Path(case_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let bids = state.ledger.bids_for_case(&case_id)?;
    Ok(ApiResponse::success(bids))
}

pub async fn accept_bid(
    State(state): State<AppState>,
    actor: CurrentActor,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let acceptance = state.ledger.accept_bid(&id, &actor.0)?;
    Ok(ApiResponse::success(acceptance))
}

pub async fn withdraw_bid(
    State(state): State<AppState>,
    actor: CurrentActor,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let bid = state.ledger.withdraw_bid(&id, &actor.0)?;
    Ok(ApiResponse::success(bid))
}

// ============ SLA ============

pub async fn sla_dashboard(
    State(state): State<AppState>,
    _actor: CurrentActor,
) -> ApiResult<impl IntoResponse> {
    Ok(ApiResponse::success(state.sla.dashboard()?))
}

pub async fn sla_active(
    State(state): State<AppState>,
    _actor: CurrentActor,
) -> ApiResult<impl IntoResponse> {
    Ok(ApiResponse::success(state.sla.active()?))
}

pub async fn sla_overdue(
    State(state): State<AppState>,
    _actor: CurrentActor,
) -> ApiResult<impl IntoResponse> {
    Ok(ApiResponse::success(state.sla.overdue()?))
}

pub async fn sla_for_case(
    State(state): State<AppState>,
    _actor: CurrentActor,
    Path(case_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state.authority.get_case(&case_id)?;
    Ok(ApiResponse::success(state.sla.trackers_for_case(&case_id)?))
}

pub async fn start_tracker(
    State(state): State<AppState>,
    actor: CurrentActor,
    Json(payload): Json<StartTrackerRequest>,
) -> ApiResult<impl IntoResponse> {
    let class = payload.sla_class.unwrap_or_else(|| match payload.entity_type {
        SlaEntityType::Kyc => gryork_sla::class::KYC.to_string(),
        SlaEntityType::Case => gryork_sla::class::EPC_REVIEW.to_string(),
    });
    let tracker = state.sla.start_tracker(
        &payload.case_id,
        payload.entity_type,
        &payload.entity_id,
        &class,
        &actor.0,
    )?;
    Ok((StatusCode::CREATED, ApiResponse::success(tracker)))
}

pub async fn complete_milestone(
    State(state): State<AppState>,
    actor: CurrentActor,
    Path((id, milestone)): Path<(String, String)>,
    Query(params): Query<VersionParams>,
) -> ApiResult<impl IntoResponse> {
    let key: MilestoneKey = milestone.to_lowercase().parse().map_err(|_| {
        ApiError::BadRequest(format!(
            "unknown milestone '{}' (expected day3, day7, day10 or day14)",
            milestone
        ))
    })?;
    let tracker = state
        .sla
        .complete_milestone(&id, key, &actor.0, params.version)?;
    Ok(ApiResponse::success(tracker))
}

pub async fn restart_tracker(
    State(state): State<AppState>,
    actor: CurrentActor,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let tracker = state.sla.restart(&id, &actor.0)?;
    Ok(ApiResponse::success(tracker))
}

// ============ Audit ============

pub async fn audit_logs(
    State(state): State<AppState>,
    actor: CurrentActor,
    Query(query): Query<AuditQuery>,
) -> ApiResult<impl IntoResponse> {
    require_supervisor(&actor, "read the audit log")?;
    Ok(ApiResponse::success(state.audit.query(&query)?))
}

pub async fn audit_stats(
    State(state): State<AppState>,
    actor: CurrentActor,
    Query(params): Query<StatsParams>,
) -> ApiResult<impl IntoResponse> {
    require_supervisor(&actor, "read audit statistics")?;
    let days = params.days.unwrap_or(DEFAULT_STATS_DAYS);
    Ok(ApiResponse::success(
        state.audit.stats(days, state.clock.now())?,
    ))
}

pub async fn audit_export(
    State(state): State<AppState>,
    actor: CurrentActor,
    Query(params): Query<ExportParams>,
    Query(query): Query<AuditQuery>,
) -> ApiResult<impl IntoResponse> {
    require_supervisor(&actor, "export the audit log")?;
    let format: ExportFormat = match params.format {
        Some(raw) => raw.parse()?,
        None => ExportFormat::default(),
    };
    let body = state.audit.export(&query, format)?;
    let disposition = format!(
        "attachment; filename=\"audit-{}.{}\"",
        state.clock.now().format("%Y%m%d"),
        format.extension()
    );
    Ok((
        [
            (header::CONTENT_TYPE, format.mime_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    ))
}
