//! API Routes

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Case routes
        .route(
            "/cases",
            get(handlers::list_cases).post(handlers::create_case),
        )
        .route("/cases/:id", get(handlers::get_case))
        .route("/cases/:id/status", post(handlers::transition_case))
        .route("/cases/:id/transitions", get(handlers::available_transitions))
        // Bid routes
        .route("/bids", post(handlers::place_bid))
        .route("/bids/case/:case_id", get(handlers::bids_for_case))
        .route("/bids/:id/accept", post(handlers::accept_bid))
        .route("/bids/:id/withdraw", post(handlers::withdraw_bid))
        // SLA routes
        .route("/sla/dashboard", get(handlers::sla_dashboard))
        .route("/sla/active", get(handlers::sla_active))
        .route("/sla/overdue", get(handlers::sla_overdue))
        .route("/sla/case/:case_id", get(handlers::sla_for_case))
        .route("/sla/trackers", post(handlers::start_tracker))
        .route(
            "/sla/trackers/:id/milestones/:milestone/complete",
            post(handlers::complete_milestone),
        )
        .route("/sla/trackers/:id/restart", post(handlers::restart_tracker))
        // Audit routes
        .route("/audit/logs", get(handlers::audit_logs))
        .route("/audit/stats", get(handlers::audit_stats))
        .route("/audit/export", get(handlers::audit_export))
        // Middleware
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
