// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 GhostPost

//! HTTP API: routing, OpenAPI docs, and the tower middleware stack.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::state::AppState;

pub mod capsules;
pub mod delivery;
pub mod health;
pub mod plan;
pub mod view;

pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        .route(
            "/capsules",
            get(capsules::list_capsules).post(capsules::create_capsule),
        )
        .route("/capsules/received", get(capsules::list_received_capsules))
        .route(
            "/capsules/{capsule_id}",
            get(capsules::get_capsule)
                .patch(capsules::update_capsule)
                .delete(capsules::delete_capsule),
        )
        .route("/view/{capsule_id}", get(view::view_capsule))
        .route("/plan", get(plan::get_plan).post(plan::set_plan))
        .route("/delivery/run", post(delivery::run_delivery_sweep));

    Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .nest("/v1", v1_routes)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(TraceLayer::new_for_http())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        capsules::create_capsule,
        capsules::list_capsules,
        capsules::list_received_capsules,
        capsules::get_capsule,
        capsules::update_capsule,
        capsules::delete_capsule,
        view::view_capsule,
        plan::get_plan,
        plan::set_plan,
        delivery::run_delivery_sweep,
        health::health,
        health::liveness,
        health::readiness
    ),
    components(
        schemas(
            crate::lifecycle::NewCapsule,
            crate::lifecycle::CapsuleChanges,
            crate::lifecycle::CapsuleView,
            crate::lifecycle::ReceivedCapsule,
            crate::storage::CapsuleStatus,
            crate::entitlements::PlanTier,
            crate::entitlements::PlanLimits,
            crate::delivery::SweepReport,
            capsules::CreateCapsuleResponse,
            capsules::CapsuleListResponse,
            capsules::ReceivedListResponse,
            capsules::DeleteCapsuleResponse,
            plan::PlanResponse,
            plan::SetPlanRequest,
            plan::SetPlanResponse,
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse
        )
    ),
    tags(
        (name = "Capsules", description = "Capsule lifecycle"),
        (name = "View", description = "Public time-gated capsule links"),
        (name = "Plan", description = "Plan tiers and entitlements"),
        (name = "Delivery", description = "Delivery sweep operations"),
        (name = "Health", description = "Service health probes")
    )
)]
struct ApiDoc;
