// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Atelier

use std::time::Duration;

use axum::{
    http::StatusCode,
    routing::{delete, get, patch, post},
    Json, Router,
};
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};
use utoipa::OpenApi;

use crate::state::AppState;

pub mod auth;
pub mod components;
pub mod health;

pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        .route(
            "/components",
            get(components::list_components).post(components::create_component),
        )
        .route("/components/search", get(components::search_components))
        .route(
            "/components/trash",
            get(components::list_trash).delete(components::clear_trash),
        )
        .route(
            "/components/user/{username}",
            get(components::list_user_components),
        )
        .route(
            "/components/user/{username}/owned",
            get(components::list_user_inventory),
        )
        .route("/components/{id}", get(components::get_component))
        .route("/components/{id}/holders", get(components::list_holders))
        .route("/components/{id}/buy", post(components::buy_component))
        .route("/components/{id}/sell", post(components::sell_component))
        .route("/components/{id}/update", patch(components::update_component))
        .route(
            "/components/{id}/publish",
            patch(components::publish_component),
        )
        .route(
            "/components/{id}/unpublish",
            delete(components::unpublish_component),
        )
        .route("/components/{id}/trash", delete(components::trash_component))
        .route(
            "/components/{id}/trash/restore",
            patch(components::restore_component),
        )
        .route(
            "/components/{id}/trash/force",
            delete(components::force_delete_component),
        )
        .route("/auth/login", post(auth::login))
        .route("/health", get(health::health))
        .with_state(state);

    Router::new()
        .nest("/v1", v1_routes)
        .route(
            "/api-doc/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        )
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(30),
        ))
        .layer(CorsLayer::permissive())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        components::list_components,
        components::search_components,
        components::list_trash,
        components::list_user_components,
        components::list_user_inventory,
        components::get_component,
        components::list_holders,
        components::create_component,
        components::update_component,
        components::publish_component,
        components::unpublish_component,
        components::buy_component,
        components::sell_component,
        components::trash_component,
        components::restore_component,
        components::force_delete_component,
        components::clear_trash,
        auth::login,
        health::health
    ),
    components(
        schemas(
            components::CreateComponentRequest,
            components::UpdateComponentRequest,
            components::MessageResponse,
            auth::LoginRequest,
            auth::LoginResponse,
            health::HealthResponse
        )
    ),
    tags(
        (name = "Components", description = "Component marketplace"),
        (name = "Trash", description = "Soft-delete lifecycle"),
        (name = "Auth", description = "Session token issuance"),
        (name = "Health", description = "Service health")
    )
)]
struct ApiDoc;
