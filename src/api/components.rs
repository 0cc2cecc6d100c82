// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Atelier

//! Component marketplace endpoints.
//!
//! Every route is gated by an API key capability; identity comes from the
//! bearer token where required. Business-rule violations surface as
//! localized 400/404/409 responses; ownership failures answer 404 so that
//! private components cannot be enumerated.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::{IntoParams, ToSchema};

use crate::{
    auth::{Auth, OptionalAuth, RequireProjectsKey, RequireSearchKey, UserProfile},
    error::ApiError,
    i18n::{Lang, Msg},
    state::AppState,
    storage::{
        pagination::DEFAULT_PER_PAGE,
        repository::{
            users::PrivacyFacet, ComponentError, ComponentPatch, ComponentRepository,
            ComponentView, HolderView, NewComponent, SearchCriteria, SearchOrder, UserRepository,
        },
        Page, StoreError,
    },
};

// =============================================================================
// Request / response bodies
// =============================================================================

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateComponentRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub content: Value,
    #[serde(default)]
    pub price: u64,
    #[serde(default)]
    pub budget: u64,
    #[serde(default)]
    pub public: bool,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateComponentRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub content: Option<Value>,
    pub price: Option<u64>,
    pub budget: Option<u64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    fn localized(lang: Lang, msg: Msg) -> Json<Self> {
        Json(Self {
            message: lang.msg(msg).to_string(),
        })
    }
}

// =============================================================================
// Query parameters
// =============================================================================

/// Truthy flag values accepted in query strings.
fn truthy(value: &str) -> bool {
    matches!(value, "t" | "true" | "1")
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct PageQuery {
    pub page: Option<u64>,
    pub perpage: Option<u64>,
}

impl PageQuery {
    fn page(&self) -> u64 {
        self.page.unwrap_or(1)
    }

    fn perpage(&self) -> u64 {
        self.perpage.unwrap_or(DEFAULT_PER_PAGE)
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct ListQuery {
    pub page: Option<u64>,
    pub perpage: Option<u64>,
    /// Restrict to free components (`t`, `true`, `1`).
    pub free: Option<String>,
    /// Restrict to published components (`t`, `true`, `1`).
    pub public: Option<String>,
    /// Presence restricts the listing to the viewer's own components.
    pub own: Option<String>,
}

impl ListQuery {
    fn page(&self) -> u64 {
        self.page.unwrap_or(1)
    }

    fn perpage(&self) -> u64 {
        self.perpage.unwrap_or(DEFAULT_PER_PAGE)
    }

    fn free_flag(&self) -> bool {
        self.free.as_deref().is_some_and(truthy)
    }

    fn public_flag(&self) -> bool {
        self.public.as_deref().is_some_and(truthy)
    }

    fn own_flag(&self) -> bool {
        self.own.is_some()
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct SearchQuery {
    /// Pattern to match against names, descriptions and owner names.
    pub q: Option<String>,
    /// Presence restricts results to owners the viewer follows.
    pub following: Option<String>,
    /// Sort key: `name`, `created_at`, `updated_at` or `holders`.
    pub order: Option<String>,
    /// Sort direction (`t`, `true`, `1` for descending; default descending).
    pub desc: Option<String>,
    pub page: Option<u64>,
    pub perpage: Option<u64>,
}

impl SearchQuery {
    fn criteria(&self) -> SearchCriteria {
        let order = match self.order.as_deref() {
            Some("name") => SearchOrder::Name,
            Some("updated_at") => SearchOrder::UpdatedAt,
            Some("holders") => SearchOrder::Holders,
            _ => SearchOrder::CreatedAt,
        };
        SearchCriteria {
            query: self.q.clone().unwrap_or_default(),
            following_only: self.following.is_some(),
            order,
            descending: self.desc.as_deref().map(truthy).unwrap_or(true),
        }
    }
}

// =============================================================================
// Error mapping and filters
// =============================================================================

/// Translate a repository error into a localized HTTP response.
fn map_component_error(err: ComponentError, lang: Lang) -> ApiError {
    match err {
        ComponentError::ComponentNotFound => ApiError::not_found(lang.msg(Msg::ComponentNotFound)),
        ComponentError::UserNotFound => ApiError::not_found(lang.msg(Msg::UserNotFound)),
        ComponentError::ComponentAlreadyPublic => {
            ApiError::conflict(lang.msg(Msg::ComponentAlreadyPublic))
        }
        ComponentError::ComponentAlreadyOwned => {
            ApiError::conflict(lang.msg(Msg::ComponentAlreadyOwned))
        }
        ComponentError::ComponentAlreadyTrashed => {
            ApiError::conflict(lang.msg(Msg::ComponentAlreadyTrashed))
        }
        ComponentError::InsufficientArkhoins => {
            ApiError::bad_request(lang.msg(Msg::InsufficientArkhoins))
        }
        ComponentError::ComponentNotPublic => {
            ApiError::bad_request(lang.msg(Msg::ComponentNotPublic))
        }
        ComponentError::ComponentNotOwned => {
            ApiError::bad_request(lang.msg(Msg::ComponentNotOwned))
        }
        ComponentError::ComponentNotTrashed => {
            ApiError::bad_request(lang.msg(Msg::ComponentNotTrashed))
        }
        ComponentError::ComponentOwnerCannotBuy => {
            ApiError::bad_request(lang.msg(Msg::ComponentOwnerCannotBuy))
        }
        ComponentError::ComponentOwnerCannotSell => {
            ApiError::bad_request(lang.msg(Msg::ComponentOwnerCannotSell))
        }
        ComponentError::InvalidSearchPattern => {
            ApiError::bad_request(lang.msg(Msg::InvalidSearchPattern))
        }
        ComponentError::Store(StoreError::NotFound(_)) => {
            ApiError::not_found(lang.msg(Msg::ComponentNotFound))
        }
        ComponentError::Store(err) => {
            tracing::error!(error = %err, "storage failure");
            ApiError::internal(lang.msg(Msg::Internal))
        }
    }
}

/// Ownership filter: the caller must own the component or hold the
/// manage-store permission. Failure answers 404 so component IDs cannot be
/// probed through mutation routes.
fn require_ownership(
    state: &AppState,
    component_id: &str,
    user: &UserProfile,
    lang: Lang,
) -> Result<(), ApiError> {
    let ownership = ComponentRepository::new(&state.db)
        .ownership(component_id)
        .map_err(|err| map_component_error(err, lang))?;
    let allowed =
        user.role.can_manage_store() || ownership.user_id() == Some(user.user_id.as_str());
    if allowed {
        Ok(())
    } else {
        Err(ApiError::not_found(lang.msg(Msg::ComponentNotFound)))
    }
}

/// Privacy filter for user-scoped listings: the facet must be visible, or
/// the viewer must be the target user or a store manager.
fn require_facet(
    target: &crate::storage::repository::StoredUser,
    viewer: Option<&UserProfile>,
    facet: PrivacyFacet,
    lang: Lang,
) -> Result<(), ApiError> {
    let allowed = target.privacy.allows(facet)
        || viewer.is_some_and(|v| {
            v.user_id == target.user_id || v.role.can_manage_store()
        });
    if allowed {
        Ok(())
    } else {
        Err(ApiError::forbidden(lang.msg(Msg::PrivacyDenied)))
    }
}

// =============================================================================
// Listings
// =============================================================================

#[utoipa::path(
    get,
    path = "/v1/components",
    params(ListQuery),
    tag = "Components",
    responses((status = 200, body = Page<ComponentView>))
)]
pub async fn list_components(
    _gate: RequireProjectsKey,
    Auth(user): Auth,
    lang: Lang,
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Page<ComponentView>>, ApiError> {
    let repo = ComponentRepository::new(&state.db);
    let viewer = Some(user.as_viewer());

    let page = if query.own_flag() {
        repo.get_by_owner(
            viewer,
            &user.user_id,
            query.public_flag(),
            query.page(),
            query.perpage(),
        )
    } else {
        repo.get_public(viewer, query.free_flag(), query.page(), query.perpage())
    }
    .map_err(|err| map_component_error(err, lang))?;

    Ok(Json(page))
}

#[utoipa::path(
    get,
    path = "/v1/components/search",
    params(SearchQuery),
    tag = "Components",
    responses((status = 200, body = Page<ComponentView>))
)]
pub async fn search_components(
    _gate: RequireSearchKey,
    OptionalAuth(user): OptionalAuth,
    lang: Lang,
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Page<ComponentView>>, ApiError> {
    let repo = ComponentRepository::new(&state.db);
    let viewer = user.as_ref().map(|u| u.as_viewer());
    let page = repo
        .search(
            viewer,
            &query.criteria(),
            query.page.unwrap_or(1),
            query.perpage.unwrap_or(DEFAULT_PER_PAGE),
        )
        .map_err(|err| map_component_error(err, lang))?;
    Ok(Json(page))
}

#[utoipa::path(
    get,
    path = "/v1/components/trash",
    params(PageQuery),
    tag = "Components",
    responses((status = 200, body = Page<ComponentView>))
)]
pub async fn list_trash(
    _gate: RequireProjectsKey,
    Auth(user): Auth,
    lang: Lang,
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<ComponentView>>, ApiError> {
    let page = ComponentRepository::new(&state.db)
        .get_trashed(&user.user_id, query.page(), query.perpage())
        .map_err(|err| map_component_error(err, lang))?;
    Ok(Json(page))
}

#[utoipa::path(
    get,
    path = "/v1/components/user/{username}",
    params(("username" = String, Path), PageQuery),
    tag = "Components",
    responses((status = 200, body = Page<ComponentView>), (status = 403), (status = 404))
)]
pub async fn list_user_components(
    _gate: RequireProjectsKey,
    OptionalAuth(viewer): OptionalAuth,
    lang: Lang,
    State(state): State<AppState>,
    Path(username): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<ComponentView>>, ApiError> {
    let target = UserRepository::new(&state.db)
        .get_by_username(&username)
        .map_err(|_| ApiError::not_found(lang.msg(Msg::UserNotFound)))?;
    require_facet(&target, viewer.as_ref(), PrivacyFacet::Components, lang)?;

    // Strangers only see published components.
    let privileged = viewer
        .as_ref()
        .is_some_and(|v| v.user_id == target.user_id || v.role.can_manage_store());
    let page = ComponentRepository::new(&state.db)
        .get_by_owner(
            viewer.as_ref().map(|v| v.as_viewer()),
            &target.user_id,
            !privileged,
            query.page(),
            query.perpage(),
        )
        .map_err(|err| map_component_error(err, lang))?;
    Ok(Json(page))
}

#[utoipa::path(
    get,
    path = "/v1/components/user/{username}/owned",
    params(("username" = String, Path), PageQuery),
    tag = "Components",
    responses((status = 200, body = Page<ComponentView>), (status = 403), (status = 404))
)]
pub async fn list_user_inventory(
    _gate: RequireProjectsKey,
    OptionalAuth(viewer): OptionalAuth,
    lang: Lang,
    State(state): State<AppState>,
    Path(username): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<ComponentView>>, ApiError> {
    let target = UserRepository::new(&state.db)
        .get_by_username(&username)
        .map_err(|_| ApiError::not_found(lang.msg(Msg::UserNotFound)))?;
    require_facet(&target, viewer.as_ref(), PrivacyFacet::Inventory, lang)?;

    let privileged = viewer
        .as_ref()
        .is_some_and(|v| v.user_id == target.user_id || v.role.can_manage_store());
    let page = ComponentRepository::new(&state.db)
        .get_owned(
            viewer.as_ref().map(|v| v.as_viewer()),
            &target.user_id,
            !privileged,
            query.page(),
            query.perpage(),
        )
        .map_err(|err| map_component_error(err, lang))?;
    Ok(Json(page))
}

// =============================================================================
// Single-component reads
// =============================================================================

#[utoipa::path(
    get,
    path = "/v1/components/{id}",
    params(("id" = String, Path)),
    tag = "Components",
    responses((status = 200, body = ComponentView), (status = 404))
)]
pub async fn get_component(
    _gate: RequireProjectsKey,
    OptionalAuth(viewer): OptionalAuth,
    lang: Lang,
    State(state): State<AppState>,
    Path(component_id): Path<String>,
) -> Result<Json<ComponentView>, ApiError> {
    let view = ComponentRepository::new(&state.db)
        .get_for_viewer(&component_id, viewer.as_ref().map(|v| v.as_viewer()))
        .map_err(|err| map_component_error(err, lang))?;
    Ok(Json(view))
}

#[utoipa::path(
    get,
    path = "/v1/components/{id}/holders",
    params(("id" = String, Path), PageQuery),
    tag = "Components",
    responses((status = 200, body = Page<HolderView>), (status = 404))
)]
pub async fn list_holders(
    _gate: RequireProjectsKey,
    OptionalAuth(viewer): OptionalAuth,
    lang: Lang,
    State(state): State<AppState>,
    Path(component_id): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<HolderView>>, ApiError> {
    let repo = ComponentRepository::new(&state.db);
    // Visibility first: a private component must stay invisible here too.
    repo.get_for_viewer(&component_id, viewer.as_ref().map(|v| v.as_viewer()))
        .map_err(|err| map_component_error(err, lang))?;
    let page = repo
        .get_holders(&component_id, query.page(), query.perpage())
        .map_err(|err| map_component_error(err, lang))?;
    Ok(Json(page))
}

// =============================================================================
// Writes
// =============================================================================

#[utoipa::path(
    post,
    path = "/v1/components",
    request_body = CreateComponentRequest,
    tag = "Components",
    responses((status = 201, body = ComponentView), (status = 400))
)]
pub async fn create_component(
    _gate: RequireProjectsKey,
    Auth(user): Auth,
    lang: Lang,
    State(state): State<AppState>,
    Json(request): Json<CreateComponentRequest>,
) -> Result<(StatusCode, Json<ComponentView>), ApiError> {
    if request.name.trim().is_empty() {
        return Err(ApiError::validation([(
            "name".to_string(),
            lang.msg(Msg::NameRequired).to_string(),
        )]));
    }

    let repo = ComponentRepository::new(&state.db);
    let created = repo
        .create(
            &user.user_id,
            NewComponent {
                name: request.name,
                description: request.description,
                content: request.content,
                price: request.price,
                budget: request.budget,
                public: request.public,
            },
        )
        .map_err(|err| map_component_error(err, lang))?;

    let view = repo
        .get_for_viewer(&created.component_id, Some(user.as_viewer()))
        .map_err(|err| map_component_error(err, lang))?;
    Ok((StatusCode::CREATED, Json(view)))
}

#[utoipa::path(
    patch,
    path = "/v1/components/{id}/update",
    params(("id" = String, Path)),
    request_body = UpdateComponentRequest,
    tag = "Components",
    responses((status = 200, body = MessageResponse), (status = 400), (status = 404))
)]
pub async fn update_component(
    _gate: RequireProjectsKey,
    Auth(user): Auth,
    lang: Lang,
    State(state): State<AppState>,
    Path(component_id): Path<String>,
    Json(request): Json<UpdateComponentRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    require_ownership(&state, &component_id, &user, lang)?;

    if request.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(ApiError::validation([(
            "name".to_string(),
            lang.msg(Msg::NameRequired).to_string(),
        )]));
    }

    ComponentRepository::new(&state.db)
        .update(
            &component_id,
            ComponentPatch {
                name: request.name,
                description: request.description,
                content: request.content,
                price: request.price,
                budget: request.budget,
                public: None,
            },
        )
        .map_err(|err| map_component_error(err, lang))?;
    Ok(MessageResponse::localized(lang, Msg::ComponentUpdated))
}

#[utoipa::path(
    patch,
    path = "/v1/components/{id}/publish",
    params(("id" = String, Path)),
    tag = "Components",
    responses((status = 200, body = MessageResponse), (status = 404), (status = 409))
)]
pub async fn publish_component(
    _gate: RequireProjectsKey,
    Auth(user): Auth,
    lang: Lang,
    State(state): State<AppState>,
    Path(component_id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    require_ownership(&state, &component_id, &user, lang)?;
    ComponentRepository::new(&state.db)
        .publish(&component_id)
        .map_err(|err| map_component_error(err, lang))?;
    Ok(MessageResponse::localized(lang, Msg::ComponentPublished))
}

#[utoipa::path(
    delete,
    path = "/v1/components/{id}/unpublish",
    params(("id" = String, Path)),
    tag = "Components",
    responses((status = 200, body = MessageResponse), (status = 400), (status = 404))
)]
pub async fn unpublish_component(
    _gate: RequireProjectsKey,
    Auth(user): Auth,
    lang: Lang,
    State(state): State<AppState>,
    Path(component_id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    require_ownership(&state, &component_id, &user, lang)?;
    ComponentRepository::new(&state.db)
        .unpublish(&component_id)
        .map_err(|err| map_component_error(err, lang))?;
    Ok(MessageResponse::localized(lang, Msg::ComponentUnpublished))
}

#[utoipa::path(
    post,
    path = "/v1/components/{id}/buy",
    params(("id" = String, Path)),
    tag = "Components",
    responses((status = 200, body = MessageResponse), (status = 400), (status = 404), (status = 409))
)]
pub async fn buy_component(
    _gate: RequireProjectsKey,
    Auth(user): Auth,
    lang: Lang,
    State(state): State<AppState>,
    Path(component_id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let repo = ComponentRepository::new(&state.db);
    // Visibility first: a private component must stay invisible here too.
    repo.get_for_viewer(&component_id, Some(user.as_viewer()))
        .map_err(|err| map_component_error(err, lang))?;
    repo.buy(&user.user_id, &component_id)
        .map_err(|err| map_component_error(err, lang))?;
    Ok(MessageResponse::localized(lang, Msg::ComponentBought))
}

#[utoipa::path(
    post,
    path = "/v1/components/{id}/sell",
    params(("id" = String, Path)),
    tag = "Components",
    responses((status = 200, body = MessageResponse), (status = 400), (status = 404))
)]
pub async fn sell_component(
    _gate: RequireProjectsKey,
    Auth(user): Auth,
    lang: Lang,
    State(state): State<AppState>,
    Path(component_id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let repo = ComponentRepository::new(&state.db);
    repo.get_for_viewer(&component_id, Some(user.as_viewer()))
        .map_err(|err| map_component_error(err, lang))?;
    repo.sell(&user.user_id, &component_id)
        .map_err(|err| map_component_error(err, lang))?;
    Ok(MessageResponse::localized(lang, Msg::ComponentSold))
}

// =============================================================================
// Trash lifecycle
// =============================================================================

#[utoipa::path(
    delete,
    path = "/v1/components/{id}/trash",
    params(("id" = String, Path)),
    tag = "Trash",
    responses((status = 200, body = MessageResponse), (status = 404), (status = 409))
)]
pub async fn trash_component(
    _gate: RequireProjectsKey,
    Auth(user): Auth,
    lang: Lang,
    State(state): State<AppState>,
    Path(component_id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    require_ownership(&state, &component_id, &user, lang)?;
    ComponentRepository::new(&state.db)
        .safe_delete(&component_id)
        .map_err(|err| map_component_error(err, lang))?;
    Ok(MessageResponse::localized(lang, Msg::ComponentTrashed))
}

#[utoipa::path(
    patch,
    path = "/v1/components/{id}/trash/restore",
    params(("id" = String, Path)),
    tag = "Trash",
    responses((status = 200, body = MessageResponse), (status = 400), (status = 404))
)]
pub async fn restore_component(
    _gate: RequireProjectsKey,
    Auth(user): Auth,
    lang: Lang,
    State(state): State<AppState>,
    Path(component_id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    require_ownership(&state, &component_id, &user, lang)?;
    ComponentRepository::new(&state.db)
        .restore(&component_id)
        .map_err(|err| map_component_error(err, lang))?;
    Ok(MessageResponse::localized(lang, Msg::ComponentRestored))
}

#[utoipa::path(
    delete,
    path = "/v1/components/{id}/trash/force",
    params(("id" = String, Path)),
    tag = "Trash",
    responses((status = 200, body = MessageResponse), (status = 400), (status = 404))
)]
pub async fn force_delete_component(
    _gate: RequireProjectsKey,
    Auth(user): Auth,
    lang: Lang,
    State(state): State<AppState>,
    Path(component_id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    require_ownership(&state, &component_id, &user, lang)?;
    ComponentRepository::new(&state.db)
        .unsafe_delete(&component_id)
        .map_err(|err| map_component_error(err, lang))?;
    Ok(MessageResponse::localized(lang, Msg::ComponentPurged))
}

#[utoipa::path(
    delete,
    path = "/v1/components/trash",
    tag = "Trash",
    responses((status = 200, body = MessageResponse))
)]
pub async fn clear_trash(
    _gate: RequireProjectsKey,
    Auth(user): Auth,
    lang: Lang,
    State(state): State<AppState>,
) -> Result<Json<MessageResponse>, ApiError> {
    ComponentRepository::new(&state.db)
        .clear_trash(&user.user_id)
        .map_err(|err| map_component_error(err, lang))?;
    Ok(MessageResponse::localized(lang, Msg::TrashCleared))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::router;
    use crate::auth::token;
    use crate::storage::repository::users::NewUser;
    use crate::storage::repository::{ApiKeyRepository, StoredApiKey};
    use crate::storage::MarketDb;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    const SECRET: &str = "test-secret";
    const API_KEY: &str = "test-key";

    fn test_state() -> (AppState, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = MarketDb::open(&dir.path().join("test.redb")).unwrap();
        let state = AppState::new(db, SECRET);
        ApiKeyRepository::new(&state.db)
            .put(&StoredApiKey::all_enabled(API_KEY))
            .unwrap();
        (state, dir)
    }

    fn seed_user(state: &AppState, username: &str, balance: u64) -> (String, String) {
        let users = UserRepository::new(&state.db);
        let mut user = users
            .create(NewUser {
                username: username.to_string(),
                email: format!("{username}@example.com"),
                password: "hunter2".to_string(),
                first_name: "Ada".to_string(),
                last_name: "Lovelace".to_string(),
            })
            .unwrap();
        user.balance = balance;
        users.update(&user).unwrap();
        let jwt = token::issue(&user.user_id, SECRET).unwrap();
        (user.user_id, jwt)
    }

    fn request(method: &str, uri: &str, jwt: Option<&str>, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("x-api-key", API_KEY);
        if let Some(jwt) = jwt {
            builder = builder.header("authorization", format!("Bearer {jwt}"));
        }
        match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn create_requires_an_api_key() {
        let (state, _dir) = test_state();
        let (_, jwt) = seed_user(&state, "alice", 0);
        let app = router(state);

        let req = Request::builder()
            .method("POST")
            .uri("/v1/components")
            .header("authorization", format!("Bearer {jwt}"))
            .header("content-type", "application/json")
            .body(Body::from(r#"{"name":"button"}"#))
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body = json_body(response).await;
        assert!(body.get("error").is_some());
    }

    #[tokio::test]
    async fn create_then_fetch_round_trip() {
        let (state, _dir) = test_state();
        let (_, jwt) = seed_user(&state, "alice", 0);
        let app = router(state);

        let response = app
            .clone()
            .oneshot(request(
                "POST",
                "/v1/components",
                Some(&jwt),
                Some(serde_json::json!({"name": "button", "price": 50, "public": true})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = json_body(response).await;
        let id = created["component_id"].as_str().unwrap().to_string();
        assert_eq!(created["is_public"], true);

        let response = app
            .oneshot(request(
                "GET",
                &format!("/v1/components/{id}"),
                None,
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let fetched = json_body(response).await;
        assert_eq!(fetched["name"], "button");
        assert_eq!(fetched["price"], 50);
    }

    #[tokio::test]
    async fn create_validates_the_name() {
        let (state, _dir) = test_state();
        let (_, jwt) = seed_user(&state, "alice", 0);
        let app = router(state);

        let response = app
            .oneshot(request(
                "POST",
                "/v1/components",
                Some(&jwt),
                Some(serde_json::json!({"name": "  "})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert!(body["error"]["name"].is_string());
    }

    #[tokio::test]
    async fn private_components_are_invisible_to_strangers() {
        let (state, _dir) = test_state();
        let (_, owner_jwt) = seed_user(&state, "owner", 0);
        let (_, stranger_jwt) = seed_user(&state, "stranger", 0);
        let app = router(state);

        let response = app
            .clone()
            .oneshot(request(
                "POST",
                "/v1/components",
                Some(&owner_jwt),
                Some(serde_json::json!({"name": "secret"})),
            ))
            .await
            .unwrap();
        let id = json_body(response).await["component_id"]
            .as_str()
            .unwrap()
            .to_string();

        // The owner sees it.
        let response = app
            .clone()
            .oneshot(request(
                "GET",
                &format!("/v1/components/{id}"),
                Some(&owner_jwt),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // Anonymous and stranger requests both get 404, not 403.
        for jwt in [None, Some(stranger_jwt.as_str())] {
            let response = app
                .clone()
                .oneshot(request("GET", &format!("/v1/components/{id}"), jwt, None))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
        }

        // Mutation through a stranger's token is also a 404.
        let response = app
            .oneshot(request(
                "PATCH",
                &format!("/v1/components/{id}/publish"),
                Some(&stranger_jwt),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn buy_and_sell_answer_not_found_for_private_components() {
        let (state, _dir) = test_state();
        let (_, owner_jwt) = seed_user(&state, "owner", 0);
        let (_, stranger_jwt) = seed_user(&state, "stranger", 500);
        let app = router(state);

        let response = app
            .clone()
            .oneshot(request(
                "POST",
                "/v1/components",
                Some(&owner_jwt),
                Some(serde_json::json!({"name": "secret", "price": 10})),
            ))
            .await
            .unwrap();
        let id = json_body(response).await["component_id"]
            .as_str()
            .unwrap()
            .to_string();

        // A stranger probing the private id gets the same answer as probing
        // an id that does not exist.
        for target in [id.as_str(), "no-such-component"] {
            for action in ["buy", "sell"] {
                let response = app
                    .clone()
                    .oneshot(request(
                        "POST",
                        &format!("/v1/components/{target}/{action}"),
                        Some(&stranger_jwt),
                        None,
                    ))
                    .await
                    .unwrap();
                assert_eq!(response.status(), StatusCode::NOT_FOUND);
            }
        }
    }

    #[tokio::test]
    async fn buy_and_sell_through_the_api() {
        let (state, _dir) = test_state();
        let (_, owner_jwt) = seed_user(&state, "owner", 0);
        let (buyer_id, buyer_jwt) = seed_user(&state, "buyer", 200);
        let app = router(state.clone());

        let response = app
            .clone()
            .oneshot(request(
                "POST",
                "/v1/components",
                Some(&owner_jwt),
                Some(serde_json::json!({"name": "button", "price": 60, "public": true})),
            ))
            .await
            .unwrap();
        let id = json_body(response).await["component_id"]
            .as_str()
            .unwrap()
            .to_string();

        let response = app
            .clone()
            .oneshot(request(
                "POST",
                &format!("/v1/components/{id}/buy"),
                Some(&buyer_jwt),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            UserRepository::new(&state.db).get(&buyer_id).unwrap().balance,
            140
        );

        // Buying twice conflicts even with arkhoins to spare.
        let response = app
            .clone()
            .oneshot(request(
                "POST",
                &format!("/v1/components/{id}/buy"),
                Some(&buyer_jwt),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = app
            .oneshot(request(
                "POST",
                &format!("/v1/components/{id}/sell"),
                Some(&buyer_jwt),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            UserRepository::new(&state.db).get(&buyer_id).unwrap().balance,
            200
        );
    }

    #[tokio::test]
    async fn messages_follow_the_x_lang_header() {
        let (state, _dir) = test_state();
        let (_, jwt) = seed_user(&state, "alice", 0);
        let app = router(state);

        for (lang, expected) in [
            ("en", "Component not found"),
            ("pt", "Componente não encontrado"),
        ] {
            let req = Request::builder()
                .method("GET")
                .uri("/v1/components/missing")
                .header("x-api-key", API_KEY)
                .header("authorization", format!("Bearer {jwt}"))
                .header("x-lang", lang)
                .body(Body::empty())
                .unwrap();
            let response = app.clone().oneshot(req).await.unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
            let body = json_body(response).await;
            assert_eq!(body["error"], expected);
        }
    }

    #[tokio::test]
    async fn trash_lifecycle_through_the_api() {
        let (state, _dir) = test_state();
        let (_, jwt) = seed_user(&state, "alice", 0);
        let app = router(state);

        let response = app
            .clone()
            .oneshot(request(
                "POST",
                "/v1/components",
                Some(&jwt),
                Some(serde_json::json!({"name": "button"})),
            ))
            .await
            .unwrap();
        let id = json_body(response).await["component_id"]
            .as_str()
            .unwrap()
            .to_string();

        let response = app
            .clone()
            .oneshot(request(
                "DELETE",
                &format!("/v1/components/{id}/trash"),
                Some(&jwt),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .clone()
            .oneshot(request("GET", "/v1/components/trash", Some(&jwt), None))
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["total_records"], 1);

        let response = app
            .clone()
            .oneshot(request(
                "DELETE",
                &format!("/v1/components/{id}/trash/force"),
                Some(&jwt),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(request("GET", "/v1/components/trash", Some(&jwt), None))
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["total_records"], 0);
    }

    #[tokio::test]
    async fn search_is_gated_by_its_own_capability() {
        let (state, _dir) = test_state();
        let mut key = StoredApiKey::all_enabled("search-off");
        key.search = crate::storage::repository::FlagState::Disabled;
        ApiKeyRepository::new(&state.db).put(&key).unwrap();
        let app = router(state);

        let req = Request::builder()
            .method("GET")
            .uri("/v1/components/search?q=button")
            .header("x-api-key", "search-off")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
