// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Atelier

//! Login endpoint: credentials in, session token out.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    auth::{token, RequireAuthKey},
    error::ApiError,
    i18n::{Lang, Msg},
    state::AppState,
    storage::repository::UserRepository,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    pub token: String,
    pub user_id: String,
    pub username: String,
}

/// Authenticate with username and password. An unknown username and a wrong
/// password produce the same response, so accounts cannot be enumerated.
#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    tag = "Auth",
    responses((status = 200, body = LoginResponse), (status = 401))
)]
pub async fn login(
    _gate: RequireAuthKey,
    lang: Lang,
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let invalid = || ApiError::unauthorized(lang.msg(Msg::InvalidCredentials));

    let users = UserRepository::new(&state.db);
    let user = users
        .get_by_username(&request.username)
        .map_err(|_| invalid())?;
    if !users.verify_password(&user, &request.password) {
        return Err(invalid());
    }

    let token = token::issue(&user.user_id, &state.auth.jwt_secret)
        .map_err(|_| ApiError::internal(lang.msg(Msg::Internal)))?;
    Ok(Json(LoginResponse {
        token,
        user_id: user.user_id,
        username: user.username,
    }))
}
