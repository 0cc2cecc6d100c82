// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Atelier

//! Axum extractors for the authorization pipeline.
//!
//! Routes declare their requirements through extractor arguments:
//!
//! ```rust,ignore
//! async fn create_component(
//!     _gate: RequireProjectsKey,   // X-API-Key must enable `projects`
//!     Auth(user): Auth,            // valid bearer token required
//!     State(state): State<AppState>,
//! ) -> Result<..., ApiError> { ... }
//! ```
//!
//! `Auth` resolves the token subject against the user table on every
//! request, so a deleted user's outstanding tokens stop working.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use super::claims::UserProfile;
use super::error::{AuthError, AuthErrorKind};
use super::token;
use crate::i18n::Lang;
use crate::state::AppState;
use crate::storage::repository::{ApiKeyError, ApiKeyRepository, Capability, StoredApiKey};
use crate::storage::repository::UserRepository;

/// Header carrying the API key.
pub const API_KEY_HEADER: &str = "x-api-key";

fn lang_of(parts: &Parts) -> Lang {
    let value = parts
        .headers
        .get("x-lang")
        .and_then(|value| value.to_str().ok());
    Lang::from_header(value)
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

fn resolve_user(state: &AppState, token: &str, lang: Lang) -> Result<UserProfile, AuthError> {
    let claims = token::verify(token, &state.auth.jwt_secret)
        .map_err(|_| AuthError::new(AuthErrorKind::InvalidToken, lang))?;

    let user = UserRepository::new(&state.db)
        .get(&claims.sub)
        .map_err(|_| AuthError::new(AuthErrorKind::InvalidToken, lang))?;

    Ok(UserProfile {
        user_id: user.user_id,
        username: user.username,
        role: user.role,
    })
}

/// Requires a valid bearer token; rejects the request otherwise.
#[derive(Debug)]
pub struct Auth(pub UserProfile);

impl FromRequestParts<AppState> for Auth {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let lang = lang_of(parts);
        let token =
            bearer_token(parts).ok_or(AuthError::new(AuthErrorKind::MissingToken, lang))?;
        Ok(Auth(resolve_user(state, token, lang)?))
    }
}

/// Accepts anonymous requests; a present but invalid token still rejects.
#[derive(Debug)]
pub struct OptionalAuth(pub Option<UserProfile>);

impl FromRequestParts<AppState> for OptionalAuth {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let lang = lang_of(parts);
        match bearer_token(parts) {
            Some(token) => Ok(OptionalAuth(Some(resolve_user(state, token, lang)?))),
            None => Ok(OptionalAuth(None)),
        }
    }
}

/// Requires an API key that enables capability `C` and has quota left.
/// Each successful pass counts one use against the key.
#[derive(Debug)]
pub struct RequireCapability<const C: u8>(pub StoredApiKey);

impl<const C: u8> FromRequestParts<AppState> for RequireCapability<C> {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let lang = lang_of(parts);
        let key = parts
            .headers
            .get(API_KEY_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or(AuthError::new(AuthErrorKind::MissingApiKey, lang))?;

        let record = ApiKeyRepository::new(&state.db)
            .authorize(key, Capability::from_u8(C))
            .map_err(|err| {
                let kind = match err {
                    ApiKeyError::UnknownKey => AuthErrorKind::UnknownApiKey,
                    ApiKeyError::QuotaExhausted => AuthErrorKind::QuotaExhausted,
                    ApiKeyError::CapabilityDisabled => AuthErrorKind::CapabilityDisabled,
                    ApiKeyError::Store(_) => AuthErrorKind::Internal,
                };
                AuthError::new(kind, lang)
            })?;

        Ok(RequireCapability(record))
    }
}

pub type RequireKeyManage = RequireCapability<{ Capability::KeyManage as u8 }>;
pub type RequireAuthKey = RequireCapability<{ Capability::Auth as u8 }>;
pub type RequireSearchKey = RequireCapability<{ Capability::Search as u8 }>;
pub type RequireUserFetchKey = RequireCapability<{ Capability::UserFetch as u8 }>;
pub type RequireUserActionsKey = RequireCapability<{ Capability::UserActions as u8 }>;
pub type RequireProjectsKey = RequireCapability<{ Capability::Projects as u8 }>;
