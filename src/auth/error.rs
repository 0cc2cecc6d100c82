// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Atelier

//! Authentication and authorization rejections.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::i18n::{Lang, Msg};

/// Why an extractor rejected the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
    /// No `Authorization: Bearer` header present
    MissingToken,
    /// Token failed signature or expiry validation, or its subject is gone
    InvalidToken,
    /// No `X-API-Key` header present
    MissingApiKey,
    /// The API key is not registered
    UnknownApiKey,
    /// The API key's usage quota is exhausted
    QuotaExhausted,
    /// The key does not enable the capability this route requires
    CapabilityDisabled,
    /// Authenticated, but the identity lacks the required permission
    InsufficientPermissions,
    /// The gate itself failed (storage error)
    Internal,
}

/// Extractor rejection carrying the negotiated response language.
#[derive(Debug)]
pub struct AuthError {
    pub kind: AuthErrorKind,
    pub lang: Lang,
}

impl AuthError {
    pub fn new(kind: AuthErrorKind, lang: Lang) -> Self {
        Self { kind, lang }
    }

    pub fn status_code(&self) -> StatusCode {
        match self.kind {
            AuthErrorKind::InsufficientPermissions => StatusCode::FORBIDDEN,
            AuthErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNAUTHORIZED,
        }
    }

    fn message(&self) -> &'static str {
        let msg = match self.kind {
            AuthErrorKind::MissingToken => Msg::MissingToken,
            AuthErrorKind::InvalidToken => Msg::InvalidToken,
            AuthErrorKind::MissingApiKey | AuthErrorKind::UnknownApiKey => Msg::InvalidApiKey,
            AuthErrorKind::QuotaExhausted => Msg::ApiKeyQuotaExhausted,
            AuthErrorKind::CapabilityDisabled => Msg::ApiKeyCapabilityDisabled,
            AuthErrorKind::InsufficientPermissions => Msg::InsufficientPermissions,
            AuthErrorKind::Internal => Msg::Internal,
        };
        self.lang.msg(msg)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message().to_string(),
        });
        (self.status_code(), body).into_response()
    }
}
