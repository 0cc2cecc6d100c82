// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Atelier

//! Resolved request identity.

use serde::Serialize;
use utoipa::ToSchema;

use crate::storage::repository::users::Role;
use crate::storage::repository::Viewer;

/// The authenticated user a handler sees: the token subject resolved
/// against the user table at request time.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UserProfile {
    pub user_id: String,
    pub username: String,
    pub role: Role,
}

impl UserProfile {
    /// The repository-facing view of this identity.
    pub fn as_viewer(&self) -> Viewer<'_> {
        Viewer {
            user_id: &self.user_id,
            manage_store: self.role.can_manage_store(),
        }
    }
}
