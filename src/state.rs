// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Atelier

use std::sync::Arc;

use crate::storage::MarketDb;

/// Secrets the auth extractors need.
#[derive(Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<MarketDb>,
    pub auth: AuthConfig,
}

impl AppState {
    pub fn new(db: MarketDb, jwt_secret: impl Into<String>) -> Self {
        Self {
            db: Arc::new(db),
            auth: AuthConfig {
                jwt_secret: jwt_secret.into(),
            },
        }
    }
}
