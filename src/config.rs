// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Atelier

//! # Runtime Configuration
//!
//! Configuration is loaded from the environment at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DATA_DIR` | Root directory for the market database | `/data` |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `JWT_SECRET` | HS256 signing secret for session tokens | Required |
//! | `BOOTSTRAP_API_KEY` | API key seeded with every capability enabled | Optional |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::path::PathBuf;

/// Environment variable name for the data directory path.
pub const DATA_DIR_ENV: &str = "DATA_DIR";

/// Environment variable name for the HS256 token signing secret.
pub const JWT_SECRET_ENV: &str = "JWT_SECRET";

/// Environment variable name for the bootstrap API key. When set, a key with
/// every capability enabled and no quota is seeded at startup.
pub const BOOTSTRAP_API_KEY_ENV: &str = "BOOTSTRAP_API_KEY";

/// Resolved server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub jwt_secret: String,
    pub bootstrap_api_key: Option<String>,
}

impl ServerConfig {
    /// Load configuration from the environment. Fails when `JWT_SECRET` is
    /// missing; sessions cannot be issued or verified without it.
    pub fn from_env() -> Result<Self, String> {
        let jwt_secret = std::env::var(JWT_SECRET_ENV)
            .map_err(|_| format!("{JWT_SECRET_ENV} must be set"))?;

        let port = match std::env::var("PORT") {
            Ok(raw) => raw
                .parse::<u16>()
                .map_err(|_| format!("invalid PORT value: {raw}"))?,
            Err(_) => 8080,
        };

        Ok(Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port,
            data_dir: std::env::var(DATA_DIR_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/data")),
            jwt_secret,
            bootstrap_api_key: std::env::var(BOOTSTRAP_API_KEY_ENV).ok(),
        })
    }
}
