// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Atelier

//! Atelier - Component Marketplace Backend
//!
//! HTTP backend for a social design platform where users create, publish,
//! buy and sell reusable design components with an in-app virtual currency
//! (arkhoins).
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - Authorization pipeline (API-key capabilities, HS256 sessions)
//! - `i18n` - Response-message localization
//! - `storage` - Embedded ACID database (redb) and repositories

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod i18n;
pub mod state;
pub mod storage;
