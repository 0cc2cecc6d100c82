// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Atelier

//! Persistence layer: the embedded market database, the pagination engine
//! and the per-entity repositories.

pub mod db;
pub mod error;
pub mod pagination;
pub mod repository;

pub use db::MarketDb;
pub use error::{StoreError, StoreResult};
pub use pagination::{paginate, Page, DEFAULT_PER_PAGE};
