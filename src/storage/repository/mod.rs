// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Atelier

//! Per-entity repositories over the market database.

pub mod api_keys;
pub mod components;
pub mod users;

pub use api_keys::{ApiKeyError, ApiKeyRepository, Capability, FlagState, StoredApiKey};
pub use components::{
    ComponentError, ComponentPatch, ComponentRepository, ComponentResult, ComponentView,
    HolderView, NewComponent, Ownership, SearchCriteria, SearchOrder, StoredComponent, Viewer,
};
pub use users::{NewUser, PrivacyFacet, PrivacySettings, Role, StoredUser, UserRepository};
