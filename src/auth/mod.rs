// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Atelier

//! Authorization pipeline: API-key capability gates, bearer-token identity
//! and the rejection type both share.

pub mod claims;
pub mod error;
pub mod extractor;
pub mod token;

pub use claims::UserProfile;
pub use error::{AuthError, AuthErrorKind};
pub use extractor::{
    Auth, OptionalAuth, RequireAuthKey, RequireCapability, RequireKeyManage, RequireProjectsKey,
    RequireSearchKey, RequireUserActionsKey, RequireUserFetchKey,
};
