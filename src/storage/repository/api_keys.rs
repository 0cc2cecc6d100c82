// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Atelier

//! API key repository.
//!
//! Every API key carries one tri-valued flag per capability group. A flag in
//! the `Inherit` state resolves to the key's default policy: enabled when the
//! key is bound to an owner, disabled for anonymous keys. Keys may carry a
//! usage quota (`max_usage` 0 means unlimited).

use redb::ReadableTable;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::storage::db::{decode, encode, MarketDb, API_KEYS};
use crate::storage::error::{StoreError, StoreResult};

/// The fixed set of capability groups an API key can gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    KeyManage = 0,
    Auth = 1,
    Search = 2,
    UserFetch = 3,
    UserActions = 4,
    Projects = 5,
}

impl Capability {
    /// Decode the const-generic discriminant used by the route gate.
    pub const fn from_u8(value: u8) -> Capability {
        match value {
            0 => Capability::KeyManage,
            1 => Capability::Auth,
            2 => Capability::Search,
            3 => Capability::UserFetch,
            4 => Capability::UserActions,
            _ => Capability::Projects,
        }
    }
}

/// Tri-valued capability flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum FlagState {
    Enabled,
    Disabled,
    Inherit,
}

impl Default for FlagState {
    fn default() -> Self {
        FlagState::Inherit
    }
}

/// Persistent API key record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredApiKey {
    /// The opaque key string clients send in `X-API-Key`.
    pub key: String,
    /// Username the key is bound to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    pub key_manage: FlagState,
    pub auth: FlagState,
    pub search: FlagState,
    pub user_fetch: FlagState,
    pub user_actions: FlagState,
    pub projects: FlagState,
    pub times_used: u64,
    /// 0 means no quota.
    pub max_usage: u64,
}

impl StoredApiKey {
    /// A key with every capability enabled. Used for bootstrap seeding.
    pub fn all_enabled(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            owner: None,
            key_manage: FlagState::Enabled,
            auth: FlagState::Enabled,
            search: FlagState::Enabled,
            user_fetch: FlagState::Enabled,
            user_actions: FlagState::Enabled,
            projects: FlagState::Enabled,
            times_used: 0,
            max_usage: 0,
        }
    }

    fn flag(&self, capability: Capability) -> FlagState {
        match capability {
            Capability::KeyManage => self.key_manage,
            Capability::Auth => self.auth,
            Capability::Search => self.search,
            Capability::UserFetch => self.user_fetch,
            Capability::UserActions => self.user_actions,
            Capability::Projects => self.projects,
        }
    }

    /// Resolve a tri-valued flag to a concrete decision.
    pub fn allows(&self, capability: Capability) -> bool {
        match self.flag(capability) {
            FlagState::Enabled => true,
            FlagState::Disabled => false,
            FlagState::Inherit => self.owner.is_some(),
        }
    }

    /// Whether the key's usage quota is exhausted.
    pub fn quota_exhausted(&self) -> bool {
        self.max_usage > 0 && self.times_used >= self.max_usage
    }
}

/// Denial reasons surfaced by the capability gate. All map to 401.
#[derive(Debug, thiserror::Error)]
pub enum ApiKeyError {
    #[error("unknown API key")]
    UnknownKey,
    #[error("API key usage quota exhausted")]
    QuotaExhausted,
    #[error("capability disabled for this API key")]
    CapabilityDisabled,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Repository for API keys.
pub struct ApiKeyRepository<'a> {
    db: &'a MarketDb,
}

impl<'a> ApiKeyRepository<'a> {
    pub fn new(db: &'a MarketDb) -> Self {
        Self { db }
    }

    /// Insert or replace a key record.
    pub fn put(&self, record: &StoredApiKey) -> StoreResult<()> {
        let write_txn = self.db.write()?;
        {
            let mut keys = write_txn.open_table(API_KEYS)?;
            keys.insert(record.key.as_str(), encode(record)?.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Get a key record.
    pub fn get(&self, key: &str) -> StoreResult<StoredApiKey> {
        let read_txn = self.db.read()?;
        let keys = read_txn.open_table(API_KEYS)?;
        match keys.get(key)? {
            Some(value) => decode(value.value()),
            None => Err(StoreError::NotFound(format!("api key {key}"))),
        }
    }

    /// Authorize one gated request: the key must exist, have quota left and
    /// resolve the capability to enabled. Counts the use on success.
    pub fn authorize(&self, key: &str, capability: Capability) -> Result<StoredApiKey, ApiKeyError> {
        let write_txn = self.db.write().map_err(ApiKeyError::Store)?;
        let record = {
            let mut keys = write_txn.open_table(API_KEYS).map_err(StoreError::from)?;

            let mut record: StoredApiKey = {
                let value = keys
                    .get(key)
                    .map_err(StoreError::from)?
                    .ok_or(ApiKeyError::UnknownKey)?;
                decode(value.value())?
            };

            if record.quota_exhausted() {
                return Err(ApiKeyError::QuotaExhausted);
            }
            if !record.allows(capability) {
                return Err(ApiKeyError::CapabilityDisabled);
            }

            record.times_used += 1;
            keys.insert(key, encode(&record)?.as_slice())
                .map_err(StoreError::from)?;
            record
        };
        write_txn.commit().map_err(StoreError::from)?;
        Ok(record)
    }
}
