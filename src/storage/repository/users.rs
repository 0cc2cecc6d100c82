// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Atelier

//! User repository: identities, balances and privacy flags.
//!
//! Users are the counterparties of every marketplace money flow. The balance
//! mutations themselves (buy, sell, refund) happen inside the component
//! repository's transactions; this repository owns creation, lookup and the
//! privacy facets consulted by the authorization pipeline.

use chrono::{DateTime, Utc};
use redb::ReadableTable;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use utoipa::ToSchema;

use crate::storage::db::{
    composite_key, composite_prefix, composite_prefix_end, composite_suffix, decode, encode,
    MarketDb, FOLLOWERS, USERS, USERS_BY_EMAIL, USERS_BY_USERNAME,
};
use crate::storage::error::{StoreError, StoreResult};

/// User roles.
///
/// `Moderator` and `Admin` hold the manage-store permission: they may mutate
/// components they do not own and see facets a user has made private.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Normal platform user
    User,
    /// Store moderator (manage-store permission)
    Moderator,
    /// Full administrative access
    Admin,
}

impl Role {
    pub fn can_manage_store(&self) -> bool {
        matches!(self, Role::Moderator | Role::Admin)
    }
}

impl Default for Role {
    fn default() -> Self {
        Role::User
    }
}

/// Per-facet visibility switches. A facet that is off hides the
/// corresponding listing from everyone except the owner and store managers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
pub struct PrivacySettings {
    pub show_profile: bool,
    pub show_image: bool,
    pub show_comments: bool,
    pub show_favorites: bool,
    pub show_projects: bool,
    pub show_components: bool,
    pub show_followers: bool,
    pub show_following: bool,
    pub show_inventory: bool,
    pub show_formations: bool,
}

impl Default for PrivacySettings {
    fn default() -> Self {
        Self {
            show_profile: true,
            show_image: true,
            show_comments: true,
            show_favorites: true,
            show_projects: true,
            show_components: true,
            show_followers: true,
            show_following: true,
            show_inventory: true,
            show_formations: true,
        }
    }
}

/// The privacy facets a route may require.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrivacyFacet {
    Profile,
    Image,
    Comments,
    Favorites,
    Projects,
    Components,
    Followers,
    Following,
    Inventory,
    Formations,
}

impl PrivacySettings {
    pub fn allows(&self, facet: PrivacyFacet) -> bool {
        match facet {
            PrivacyFacet::Profile => self.show_profile,
            PrivacyFacet::Image => self.show_image,
            PrivacyFacet::Comments => self.show_comments,
            PrivacyFacet::Favorites => self.show_favorites,
            PrivacyFacet::Projects => self.show_projects,
            PrivacyFacet::Components => self.show_components,
            PrivacyFacet::Followers => self.show_followers,
            PrivacyFacet::Following => self.show_following,
            PrivacyFacet::Inventory => self.show_inventory,
            PrivacyFacet::Formations => self.show_formations,
        }
    }
}

/// Persistent user record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredUser {
    pub user_id: String,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_picture: Option<String>,
    pub verified: bool,
    pub password_salt: String,
    pub password_digest: String,
    /// Arkhoin balance. Non-negative by construction (unsigned).
    pub balance: u64,
    pub xp: u64,
    pub role: Role,
    pub privacy: PrivacySettings,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Salted SHA-256 digest of a password.
pub fn password_digest(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hex(&hasher.finalize())
}

/// Repository for user records.
pub struct UserRepository<'a> {
    db: &'a MarketDb,
}

impl<'a> UserRepository<'a> {
    pub fn new(db: &'a MarketDb) -> Self {
        Self { db }
    }

    /// Create a new user. Username and email must be unique.
    pub fn create(&self, new: NewUser) -> StoreResult<StoredUser> {
        let user_id = uuid::Uuid::new_v4().to_string();
        let salt = uuid::Uuid::new_v4().to_string();
        let user = StoredUser {
            user_id: user_id.clone(),
            username: new.username,
            email: new.email,
            first_name: new.first_name,
            last_name: new.last_name,
            profile_picture: None,
            verified: false,
            password_digest: password_digest(&salt, &new.password),
            password_salt: salt,
            balance: 0,
            xp: 0,
            role: Role::User,
            privacy: PrivacySettings::default(),
            created_at: Utc::now(),
        };

        let write_txn = self.db.write()?;
        {
            let mut by_username = write_txn.open_table(USERS_BY_USERNAME)?;
            if by_username.get(user.username.as_str())?.is_some() {
                return Err(StoreError::AlreadyExists(format!(
                    "username {}",
                    user.username
                )));
            }
            by_username.insert(user.username.as_str(), user_id.as_str())?;

            let mut by_email = write_txn.open_table(USERS_BY_EMAIL)?;
            if by_email.get(user.email.as_str())?.is_some() {
                return Err(StoreError::AlreadyExists(format!("email {}", user.email)));
            }
            by_email.insert(user.email.as_str(), user_id.as_str())?;

            let mut users = write_txn.open_table(USERS)?;
            users.insert(user_id.as_str(), encode(&user)?.as_slice())?;
        }
        write_txn.commit()?;

        Ok(user)
    }

    /// Get a user by ID.
    pub fn get(&self, user_id: &str) -> StoreResult<StoredUser> {
        let read_txn = self.db.read()?;
        let users = read_txn.open_table(USERS)?;
        match users.get(user_id)? {
            Some(value) => decode(value.value()),
            None => Err(StoreError::NotFound(format!("user {user_id}"))),
        }
    }

    /// Get a user by username.
    pub fn get_by_username(&self, username: &str) -> StoreResult<StoredUser> {
        let read_txn = self.db.read()?;
        let by_username = read_txn.open_table(USERS_BY_USERNAME)?;
        let user_id = match by_username.get(username)? {
            Some(value) => value.value().to_string(),
            None => return Err(StoreError::NotFound(format!("user {username}"))),
        };
        let users = read_txn.open_table(USERS)?;
        match users.get(user_id.as_str())? {
            Some(value) => decode(value.value()),
            None => Err(StoreError::NotFound(format!("user {username}"))),
        }
    }

    /// Rewrite a user record in place (role, privacy, balance grants).
    pub fn update(&self, user: &StoredUser) -> StoreResult<()> {
        let write_txn = self.db.write()?;
        {
            let mut users = write_txn.open_table(USERS)?;
            if users.get(user.user_id.as_str())?.is_none() {
                return Err(StoreError::NotFound(format!("user {}", user.user_id)));
            }
            users.insert(user.user_id.as_str(), encode(user)?.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Check a password against the stored digest.
    pub fn verify_password(&self, user: &StoredUser, password: &str) -> bool {
        password_digest(&user.password_salt, password) == user.password_digest
    }

    /// Record that `follower_id` follows `following_id`.
    pub fn add_follower(&self, follower_id: &str, following_id: &str) -> StoreResult<()> {
        let write_txn = self.db.write()?;
        {
            let mut followers = write_txn.open_table(FOLLOWERS)?;
            followers.insert(composite_key(follower_id, following_id).as_slice(), ())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// All user IDs that `follower_id` follows.
    pub fn following_of(&self, follower_id: &str) -> StoreResult<Vec<String>> {
        let read_txn = self.db.read()?;
        let followers = read_txn.open_table(FOLLOWERS)?;
        let start = composite_prefix(follower_id);
        let end = composite_prefix_end(follower_id);
        let mut following = Vec::new();
        for entry in followers.range(start.as_slice()..end.as_slice())? {
            let (key, _) = entry?;
            if let Some(id) = composite_suffix(key.value()) {
                following.push(id);
            }
        }
        Ok(following)
    }
}
