// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Atelier

//! Embedded market database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `users`: user_id → serialized StoredUser
//! - `users_by_username`: username → user_id
//! - `users_by_email`: email → user_id
//! - `api_keys`: key string → serialized StoredApiKey
//! - `components`: component_id → serialized StoredComponent
//! - `component_owners`: component_id → serialized Ownership
//! - `component_publications`: component_id → unit (presence = public)
//! - `component_holders`: composite key (component_id|user_id) → HolderRecord
//! - `followers`: composite key (follower_id|following_id) → unit
//!
//! Every multi-row write runs inside a single write transaction. redb
//! serializes write transactions and rolls back any transaction dropped
//! without a commit, so no error path can leave a partial write behind.

use std::path::Path;

use redb::{Database, ReadTransaction, ReadableDatabase, TableDefinition, WriteTransaction};
use serde::{de::DeserializeOwned, Serialize};

use super::error::{StoreError, StoreResult};

// =============================================================================
// Table Definitions
// =============================================================================

/// Primary user records: user_id → serialized StoredUser (JSON bytes).
pub const USERS: TableDefinition<&str, &[u8]> = TableDefinition::new("users");

/// Unique index: username → user_id.
pub const USERS_BY_USERNAME: TableDefinition<&str, &str> =
    TableDefinition::new("users_by_username");

/// Unique index: email → user_id.
pub const USERS_BY_EMAIL: TableDefinition<&str, &str> = TableDefinition::new("users_by_email");

/// API keys: opaque key string → serialized StoredApiKey.
pub const API_KEYS: TableDefinition<&str, &[u8]> = TableDefinition::new("api_keys");

/// Component records: component_id → serialized StoredComponent.
pub const COMPONENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("components");

/// Exactly one row per component: component_id → serialized Ownership.
pub const COMPONENT_OWNERS: TableDefinition<&str, &[u8]> =
    TableDefinition::new("component_owners");

/// Presence of a row means "public"; absence means "private".
pub const COMPONENT_PUBLICATIONS: TableDefinition<&str, ()> =
    TableDefinition::new("component_publications");

/// Holder rows: composite key `component_id|user_id` → serialized HolderRecord.
pub const COMPONENT_HOLDERS: TableDefinition<&[u8], &[u8]> =
    TableDefinition::new("component_holders");

/// Follower edges: composite key `follower_id|following_id` → unit.
/// Written only by seed helpers; read by the search "following" filter.
pub const FOLLOWERS: TableDefinition<&[u8], ()> = TableDefinition::new("followers");

// =============================================================================
// Composite Key Helpers
// =============================================================================

/// Build a composite key `left|right`. IDs are UUIDs, which never contain `|`.
pub fn composite_key(left: &str, right: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(left.len() + 1 + right.len());
    key.extend_from_slice(left.as_bytes());
    key.push(b'|');
    key.extend_from_slice(right.as_bytes());
    key
}

/// Build a prefix for range scanning all rows keyed under `left`.
pub fn composite_prefix(left: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(left.len() + 1);
    prefix.extend_from_slice(left.as_bytes());
    prefix.push(b'|');
    prefix
}

/// Build the upper bound for a prefix range scan.
pub fn composite_prefix_end(left: &str) -> Vec<u8> {
    let mut end = composite_prefix(left);
    end.extend_from_slice(&[0xFF; 20]);
    end
}

/// Extract the `right` half of a composite key.
pub fn composite_suffix(key: &[u8]) -> Option<String> {
    let sep = key.iter().position(|&b| b == b'|')?;
    String::from_utf8(key[sep + 1..].to_vec()).ok()
}

// =============================================================================
// Value Codec
// =============================================================================

/// Serialize a value for storage (JSON bytes, the content columns of the
/// schema are serialized JSON per the external interface contract).
pub fn encode<T: Serialize>(value: &T) -> StoreResult<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

/// Deserialize a stored value.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StoreResult<T> {
    Ok(serde_json::from_slice(bytes)?)
}

// =============================================================================
// MarketDb
// =============================================================================

/// Embedded ACID database holding all marketplace state.
pub struct MarketDb {
    db: Database,
}

impl MarketDb {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(USERS)?;
            let _ = write_txn.open_table(USERS_BY_USERNAME)?;
            let _ = write_txn.open_table(USERS_BY_EMAIL)?;
            let _ = write_txn.open_table(API_KEYS)?;
            let _ = write_txn.open_table(COMPONENTS)?;
            let _ = write_txn.open_table(COMPONENT_OWNERS)?;
            let _ = write_txn.open_table(COMPONENT_PUBLICATIONS)?;
            let _ = write_txn.open_table(COMPONENT_HOLDERS)?;
            let _ = write_txn.open_table(FOLLOWERS)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    /// Begin a write transaction. redb admits one writer at a time, so
    /// money-affecting operations on the same rows serialize. Dropping the
    /// transaction without `commit` rolls back.
    pub fn write(&self) -> StoreResult<WriteTransaction> {
        Ok(self.db.begin_write()?)
    }

    /// Begin a read transaction (MVCC snapshot).
    pub fn read(&self) -> StoreResult<ReadTransaction> {
        Ok(self.db.begin_read()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redb::ReadableTable;

    fn temp_db() -> (MarketDb, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = MarketDb::open(&dir.path().join("test.redb")).unwrap();
        (db, dir)
    }

    #[test]
    fn open_precreates_tables() {
        let (db, _dir) = temp_db();
        // Reading a fresh table must not fail.
        let read_txn = db.read().unwrap();
        let table = read_txn.open_table(COMPONENTS).unwrap();
        assert!(table.get("missing").unwrap().is_none());
    }

    #[test]
    fn dropped_transaction_rolls_back() {
        let (db, _dir) = temp_db();
        {
            let write_txn = db.write().unwrap();
            {
                let mut table = write_txn.open_table(COMPONENTS).unwrap();
                table.insert("c1", b"data".as_slice()).unwrap();
            }
            // no commit: dropped here
        }
        let read_txn = db.read().unwrap();
        let table = read_txn.open_table(COMPONENTS).unwrap();
        assert!(table.get("c1").unwrap().is_none());
    }

    #[test]
    fn composite_keys_scan_within_prefix() {
        let (db, _dir) = temp_db();
        let write_txn = db.write().unwrap();
        {
            let mut table = write_txn.open_table(COMPONENT_HOLDERS).unwrap();
            table
                .insert(composite_key("comp-a", "user-1").as_slice(), b"x".as_slice())
                .unwrap();
            table
                .insert(composite_key("comp-a", "user-2").as_slice(), b"x".as_slice())
                .unwrap();
            table
                .insert(composite_key("comp-b", "user-1").as_slice(), b"x".as_slice())
                .unwrap();
        }
        write_txn.commit().unwrap();

        let read_txn = db.read().unwrap();
        let table = read_txn.open_table(COMPONENT_HOLDERS).unwrap();
        let start = composite_prefix("comp-a");
        let end = composite_prefix_end("comp-a");
        let mut users = Vec::new();
        for entry in table.range(start.as_slice()..end.as_slice()).unwrap() {
            let (key, _) = entry.unwrap();
            users.push(composite_suffix(key.value()).unwrap());
        }
        assert_eq!(users, vec!["user-1".to_string(), "user-2".to_string()]);
    }

    #[test]
    fn encode_decode_round_trip() {
        #[derive(serde::Serialize, serde::Deserialize, PartialEq, Debug)]
        struct Doc {
            name: String,
            price: u64,
        }
        let doc = Doc {
            name: "button".into(),
            price: 42,
        };
        let bytes = encode(&doc).unwrap();
        let back: Doc = decode(&bytes).unwrap();
        assert_eq!(back, doc);
    }
}
