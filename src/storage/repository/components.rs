// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Atelier

//! Component repository: the transactional core of the marketplace.
//!
//! Owns every component read and write, including the buy/sell/refund money
//! flow and the trash lifecycle. All multi-row writes run inside a single
//! write transaction; any early return drops the transaction un-committed,
//! which rolls it back.
//!
//! ## Lifecycle
//!
//! ```text
//!  (created, private) --publish--> (created, public)
//!                       <--unpublish + refund--
//!  any non-trashed --safe_delete + refund--> (trashed)
//!  (trashed) --restore--> prior non-trashed state
//!  (trashed) --unsafe_delete--> (purged)
//! ```

use chrono::{DateTime, Utc};
use redb::{ReadTransaction, ReadableTable};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::storage::db::{
    composite_key, composite_prefix, composite_prefix_end, composite_suffix, decode, encode,
    MarketDb, COMPONENTS, COMPONENT_HOLDERS, COMPONENT_OWNERS, COMPONENT_PUBLICATIONS, FOLLOWERS,
    USERS,
};
use crate::storage::error::{StoreError, StoreResult};
use crate::storage::pagination::{paginate, Page};

use super::users::StoredUser;

// =============================================================================
// Errors
// =============================================================================

/// Business-rule violations. Handlers match each variant explicitly and
/// translate it to a localized HTTP response.
#[derive(Debug, thiserror::Error)]
pub enum ComponentError {
    #[error("insufficient arkhoins")]
    InsufficientArkhoins,
    #[error("component not found")]
    ComponentNotFound,
    #[error("component is not trashed")]
    ComponentNotTrashed,
    #[error("component is already trashed")]
    ComponentAlreadyTrashed,
    #[error("component is not public")]
    ComponentNotPublic,
    #[error("component is already public")]
    ComponentAlreadyPublic,
    #[error("component is not owned")]
    ComponentNotOwned,
    #[error("component is already owned")]
    ComponentAlreadyOwned,
    #[error("the owner cannot buy their own component")]
    ComponentOwnerCannotBuy,
    #[error("the owner cannot sell their own component")]
    ComponentOwnerCannotSell,
    #[error("user not found")]
    UserNotFound,
    #[error("invalid search pattern")]
    InvalidSearchPattern,
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type ComponentResult<T> = Result<T, ComponentError>;

// =============================================================================
// Records
// =============================================================================

/// Who owns a component. Exactly one ownership row exists per component;
/// `Orphaned` replaces the source schema's nullable user id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Ownership {
    User { user_id: String },
    Orphaned,
}

impl Ownership {
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Ownership::User { user_id } => Some(user_id),
            Ownership::Orphaned => None,
        }
    }
}

/// Persistent component record. Publication and ownership live in their own
/// tables; `deleted_at` marks the trashed state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredComponent {
    pub component_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    pub name: String,
    pub description: String,
    /// Opaque structured document, stored as serialized JSON.
    pub content: Value,
    pub price: u64,
    pub budget: u64,
}

/// Holder row: one per (component, user), capturing the price at purchase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HolderRecord {
    pub price_paid: u64,
    pub held_at: DateTime<Utc>,
}

/// Input for creating a component.
#[derive(Debug, Clone)]
pub struct NewComponent {
    pub name: String,
    pub description: String,
    pub content: Value,
    pub price: u64,
    pub budget: u64,
    pub public: bool,
}

/// Field updates applied by `update`. `public` toggles the publication row
/// and, on unpublish, refunds every holder.
#[derive(Debug, Clone, Default)]
pub struct ComponentPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub content: Option<Value>,
    pub price: Option<u64>,
    pub budget: Option<u64>,
    pub public: Option<bool>,
}

// =============================================================================
// Views
// =============================================================================

/// Denormalized owner fields projected into every component view.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OwnerView {
    pub user_id: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_picture: Option<String>,
    pub verified: bool,
}

impl OwnerView {
    fn from_user(user: &StoredUser) -> Self {
        Self {
            user_id: user.user_id.clone(),
            username: user.username.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            profile_picture: user.profile_picture.clone(),
            verified: user.verified,
        }
    }
}

/// The uniform projection every read returns: component fields, denormalized
/// owner, computed counters and the viewer-relative purchase fields.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ComponentView {
    pub component_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    pub name: String,
    pub description: String,
    #[schema(value_type = Object)]
    pub content: Value,
    pub price: u64,
    pub budget: u64,
    /// None when the component is orphaned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<OwnerView>,
    pub holders: u64,
    pub total_sells: u64,
    pub is_public: bool,
    pub bought: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paid_price: Option<u64>,
    /// Alias of `paid_price`: what the viewer would receive on sell-back.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sell_price: Option<u64>,
}

/// One row per holder of a component.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HolderView {
    pub user: OwnerView,
    pub price_paid: u64,
    pub held_at: DateTime<Utc>,
}

/// The requesting identity, as the repository sees it.
#[derive(Debug, Clone, Copy)]
pub struct Viewer<'v> {
    pub user_id: &'v str,
    pub manage_store: bool,
}

// =============================================================================
// Search
// =============================================================================

/// Sort keys accepted by `search`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SearchOrder {
    Name,
    CreatedAt,
    UpdatedAt,
    Holders,
}

/// Search parameters.
#[derive(Debug, Clone)]
pub struct SearchCriteria {
    pub query: String,
    /// Restrict to components whose owners the viewer follows.
    pub following_only: bool,
    pub order: SearchOrder,
    pub descending: bool,
}

impl Default for SearchCriteria {
    fn default() -> Self {
        Self {
            query: String::new(),
            following_only: false,
            order: SearchOrder::CreatedAt,
            descending: true,
        }
    }
}

/// Expand each lowercased character through the diacritic folding table.
/// Characters outside the table pass through verbatim, so the result is
/// still a regex supplied by the caller.
pub fn fold_diacritics(input: &str) -> String {
    let mut folded = String::with_capacity(input.len() * 2);
    for c in input.to_lowercase().chars() {
        match c {
            'a' => folded.push_str("[aáàãâä]"),
            'e' => folded.push_str("[eéèẽêë]"),
            'i' => folded.push_str("[iíìĩîï]"),
            'o' => folded.push_str("[oóòõôö]"),
            'u' => folded.push_str("[uúùũûü]"),
            'n' => folded.push_str("[nñ]"),
            'c' => folded.push_str("[cç]"),
            's' => folded.push_str("[sśš]"),
            'z' => folded.push_str("[zźżž]"),
            other => folded.push(other),
        }
    }
    folded
}

fn build_search_regex(query: &str) -> ComponentResult<regex::Regex> {
    regex::Regex::new(&format!("(?i){}", fold_diacritics(query)))
        .map_err(|_| ComponentError::InvalidSearchPattern)
}

// =============================================================================
// Read-side table bundle
// =============================================================================

type StrBytesTable = redb::ReadOnlyTable<&'static str, &'static [u8]>;

struct ReadTables {
    components: StrBytesTable,
    owners: StrBytesTable,
    publications: redb::ReadOnlyTable<&'static str, ()>,
    holders: redb::ReadOnlyTable<&'static [u8], &'static [u8]>,
    users: StrBytesTable,
}

impl ReadTables {
    fn open(txn: &ReadTransaction) -> StoreResult<Self> {
        Ok(Self {
            components: txn.open_table(COMPONENTS)?,
            owners: txn.open_table(COMPONENT_OWNERS)?,
            publications: txn.open_table(COMPONENT_PUBLICATIONS)?,
            holders: txn.open_table(COMPONENT_HOLDERS)?,
            users: txn.open_table(USERS)?,
        })
    }

    fn component(&self, component_id: &str) -> StoreResult<Option<StoredComponent>> {
        match self.components.get(component_id)? {
            Some(value) => Ok(Some(decode(value.value())?)),
            None => Ok(None),
        }
    }

    fn ownership(&self, component_id: &str) -> StoreResult<Ownership> {
        match self.owners.get(component_id)? {
            Some(value) => decode(value.value()),
            // The invariant is one row per component; a missing row is an
            // orphan left by partial legacy data.
            None => Ok(Ownership::Orphaned),
        }
    }

    fn owner_view(&self, component_id: &str) -> StoreResult<Option<OwnerView>> {
        let ownership = self.ownership(component_id)?;
        let Some(user_id) = ownership.user_id() else {
            return Ok(None);
        };
        match self.users.get(user_id)? {
            Some(value) => {
                let user: StoredUser = decode(value.value())?;
                Ok(Some(OwnerView::from_user(&user)))
            }
            None => Ok(None),
        }
    }

    fn is_public(&self, component_id: &str) -> StoreResult<bool> {
        Ok(self.publications.get(component_id)?.is_some())
    }

    /// All holder rows of a component, as (user_id, record) pairs.
    fn holder_records(&self, component_id: &str) -> StoreResult<Vec<(String, HolderRecord)>> {
        let start = composite_prefix(component_id);
        let end = composite_prefix_end(component_id);
        let mut records = Vec::new();
        for entry in self.holders.range(start.as_slice()..end.as_slice())? {
            let (key, value) = entry?;
            if let Some(user_id) = composite_suffix(key.value()) {
                records.push((user_id, decode(value.value())?));
            }
        }
        Ok(records)
    }

    /// Component IDs held by a user. Full-table scan; holder rows are keyed
    /// by component, not user.
    fn holdings_of(&self, user_id: &str) -> StoreResult<Vec<String>> {
        let mut ids = Vec::new();
        for entry in self.holders.iter()? {
            let (key, _) = entry?;
            let key = key.value();
            if composite_suffix(key).as_deref() == Some(user_id) {
                let sep = key.iter().position(|&b| b == b'|').unwrap_or(key.len());
                if let Ok(component_id) = String::from_utf8(key[..sep].to_vec()) {
                    ids.push(component_id);
                }
            }
        }
        Ok(ids)
    }

    fn view(
        &self,
        component: &StoredComponent,
        viewer: Option<Viewer<'_>>,
    ) -> StoreResult<ComponentView> {
        let holder_records = self.holder_records(&component.component_id)?;
        let holders = holder_records.len() as u64;
        let total_sells: u64 = holder_records.iter().map(|(_, r)| r.price_paid).sum();

        let paid_price = viewer.and_then(|v| {
            holder_records
                .iter()
                .find(|(user_id, _)| user_id == v.user_id)
                .map(|(_, record)| record.price_paid)
        });

        Ok(ComponentView {
            component_id: component.component_id.clone(),
            created_at: component.created_at,
            updated_at: component.updated_at,
            deleted_at: component.deleted_at,
            name: component.name.clone(),
            description: component.description.clone(),
            content: component.content.clone(),
            price: component.price,
            budget: component.budget,
            owner: self.owner_view(&component.component_id)?,
            holders,
            total_sells,
            is_public: self.is_public(&component.component_id)?,
            bought: paid_price.is_some(),
            paid_price,
            sell_price: paid_price,
        })
    }

    /// Every non-trashed component ID carrying a publication row.
    fn published_ids(&self) -> StoreResult<Vec<String>> {
        let mut ids = Vec::new();
        for entry in self.publications.iter()? {
            let (key, _) = entry?;
            ids.push(key.value().to_string());
        }
        Ok(ids)
    }

    /// Component IDs owned by a user.
    fn owned_by(&self, user_id: &str) -> StoreResult<Vec<String>> {
        let mut ids = Vec::new();
        for entry in self.owners.iter()? {
            let (key, value) = entry?;
            let ownership: Ownership = decode(value.value())?;
            if ownership.user_id() == Some(user_id) {
                ids.push(key.value().to_string());
            }
        }
        Ok(ids)
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for component reads, writes and the money flow.
pub struct ComponentRepository<'a> {
    db: &'a MarketDb,
}

impl<'a> ComponentRepository<'a> {
    pub fn new(db: &'a MarketDb) -> Self {
        Self { db }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Load a component for a viewer. Trashed components and private
    /// components the viewer neither owns nor manages answer not-found, so
    /// existence cannot be probed.
    pub fn get_for_viewer(
        &self,
        component_id: &str,
        viewer: Option<Viewer<'_>>,
    ) -> ComponentResult<ComponentView> {
        let read_txn = self.db.read()?;
        let tables = ReadTables::open(&read_txn)?;

        let component = tables
            .component(component_id)?
            .ok_or(ComponentError::ComponentNotFound)?;
        if component.deleted_at.is_some() {
            return Err(ComponentError::ComponentNotFound);
        }

        if !tables.is_public(component_id)? {
            let ownership = tables.ownership(component_id)?;
            let allowed = viewer.is_some_and(|v| {
                v.manage_store || ownership.user_id() == Some(v.user_id)
            });
            if !allowed {
                return Err(ComponentError::ComponentNotFound);
            }
        }

        Ok(tables.view(&component, viewer)?)
    }

    /// Ownership row for a component, for the ownership filter. Not-found
    /// when the component does not exist at all (trashed rows are visible
    /// here; the trash routes operate on them).
    pub fn ownership(&self, component_id: &str) -> ComponentResult<Ownership> {
        let read_txn = self.db.read()?;
        let tables = ReadTables::open(&read_txn)?;
        if tables.component(component_id)?.is_none() {
            return Err(ComponentError::ComponentNotFound);
        }
        Ok(tables.ownership(component_id)?)
    }

    /// Published components, optionally free ones only.
    pub fn get_public(
        &self,
        viewer: Option<Viewer<'_>>,
        free_only: bool,
        page: u64,
        per_page: u64,
    ) -> ComponentResult<Page<ComponentView>> {
        let read_txn = self.db.read()?;
        let tables = ReadTables::open(&read_txn)?;

        let mut components = Vec::new();
        for id in tables.published_ids()? {
            let Some(component) = tables.component(&id)? else {
                continue;
            };
            if component.deleted_at.is_some() {
                continue;
            }
            if free_only && component.price != 0 {
                continue;
            }
            components.push(component);
        }

        self.finish_listing(&tables, components, viewer, page, per_page)
    }

    /// Components owned by `owner_id`, optionally published ones only.
    pub fn get_by_owner(
        &self,
        viewer: Option<Viewer<'_>>,
        owner_id: &str,
        only_public: bool,
        page: u64,
        per_page: u64,
    ) -> ComponentResult<Page<ComponentView>> {
        let read_txn = self.db.read()?;
        let tables = ReadTables::open(&read_txn)?;

        let mut components = Vec::new();
        for id in tables.owned_by(owner_id)? {
            let Some(component) = tables.component(&id)? else {
                continue;
            };
            if component.deleted_at.is_some() {
                continue;
            }
            if only_public && !tables.is_public(&id)? {
                continue;
            }
            components.push(component);
        }

        self.finish_listing(&tables, components, viewer, page, per_page)
    }

    /// Components held by `user_id` OR owned by `user_id`.
    pub fn get_owned(
        &self,
        viewer: Option<Viewer<'_>>,
        user_id: &str,
        only_public: bool,
        page: u64,
        per_page: u64,
    ) -> ComponentResult<Page<ComponentView>> {
        let read_txn = self.db.read()?;
        let tables = ReadTables::open(&read_txn)?;

        let mut ids = tables.holdings_of(user_id)?;
        for id in tables.owned_by(user_id)? {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }

        let mut components = Vec::new();
        for id in ids {
            let Some(component) = tables.component(&id)? else {
                continue;
            };
            if component.deleted_at.is_some() {
                continue;
            }
            if only_public && !tables.is_public(&id)? {
                continue;
            }
            components.push(component);
        }

        self.finish_listing(&tables, components, viewer, page, per_page)
    }

    /// Soft-deleted components owned by `owner_id`.
    pub fn get_trashed(
        &self,
        owner_id: &str,
        page: u64,
        per_page: u64,
    ) -> ComponentResult<Page<ComponentView>> {
        let read_txn = self.db.read()?;
        let tables = ReadTables::open(&read_txn)?;

        let mut components = Vec::new();
        for id in tables.owned_by(owner_id)? {
            let Some(component) = tables.component(&id)? else {
                continue;
            };
            if component.deleted_at.is_none() {
                continue;
            }
            components.push(component);
        }

        let viewer = Some(Viewer {
            user_id: owner_id,
            manage_store: false,
        });
        self.finish_listing(&tables, components, viewer, page, per_page)
    }

    /// The holders of a component, one row per holder.
    pub fn get_holders(
        &self,
        component_id: &str,
        page: u64,
        per_page: u64,
    ) -> ComponentResult<Page<HolderView>> {
        let read_txn = self.db.read()?;
        let tables = ReadTables::open(&read_txn)?;

        if tables.component(component_id)?.is_none() {
            return Err(ComponentError::ComponentNotFound);
        }

        let mut rows = Vec::new();
        for (user_id, record) in tables.holder_records(component_id)? {
            let Some(value) = tables.users.get(user_id.as_str()).map_err(StoreError::from)? else {
                continue;
            };
            let user: StoredUser = decode(value.value())?;
            rows.push(HolderView {
                user: OwnerView::from_user(&user),
                price_paid: record.price_paid,
                held_at: record.held_at,
            });
        }
        rows.sort_by(|a, b| a.held_at.cmp(&b.held_at));

        Ok(paginate(rows, page, per_page))
    }

    /// Search published, non-trashed components with a case-insensitive,
    /// diacritic-folded pattern over name, description and owner names.
    pub fn search(
        &self,
        viewer: Option<Viewer<'_>>,
        criteria: &SearchCriteria,
        page: u64,
        per_page: u64,
    ) -> ComponentResult<Page<ComponentView>> {
        let pattern = build_search_regex(&criteria.query)?;

        let read_txn = self.db.read()?;
        let tables = ReadTables::open(&read_txn)?;

        let following: Option<Vec<String>> = if criteria.following_only {
            let Some(v) = viewer else {
                // No identity to follow from.
                return Ok(paginate(Vec::new(), page, per_page));
            };
            let followers = read_txn.open_table(FOLLOWERS).map_err(StoreError::from)?;
            let start = composite_prefix(v.user_id);
            let end = composite_prefix_end(v.user_id);
            let mut ids = Vec::new();
            for entry in followers
                .range(start.as_slice()..end.as_slice())
                .map_err(StoreError::from)?
            {
                let (key, _) = entry.map_err(StoreError::from)?;
                if let Some(id) = composite_suffix(key.value()) {
                    ids.push(id);
                }
            }
            Some(ids)
        } else {
            None
        };

        let mut matches = Vec::new();
        for id in tables.published_ids()? {
            let Some(component) = tables.component(&id)? else {
                continue;
            };
            if component.deleted_at.is_some() {
                continue;
            }
            let owner = tables.owner_view(&id)?;

            if let Some(following) = &following {
                let followed = owner
                    .as_ref()
                    .is_some_and(|o| following.contains(&o.user_id));
                if !followed {
                    continue;
                }
            }

            let mut haystacks = vec![component.name.clone(), component.description.clone()];
            if let Some(owner) = &owner {
                haystacks.push(owner.first_name.clone());
                haystacks.push(owner.last_name.clone());
                haystacks.push(owner.username.clone());
            }
            if haystacks.iter().any(|h| pattern.is_match(h)) {
                matches.push(component);
            }
        }

        let mut views = Vec::with_capacity(matches.len());
        for component in &matches {
            views.push(tables.view(component, viewer)?);
        }

        views.sort_by(|a, b| {
            let ordering = match criteria.order {
                SearchOrder::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
                SearchOrder::CreatedAt => a.created_at.cmp(&b.created_at),
                SearchOrder::UpdatedAt => a.updated_at.cmp(&b.updated_at),
                SearchOrder::Holders => a.holders.cmp(&b.holders),
            };
            if criteria.descending {
                ordering.reverse()
            } else {
                ordering
            }
        });

        Ok(paginate(views, page, per_page))
    }

    /// Project, order (newest first) and paginate a filtered component set.
    fn finish_listing(
        &self,
        tables: &ReadTables,
        mut components: Vec<StoredComponent>,
        viewer: Option<Viewer<'_>>,
        page: u64,
        per_page: u64,
    ) -> ComponentResult<Page<ComponentView>> {
        components.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let mut views = Vec::with_capacity(components.len());
        for component in &components {
            views.push(tables.view(component, viewer)?);
        }
        Ok(paginate(views, page, per_page))
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Create a component, its ownership row and, when requested, its
    /// publication row, in one transaction.
    pub fn create(&self, creator_id: &str, new: NewComponent) -> ComponentResult<StoredComponent> {
        let now = Utc::now();
        let component = StoredComponent {
            component_id: uuid::Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
            name: new.name,
            description: new.description,
            content: new.content,
            price: new.price,
            budget: new.budget,
        };

        let write_txn = self.db.write().map_err(StoreError::from)?;
        {
            let mut components = write_txn.open_table(COMPONENTS).map_err(StoreError::from)?;
            components
                .insert(
                    component.component_id.as_str(),
                    encode(&component)?.as_slice(),
                )
                .map_err(StoreError::from)?;

            let mut owners = write_txn
                .open_table(COMPONENT_OWNERS)
                .map_err(StoreError::from)?;
            let ownership = Ownership::User {
                user_id: creator_id.to_string(),
            };
            owners
                .insert(
                    component.component_id.as_str(),
                    encode(&ownership)?.as_slice(),
                )
                .map_err(StoreError::from)?;

            if new.public {
                let mut publications = write_txn
                    .open_table(COMPONENT_PUBLICATIONS)
                    .map_err(StoreError::from)?;
                publications
                    .insert(component.component_id.as_str(), ())
                    .map_err(StoreError::from)?;
            }
        }
        write_txn.commit().map_err(StoreError::from)?;

        Ok(component)
    }

    /// Apply a patch. Publication transitions are handled first: publishing
    /// an already-public component fails, unpublishing refunds every holder.
    pub fn update(&self, component_id: &str, patch: ComponentPatch) -> ComponentResult<()> {
        let write_txn = self.db.write().map_err(StoreError::from)?;
        {
            let mut components = write_txn.open_table(COMPONENTS).map_err(StoreError::from)?;

            // Trashed components are still updatable; the lookup is unscoped.
            let mut component: StoredComponent = {
                let value = components
                    .get(component_id)
                    .map_err(StoreError::from)?
                    .ok_or(ComponentError::ComponentNotFound)?;
                decode(value.value())?
            };

            if let Some(public) = patch.public {
                let mut publications = write_txn
                    .open_table(COMPONENT_PUBLICATIONS)
                    .map_err(StoreError::from)?;
                let currently_public = publications
                    .get(component_id)
                    .map_err(StoreError::from)?
                    .is_some();

                if public {
                    if currently_public {
                        return Err(ComponentError::ComponentAlreadyPublic);
                    }
                    publications
                        .insert(component_id, ())
                        .map_err(StoreError::from)?;
                } else {
                    if !currently_public {
                        return Err(ComponentError::ComponentNotPublic);
                    }
                    publications.remove(component_id).map_err(StoreError::from)?;

                    let mut holders = write_txn
                        .open_table(COMPONENT_HOLDERS)
                        .map_err(StoreError::from)?;
                    let mut users = write_txn.open_table(USERS).map_err(StoreError::from)?;
                    let owners = write_txn
                        .open_table(COMPONENT_OWNERS)
                        .map_err(StoreError::from)?;
                    let ownership: Ownership = match owners.get(component_id).map_err(StoreError::from)? {
                        Some(value) => decode(value.value())?,
                        None => Ownership::Orphaned,
                    };
                    refund_holders(&mut holders, &mut users, component_id, &ownership)?;
                }
            }

            if let Some(name) = patch.name {
                component.name = name;
            }
            if let Some(description) = patch.description {
                component.description = description;
            }
            if let Some(content) = patch.content {
                component.content = content;
            }
            if let Some(price) = patch.price {
                component.price = price;
            }
            if let Some(budget) = patch.budget {
                component.budget = budget;
            }
            component.updated_at = Utc::now();

            components
                .insert(component_id, encode(&component)?.as_slice())
                .map_err(StoreError::from)?;
        }
        write_txn.commit().map_err(StoreError::from)?;
        Ok(())
    }

    /// Insert the publication row. Fails on an already-public component.
    pub fn publish(&self, component_id: &str) -> ComponentResult<()> {
        self.update(
            component_id,
            ComponentPatch {
                public: Some(true),
                ..Default::default()
            },
        )
    }

    /// Remove the publication row and refund every holder.
    pub fn unpublish(&self, component_id: &str) -> ComponentResult<()> {
        self.update(
            component_id,
            ComponentPatch {
                public: Some(false),
                ..Default::default()
            },
        )
    }

    /// Purchase: transfer the price from buyer to owner and insert the
    /// holder row capturing the price paid, all in one transaction.
    pub fn buy(&self, buyer_id: &str, component_id: &str) -> ComponentResult<()> {
        let write_txn = self.db.write().map_err(StoreError::from)?;
        {
            let components = write_txn.open_table(COMPONENTS).map_err(StoreError::from)?;
            let component: StoredComponent = {
                let value = components
                    .get(component_id)
                    .map_err(StoreError::from)?
                    .ok_or(ComponentError::ComponentNotFound)?;
                decode(value.value())?
            };
            if component.deleted_at.is_some() {
                return Err(ComponentError::ComponentNotFound);
            }

            let publications = write_txn
                .open_table(COMPONENT_PUBLICATIONS)
                .map_err(StoreError::from)?;
            if publications
                .get(component_id)
                .map_err(StoreError::from)?
                .is_none()
            {
                return Err(ComponentError::ComponentNotPublic);
            }

            let mut users = write_txn.open_table(USERS).map_err(StoreError::from)?;
            let mut buyer: StoredUser = {
                let value = users
                    .get(buyer_id)
                    .map_err(StoreError::from)?
                    .ok_or(ComponentError::UserNotFound)?;
                decode(value.value())?
            };
            if buyer.balance < component.price {
                return Err(ComponentError::InsufficientArkhoins);
            }

            let mut holders = write_txn
                .open_table(COMPONENT_HOLDERS)
                .map_err(StoreError::from)?;
            let holder_key = composite_key(component_id, buyer_id);
            if holders
                .get(holder_key.as_slice())
                .map_err(StoreError::from)?
                .is_some()
            {
                return Err(ComponentError::ComponentAlreadyOwned);
            }

            let owners = write_txn
                .open_table(COMPONENT_OWNERS)
                .map_err(StoreError::from)?;
            let ownership: Ownership = match owners.get(component_id).map_err(StoreError::from)? {
                Some(value) => decode(value.value())?,
                None => Ownership::Orphaned,
            };
            if ownership.user_id() == Some(buyer_id) {
                return Err(ComponentError::ComponentOwnerCannotBuy);
            }

            // Credit the owner first; an orphaned component keeps no
            // proceeds but the purchase still stands.
            if let Some(owner_id) = ownership.user_id() {
                let mut owner: StoredUser = {
                    let value = users
                        .get(owner_id)
                        .map_err(StoreError::from)?
                        .ok_or(ComponentError::UserNotFound)?;
                    decode(value.value())?
                };
                owner.balance += component.price;
                users
                    .insert(owner_id, encode(&owner)?.as_slice())
                    .map_err(StoreError::from)?;
            }

            buyer.balance -= component.price;
            users
                .insert(buyer_id, encode(&buyer)?.as_slice())
                .map_err(StoreError::from)?;

            let record = HolderRecord {
                price_paid: component.price,
                held_at: Utc::now(),
            };
            holders
                .insert(holder_key.as_slice(), encode(&record)?.as_slice())
                .map_err(StoreError::from)?;
        }
        write_txn.commit().map_err(StoreError::from)?;
        Ok(())
    }

    /// Sell-back: return the captured price to the holder and remove the
    /// holder row. The owner is not debited here; only unpublish and
    /// safe-delete run the full refund.
    pub fn sell(&self, seller_id: &str, component_id: &str) -> ComponentResult<()> {
        let write_txn = self.db.write().map_err(StoreError::from)?;
        {
            let mut holders = write_txn
                .open_table(COMPONENT_HOLDERS)
                .map_err(StoreError::from)?;
            let holder_key = composite_key(component_id, seller_id);
            let record: HolderRecord = {
                let value = holders
                    .get(holder_key.as_slice())
                    .map_err(StoreError::from)?
                    .ok_or(ComponentError::ComponentNotOwned)?;
                decode(value.value())?
            };

            let owners = write_txn
                .open_table(COMPONENT_OWNERS)
                .map_err(StoreError::from)?;
            let ownership: Ownership = match owners.get(component_id).map_err(StoreError::from)? {
                Some(value) => decode(value.value())?,
                None => Ownership::Orphaned,
            };
            if ownership.user_id() == Some(seller_id) {
                return Err(ComponentError::ComponentOwnerCannotSell);
            }

            let mut users = write_txn.open_table(USERS).map_err(StoreError::from)?;
            let mut seller: StoredUser = {
                let value = users
                    .get(seller_id)
                    .map_err(StoreError::from)?
                    .ok_or(ComponentError::UserNotFound)?;
                decode(value.value())?
            };
            seller.balance += record.price_paid;
            users
                .insert(seller_id, encode(&seller)?.as_slice())
                .map_err(StoreError::from)?;

            holders
                .remove(holder_key.as_slice())
                .map_err(StoreError::from)?;
        }
        write_txn.commit().map_err(StoreError::from)?;
        Ok(())
    }

    /// Soft-delete: refund every holder, then set `deleted_at`.
    pub fn safe_delete(&self, component_id: &str) -> ComponentResult<()> {
        let write_txn = self.db.write().map_err(StoreError::from)?;
        {
            let mut components = write_txn.open_table(COMPONENTS).map_err(StoreError::from)?;
            let mut component: StoredComponent = {
                let value = components
                    .get(component_id)
                    .map_err(StoreError::from)?
                    .ok_or(ComponentError::ComponentNotFound)?;
                decode(value.value())?
            };
            if component.deleted_at.is_some() {
                return Err(ComponentError::ComponentAlreadyTrashed);
            }

            let mut holders = write_txn
                .open_table(COMPONENT_HOLDERS)
                .map_err(StoreError::from)?;
            let mut users = write_txn.open_table(USERS).map_err(StoreError::from)?;
            let owners = write_txn
                .open_table(COMPONENT_OWNERS)
                .map_err(StoreError::from)?;
            let ownership: Ownership = match owners.get(component_id).map_err(StoreError::from)? {
                Some(value) => decode(value.value())?,
                None => Ownership::Orphaned,
            };
            refund_holders(&mut holders, &mut users, component_id, &ownership)?;

            component.deleted_at = Some(Utc::now());
            components
                .insert(component_id, encode(&component)?.as_slice())
                .map_err(StoreError::from)?;
        }
        write_txn.commit().map_err(StoreError::from)?;
        Ok(())
    }

    /// Restore a trashed component. Holders are not re-created.
    pub fn restore(&self, component_id: &str) -> ComponentResult<()> {
        let write_txn = self.db.write().map_err(StoreError::from)?;
        {
            let mut components = write_txn.open_table(COMPONENTS).map_err(StoreError::from)?;
            let mut component: StoredComponent = {
                let value = components
                    .get(component_id)
                    .map_err(StoreError::from)?
                    .ok_or(ComponentError::ComponentNotFound)?;
                decode(value.value())?
            };
            if component.deleted_at.is_none() {
                return Err(ComponentError::ComponentNotTrashed);
            }

            component.deleted_at = None;
            components
                .insert(component_id, encode(&component)?.as_slice())
                .map_err(StoreError::from)?;
        }
        write_txn.commit().map_err(StoreError::from)?;
        Ok(())
    }

    /// Hard-delete a trashed component and every row referencing it.
    pub fn unsafe_delete(&self, component_id: &str) -> ComponentResult<()> {
        let write_txn = self.db.write().map_err(StoreError::from)?;
        {
            let mut components = write_txn.open_table(COMPONENTS).map_err(StoreError::from)?;
            let component: StoredComponent = {
                let value = components
                    .get(component_id)
                    .map_err(StoreError::from)?
                    .ok_or(ComponentError::ComponentNotFound)?;
                decode(value.value())?
            };
            if component.deleted_at.is_none() {
                return Err(ComponentError::ComponentNotTrashed);
            }

            let mut holders = write_txn
                .open_table(COMPONENT_HOLDERS)
                .map_err(StoreError::from)?;
            let mut publications = write_txn
                .open_table(COMPONENT_PUBLICATIONS)
                .map_err(StoreError::from)?;
            let mut owners = write_txn
                .open_table(COMPONENT_OWNERS)
                .map_err(StoreError::from)?;
            purge(
                &mut components,
                &mut owners,
                &mut publications,
                &mut holders,
                component_id,
            )?;
        }
        write_txn.commit().map_err(StoreError::from)?;
        Ok(())
    }

    /// Hard-delete every trashed component owned by a user, with all
    /// dependent rows, in one transaction. Returns the number purged.
    pub fn clear_trash(&self, user_id: &str) -> ComponentResult<u64> {
        let write_txn = self.db.write().map_err(StoreError::from)?;
        let purged = {
            let mut components = write_txn.open_table(COMPONENTS).map_err(StoreError::from)?;
            let mut holders = write_txn
                .open_table(COMPONENT_HOLDERS)
                .map_err(StoreError::from)?;
            let mut publications = write_txn
                .open_table(COMPONENT_PUBLICATIONS)
                .map_err(StoreError::from)?;
            let mut owners = write_txn
                .open_table(COMPONENT_OWNERS)
                .map_err(StoreError::from)?;

            let mut targets = Vec::new();
            for entry in owners.iter().map_err(StoreError::from)? {
                let (key, value) = entry.map_err(StoreError::from)?;
                let ownership: Ownership = decode(value.value())?;
                if ownership.user_id() != Some(user_id) {
                    continue;
                }
                let component_id = key.value().to_string();
                let trashed = match components
                    .get(component_id.as_str())
                    .map_err(StoreError::from)?
                {
                    Some(value) => {
                        let component: StoredComponent = decode(value.value())?;
                        component.deleted_at.is_some()
                    }
                    None => false,
                };
                if trashed {
                    targets.push(component_id);
                }
            }

            for component_id in &targets {
                purge(
                    &mut components,
                    &mut owners,
                    &mut publications,
                    &mut holders,
                    component_id,
                )?;
            }
            targets.len() as u64
        };
        write_txn.commit().map_err(StoreError::from)?;
        Ok(purged)
    }
}

type WriteStrBytes<'txn> = redb::Table<'txn, &'static str, &'static [u8]>;
type WriteBytesBytes<'txn> = redb::Table<'txn, &'static [u8], &'static [u8]>;
type WriteUnit<'txn> = redb::Table<'txn, &'static str, ()>;

/// Refund every holder of a component: credit each holder's captured price,
/// remove the holder rows and debit the owner for the total, clamped at
/// zero; the owner never owes beyond their remaining balance.
fn refund_holders(
    holders: &mut WriteBytesBytes<'_>,
    users: &mut WriteStrBytes<'_>,
    component_id: &str,
    ownership: &Ownership,
) -> ComponentResult<u64> {
    let start = composite_prefix(component_id);
    let end = composite_prefix_end(component_id);

    let mut entries: Vec<(Vec<u8>, HolderRecord)> = Vec::new();
    for entry in holders
        .range(start.as_slice()..end.as_slice())
        .map_err(StoreError::from)?
    {
        let (key, value) = entry.map_err(StoreError::from)?;
        entries.push((key.value().to_vec(), decode(value.value())?));
    }

    let mut total = 0u64;
    for (key, record) in &entries {
        let Some(holder_id) = composite_suffix(key) else {
            continue;
        };
        let mut holder: StoredUser = {
            let value = users
                .get(holder_id.as_str())
                .map_err(StoreError::from)?
                .ok_or(ComponentError::UserNotFound)?;
            decode(value.value())?
        };
        holder.balance += record.price_paid;
        users
            .insert(holder_id.as_str(), encode(&holder)?.as_slice())
            .map_err(StoreError::from)?;
        total += record.price_paid;

        holders.remove(key.as_slice()).map_err(StoreError::from)?;
    }

    if total > 0 {
        if let Some(owner_id) = ownership.user_id() {
            let mut owner: StoredUser = {
                let value = users
                    .get(owner_id)
                    .map_err(StoreError::from)?
                    .ok_or(ComponentError::UserNotFound)?;
                decode(value.value())?
            };
            owner.balance = owner.balance.saturating_sub(total);
            users
                .insert(owner_id, encode(&owner)?.as_slice())
                .map_err(StoreError::from)?;
        }
    }

    Ok(total)
}

/// Remove a component and every row referencing it.
fn purge(
    components: &mut WriteStrBytes<'_>,
    owners: &mut WriteStrBytes<'_>,
    publications: &mut WriteUnit<'_>,
    holders: &mut WriteBytesBytes<'_>,
    component_id: &str,
) -> ComponentResult<()> {
    let start = composite_prefix(component_id);
    let end = composite_prefix_end(component_id);
    let mut holder_keys = Vec::new();
    for entry in holders
        .range(start.as_slice()..end.as_slice())
        .map_err(StoreError::from)?
    {
        let (key, _) = entry.map_err(StoreError::from)?;
        holder_keys.push(key.value().to_vec());
    }
    for key in holder_keys {
        holders.remove(key.as_slice()).map_err(StoreError::from)?;
    }

    publications.remove(component_id).map_err(StoreError::from)?;
    owners.remove(component_id).map_err(StoreError::from)?;
    components.remove(component_id).map_err(StoreError::from)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::repository::users::{NewUser, UserRepository};
    use serde_json::json;

    fn temp_db() -> (MarketDb, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = MarketDb::open(&dir.path().join("test.redb")).unwrap();
        (db, dir)
    }

    fn user_with_balance(db: &MarketDb, username: &str, balance: u64) -> StoredUser {
        let users = UserRepository::new(db);
        let mut user = users
            .create(NewUser {
                username: username.to_string(),
                email: format!("{username}@example.com"),
                password: "hunter2".to_string(),
                first_name: "Ada".to_string(),
                last_name: "Lovelace".to_string(),
            })
            .unwrap();
        user.balance = balance;
        users.update(&user).unwrap();
        user
    }

    fn balance_of(db: &MarketDb, user_id: &str) -> u64 {
        UserRepository::new(db).get(user_id).unwrap().balance
    }

    fn component(name: &str, price: u64, public: bool) -> NewComponent {
        NewComponent {
            name: name.to_string(),
            description: format!("{name} description"),
            content: json!({"blocks": []}),
            price,
            budget: 0,
            public,
        }
    }

    fn viewer(user: &StoredUser) -> Option<Viewer<'_>> {
        Some(Viewer {
            user_id: &user.user_id,
            manage_store: false,
        })
    }

    #[test]
    fn buy_transfers_the_price_and_records_the_holder() {
        let (db, _dir) = temp_db();
        let repo = ComponentRepository::new(&db);
        let seller = user_with_balance(&db, "seller", 0);
        let buyer = user_with_balance(&db, "buyer", 500);

        let created = repo
            .create(&seller.user_id, component("button", 300, true))
            .unwrap();
        repo.buy(&buyer.user_id, &created.component_id).unwrap();

        assert_eq!(balance_of(&db, &buyer.user_id), 200);
        assert_eq!(balance_of(&db, &seller.user_id), 300);

        let view = repo
            .get_for_viewer(&created.component_id, viewer(&buyer))
            .unwrap();
        assert!(view.bought);
        assert_eq!(view.paid_price, Some(300));
        assert_eq!(view.sell_price, Some(300));
        assert_eq!(view.holders, 1);
        assert_eq!(view.total_sells, 300);
    }

    #[test]
    fn buy_refuses_before_any_money_moves() {
        let (db, _dir) = temp_db();
        let repo = ComponentRepository::new(&db);
        let seller = user_with_balance(&db, "seller", 0);
        let poor = user_with_balance(&db, "poor", 100);

        let created = repo
            .create(&seller.user_id, component("button", 300, true))
            .unwrap();

        let result = repo.buy(&poor.user_id, &created.component_id);
        assert!(matches!(result, Err(ComponentError::InsufficientArkhoins)));
        assert_eq!(balance_of(&db, &poor.user_id), 100);
        assert_eq!(balance_of(&db, &seller.user_id), 0);
    }

    #[test]
    fn buy_marker_priority_and_guards() {
        let (db, _dir) = temp_db();
        let repo = ComponentRepository::new(&db);
        let seller = user_with_balance(&db, "seller", 1000);
        let buyer = user_with_balance(&db, "buyer", 1000);

        assert!(matches!(
            repo.buy(&buyer.user_id, "no-such-id"),
            Err(ComponentError::ComponentNotFound)
        ));

        let private = repo
            .create(&seller.user_id, component("hidden", 100, false))
            .unwrap();
        assert!(matches!(
            repo.buy(&buyer.user_id, &private.component_id),
            Err(ComponentError::ComponentNotPublic)
        ));

        let public = repo
            .create(&seller.user_id, component("listed", 100, true))
            .unwrap();
        assert!(matches!(
            repo.buy(&seller.user_id, &public.component_id),
            Err(ComponentError::ComponentOwnerCannotBuy)
        ));

        repo.buy(&buyer.user_id, &public.component_id).unwrap();
        assert!(matches!(
            repo.buy(&buyer.user_id, &public.component_id),
            Err(ComponentError::ComponentAlreadyOwned)
        ));
    }

    #[test]
    fn sell_returns_the_captured_price_not_the_current_one() {
        let (db, _dir) = temp_db();
        let repo = ComponentRepository::new(&db);
        let seller = user_with_balance(&db, "seller", 0);
        let buyer = user_with_balance(&db, "buyer", 500);

        let created = repo
            .create(&seller.user_id, component("button", 300, true))
            .unwrap();
        repo.buy(&buyer.user_id, &created.component_id).unwrap();

        // Price changes after purchase do not change the refundable amount.
        repo.update(
            &created.component_id,
            ComponentPatch {
                price: Some(900),
                ..Default::default()
            },
        )
        .unwrap();

        repo.sell(&buyer.user_id, &created.component_id).unwrap();
        assert_eq!(balance_of(&db, &buyer.user_id), 500);
        // The owner keeps the original proceeds.
        assert_eq!(balance_of(&db, &seller.user_id), 300);

        let view = repo
            .get_for_viewer(&created.component_id, viewer(&buyer))
            .unwrap();
        assert!(!view.bought);
        assert_eq!(view.holders, 0);
    }

    #[test]
    fn sell_markers() {
        let (db, _dir) = temp_db();
        let repo = ComponentRepository::new(&db);
        let seller = user_with_balance(&db, "seller", 0);
        let stranger = user_with_balance(&db, "stranger", 0);

        let created = repo
            .create(&seller.user_id, component("button", 300, true))
            .unwrap();

        assert!(matches!(
            repo.sell(&stranger.user_id, &created.component_id),
            Err(ComponentError::ComponentNotOwned)
        ));
        assert!(matches!(
            repo.sell(&seller.user_id, &created.component_id),
            Err(ComponentError::ComponentNotOwned)
        ));
    }

    #[test]
    fn unpublish_refunds_every_holder_and_debits_the_owner() {
        let (db, _dir) = temp_db();
        let repo = ComponentRepository::new(&db);
        let seller = user_with_balance(&db, "seller", 0);
        let first = user_with_balance(&db, "first", 300);
        let second = user_with_balance(&db, "second", 300);

        let created = repo
            .create(&seller.user_id, component("button", 300, true))
            .unwrap();
        repo.buy(&first.user_id, &created.component_id).unwrap();
        repo.buy(&second.user_id, &created.component_id).unwrap();
        assert_eq!(balance_of(&db, &seller.user_id), 600);

        repo.unpublish(&created.component_id).unwrap();

        assert_eq!(balance_of(&db, &first.user_id), 300);
        assert_eq!(balance_of(&db, &second.user_id), 300);
        assert_eq!(balance_of(&db, &seller.user_id), 0);

        let view = repo
            .get_for_viewer(&created.component_id, viewer(&seller))
            .unwrap();
        assert!(!view.is_public);
        assert_eq!(view.holders, 0);
    }

    #[test]
    fn publish_and_unpublish_markers() {
        let (db, _dir) = temp_db();
        let repo = ComponentRepository::new(&db);
        let seller = user_with_balance(&db, "seller", 0);

        let created = repo
            .create(&seller.user_id, component("button", 100, false))
            .unwrap();

        assert!(matches!(
            repo.unpublish(&created.component_id),
            Err(ComponentError::ComponentNotPublic)
        ));

        repo.publish(&created.component_id).unwrap();
        assert!(matches!(
            repo.publish(&created.component_id),
            Err(ComponentError::ComponentAlreadyPublic)
        ));

        assert!(matches!(
            repo.publish("no-such-id"),
            Err(ComponentError::ComponentNotFound)
        ));
    }

    #[test]
    fn safe_delete_refunds_with_owner_balance_clamped_at_zero() {
        let (db, _dir) = temp_db();
        let repo = ComponentRepository::new(&db);
        let seller = user_with_balance(&db, "seller", 0);
        let buyer = user_with_balance(&db, "buyer", 500);

        let created = repo
            .create(&seller.user_id, component("button", 500, true))
            .unwrap();
        repo.buy(&buyer.user_id, &created.component_id).unwrap();

        // The owner spends the proceeds before the delete.
        let users = UserRepository::new(&db);
        let mut owner = users.get(&seller.user_id).unwrap();
        owner.balance = 200;
        users.update(&owner).unwrap();

        repo.safe_delete(&created.component_id).unwrap();

        // The holder is made whole; the owner owes no more than they have.
        assert_eq!(balance_of(&db, &buyer.user_id), 500);
        assert_eq!(balance_of(&db, &seller.user_id), 0);

        assert!(matches!(
            repo.safe_delete(&created.component_id),
            Err(ComponentError::ComponentAlreadyTrashed)
        ));
    }

    #[test]
    fn trashed_components_are_invisible_except_in_the_trash() {
        let (db, _dir) = temp_db();
        let repo = ComponentRepository::new(&db);
        let seller = user_with_balance(&db, "seller", 0);

        let created = repo
            .create(&seller.user_id, component("button", 100, true))
            .unwrap();
        repo.safe_delete(&created.component_id).unwrap();

        assert!(matches!(
            repo.get_for_viewer(&created.component_id, viewer(&seller)),
            Err(ComponentError::ComponentNotFound)
        ));
        assert_eq!(
            repo.get_public(None, false, 1, 10).unwrap().total_records,
            0
        );
        assert_eq!(
            repo.get_by_owner(None, &seller.user_id, false, 1, 10)
                .unwrap()
                .total_records,
            0
        );

        let trash = repo.get_trashed(&seller.user_id, 1, 10).unwrap();
        assert_eq!(trash.total_records, 1);
        assert_eq!(trash.data[0].component_id, created.component_id);
    }

    #[test]
    fn restore_brings_a_trashed_component_back() {
        let (db, _dir) = temp_db();
        let repo = ComponentRepository::new(&db);
        let seller = user_with_balance(&db, "seller", 0);

        let created = repo
            .create(&seller.user_id, component("button", 100, true))
            .unwrap();

        assert!(matches!(
            repo.restore(&created.component_id),
            Err(ComponentError::ComponentNotTrashed)
        ));

        repo.safe_delete(&created.component_id).unwrap();
        repo.restore(&created.component_id).unwrap();

        let view = repo
            .get_for_viewer(&created.component_id, viewer(&seller))
            .unwrap();
        assert!(view.deleted_at.is_none());
        assert_eq!(repo.get_trashed(&seller.user_id, 1, 10).unwrap().total_records, 0);
    }

    #[test]
    fn unsafe_delete_purges_every_row() {
        let (db, _dir) = temp_db();
        let repo = ComponentRepository::new(&db);
        let seller = user_with_balance(&db, "seller", 0);
        let buyer = user_with_balance(&db, "buyer", 100);

        let created = repo
            .create(&seller.user_id, component("button", 100, true))
            .unwrap();
        repo.buy(&buyer.user_id, &created.component_id).unwrap();

        assert!(matches!(
            repo.unsafe_delete(&created.component_id),
            Err(ComponentError::ComponentNotTrashed)
        ));

        repo.safe_delete(&created.component_id).unwrap();
        repo.unsafe_delete(&created.component_id).unwrap();

        assert!(matches!(
            repo.get_for_viewer(&created.component_id, viewer(&seller)),
            Err(ComponentError::ComponentNotFound)
        ));
        assert!(matches!(
            repo.ownership(&created.component_id),
            Err(ComponentError::ComponentNotFound)
        ));
        assert_eq!(repo.get_trashed(&seller.user_id, 1, 10).unwrap().total_records, 0);

        let read_txn = db.read().unwrap();
        let tables = ReadTables::open(&read_txn).unwrap();
        assert!(tables.holder_records(&created.component_id).unwrap().is_empty());
        assert!(!tables.is_public(&created.component_id).unwrap());
    }

    #[test]
    fn clear_trash_purges_only_the_owners_trashed_components() {
        let (db, _dir) = temp_db();
        let repo = ComponentRepository::new(&db);
        let alice = user_with_balance(&db, "alice", 0);
        let bob = user_with_balance(&db, "bob", 0);

        let kept = repo
            .create(&alice.user_id, component("kept", 0, true))
            .unwrap();
        let trashed_a = repo
            .create(&alice.user_id, component("gone-a", 0, false))
            .unwrap();
        let trashed_b = repo
            .create(&alice.user_id, component("gone-b", 0, false))
            .unwrap();
        let bobs = repo
            .create(&bob.user_id, component("bobs", 0, false))
            .unwrap();

        repo.safe_delete(&trashed_a.component_id).unwrap();
        repo.safe_delete(&trashed_b.component_id).unwrap();
        repo.safe_delete(&bobs.component_id).unwrap();

        assert_eq!(repo.clear_trash(&alice.user_id).unwrap(), 2);

        assert_eq!(repo.get_trashed(&alice.user_id, 1, 10).unwrap().total_records, 0);
        assert_eq!(repo.get_trashed(&bob.user_id, 1, 10).unwrap().total_records, 1);
        assert!(repo
            .get_for_viewer(&kept.component_id, viewer(&alice))
            .is_ok());
    }

    #[test]
    fn private_components_answer_not_found_to_strangers() {
        let (db, _dir) = temp_db();
        let repo = ComponentRepository::new(&db);
        let owner = user_with_balance(&db, "owner", 0);
        let stranger = user_with_balance(&db, "stranger", 0);

        let created = repo
            .create(&owner.user_id, component("secret", 100, false))
            .unwrap();

        assert!(matches!(
            repo.get_for_viewer(&created.component_id, None),
            Err(ComponentError::ComponentNotFound)
        ));
        assert!(matches!(
            repo.get_for_viewer(&created.component_id, viewer(&stranger)),
            Err(ComponentError::ComponentNotFound)
        ));

        assert!(repo
            .get_for_viewer(&created.component_id, viewer(&owner))
            .is_ok());

        let moderator = Some(Viewer {
            user_id: &stranger.user_id,
            manage_store: true,
        });
        assert!(repo
            .get_for_viewer(&created.component_id, moderator)
            .is_ok());
    }

    #[test]
    fn listings_filter_by_publication_and_price() {
        let (db, _dir) = temp_db();
        let repo = ComponentRepository::new(&db);
        let owner = user_with_balance(&db, "owner", 0);

        repo.create(&owner.user_id, component("free", 0, true))
            .unwrap();
        repo.create(&owner.user_id, component("paid", 100, true))
            .unwrap();
        repo.create(&owner.user_id, component("draft", 0, false))
            .unwrap();

        assert_eq!(
            repo.get_public(None, false, 1, 10).unwrap().total_records,
            2
        );
        let free = repo.get_public(None, true, 1, 10).unwrap();
        assert_eq!(free.total_records, 1);
        assert_eq!(free.data[0].name, "free");

        assert_eq!(
            repo.get_by_owner(None, &owner.user_id, false, 1, 10)
                .unwrap()
                .total_records,
            3
        );
        assert_eq!(
            repo.get_by_owner(None, &owner.user_id, true, 1, 10)
                .unwrap()
                .total_records,
            2
        );
    }

    #[test]
    fn get_owned_includes_held_and_created() {
        let (db, _dir) = temp_db();
        let repo = ComponentRepository::new(&db);
        let owner = user_with_balance(&db, "owner", 0);
        let buyer = user_with_balance(&db, "buyer", 100);

        let own = repo
            .create(&buyer.user_id, component("mine", 0, false))
            .unwrap();
        let bought = repo
            .create(&owner.user_id, component("theirs", 100, true))
            .unwrap();
        repo.buy(&buyer.user_id, &bought.component_id).unwrap();

        let page = repo
            .get_owned(viewer(&buyer), &buyer.user_id, false, 1, 10)
            .unwrap();
        assert_eq!(page.total_records, 2);
        let ids: Vec<&str> = page.data.iter().map(|v| v.component_id.as_str()).collect();
        assert!(ids.contains(&own.component_id.as_str()));
        assert!(ids.contains(&bought.component_id.as_str()));
    }

    #[test]
    fn holders_listing_shows_each_purchase() {
        let (db, _dir) = temp_db();
        let repo = ComponentRepository::new(&db);
        let owner = user_with_balance(&db, "owner", 0);
        let first = user_with_balance(&db, "first", 100);
        let second = user_with_balance(&db, "second", 100);

        let created = repo
            .create(&owner.user_id, component("button", 100, true))
            .unwrap();
        repo.buy(&first.user_id, &created.component_id).unwrap();
        repo.buy(&second.user_id, &created.component_id).unwrap();

        let page = repo.get_holders(&created.component_id, 1, 10).unwrap();
        assert_eq!(page.total_records, 2);
        assert!(page.data.iter().all(|h| h.price_paid == 100));

        assert!(matches!(
            repo.get_holders("no-such-id", 1, 10),
            Err(ComponentError::ComponentNotFound)
        ));
    }

    #[test]
    fn search_folds_diacritics_and_matches_owner_names() {
        let (db, _dir) = temp_db();
        let repo = ComponentRepository::new(&db);
        let users = UserRepository::new(&db);
        let mut owner = user_with_balance(&db, "joao", 0);
        owner.first_name = "João".to_string();
        users.update(&owner).unwrap();

        repo.create(&owner.user_id, component("Botão Azul", 0, true))
            .unwrap();
        repo.create(&owner.user_id, component("Plain Grid", 0, true))
            .unwrap();

        // "botao" matches "Botão" through the folding table.
        let criteria = SearchCriteria {
            query: "botao".to_string(),
            ..Default::default()
        };
        let page = repo.search(None, &criteria, 1, 10).unwrap();
        assert_eq!(page.total_records, 1);
        assert_eq!(page.data[0].name, "Botão Azul");

        // Owner first name participates in the match.
        let criteria = SearchCriteria {
            query: "joao".to_string(),
            ..Default::default()
        };
        assert_eq!(repo.search(None, &criteria, 1, 10).unwrap().total_records, 2);
    }

    #[test]
    fn search_following_filter_and_ordering() {
        let (db, _dir) = temp_db();
        let repo = ComponentRepository::new(&db);
        let users = UserRepository::new(&db);
        let fan = user_with_balance(&db, "fan", 0);
        let followed = user_with_balance(&db, "followed", 0);
        let other = user_with_balance(&db, "other", 0);
        users.add_follower(&fan.user_id, &followed.user_id).unwrap();

        repo.create(&followed.user_id, component("alpha", 0, true))
            .unwrap();
        repo.create(&other.user_id, component("beta", 0, true))
            .unwrap();

        let criteria = SearchCriteria {
            following_only: true,
            ..Default::default()
        };
        let page = repo.search(viewer(&fan), &criteria, 1, 10).unwrap();
        assert_eq!(page.total_records, 1);
        assert_eq!(page.data[0].name, "alpha");

        // Anonymous following-only search matches nothing.
        assert_eq!(repo.search(None, &criteria, 1, 10).unwrap().total_records, 0);

        let criteria = SearchCriteria {
            order: SearchOrder::Name,
            descending: false,
            ..Default::default()
        };
        let page = repo.search(None, &criteria, 1, 10).unwrap();
        let names: Vec<&str> = page.data.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "beta"]);
    }

    #[test]
    fn invalid_search_pattern_is_reported() {
        let (db, _dir) = temp_db();
        let repo = ComponentRepository::new(&db);
        let criteria = SearchCriteria {
            query: "([".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            repo.search(None, &criteria, 1, 10),
            Err(ComponentError::InvalidSearchPattern)
        ));
    }

    #[test]
    fn update_patches_fields_and_bumps_updated_at() {
        let (db, _dir) = temp_db();
        let repo = ComponentRepository::new(&db);
        let owner = user_with_balance(&db, "owner", 0);

        let created = repo
            .create(&owner.user_id, component("button", 100, false))
            .unwrap();
        repo.update(
            &created.component_id,
            ComponentPatch {
                name: Some("switch".to_string()),
                price: Some(250),
                ..Default::default()
            },
        )
        .unwrap();

        let view = repo
            .get_for_viewer(&created.component_id, viewer(&owner))
            .unwrap();
        assert_eq!(view.name, "switch");
        assert_eq!(view.price, 250);
        assert_eq!(view.description, "button description");
        assert!(view.updated_at >= created.updated_at);
    }

    #[test]
    fn fold_diacritics_builds_character_classes() {
        assert_eq!(fold_diacritics("n"), "[nñ]");
        assert!(fold_diacritics("Botao").starts_with("b[oóòõôö]t"));
        assert_eq!(fold_diacritics("x-1"), "x-1");
    }
}
