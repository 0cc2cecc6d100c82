// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Atelier

//! Pagination engine shared by every listing endpoint.
//!
//! Given an already-filtered row set, a 1-based page index and a page size,
//! returns a bounded page plus navigation metadata. Counting and windowing
//! observe the same rows; ordering is supplied by the caller.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Default page size when the `perpage` query parameter is absent.
pub const DEFAULT_PER_PAGE: u64 = 10;

/// A bounded page of results plus navigation metadata.
///
/// `next_page` is -1 on the last page; `previous_page` is -1 on the first.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub total_records: u64,
    pub total_pages: u64,
    pub current_page: u64,
    pub next_page: i64,
    pub previous_page: i64,
}

/// Paginate a filtered, ordered row set.
///
/// Page indices are clamped: values below 1 become 1, values past the end
/// become the last page. An empty row set yields an empty page with
/// `total_pages` = 0.
pub fn paginate<T>(rows: Vec<T>, page: u64, per_page: u64) -> Page<T> {
    let per_page = per_page.max(1);
    let total_records = rows.len() as u64;

    if total_records == 0 {
        return Page {
            data: Vec::new(),
            total_records: 0,
            total_pages: 0,
            current_page: 1,
            next_page: -1,
            previous_page: -1,
        };
    }

    let total_pages = total_records.div_ceil(per_page);
    let current_page = page.max(1).min(total_pages);

    let start = ((current_page - 1) * per_page) as usize;
    let data: Vec<T> = rows
        .into_iter()
        .skip(start)
        .take(per_page as usize)
        .collect();

    let next_page = if current_page == total_pages {
        -1
    } else {
        (current_page + 1) as i64
    };
    let previous_page = if current_page == 1 {
        -1
    } else {
        (current_page - 1) as i64
    };

    Page {
        data,
        total_records,
        total_pages,
        current_page,
        next_page,
        previous_page,
    }
}
