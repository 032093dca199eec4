//! Maintenance report types

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Database file size
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSize {
    pub page_count: i64,
    pub page_size: i64,
    pub freelist_count: i64,
}

impl DatabaseSize {
    /// File size implied by the page count
    pub fn total_bytes(&self) -> i64 {
        self.page_count * self.page_size
    }

    /// Bytes a `VACUUM` could reclaim
    pub fn free_bytes(&self) -> i64 {
        self.freelist_count * self.page_size
    }
}

/// Health report produced by `Maintenance::health_check`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseHealth {
    pub integrity_ok: bool,
    /// Messages from `PRAGMA integrity_check` other than `ok`
    pub integrity_messages: Vec<String>,
    pub auto_vacuum: i64,
    pub journal_mode: String,
    pub size: DatabaseSize,
    pub table_row_counts: BTreeMap<String, i64>,
}
