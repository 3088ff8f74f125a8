//! # SQLite Specific SQL Queries
//!
//! This module centralizes SQL query strings for the SQLite feature store.

/// One row per asset. `features` holds a JSON object of every field written
/// so far, merged across tasks.
pub const CREATE_ASSETS_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS assets (
        asset_id TEXT PRIMARY KEY,
        features TEXT NOT NULL DEFAULT '{}',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )";

pub const ALL_TABLE_CREATION_SQL: &[&str] = &[CREATE_ASSETS_TABLE];

pub const SELECT_FEATURES: &str = "SELECT features FROM assets WHERE asset_id = ?";

pub const SELECT_ALL_FEATURES: &str = "SELECT asset_id, features FROM assets ORDER BY asset_id";

pub const INSERT_ASSET: &str =
    "INSERT INTO assets (asset_id, features, created_at, updated_at) VALUES (?, ?, ?, ?)";

pub const UPDATE_FEATURES: &str =
    "UPDATE assets SET features = ?, updated_at = ? WHERE asset_id = ?";
