use crate::{
    errors::StoreError,
    providers::db::storage::{FeatureStore, IdentityFilter},
    record::ValidatedRecord,
};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::fmt::{self, Debug};
use tracing::debug;
use turso::{params, Database, Value as TursoValue};

pub mod sql;

/// A feature store backed by a local SQLite database using Turso.
///
/// Cloning shares the same underlying database, so an in-memory store can be
/// handed to the orchestrator and still inspected by the caller afterwards.
#[derive(Clone)]
pub struct SqliteFeatureStore {
    pub db: Database,
}

impl SqliteFeatureStore {
    /// Opens (or creates) the database at `db_path` and ensures the schema exists.
    ///
    /// Use ":memory:" for an isolated in-memory database.
    pub async fn new(db_path: &str) -> Result<Self, StoreError> {
        let db = turso::Builder::new_local(db_path)
            .build()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        // PRAGMA returns a row, so it has to go through `query`.
        conn.query("PRAGMA journal_mode=WAL;", ())
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let store = Self { db };
        store.initialize_schema().await?;
        Ok(store)
    }

    /// Creates the tables if they do not exist. Safe to call repeatedly.
    pub async fn initialize_schema(&self) -> Result<(), StoreError> {
        let conn = self
            .db
            .connect()
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        for statement in sql::ALL_TABLE_CREATION_SQL {
            conn.execute(statement, ()).await?;
        }
        Ok(())
    }

    /// Creates an empty document for an asset if none exists.
    ///
    /// Used to seed the catalog before feature extraction runs, so that
    /// upserts can be told apart from brand-new documents.
    pub async fn register_asset(&self, asset_id: &str) -> Result<bool, StoreError> {
        if self.load_features(asset_id).await?.is_some() {
            return Ok(false);
        }
        let conn = self
            .db
            .connect()
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        let now = chrono::Utc::now().to_rfc3339();
        conn.execute(
            sql::INSERT_ASSET,
            params![asset_id, "{}", now.clone(), now],
        )
        .await?;
        Ok(true)
    }

    /// Registers every identity in `asset_ids`, returning how many documents
    /// were created.
    pub async fn register_all<'a, I>(&self, asset_ids: I) -> Result<usize, StoreError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut created = 0;
        for asset_id in asset_ids {
            if self.register_asset(asset_id).await? {
                debug!("Registered asset '{}'.", asset_id);
                created += 1;
            }
        }
        Ok(created)
    }

    /// Returns the stored feature object for an asset, if a document exists.
    pub async fn load_features(
        &self,
        asset_id: &str,
    ) -> Result<Option<Map<String, Value>>, StoreError> {
        let conn = self
            .db
            .connect()
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        let mut rows = conn.query(sql::SELECT_FEATURES, params![asset_id]).await?;
        match rows.next().await? {
            Some(row) => {
                let raw = text_value(row.get_value(0)?)?;
                Ok(Some(parse_features(&raw)?))
            }
            None => Ok(None),
        }
    }
}

impl Debug for SqliteFeatureStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteFeatureStore").finish_non_exhaustive()
    }
}

fn text_value(value: TursoValue) -> Result<String, StoreError> {
    match value {
        TursoValue::Text(s) => Ok(s),
        other => Err(StoreError::Operation(format!(
            "expected a text column, found {other:?}"
        ))),
    }
}

fn parse_features(raw: &str) -> Result<Map<String, Value>, StoreError> {
    match serde_json::from_str(raw)? {
        Value::Object(map) => Ok(map),
        _ => Err(StoreError::Operation(
            "stored features are not a JSON object".to_string(),
        )),
    }
}

#[async_trait]
impl FeatureStore for SqliteFeatureStore {
    fn name(&self) -> &str {
        "SQLite"
    }

    async fn upsert(&self, asset_id: &str, record: &ValidatedRecord) -> Result<bool, StoreError> {
        let existing = self.load_features(asset_id).await?;
        let existed = existing.is_some();

        let mut features = existing.unwrap_or_default();
        for (name, value) in record.iter() {
            features.insert(name.to_string(), Value::String(value.to_string()));
        }
        let serialized = serde_json::to_string(&Value::Object(features))?;
        let now = chrono::Utc::now().to_rfc3339();

        let conn = self
            .db
            .connect()
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        if existed {
            conn.execute(sql::UPDATE_FEATURES, params![serialized, now, asset_id])
                .await?;
        } else {
            conn.execute(
                sql::INSERT_ASSET,
                params![asset_id, serialized, now.clone(), now],
            )
            .await?;
        }
        debug!(asset_id = %asset_id, existed, "Persisted {} fields.", record.len());
        Ok(existed)
    }

    async fn list_identities(&self, filter: &IdentityFilter) -> Result<Vec<String>, StoreError> {
        let conn = self
            .db
            .connect()
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        let mut rows = conn.query(sql::SELECT_ALL_FEATURES, ()).await?;

        let mut ids = Vec::new();
        while let Some(row) = rows.next().await? {
            let asset_id = text_value(row.get_value(0)?)?;
            let matches = match filter {
                IdentityFilter::All => true,
                IdentityFilter::HasFields(fields) => {
                    let features = parse_features(&text_value(row.get_value(1)?)?)?;
                    fields.iter().all(|f| features.contains_key(f))
                }
            };
            if matches {
                ids.push(asset_id);
            }
        }
        Ok(ids)
    }
}
