//! Record store abstraction
//!
//! The bot persists everything in a remote document store addressed by named
//! collections. Only exact-match field filters exist; anything resembling a
//! range query happens client-side after a full fetch. The trait is injected
//! into every component so tests can substitute the in-memory fake.

mod http;
#[cfg(test)]
pub mod memory;

pub use http::HttpStore;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

/// Warning records, one per issued warning
pub const WARNS: &str = "warns";
/// Active timed mutes
pub const MUTES: &str = "mutes";
/// Bans on record
pub const BANS: &str = "bans";
/// Per-guild configuration
pub const GUILD_SETTINGS: &str = "guild_settings";

/// Errors from store operations
#[derive(Debug, Error)]
pub enum StoreError {
    /// Update/delete refused because no filters were supplied
    #[error("{0} requires at least one filter")]
    EmptyFilters(&'static str),

    /// Transport-level failure talking to the backend
    #[error("store transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The backend reported an error of its own
    #[error("store backend error: {0}")]
    Backend(String),

    /// A stored document did not decode into the expected shape
    #[error("store decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Exact-match field filters for select/update/delete/count
pub type Filters = Map<String, Value>;

/// Build filters addressing a (user, guild) pair the way the collections key
/// their records
#[must_use]
pub fn user_guild_filters(user_id: u64, guild_id: u64) -> Filters {
    let mut filters = Filters::new();
    filters.insert("user_id".to_string(), Value::String(user_id.to_string()));
    filters.insert("guild_id".to_string(), Value::String(guild_id.to_string()));
    filters
}

/// Filters addressing a guild's settings record
#[must_use]
pub fn guild_filters(guild_id: u64) -> Filters {
    let mut filters = Filters::new();
    filters.insert("guild_id".to_string(), Value::String(guild_id.to_string()));
    filters
}

/// Document store contract used by every component
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert a document, returning it as stored. Implementations populate
    /// `created_at` with the current ISO-8601 instant when absent.
    async fn insert(&self, collection: &str, document: Value) -> Result<Value, StoreError>;

    /// Fetch every document matching the filters; `None` fetches the whole
    /// collection. Missing collections read as empty.
    async fn select(
        &self,
        collection: &str,
        filters: Option<&Filters>,
    ) -> Result<Vec<Value>, StoreError>;

    /// Apply a patch to every matching document. Fails closed on empty
    /// filters.
    async fn update(
        &self,
        collection: &str,
        filters: &Filters,
        patch: Value,
    ) -> Result<(), StoreError>;

    /// Delete every matching document. Fails closed on empty filters.
    async fn delete(&self, collection: &str, filters: &Filters) -> Result<(), StoreError>;

    /// Count matching documents
    async fn count(&self, collection: &str, filters: Option<&Filters>)
    -> Result<u64, StoreError>;
}

/// Fetch the first document matching the filters, if any
pub async fn select_one(
    store: &dyn RecordStore,
    collection: &str,
    filters: &Filters,
) -> Result<Option<Value>, StoreError> {
    let mut documents = store.select(collection, Some(filters)).await?;
    if documents.is_empty() {
        Ok(None)
    } else {
        Ok(Some(documents.swap_remove(0)))
    }
}
