//! HTTP-backed record store
//!
//! The backend is a single webhook endpoint taking `{action, database,
//! bot_id, data?, filters?}` envelopes and answering with `{data}`, `{count}`
//! or `{error}` JSON bodies.

use chrono::Utc;
use serde_json::{Value, json};
use tracing::error;

use super::{Filters, RecordStore, StoreError};

/// Store client speaking the webhook protocol
#[derive(Debug, Clone)]
pub struct HttpStore {
    client: reqwest::Client,
    endpoint: String,
    bot_id: String,
}

impl HttpStore {
    #[must_use]
    pub fn new(endpoint: impl Into<String>, bot_id: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            bot_id: bot_id.into(),
        }
    }

    async fn call(
        &self,
        action: &str,
        collection: &str,
        data: Option<Value>,
        filters: Option<&Filters>,
    ) -> Result<Value, StoreError> {
        let mut payload = json!({
            "action": action,
            "database": collection,
            "bot_id": self.bot_id,
        });
        if let Some(data) = data {
            payload["data"] = data;
        }
        if let Some(filters) = filters {
            payload["filters"] = Value::Object(filters.clone());
        }

        let response = self
            .client
            .post(format!("{}/database", self.endpoint))
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;
        let body: Value = response.json().await?;

        if let Some(message) = body.get("error").and_then(Value::as_str) {
            error!(
                action = %action,
                collection = %collection,
                error = %message,
                "Store backend reported an error"
            );
            return Err(StoreError::Backend(message.to_string()));
        }

        Ok(body)
    }
}

/// Stamp `created_at` with the current instant when the caller did not
pub(super) fn stamp_created_at(document: &mut Value) {
    if let Some(fields) = document.as_object_mut() {
        fields
            .entry("created_at")
            .or_insert_with(|| Value::String(Utc::now().to_rfc3339()));
    }
}

#[async_trait::async_trait]
impl RecordStore for HttpStore {
    async fn insert(&self, collection: &str, mut document: Value) -> Result<Value, StoreError> {
        stamp_created_at(&mut document);
        let body = self
            .call("insert", collection, Some(document.clone()), None)
            .await?;
        // The backend echoes the stored row; fall back to what we sent.
        Ok(body.get("data").cloned().unwrap_or(document))
    }

    async fn select(
        &self,
        collection: &str,
        filters: Option<&Filters>,
    ) -> Result<Vec<Value>, StoreError> {
        let body = self.call("select", collection, None, filters).await?;
        match body.get("data") {
            Some(Value::Array(rows)) => Ok(rows.clone()),
            _ => Ok(Vec::new()),
        }
    }

    async fn update(
        &self,
        collection: &str,
        filters: &Filters,
        patch: Value,
    ) -> Result<(), StoreError> {
        if filters.is_empty() {
            return Err(StoreError::EmptyFilters("update"));
        }
        self.call("update", collection, Some(patch), Some(filters))
            .await?;
        Ok(())
    }

    async fn delete(&self, collection: &str, filters: &Filters) -> Result<(), StoreError> {
        if filters.is_empty() {
            return Err(StoreError::EmptyFilters("delete"));
        }
        self.call("delete", collection, None, Some(filters)).await?;
        Ok(())
    }

    async fn count(
        &self,
        collection: &str,
        filters: Option<&Filters>,
    ) -> Result<u64, StoreError> {
        let body = self.call("count", collection, None, filters).await?;
        Ok(body.get("count").and_then(Value::as_u64).unwrap_or(0))
    }
}
