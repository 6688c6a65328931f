use super::{DraftStore, SettingsStore, StoreError, apply_removal, apply_result};
use crate::http::{ApiRequest, ApiResponse, Transport};
use crate::models::{Draft, DraftStatus, MarketplaceListing, PerMarketplaceResult};
use crate::profile::Settings;
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

const SETTINGS_KEY: &str = "marketplace_settings";
/// Read-modify-write rounds before a busy draft is reported as a conflict.
const MAX_WRITE_ROUNDS: u32 = 3;

/// PostgREST-backed store: `drafts` rows mirror [`Draft`], the settings overlay
/// lives in `app_settings` under one key.
pub struct SupabaseStore {
    base_url: String,
    service_key: String,
    transport: Arc<dyn Transport>,
}

impl SupabaseStore {
    pub fn new(
        base_url: impl Into<String>,
        service_key: impl Into<String>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            service_key: service_key.into(),
            transport,
        }
    }

    fn table(&self, name: &str) -> String {
        format!("{}/rest/v1/{name}", self.base_url)
    }

    fn authorized(&self, request: ApiRequest) -> ApiRequest {
        request
            .header("apikey", self.service_key.as_str())
            .bearer(&self.service_key)
    }

    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, StoreError> {
        let response = self
            .transport
            .send(&self.authorized(request))
            .await
            .map_err(|err| StoreError::Request(err.to_string()))?;
        if !response.is_success() {
            return Err(StoreError::Request(format!(
                "HTTP {}: {}",
                response.status,
                response.body_preview()
            )));
        }
        Ok(response)
    }

    fn decode_rows<T: DeserializeOwned>(response: &ApiResponse) -> Result<Vec<T>, StoreError> {
        serde_json::from_str(&response.body).map_err(|err| StoreError::Deserialize(err.to_string()))
    }

    /// Writes `apply`'s changes only if the row was not touched since it was read.
    async fn update_draft<T: Send>(
        &self,
        id: &str,
        apply: impl Fn(&mut Draft) -> T + Send + Sync,
    ) -> Result<T, StoreError> {
        for round in 1..=MAX_WRITE_ROUNDS {
            let mut draft = self.get_draft(id).await?;
            let seen = draft.updated_at.to_rfc3339_opts(SecondsFormat::Micros, true);
            let out = apply(&mut draft);
            let body = serde_json::to_value(&draft)
                .map_err(|err| StoreError::Deserialize(err.to_string()))?;
            let request = ApiRequest::patch(self.table("drafts"))
                .query("id", format!("eq.{id}"))
                .query("updated_at", format!("eq.{seen}"))
                .header("Prefer", "return=representation")
                .json(body);
            let response = self.send(request).await?;
            let rows: Vec<serde_json::Value> = Self::decode_rows(&response)?;
            if !rows.is_empty() {
                return Ok(out);
            }
            warn!(
                target = "crosslist.store",
                draft_id = %id,
                round,
                "draft_update_conflict"
            );
        }
        Err(StoreError::Conflict(id.to_string()))
    }
}

#[async_trait]
impl DraftStore for SupabaseStore {
    async fn get_draft(&self, id: &str) -> Result<Draft, StoreError> {
        let request = ApiRequest::get(self.table("drafts"))
            .query("id", format!("eq.{id}"))
            .query("select", "*")
            .query("limit", "1");
        let response = self.send(request).await?;
        let mut rows: Vec<Draft> = Self::decode_rows(&response)?;
        rows.pop().ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn insert_draft(&self, draft: &Draft) -> Result<(), StoreError> {
        let body =
            serde_json::to_value(draft).map_err(|err| StoreError::Deserialize(err.to_string()))?;
        let request = ApiRequest::post(self.table("drafts"))
            .header("Prefer", "resolution=merge-duplicates")
            .json(body);
        self.send(request).await.map(|_| ())
    }

    async fn record_marketplace_result(
        &self,
        id: &str,
        marketplace: &str,
        result: &PerMarketplaceResult,
        listing: Option<&MarketplaceListing>,
    ) -> Result<(), StoreError> {
        self.update_draft(id, |draft| apply_result(draft, marketplace, result, listing))
            .await
    }

    async fn set_status(
        &self,
        id: &str,
        status: DraftStatus,
        error_message: Option<String>,
    ) -> Result<(), StoreError> {
        let body = json!({
            "status": status,
            "error_message": error_message,
            "updated_at": Utc::now(),
        });
        let request = ApiRequest::patch(self.table("drafts"))
            .query("id", format!("eq.{id}"))
            .json(body);
        self.send(request).await.map(|_| ())
    }

    async fn remove_marketplace(&self, id: &str, marketplace: &str) -> Result<Draft, StoreError> {
        self.update_draft(id, |draft| {
            apply_removal(draft, marketplace);
            draft.clone()
        })
        .await
    }

    async fn delete_draft(&self, id: &str) -> Result<(), StoreError> {
        let request = ApiRequest::delete(self.table("drafts"))
            .query("id", format!("eq.{id}"))
            .header("Prefer", "return=representation");
        let response = self.send(request).await?;
        let rows: Vec<serde_json::Value> = Self::decode_rows(&response)?;
        if rows.is_empty() {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }
}

#[derive(Deserialize)]
struct SettingsRow {
    value: Settings,
}

#[async_trait]
impl SettingsStore for SupabaseStore {
    async fn load_settings(&self) -> Result<Settings, StoreError> {
        let request = ApiRequest::get(self.table("app_settings"))
            .query("key", format!("eq.{SETTINGS_KEY}"))
            .query("select", "value")
            .query("limit", "1");
        let response = self.send(request).await?;
        let mut rows: Vec<SettingsRow> = Self::decode_rows(&response)?;
        Ok(rows.pop().map(|row| row.value).unwrap_or_default())
    }

    async fn save_settings(&self, settings: &Settings) -> Result<(), StoreError> {
        let request = ApiRequest::post(self.table("app_settings"))
            .header("Prefer", "resolution=merge-duplicates")
            .json(json!({"key": SETTINGS_KEY, "value": settings}));
        self.send(request).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{HttpMethod, TransportError};
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    struct Recorder {
        responses: Mutex<VecDeque<ApiResponse>>,
        requests: Mutex<Vec<ApiRequest>>,
    }

    impl Recorder {
        fn new(responses: Vec<ApiResponse>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Transport for Recorder {
        async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
            self.requests.lock().push(request.clone());
            Ok(self
                .responses
                .lock()
                .pop_front()
                .unwrap_or_else(|| ApiResponse::new(200, "[]")))
        }
    }

    fn draft_row() -> String {
        let draft = Draft::new("d-1", "WHL-1");
        serde_json::to_string(&vec![draft]).unwrap()
    }

    #[tokio::test]
    async fn settings_default_when_row_is_missing() {
        let transport = Recorder::new(vec![ApiResponse::new(200, "[]")]);
        let store = SupabaseStore::new("https://db.example.com/", "key", transport.clone());
        let settings = store.load_settings().await.unwrap();
        assert_eq!(settings, Settings::default());
        let requests = transport.requests.lock();
        assert_eq!(requests[0].url, "https://db.example.com/rest/v1/app_settings");
        assert_eq!(requests[0].header_value("apikey"), Some("key"));
    }

    #[tokio::test]
    async fn keyed_update_retries_on_concurrent_write() {
        let transport = Recorder::new(vec![
            ApiResponse::new(200, draft_row()),
            ApiResponse::new(200, "[]"),
            ApiResponse::new(200, draft_row()),
            ApiResponse::new(200, "[{}]"),
        ]);
        let store = SupabaseStore::new("https://db.example.com", "key", transport.clone());
        let draft = store.remove_marketplace("d-1", "EBAY_DE").await.unwrap();
        assert_eq!(draft.id, "d-1");
        let requests = transport.requests.lock();
        assert_eq!(requests.len(), 4);
        assert_eq!(requests[1].method, HttpMethod::Patch);
        assert!(requests[1].query.iter().any(|(k, _)| k == "updated_at"));
    }

    #[tokio::test]
    async fn missing_draft_maps_to_not_found() {
        let transport = Recorder::new(vec![ApiResponse::new(200, "[]")]);
        let store = SupabaseStore::new("https://db.example.com", "key", transport);
        assert!(matches!(
            store.get_draft("d-9").await,
            Err(StoreError::NotFound(_))
        ));
    }
}
