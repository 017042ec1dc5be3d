//! Client for the higher-level "linked-data" EMSON API, used for the two
//! high-volume resources: `assets` and `assetrelaties`.
//!
//! Paging is cursor-based via a `fromCursor` field in the POST body and an
//! `em-paging-next-cursor` response header, mirroring
//! `EMSONClient.get_resource_by_cursor` exactly. Payloads are wrapped in a
//! `@graph` envelope (JSON-LD convention), not a plain `data` array like
//! the EM-Infra API.

use amsync_core::PipelineError;
use serde::Serialize;
use serde_json::Value;

use crate::auth::Requester;

/// Body for the EMSON `*/search` endpoints. `crs` defaults to Belgian
/// Lambert 2008 (EPSG:3812), matching the upstream default so geometries
/// arrive in a known, fixed projection before the Asset Transformer
/// reprojects them to WGS84.
#[derive(Debug, Clone, Serialize)]
struct SearchQuery<'a> {
    size: u64,
    filters: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "orderByProperty")]
    order_by_property: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "fromCursor")]
    from_cursor: Option<&'a str>,
    crs: &'static str,
}

pub struct EmsonClient {
    requester: Box<dyn Requester>,
}

impl EmsonClient {
    pub fn new(requester: Box<dyn Requester>) -> Self {
        Self { requester }
    }

    pub async fn test_connection(&self) -> Result<Value, PipelineError> {
        let resp = self.requester.get("api/otl/assetrelaties").await?;
        resp.json()
            .await
            .map_err(|e| PipelineError::Storage(format!("invalid JSON from test_connection: {e}")))
    }

    /// Fetch one cursor page of `resource` (`assets` or `assetrelaties`).
    /// Returns `(next_cursor, items)`; a `None` cursor means there are no
    /// more pages.
    pub async fn get_resource_by_cursor(
        &self,
        resource: &str,
        cursor: Option<&str>,
        page_size: u64,
    ) -> Result<(Option<String>, Vec<Value>), PipelineError> {
        let query = SearchQuery {
            size: page_size,
            filters: Value::Object(Default::default()),
            order_by_property: None,
            from_cursor: cursor,
            crs: "3812",
        };
        let body = serde_json::to_value(&query)
            .map_err(|e| PipelineError::Storage(format!("failed to serialize search query: {e}")))?;
        let resp = self.requester.post_json(&format!("api/otl/{resource}/search"), &body).await?;
        let next_cursor = resp
            .headers()
            .get("em-paging-next-cursor")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let payload: Value = resp
            .json()
            .await
            .map_err(|e| PipelineError::Storage(format!("invalid JSON from {resource} search: {e}")))?;
        let items = payload
            .get("@graph")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok((next_cursor, items))
    }

    pub async fn get_asset_by_uuid(&self, uuid: &str) -> Result<Value, PipelineError> {
        let resp = self.requester.get(&format!("api/otl/assets/{uuid}")).await?;
        resp.json()
            .await
            .map_err(|e| PipelineError::Storage(format!("invalid JSON for asset {uuid}: {e}")))
    }

    pub async fn get_assetrelatie_by_uuid(&self, uuid: &str) -> Result<Value, PipelineError> {
        let resp = self.requester.get(&format!("api/otl/assetrelaties/{uuid}")).await?;
        resp.json()
            .await
            .map_err(|e| PipelineError::Storage(format!("invalid JSON for assetrelatie {uuid}: {e}")))
    }
}
