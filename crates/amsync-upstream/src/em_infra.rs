//! Client for the lower-level "EM-Infra" resource API.
//!
//! Two paging styles are used, matching the endpoints they're paired
//! with:
//!
//! - offset paging (`from`/`size` query params, `totalCount` in the
//!   response envelope) for small reference collections and for the
//!   identity endpoints (`toezichtgroepen`, `identiteiten`);
//! - cursor paging (`em-paging-next-cursor` response header) for
//!   `agents`/`betrokkenerelaties`, which additionally accept an
//!   `expansions` query param (`contactInfo`) to inline related data.
//!
//! This client also carries the Extra Fill Engine's capability-probe and
//! sub-resource calls (`get_kenmerktypes_by_assettype_uuid`,
//! `get_vplankoppelingen_by_asset_uuid`, `get_aansluiting_by_asset_uuid`,
//! `get_aansluitingrefs_page`), and the feed-probing calls whose output is
//! recorded but never consumed (no incremental feed support, by design).

use amsync_core::PipelineError;
use serde_json::Value;

use crate::auth::Requester;

/// One page of an offset-paged listing.
pub struct OffsetPage {
    pub items: Vec<Value>,
    pub total_count: Option<u64>,
}

pub struct EmInfraClient {
    requester: Box<dyn Requester>,
}

impl EmInfraClient {
    pub fn new(requester: Box<dyn Requester>) -> Self {
        Self { requester }
    }

    pub async fn test_connection(&self) -> Result<Value, PipelineError> {
        let resp = self.requester.get("core/api/assettypes?size=1").await?;
        resp.json::<Value>()
            .await
            .map_err(|e| PipelineError::Storage(format!("invalid JSON from test_connection: {e}")))
    }

    /// Offset-paged fetch against `core/api/{resource}`.
    pub async fn get_resource_page(
        &self,
        resource: &str,
        offset: u64,
        size: u64,
    ) -> Result<OffsetPage, PipelineError> {
        self.offset_page(&format!("core/api/{resource}"), offset, size).await
    }

    /// Offset-paged fetch against `identiteit/api/{resource}` — used for
    /// `toezichtgroepen` and `identiteiten`, which live under a distinct
    /// API root from the rest of the core resources.
    pub async fn get_identity_resource_page(
        &self,
        resource: &str,
        offset: u64,
        size: u64,
    ) -> Result<OffsetPage, PipelineError> {
        self.offset_page(&format!("identiteit/api/{resource}"), offset, size).await
    }

    async fn offset_page(&self, path: &str, offset: u64, size: u64) -> Result<OffsetPage, PipelineError> {
        let sep = if path.contains('?') { '&' } else { '?' };
        let url = format!("{path}{sep}from={offset}&size={size}");
        let resp = self.requester.get(&url).await?;
        let body: Value = resp
            .json()
            .await
            .map_err(|e| PipelineError::Storage(format!("invalid JSON from {path}: {e}")))?;
        let items = body
            .get("data")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let total_count = body.get("totalCount").and_then(Value::as_u64);
        Ok(OffsetPage { items, total_count })
    }

    /// Cursor-paged fetch against `core/api/otl/{resource}/search`, used
    /// for `agents` and `betrokkenerelaties`. `expansions` is forwarded as
    /// a repeated query param (e.g. `contactInfo`).
    pub async fn get_resource_by_cursor(
        &self,
        resource: &str,
        cursor: Option<&str>,
        size: u64,
        expansions: &[&str],
    ) -> Result<(Option<String>, Vec<Value>), PipelineError> {
        let mut url = format!("core/api/otl/{resource}/search?size={size}");
        if let Some(cursor) = cursor {
            url.push_str(&format!("&fromCursor={cursor}"));
        }
        for expansion in expansions {
            url.push_str(&format!("&expansions={expansion}"));
        }
        let resp = self.requester.get(&url).await?;
        let next_cursor = resp
            .headers()
            .get("em-paging-next-cursor")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body: Value = resp
            .json()
            .await
            .map_err(|e| PipelineError::Storage(format!("invalid JSON from {resource} search: {e}")))?;
        let items = body
            .get("data")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok((next_cursor, items))
    }

    /// Probe whether a feed has ever been advanced past its initial
    /// marker. Recorded in the `params` collection by the Schema
    /// Provisioner and never drained further — incremental feed
    /// consumption is out of scope.
    pub async fn get_last_feedproxy_page(&self, feed: &str) -> Result<Value, PipelineError> {
        let resp = self.requester.get(&format!("core/api/feedproxy/{feed}?direction=desc&pageSize=1")).await?;
        resp.json()
            .await
            .map_err(|e| PipelineError::Storage(format!("invalid JSON from feedproxy {feed}: {e}")))
    }

    pub async fn get_feedproxy_page(&self, feed: &str, page: &str) -> Result<Value, PipelineError> {
        let resp = self.requester.get(&format!("core/api/feedproxy/{feed}/{page}")).await?;
        resp.json()
            .await
            .map_err(|e| PipelineError::Storage(format!("invalid JSON from feedproxy {feed}/{page}: {e}")))
    }

    /// Capability probe used by the Extra Fill Engine's asset-type scan:
    /// the set of kenmerktypes (characteristic types) declared for an
    /// asset type, used to derive `has_plan_kenmerk`/`has_connection_kenmerk`.
    pub async fn get_kenmerktypes_by_assettype_uuid(&self, uuid: &str) -> Result<Vec<Value>, PipelineError> {
        let resp = self
            .requester
            .get(&format!("core/api/assettypes/{uuid}/kenmerktypes"))
            .await?;
        let body: Value = resp
            .json()
            .await
            .map_err(|e| PipelineError::Storage(format!("invalid JSON from kenmerktypes: {e}")))?;
        Ok(body.get("data").and_then(Value::as_array).cloned().unwrap_or_default())
    }

    /// Plan couplings ("vplankoppelingen") for a single plan-kenmerk asset.
    pub async fn get_vplankoppelingen_by_asset_uuid(&self, uuid: &str) -> Result<Vec<Value>, PipelineError> {
        let resp = self
            .requester
            .get(&format!("core/api/assets/{uuid}/vplankoppelingen"))
            .await?;
        let body: Value = resp
            .json()
            .await
            .map_err(|e| PipelineError::Storage(format!("invalid JSON from vplankoppelingen: {e}")))?;
        Ok(body.get("data").and_then(Value::as_array).cloned().unwrap_or_default())
    }

    /// The electrical connection record for a connection-kenmerk asset, if
    /// one exists.
    pub async fn get_aansluiting_by_asset_uuid(&self, uuid: &str) -> Result<Option<Value>, PipelineError> {
        let resp = self
            .requester
            .get(&format!("core/api/assets/{uuid}/aansluiting"))
            .await?;
        if resp.status().as_u16() == 404 {
            return Ok(None);
        }
        resp.json()
            .await
            .map(Some)
            .map_err(|e| PipelineError::Storage(format!("invalid JSON from aansluiting: {e}")))
    }

    /// Offset-paged listing of electrical-connection reference records.
    pub async fn get_aansluitingrefs_page(&self, offset: u64, size: u64) -> Result<OffsetPage, PipelineError> {
        self.offset_page("core/api/aansluitingrefs", offset, size).await
    }
}
