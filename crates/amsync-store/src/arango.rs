//! Thin REST client for the subset of the ArangoDB HTTP API this pipeline
//! needs: collection/graph/index management, bulk import, and AQL query
//! execution.

use amsync_core::PipelineError;
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

/// Bulk-import chunk size for `assets` — large enough to amortize HTTP
/// round-trips, small enough to keep a single import request's body and
/// ArangoDB-side transaction bounded.
pub const ASSET_IMPORT_CHUNK_SIZE: usize = 1_000;

/// Bulk-import chunk size for `bestekkoppelingen`, which are much smaller
/// documents than assets and so tolerate a larger batch.
pub const BESTEK_IMPORT_CHUNK_SIZE: usize = 2_000;

/// One `from`/`to` edge collection pairing in a named graph definition.
#[derive(Debug, Clone, Serialize)]
pub struct EdgeDefinition {
    pub collection: String,
    pub from: Vec<String>,
    pub to: Vec<String>,
}

pub struct ArangoStore {
    client: Client,
    base_url: String,
    database: String,
    basic_auth: Option<(String, String)>,
}

impl ArangoStore {
    /// `base_url` should not include a trailing slash or the `_db/<name>`
    /// segment — both are added per-request.
    pub fn new(base_url: impl Into<String>, database: impl Into<String>, basic_auth: Option<(&str, &str)>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            database: database.into(),
            basic_auth: basic_auth.map(|(u, p)| (u.to_string(), p.to_string())),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/_db/{}/{}", self.base_url, self.database, path)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self.client.request(method, self.url(path));
        if let Some((user, pass)) = &self.basic_auth {
            builder = builder.basic_auth(user, Some(pass));
        }
        builder
    }

    /// True if the named collection already exists (used by the Schema
    /// Provisioner to decide whether the database has been initialized).
    pub async fn collection_exists(&self, name: &str) -> Result<bool, PipelineError> {
        let resp = self
            .request(reqwest::Method::GET, &format!("_api/collection/{name}"))
            .send()
            .await
            .map_err(|e| PipelineError::Connectivity {
                url: format!("_api/collection/{name}"),
                source: e,
            })?;
        Ok(resp.status().is_success())
    }

    pub async fn list_collections(&self) -> Result<Vec<String>, PipelineError> {
        let body = self.get_json("_api/collection?excludeSystem=true").await?;
        let names = body
            .get("result")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|c| c.get("name").and_then(Value::as_str).map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        Ok(names)
    }

    pub async fn drop_collection(&self, name: &str) -> Result<(), PipelineError> {
        info!(collection = name, "dropping collection");
        self.request(reqwest::Method::DELETE, &format!("_api/collection/{name}"))
            .send()
            .await
            .map_err(|e| PipelineError::Connectivity {
                url: format!("_api/collection/{name}"),
                source: e,
            })?;
        Ok(())
    }

    pub async fn list_graphs(&self) -> Result<Vec<String>, PipelineError> {
        let body = self.get_json("_api/gharial").await?;
        let names = body
            .get("graphs")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|g| g.get("_key").and_then(Value::as_str).map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        Ok(names)
    }

    pub async fn drop_graph(&self, name: &str) -> Result<(), PipelineError> {
        self.request(reqwest::Method::DELETE, &format!("_api/gharial/{name}?dropCollections=false"))
            .send()
            .await
            .map_err(|e| PipelineError::Connectivity {
                url: format!("_api/gharial/{name}"),
                source: e,
            })?;
        Ok(())
    }

    /// Create a document or edge collection if it doesn't already exist.
    pub async fn ensure_collection(&self, name: &str, edge: bool) -> Result<(), PipelineError> {
        if self.collection_exists(name).await? {
            return Ok(());
        }
        let collection_type = if edge { 3 } else { 2 }; // ArangoDB type codes: 2=document, 3=edge
        let body = json!({ "name": name, "type": collection_type });
        self.post_json("_api/collection", &body).await?;
        debug!(collection = name, edge, "created collection");
        Ok(())
    }

    /// Create (or replace) a named graph with the given edge definitions.
    /// Idempotent: drops the graph first if present, matching the Index &
    /// Graph Builder's rebuild-on-provision contract.
    pub async fn ensure_graph(&self, name: &str, edge_definitions: &[EdgeDefinition]) -> Result<(), PipelineError> {
        let graphs = self.list_graphs().await?;
        if graphs.iter().any(|g| g == name) {
            self.drop_graph(name).await?;
        }
        let body = json!({
            "name": name,
            "edgeDefinitions": edge_definitions,
        });
        self.post_json("_api/gharial", &body).await?;
        info!(graph = name, "created graph");
        Ok(())
    }

    /// Create a persistent index over `fields` if an equivalent one
    /// doesn't already exist. ArangoDB's own `/_api/index` endpoint is
    /// idempotent on `(type, fields)`, so no pre-check is needed here.
    pub async fn ensure_persistent_index(
        &self,
        collection: &str,
        fields: &[&str],
        sparse: bool,
    ) -> Result<(), PipelineError> {
        let body = json!({
            "type": "persistent",
            "fields": fields,
            "sparse": sparse,
        });
        self.post_json(&format!("_api/index?collection={collection}"), &body)
            .await?;
        Ok(())
    }

    pub async fn truncate(&self, collection: &str) -> Result<(), PipelineError> {
        self.put_empty(&format!("_api/collection/{collection}/truncate")).await
    }

    /// Bulk import `docs` into `collection` with `on_duplicate=update` and
    /// `overwrite=false` (never replaces the whole collection, only
    /// updates matching `_key`s and inserts new ones), chunked to
    /// `chunk_size` documents per request.
    pub async fn bulk_import(
        &self,
        collection: &str,
        docs: &[Value],
        chunk_size: usize,
    ) -> Result<(), PipelineError> {
        for chunk in docs.chunks(chunk_size.max(1)) {
            let path = format!(
                "_api/import?collection={collection}&type=array&onDuplicate=update&overwrite=false&complete=true"
            );
            let resp = self
                .request(reqwest::Method::POST, &path)
                .json(chunk)
                .send()
                .await
                .map_err(|e| PipelineError::Connectivity {
                    url: path.clone(),
                    source: e,
                })?;
            if !resp.status().is_success() {
                let status = resp.status().as_u16();
                let body = resp.text().await.unwrap_or_default();
                warn!(collection, status, "bulk import chunk failed");
                return Err(PipelineError::Protocol { url: path, status, body });
            }
        }
        Ok(())
    }

    /// Execute an AQL query with bind variables, returning every result
    /// row (the adapter drains the server-side cursor to completion —
    /// none of our queries are expected to return an unbounded result
    /// set).
    pub async fn query(&self, aql: &str, bind_vars: Value) -> Result<Vec<Value>, PipelineError> {
        let body = json!({ "query": aql, "bindVars": bind_vars, "batchSize": 1000 });
        let mut result = Vec::new();
        let mut page = self.post_json("_api/cursor", &body).await?;
        loop {
            if let Some(rows) = page.get("result").and_then(Value::as_array) {
                result.extend(rows.iter().cloned());
            }
            let has_more = page.get("hasMore").and_then(Value::as_bool).unwrap_or(false);
            if !has_more {
                break;
            }
            let cursor_id = page
                .get("id")
                .and_then(Value::as_str)
                .ok_or_else(|| PipelineError::Storage("cursor continuation missing id".into()))?
                .to_string();
            page = self.put_json(&format!("_api/cursor/{cursor_id}")).await?;
        }
        Ok(result)
    }

    async fn get_json(&self, path: &str) -> Result<Value, PipelineError> {
        let resp = self
            .request(reqwest::Method::GET, path)
            .send()
            .await
            .map_err(|e| PipelineError::Connectivity { url: path.to_string(), source: e })?;
        self.check_and_parse(path, resp).await
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<Value, PipelineError> {
        let resp = self
            .request(reqwest::Method::POST, path)
            .json(body)
            .send()
            .await
            .map_err(|e| PipelineError::Connectivity { url: path.to_string(), source: e })?;
        self.check_and_parse(path, resp).await
    }

    async fn put_json(&self, path: &str) -> Result<Value, PipelineError> {
        let resp = self
            .request(reqwest::Method::PUT, path)
            .send()
            .await
            .map_err(|e| PipelineError::Connectivity { url: path.to_string(), source: e })?;
        self.check_and_parse(path, resp).await
    }

    async fn put_empty(&self, path: &str) -> Result<(), PipelineError> {
        let resp = self
            .request(reqwest::Method::PUT, path)
            .send()
            .await
            .map_err(|e| PipelineError::Connectivity { url: path.to_string(), source: e })?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(PipelineError::Protocol { url: path.to_string(), status, body });
        }
        Ok(())
    }

    async fn check_and_parse(&self, path: &str, resp: reqwest::Response) -> Result<Value, PipelineError> {
        let status = resp.status();
        if !status.is_success() {
            let status = status.as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(PipelineError::Protocol { url: path.to_string(), status, body });
        }
        resp.json()
            .await
            .map_err(|e| PipelineError::Storage(format!("invalid JSON from {path}: {e}")))
    }
}
