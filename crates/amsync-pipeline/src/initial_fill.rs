//! Initial Fill Engine.
//!
//! Fills every reference and high-volume resource from the AM upstream
//! APIs into the local replica, resumable from the per-resource progress
//! documents in `params`. Ground truth: `InitialFillStep.fill_tables` /
//! `_fill_resource` / `_fill_resource_using_em_infra` /
//! `_fill_resource_using_emson` / `_insert_assets`.
//!
//! Resources are grouped by dependency: reference collections first (no
//! dependencies), then `assets` (needs the assettype lookup), then the two
//! relation resources (need both the relatietype lookup and the assets
//! already being present). Within a group, resources fill concurrently,
//! bounded to [`MAX_WORKERS`] in flight; each resource's fill runs under
//! [`retry_forever`] so a failing upstream is retried indefinitely rather
//! than abandoned.

use std::collections::HashMap;

use amsync_core::{retry_forever, PipelineError, ResourceKind};
use amsync_store::{ArangoStore, StateStore};
use amsync_transform::{geometry, keys};
use amsync_upstream::{EmInfraClient, EmsonClient};
use arcstr::ArcStr;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use amsync_store::arango::{ASSET_IMPORT_CHUNK_SIZE, BESTEK_IMPORT_CHUNK_SIZE};

/// Upper bound on concurrently running resource fills within one
/// dependency group.
pub const MAX_WORKERS: usize = 8;

/// Default bounded-channel capacity for the optional producer/consumer
/// pipeline mode used on cursor-paged resources.
pub const PIPELINE_QUEUE_CAPACITY: usize = 3;

/// How an unparseable geometry is handled. See the Open Question recorded
/// in DESIGN.md: the default mirrors the original's actual (fail-the-page)
/// behavior, but the policy is swappable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryErrorPolicy {
    FailPage,
    SkipAsset,
}

impl Default for GeometryErrorPolicy {
    fn default() -> Self {
        GeometryErrorPolicy::FailPage
    }
}

const DEPENDENCY_GROUPS: &[&[ResourceKind]] = &[
    &[
        ResourceKind::Assettypes,
        ResourceKind::Relatietypes,
        ResourceKind::Bestekken,
        ResourceKind::Toezichtgroepen,
        ResourceKind::Identiteiten,
        ResourceKind::Beheerders,
        ResourceKind::Agents,
    ],
    &[ResourceKind::Assets],
    &[ResourceKind::Assetrelaties, ResourceKind::Betrokkenerelaties],
];

pub struct InitialFillEngine<'a> {
    store: &'a ArangoStore,
    em_infra: &'a EmInfraClient,
    emson: &'a EmsonClient,
    page_size: u64,
    use_pipeline: bool,
    geometry_policy: GeometryErrorPolicy,
    assettype_lookup: OnceCell<HashMap<String, ArcStr>>,
    relatietype_lookup: OnceCell<HashMap<String, ArcStr>>,
    beheerder_lookup: OnceCell<HashMap<String, ArcStr>>,
}

impl<'a> InitialFillEngine<'a> {
    pub fn new(store: &'a ArangoStore, em_infra: &'a EmInfraClient, emson: &'a EmsonClient) -> Self {
        Self {
            store,
            em_infra,
            emson,
            page_size: 100,
            use_pipeline: false,
            geometry_policy: GeometryErrorPolicy::default(),
            assettype_lookup: OnceCell::new(),
            relatietype_lookup: OnceCell::new(),
            beheerder_lookup: OnceCell::new(),
        }
    }

    pub fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_pipeline_mode(mut self, use_pipeline: bool) -> Self {
        self.use_pipeline = use_pipeline;
        self
    }

    /// Run every dependency group to completion, in order. A group's
    /// resources fill concurrently; the next group only starts once every
    /// resource in the previous one has reached `fill_<resource>.fill ==
    /// false`.
    pub async fn fill_all(&self) -> Result<(), PipelineError> {
        validate_dependency_groups(DEPENDENCY_GROUPS);
        for group in DEPENDENCY_GROUPS {
            info!(resources = ?group, "starting fill group");
            self.fill_group(group).await?;
        }
        Ok(())
    }

    /// Fill every resource in `group` concurrently, bounded to
    /// [`MAX_WORKERS`] in flight at once. Concurrency here is cooperative
    /// (futures interleaved on the current task via `buffer_unordered`),
    /// which is all an I/O-bound fan-out of HTTP calls needs — no OS
    /// thread pool required.
    async fn fill_group(&self, group: &[ResourceKind]) -> Result<(), PipelineError> {
        let concurrency = MAX_WORKERS.min(group.len().max(1));
        stream::iter(group.iter().copied())
            .map(|resource| self.fill_resource(resource))
            .buffer_unordered(concurrency)
            .try_for_each(|_| futures::future::ready(Ok(())))
            .await
    }

    /// Fill one resource to completion, retrying indefinitely on failure.
    /// Mirrors `_fill_resource`'s steps: check already-filled, load
    /// progress, select a generator for the resource, stream pages through
    /// the resource's handler, persist progress after every page, mark
    /// filled once the generator is exhausted.
    async fn fill_resource(&self, resource: ResourceKind) -> Result<(), PipelineError> {
        let state = StateStore::new(self.store);
        if state.is_filled(resource).await? {
            info!(resource = resource.collection_name(), "already filled, skipping");
            return Ok(());
        }

        retry_forever(resource.collection_name(), amsync_core::retry::RETRY_DELAY, || async {
            self.fill_resource_once(resource).await
        })
        .await;
        Ok(())
    }

    async fn fill_resource_once(&self, resource: ResourceKind) -> Result<(), PipelineError> {
        let state = StateStore::new(self.store);
        let mut progress = state.get_progress(resource).await?;

        let use_pipeline = self.use_pipeline && matches!(resource, ResourceKind::Assets | ResourceKind::Assetrelaties);
        if use_pipeline {
            self.fill_resource_via_pipeline(resource, &state, &progress).await?;
        } else {
            loop {
                let (items, next, done) = self.fetch_page(resource, progress.from.as_deref()).await?;
                if !items.is_empty() {
                    self.handle_page(resource, items).await?;
                }
                if let Some(next) = &next {
                    state.advance_progress(resource, next).await?;
                    progress.from = Some(next.clone());
                }
                if done {
                    break;
                }
            }
        }
        state.mark_filled(resource).await?;
        info!(resource = resource.collection_name(), "resource fully filled");
        Ok(())
    }

    /// Optional producer/consumer pipeline: one future fetches pages into
    /// a bounded channel, another drains it and writes. Both futures are
    /// polled concurrently via `tokio::join!` on the current task (no
    /// `tokio::spawn` needed, since neither future needs to outlive this
    /// call). Ground truth:
    /// `InitialFillStep._fill_resource_using_emson`'s `use_pipeline`
    /// branch.
    async fn fill_resource_via_pipeline(
        &self,
        resource: ResourceKind,
        state: &StateStore<'_>,
        progress: &amsync_store::FillProgress,
    ) -> Result<(), PipelineError> {
        enum PipelineMsg {
            Page { cursor: Option<String>, items: Vec<Value> },
            Eos,
        }

        let (tx, mut rx) = tokio::sync::mpsc::channel::<PipelineMsg>(PIPELINE_QUEUE_CAPACITY);
        let starting_cursor = progress.from.clone();

        let producer = async {
            let mut cursor = starting_cursor;
            loop {
                let (items, next, done) = self.fetch_page(resource, cursor.as_deref()).await?;
                if tx.send(PipelineMsg::Page { cursor: next.clone(), items }).await.is_err() {
                    break;
                }
                if done {
                    break;
                }
                cursor = next;
            }
            let _ = tx.send(PipelineMsg::Eos).await;
            Ok::<(), PipelineError>(())
        };

        let consumer = async {
            while let Some(msg) = rx.recv().await {
                match msg {
                    PipelineMsg::Page { cursor, items } => {
                        if !items.is_empty() {
                            self.handle_page(resource, items).await?;
                        }
                        if let Some(cursor) = cursor {
                            state.advance_progress(resource, &cursor).await?;
                        }
                    }
                    PipelineMsg::Eos => break,
                }
            }
            Ok::<(), PipelineError>(())
        };

        let (produced, consumed) = tokio::join!(producer, consumer);
        produced?;
        consumed?;
        Ok(())
    }

    /// Dispatch to the right generator for `resource`: offset paging for
    /// small reference collections, identity-offset paging for
    /// `toezichtgroepen`/`identiteiten`, cursor paging (with
    /// `contactInfo` expansion) for `agents`/`betrokkenerelaties`, and
    /// EMSON cursor paging for `assets`/`assetrelaties`.
    async fn fetch_page(
        &self,
        resource: ResourceKind,
        from: Option<&str>,
    ) -> Result<(Vec<Value>, Option<String>, bool), PipelineError> {
        match resource {
            ResourceKind::Assettypes
            | ResourceKind::Relatietypes
            | ResourceKind::Bestekken
            | ResourceKind::Beheerders => {
                let offset = parse_offset(from);
                let page = self
                    .em_infra
                    .get_resource_page(resource.collection_name(), offset, self.page_size)
                    .await?;
                let next_offset = offset + page.items.len() as u64;
                let done = match page.total_count {
                    Some(total) => next_offset >= total,
                    None => page.items.is_empty(),
                };
                let next = if done { None } else { Some(next_offset.to_string()) };
                Ok((page.items, next, done))
            }
            ResourceKind::Toezichtgroepen | ResourceKind::Identiteiten => {
                let offset = parse_offset(from);
                let page = self
                    .em_infra
                    .get_identity_resource_page(resource.collection_name(), offset, self.page_size)
                    .await?;
                let next_offset = offset + page.items.len() as u64;
                let done = match page.total_count {
                    Some(total) => next_offset >= total,
                    None => page.items.is_empty(),
                };
                let next = if done { None } else { Some(next_offset.to_string()) };
                Ok((page.items, next, done))
            }
            ResourceKind::Agents | ResourceKind::Betrokkenerelaties => {
                let (next_cursor, items) = self
                    .em_infra
                    .get_resource_by_cursor(resource.collection_name(), from, self.page_size, &["contactInfo"])
                    .await?;
                let done = next_cursor.is_none();
                Ok((items, next_cursor, done))
            }
            ResourceKind::Assets | ResourceKind::Assetrelaties => {
                let (next_cursor, items) = self
                    .emson
                    .get_resource_by_cursor(resource.collection_name(), from, self.page_size)
                    .await?;
                let done = next_cursor.is_none();
                Ok((items, next_cursor, done))
            }
            ResourceKind::Bestekkoppelingen => {
                unreachable!("bestekkoppelingen is derived from the assets handler, never fetched directly")
            }
        }
    }

    async fn handle_page(&self, resource: ResourceKind, items: Vec<Value>) -> Result<(), PipelineError> {
        match resource {
            ResourceKind::Assets => self.handle_assets_page(items).await,
            ResourceKind::Assetrelaties => self.handle_assetrelaties_page(items).await,
            ResourceKind::Betrokkenerelaties => self.handle_betrokkenerelaties_page(items).await,
            ResourceKind::Agents => self.handle_agents_page(items).await,
            ResourceKind::Assettypes
            | ResourceKind::Relatietypes
            | ResourceKind::Bestekken
            | ResourceKind::Toezichtgroepen
            | ResourceKind::Identiteiten
            | ResourceKind::Beheerders => self.handle_reference_page(resource, items).await,
            ResourceKind::Bestekkoppelingen => {
                unreachable!("bestekkoppelingen is derived from the assets handler, never fetched directly")
            }
        }
    }

    /// Small lookup resources: flat records (no namespaced keys to
    /// bucket), explicit field selection per entity, `_key` sliced from
    /// `uuid`. Ground truth: `InitialFillStep._handle_assettypes` /
    /// `_handle_relatietypes` / `_handle_bestekken` /
    /// `_handle_toezichtgroepen` / `_handle_identiteiten` /
    /// `_handle_beheerders`.
    async fn handle_reference_page(&self, resource: ResourceKind, items: Vec<Value>) -> Result<(), PipelineError> {
        let docs: Vec<Value> = items.iter().map(|raw| build_reference_doc(resource, raw)).collect();
        self.store.bulk_import(resource.collection_name(), &docs, ASSET_IMPORT_CHUNK_SIZE).await
    }

    /// `agents` handler: recursive key transform, then `_key`/`uuid` sliced
    /// from the `@id` path-tail. Ground truth: `InitialFillStep._handle_agents`.
    async fn handle_agents_page(&self, items: Vec<Value>) -> Result<(), PipelineError> {
        let docs: Vec<Value> = items
            .iter()
            .map(|raw| {
                let mut doc = keys::transform_keys(raw);
                assign_agent_keys(&mut doc);
                doc
            })
            .collect();
        self.store.bulk_import("agents", &docs, ASSET_IMPORT_CHUNK_SIZE).await
    }

    /// `betrokkenerelaties` handler. Analogous to the asset-relations
    /// handler, with source-type-dependent `_from` addressing and a
    /// `rol` derived from the role URI's terminal segment. Ground truth:
    /// `InitialFillStep._handle_betrokkenerelaties`.
    async fn handle_betrokkenerelaties_page(&self, items: Vec<Value>) -> Result<(), PipelineError> {
        let docs: Vec<Value> = items
            .iter()
            .map(|raw| {
                let mut doc = keys::transform_keys(raw);
                assign_truncated_key_from_id(&mut doc, 36);

                let from = doc
                    .get("RelatieObject_bron")
                    .map(|bron| {
                        let id_tail = bron.get("@id").and_then(Value::as_str).unwrap_or("");
                        let tail = keys::short_key_from_uri(id_tail);
                        if bron.get("@type").and_then(Value::as_str) == Some("http://purl.org/dc/terms/Agent") {
                            format!("agents/{}", truncate_chars(tail, 13))
                        } else {
                            format!("assets/{}", truncate_chars(tail, 36))
                        }
                    })
                    .unwrap_or_default();
                let to = doc
                    .get("RelatieObject_doel")
                    .and_then(|doel| doel.get("@id"))
                    .and_then(Value::as_str)
                    .map(keys::short_key_from_uri)
                    .map(|tail| format!("agents/{}", truncate_chars(tail, 13)))
                    .unwrap_or_default();

                if let Value::Object(map) = &mut doc {
                    map.insert("_from".into(), Value::String(from));
                    map.insert("_to".into(), Value::String(to));
                    map.entry("AIMDBStatus_isActief").or_insert(Value::Bool(true));
                }

                if let Some(rol_uri) = doc.get("HeeftBetrokkene_rol").and_then(Value::as_str) {
                    if rol_uri.contains('/') {
                        let rol = keys::short_key_from_uri(rol_uri).to_string();
                        if let Value::Object(map) = &mut doc {
                            map.insert("rol".into(), Value::String(rol));
                        }
                    }
                }

                doc
            })
            .collect();
        self.store.bulk_import("betrokkenerelaties", &docs, ASSET_IMPORT_CHUNK_SIZE).await
    }

    /// Asset handler: normalize keys, extract and reproject geometry,
    /// resolve the owning asset type (skipping the record if it can't be
    /// resolved), derive `toestand`/`naampad_*` and the tz-bucket foreign
    /// keys, collect bestek couplings, bulk import assets (chunk 1000) and
    /// couplings (chunk 2000). Ground truth: `InitialFillStep._insert_assets`
    /// and its `_enrich_state_and_naampad`/`_enrich_toezicht_keys`/
    /// `_collect_bestekkoppelingen` helpers.
    async fn handle_assets_page(&self, items: Vec<Value>) -> Result<(), PipelineError> {
        let assettype_lookup = self.assettype_lookup().await?;
        let beheerder_lookup = self.beheerder_lookup().await?;
        let mut docs = Vec::with_capacity(items.len());
        let mut couplings = Vec::new();
        let mut unknown_type_count = 0u64;

        for raw in &items {
            let mut doc = keys::normalize_asset(raw);
            assign_truncated_key_from_id(&mut doc, 36);

            if let Some(wkt) = geometry::extract_wkt(&doc) {
                match geometry::reproject_wkt_to_wgs84(&wkt) {
                    Ok(geojson) => {
                        if let Value::Object(map) = &mut doc {
                            map.insert("geometry".into(), serde_json::to_value(&geojson).unwrap_or(Value::Null));
                        }
                    }
                    Err(err) => match self.geometry_policy {
                        GeometryErrorPolicy::FailPage => {
                            return Err(PipelineError::Transform(format!("unparseable WKT '{wkt}': {err}")));
                        }
                        GeometryErrorPolicy::SkipAsset => {
                            warn!(%err, wkt, "skipping asset with unparseable geometry");
                            continue;
                        }
                    },
                }
            }

            let Some(type_uri) = doc.get("@type").and_then(Value::as_str) else {
                unknown_type_count += 1;
                continue;
            };
            let Some(assettype_key) = assettype_lookup.get(type_uri) else {
                unknown_type_count += 1;
                continue;
            };
            if let Value::Object(map) = &mut doc {
                map.insert("assettype_key".into(), Value::String(assettype_key.to_string()));
            }

            assign_toestand_and_naampad(&mut doc);
            assign_toezicht_keys(&mut doc, beheerder_lookup);
            collect_bestekkoppelingen(&doc, &mut couplings);

            docs.push(doc);
        }

        self.store.bulk_import("assets", &docs, ASSET_IMPORT_CHUNK_SIZE).await?;
        if !couplings.is_empty() {
            self.store.bulk_import("bestekkoppelingen", &couplings, BESTEK_IMPORT_CHUNK_SIZE).await?;
        }
        if unknown_type_count > 0 {
            warn!(unknown_type_count, "skipped asset(s) with unresolvable @type");
        }
        Ok(())
    }

    /// Asset-relations handler: normalize keys, resolve the relation type
    /// to its key via the relatietype lookup, import as edges.
    async fn handle_assetrelaties_page(&self, items: Vec<Value>) -> Result<(), PipelineError> {
        let relatietype_lookup = self.relatietype_lookup().await?;
        let mut docs = Vec::with_capacity(items.len());
        let mut unknown_type_count = 0u64;

        for raw in &items {
            let mut doc = keys::normalize_asset(raw);
            assign_truncated_key_from_id(&mut doc, 36);

            let Some(type_uri) = doc.get("@type").and_then(Value::as_str) else {
                unknown_type_count += 1;
                continue;
            };
            let Some(relatietype_key) = relatietype_lookup.get(type_uri) else {
                unknown_type_count += 1;
                continue;
            };
            if let Value::Object(map) = &mut doc {
                map.insert("relatietype_key".into(), Value::String(relatietype_key.to_string()));
                map.entry("AIMDBStatus_isActief").or_insert(Value::Bool(true));
            }
            assign_edge_endpoints(&mut doc);
            docs.push(doc);
        }

        self.store.bulk_import("assetrelaties", &docs, ASSET_IMPORT_CHUNK_SIZE).await?;
        if unknown_type_count > 0 {
            warn!(unknown_type_count, "skipped asset-relation(s) with unresolvable @type");
        }
        Ok(())
    }

    async fn assettype_lookup(&self) -> Result<&HashMap<String, ArcStr>, PipelineError> {
        self.assettype_lookup
            .get_or_try_init(|| async {
                let rows = self.store.query("FOR a IN assettypes RETURN a", serde_json::json!({})).await?;
                Ok(build_uri_lookup(rows))
            })
            .await
    }

    async fn relatietype_lookup(&self) -> Result<&HashMap<String, ArcStr>, PipelineError> {
        self.relatietype_lookup
            .get_or_try_init(|| async {
                let rows = self.store.query("FOR r IN relatietypes RETURN r", serde_json::json!({})).await?;
                Ok(build_uri_lookup(rows))
            })
            .await
    }

    /// `reference -> _key`, lazily built from the full `beheerders`
    /// collection. Ground truth: `InitialFillStep._insert_assets`'s
    /// `self.beheerders_lookup` construction.
    async fn beheerder_lookup(&self) -> Result<&HashMap<String, ArcStr>, PipelineError> {
        self.beheerder_lookup
            .get_or_try_init(|| async {
                let rows = self.store.query("FOR b IN beheerders RETURN b", serde_json::json!({})).await?;
                Ok(build_reference_lookup(rows))
            })
            .await
    }
}

/// `uri -> _key`, with `_key` as a cheaply-cloneable [`ArcStr`] since the
/// same handful of asset/relation types get looked up and cloned into
/// every one of the (potentially hundreds of thousands of) asset and
/// relation documents processed per run.
fn build_uri_lookup(rows: Vec<Value>) -> HashMap<String, ArcStr> {
    rows.into_iter()
        .filter_map(|row| {
            let uri = row.get("uri").and_then(Value::as_str)?.to_string();
            let key = row.get("_key").and_then(Value::as_str)?;
            Some((uri, ArcStr::from(key)))
        })
        .collect()
}

/// `referentie -> _key`, same cheap-clone rationale as [`build_uri_lookup`].
fn build_reference_lookup(rows: Vec<Value>) -> HashMap<String, ArcStr> {
    rows.into_iter()
        .filter_map(|row| {
            let reference = row.get("referentie").and_then(Value::as_str)?.to_string();
            let key = row.get("_key").and_then(Value::as_str)?;
            Some((reference, ArcStr::from(key)))
        })
        .collect()
}

/// Confirm the fill dependency groups form a strict acyclic chain (every
/// resource appears in exactly one group, and group order is a valid
/// topological order) before any fetching starts. Built as a graph rather
/// than asserted by eyeballing the const table, since a future resource
/// added to the wrong group would otherwise only surface as a confusing
/// "assettype_key missing" warning deep into a run.
fn validate_dependency_groups(groups: &[&[ResourceKind]]) {
    use petgraph::algo::toposort;
    use petgraph::graph::DiGraph;

    let mut graph = DiGraph::<ResourceKind, ()>::new();
    let mut nodes = HashMap::new();
    for &group in groups {
        for &resource in group {
            let idx = graph.add_node(resource);
            if nodes.insert(resource, idx).is_some() {
                panic!("resource {resource:?} listed in more than one dependency group");
            }
        }
    }
    for window in groups.windows(2) {
        for &from in window[0] {
            for &to in window[1] {
                graph.add_edge(nodes[&from], nodes[&to], ());
            }
        }
    }
    toposort(&graph, None).expect("fill dependency groups must be acyclic");
}

fn parse_offset(from: Option<&str>) -> u64 {
    from.and_then(|s| s.parse().ok()).unwrap_or(0)
}

/// Set `_key` from the record's `@id` URI (its last path segment),
/// truncated to `len` characters — e.g. 36 for assets/asset-relations/
/// betrokkenerelaties. Edge endpoint derivation ([`assign_edge_endpoints`])
/// relies on this having already run for both the edge document itself
/// and on every asset it points to.
fn assign_truncated_key_from_id(doc: &mut Value, len: usize) {
    let Some(id) = doc.get("@id").and_then(Value::as_str) else { return };
    let key = truncate_chars(keys::short_key_from_uri(id), len);
    if let Value::Object(map) = doc {
        map.insert("_key".into(), Value::String(key));
    }
}

/// `agents`/betrokkenerelaties-endpoint key derivation: `_key` is the
/// first 13 chars of the `@id` path-tail, `uuid` the first 36. Ground
/// truth: `InitialFillStep._handle_agents`.
fn assign_agent_keys(doc: &mut Value) {
    let Some(id) = doc.get("@id").and_then(Value::as_str) else { return };
    let tail = keys::short_key_from_uri(id);
    let key = truncate_chars(tail, 13);
    let uuid = truncate_chars(tail, 36);
    if let Value::Object(map) = doc {
        map.insert("_key".into(), Value::String(key));
        map.insert("uuid".into(), Value::String(uuid));
    }
}

/// Byte-safe truncation to at most `max_chars` Unicode scalar values.
fn truncate_chars(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

/// Build the stored document for one of the six small reference
/// resources, matching the field selection of
/// `InitialFillStep._handle_assettypes`/`_handle_relatietypes`/
/// `_handle_bestekken`/`_handle_toezichtgroepen`/`_handle_identiteiten`/
/// `_handle_beheerders` exactly (these are hand-picked field lists, not a
/// generic passthrough — e.g. `label` comes from `afkorting` on
/// asset-types, and relation-types synthesize `short` from the URI
/// fragment).
fn build_reference_doc(resource: ResourceKind, raw: &Value) -> Value {
    let field = |name: &str| raw.get(name).cloned().unwrap_or(Value::Null);
    match resource {
        ResourceKind::Assettypes => serde_json::json!({
            "_key": raw.get("uuid").and_then(Value::as_str).map(|s| truncate_chars(s, 8)),
            "uuid": field("uuid"),
            "naam": field("naam"),
            "label": field("afkorting"),
            "uri": field("uri"),
            "short_uri": field("korteUri"),
            "definitie": field("definitie"),
            "actief": field("actief"),
        }),
        ResourceKind::Relatietypes => {
            let short = raw.get("uri").and_then(Value::as_str).map(|uri| {
                uri.rsplit('#').next().unwrap_or(uri).to_string()
            });
            serde_json::json!({
                "_key": raw.get("uuid").and_then(Value::as_str).map(|s| truncate_chars(s, 4)),
                "uuid": field("uuid"),
                "naam": field("naam"),
                "label": field("label"),
                "uri": field("uri"),
                "short": short,
                "definitie": field("definitie"),
                "actief": raw.get("actief").cloned().unwrap_or(Value::Bool(true)),
                "gericht": field("gericht"),
            })
        }
        ResourceKind::Bestekken => serde_json::json!({
            "_key": raw.get("uuid").and_then(Value::as_str).map(|s| truncate_chars(s, 8)),
            "uuid": field("uuid"),
            "type": field("type"),
            "awvId": field("awvId"),
            "eDeltaDossiernummer": field("eDeltaDossiernummer"),
            "eDeltaBesteknummer": field("eDeltaBesteknummer"),
            "aannemerNaam": field("aannemerNaam"),
            "aannemerReferentie": field("aannemerReferentie"),
            "actief": field("actief"),
        }),
        ResourceKind::Toezichtgroepen => serde_json::json!({
            "_key": raw.get("uuid").and_then(Value::as_str).map(|s| truncate_chars(s, 8)),
            "uuid": field("uuid"),
            "naam": field("naam"),
            "actiefInterval": field("actiefInterval"),
            "actief": raw.get("actiefInterval").map(compute_actief_interval_active).unwrap_or(false),
            "contactFiche": field("contactFiche"),
            "omschrijving": field("omschrijving"),
            "type": field("_type"),
        }),
        ResourceKind::Identiteiten => serde_json::json!({
            "_key": raw.get("uuid").and_then(Value::as_str).map(|s| truncate_chars(s, 8)),
            "uuid": field("uuid"),
            "type": field("_type"),
            "naam": field("naam"),
            "voornaam": field("voornaam"),
            "gebruikersnaam": field("gebruikersnaam"),
            "systeem": field("systeem"),
            "voId": field("voId"),
            "bron": field("bron"),
            "actief": field("actief"),
            "contactFiche": field("contactFiche"),
            "gebruikersrechtOrganisaties": field("gebruikersrechtOrganisaties"),
        }),
        ResourceKind::Beheerders => serde_json::json!({
            "_key": raw.get("uuid").and_then(Value::as_str).map(|s| truncate_chars(s, 8)),
            "uuid": field("uuid"),
            "type": field("_type"),
            "naam": field("naam"),
            "referentie": field("referentie"),
            "actiefInterval": field("actiefInterval"),
            "actief": raw.get("actiefInterval").map(compute_actief_interval_active).unwrap_or(false),
            "contactFiche": field("contactFiche"),
        }),
        other => unreachable!("{other:?} is not a reference resource"),
    }
}

/// Compute `active` from an `actiefInterval: {van, tot}` field: true iff
/// `van` is in the past and (`tot` is absent or still in the future).
/// Ground truth: `InitialFillStep.actief_interval_to_actief`.
fn compute_actief_interval_active(interval: &Value) -> bool {
    let Some(van) = interval.get("van").and_then(Value::as_str) else { return false };
    let Ok(van) = chrono::DateTime::parse_from_rfc3339(van) else { return false };
    let now = chrono::Utc::now();
    if van.with_timezone(&chrono::Utc) >= now {
        return false;
    }
    match interval.get("tot").and_then(Value::as_str) {
        None => true,
        Some(tot) => match chrono::DateTime::parse_from_rfc3339(tot) {
            Ok(tot) => tot.with_timezone(&chrono::Utc) > now,
            Err(_) => false,
        },
    }
}

/// Derive `toestand` (terminal segment of the state URI) and
/// `naampad_parts`/`naampad_parent` (split of the `/`-separated name-path)
/// on an already-normalized asset document. Ground truth:
/// `InitialFillStep._enrich_state_and_naampad`.
fn assign_toestand_and_naampad(doc: &mut Value) {
    let toestand = doc
        .get("AIMToestand_toestand")
        .and_then(Value::as_str)
        .map(keys::short_key_from_uri)
        .map(str::to_string);
    let naampad = doc.get("NaampadObject_naampad").and_then(Value::as_str).map(str::to_string);

    let Value::Object(map) = doc else { return };
    if let Some(toestand) = toestand {
        map.insert("toestand".into(), Value::String(toestand));
    }
    if let Some(naampad) = naampad {
        let parts: Vec<Value> = naampad.split('/').map(|p| Value::String(p.to_string())).collect();
        if parts.len() >= 2 {
            let parent = parts[..parts.len() - 1]
                .iter()
                .map(|v| v.as_str().unwrap_or_default())
                .collect::<Vec<_>>()
                .join("/");
            map.insert("naampad_parent".into(), Value::String(parent));
        }
        map.insert("naampad_parts".into(), Value::Array(parts));
    }
}

/// Derive the tz-bucket foreign keys `toezichtgroep_key`, `toezichter_key`
/// (both first 8 chars of their `DtcToezichtGroep_id`/`DtcToezichter_id`),
/// and `beheerder_key` (resolved via `beheerder_lookup` by reference
/// string). Ground truth: `InitialFillStep._enrich_toezicht_keys`.
fn assign_toezicht_keys(doc: &mut Value, beheerder_lookup: &HashMap<String, ArcStr>) {
    let Some(tz) = doc.get("tz").cloned() else { return };

    let toezichtgroep_key = tz
        .pointer("/Toezicht_toezichtgroep/DtcToezichtGroep_id")
        .and_then(Value::as_str)
        .map(|id| truncate_chars(id, 8));
    let toezichter_key = tz
        .pointer("/Toezicht_toezichter/DtcToezichter_id")
        .and_then(Value::as_str)
        .map(|id| truncate_chars(id, 8));
    let beheerder_key = tz
        .pointer("/Schadebeheerder_schadebeheerder/DtcBeheerder_referentie")
        .and_then(Value::as_str)
        .and_then(|reference| beheerder_lookup.get(reference))
        .map(|key| key.to_string());
    if beheerder_key.is_none() {
        if let Some(reference) =
            tz.pointer("/Schadebeheerder_schadebeheerder/DtcBeheerder_referentie").and_then(Value::as_str)
        {
            warn!(reference, "beheerder reference not found in beheerder_lookup");
        }
    }

    let Value::Object(map) = doc else { return };
    if let Some(key) = toezichtgroep_key {
        map.insert("toezichtgroep_key".into(), Value::String(key));
    }
    if let Some(key) = toezichter_key {
        map.insert("toezichter_key".into(), Value::String(key));
    }
    if let Some(key) = beheerder_key {
        map.insert("beheerder_key".into(), Value::String(key));
    }
}

/// Convert `bs.Bestek_bestekkoppeling` entries on an already-normalized
/// asset into `bestekkoppelingen` edge documents. Ground truth:
/// `InitialFillStep._collect_bestekkoppelingen`.
fn collect_bestekkoppelingen(doc: &Value, couplings: &mut Vec<Value>) {
    let Some(asset_key) = doc.get("_key").and_then(Value::as_str) else { return };
    let Some(entries) = doc.pointer("/bs/Bestek_bestekkoppeling").and_then(Value::as_array) else { return };

    for koppeling in entries {
        let Some(bestek_id) =
            koppeling.pointer("/DtcBestekkoppeling_bestekId/DtcIdentificator_identificator").and_then(Value::as_str)
        else {
            continue;
        };
        let status = koppeling
            .get("status")
            .and_then(Value::as_str)
            .map(keys::short_key_from_uri)
            .map(str::to_string);

        let mut edge = koppeling.clone();
        if let Value::Object(map) = &mut edge {
            map.insert("_key".into(), Value::String(uuid::Uuid::new_v4().to_string()));
            map.insert("_from".into(), Value::String(format!("assets/{asset_key}")));
            map.insert("_to".into(), Value::String(format!("bestekken/{}", truncate_chars(bestek_id, 8))));
            match status {
                Some(status) => map.insert("status".into(), Value::String(status)),
                None => map.insert("status".into(), Value::Null),
            };
        }
        couplings.push(edge);
    }
}

/// Derive `_from`/`_to` for an assetrelatie edge from its
/// `RelatieObject_bron`/`RelatieObject_doel` endpoint objects (post-bucketing
/// of `RelatieObject:bron`/`RelatieObject:doel`), each addressed by their
/// `@id` path-tail truncated to the 36-char asset key length. Mirrors
/// `handle_betrokkenerelaties_page`'s endpoint extraction, since both
/// resources share the same `RelatieObject_bron`/`RelatieObject_doel` shape.
fn assign_edge_endpoints(doc: &mut Value) {
    let bron = doc
        .pointer("/RelatieObject_bron/@id")
        .and_then(Value::as_str)
        .map(keys::short_key_from_uri)
        .map(|s| truncate_chars(s, 36));
    let doel = doc
        .pointer("/RelatieObject_doel/@id")
        .and_then(Value::as_str)
        .map(keys::short_key_from_uri)
        .map(|s| truncate_chars(s, 36));
    if let (Some(bron), Some(doel)) = (bron, doel) {
        if let Value::Object(map) = doc {
            map.insert("_from".into(), Value::String(format!("assets/{bron}")));
            map.insert("_to".into(), Value::String(format!("assets/{doel}")));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn real_dependency_groups_validate() {
        validate_dependency_groups(DEPENDENCY_GROUPS);
    }

    #[test]
    #[should_panic(expected = "listed in more than one dependency group")]
    fn duplicate_resource_across_groups_panics() {
        let groups: &[&[ResourceKind]] =
            &[&[ResourceKind::Assettypes], &[ResourceKind::Assettypes, ResourceKind::Assets]];
        validate_dependency_groups(groups);
    }

    #[test]
    fn assign_truncated_key_from_id_takes_last_uri_segment() {
        let mut doc = json!({ "@id": "https://data.example.org/id/asset/abc-123" });
        assign_truncated_key_from_id(&mut doc, 36);
        assert_eq!(doc["_key"], "abc-123");
    }

    #[test]
    fn assign_truncated_key_from_id_truncates_long_tails() {
        let mut doc = json!({ "@id": "https://data.example.org/id/asset/123456789012345678901234567890123456789" });
        assign_truncated_key_from_id(&mut doc, 8);
        assert_eq!(doc["_key"], "12345678");
    }

    #[test]
    fn assign_agent_keys_splits_into_key_and_uuid() {
        let mut doc = json!({ "@id": "https://data.example.org/id/agent/123456789012345678901234567890123456" });
        assign_agent_keys(&mut doc);
        assert_eq!(doc["_key"], "1234567890123");
        assert_eq!(doc["uuid"], "123456789012345678901234567890123456");
    }

    #[test]
    fn assign_edge_endpoints_builds_collection_qualified_refs() {
        let mut doc = json!({
            "RelatieObject_bron": { "@id": "https://data.example.org/id/asset/aaa" },
            "RelatieObject_doel": { "@id": "https://data.example.org/id/asset/bbb" },
        });
        assign_edge_endpoints(&mut doc);
        assert_eq!(doc["_from"], "assets/aaa");
        assert_eq!(doc["_to"], "assets/bbb");
    }

    #[test]
    fn build_reference_doc_slices_assettype_key_and_renames_label() {
        let raw = json!({
            "uuid": "11111111-2222-3333-4444-555555555555",
            "afkorting": "KST",
            "uri": "https://example.org/id/assettypes/Kast",
            "korteUri": "onderdeel#Kast",
        });
        let doc = build_reference_doc(ResourceKind::Assettypes, &raw);
        assert_eq!(doc["_key"], "11111111");
        assert_eq!(doc["label"], "KST");
        assert_eq!(doc["short_uri"], "onderdeel#Kast");
    }

    #[test]
    fn build_reference_doc_relatietype_derives_short_from_uri_fragment() {
        let raw = json!({
            "uuid": "aaaa1111-2222-3333-4444-555555555555",
            "uri": "https://example.org/ns#Voedt",
        });
        let doc = build_reference_doc(ResourceKind::Relatietypes, &raw);
        assert_eq!(doc["_key"], "aaaa");
        assert_eq!(doc["short"], "Voedt");
        assert_eq!(doc["actief"], true);
    }

    #[test]
    fn build_reference_doc_toezichtgroep_computes_active_from_interval() {
        let raw = json!({
            "uuid": "22222222-3333-4444-5555-666666666666",
            "actiefInterval": { "van": "2000-01-01T00:00:00Z" },
        });
        let doc = build_reference_doc(ResourceKind::Toezichtgroepen, &raw);
        assert_eq!(doc["_key"], "22222222");
        assert_eq!(doc["actief"], true);
    }

    #[test]
    fn computed_active_true_within_interval() {
        let interval = json!({ "van": "2000-01-01T00:00:00Z", "tot": "2999-01-01T00:00:00Z" });
        assert!(compute_actief_interval_active(&interval));
    }

    #[test]
    fn computed_active_false_when_van_in_future() {
        let interval = json!({ "van": "2999-01-01T00:00:00Z" });
        assert!(!compute_actief_interval_active(&interval));
    }

    #[test]
    fn computed_active_false_when_tot_passed() {
        let interval = json!({ "van": "2000-01-01T00:00:00Z", "tot": "2001-01-01T00:00:00Z" });
        assert!(!compute_actief_interval_active(&interval));
    }

    #[test]
    fn computed_active_true_with_no_tot() {
        let interval = json!({ "van": "2000-01-01T00:00:00Z" });
        assert!(compute_actief_interval_active(&interval));
    }

    #[test]
    fn toestand_and_naampad_derivation_matches_worked_example() {
        let mut doc = json!({
            "AIMToestand_toestand": "https://example.org/id/KlAIMToestand/in-gebruik",
            "NaampadObject_naampad": "X9Y8Z7/X9Y8Z7.K",
        });
        assign_toestand_and_naampad(&mut doc);
        assert_eq!(doc["toestand"], "in-gebruik");
        assert_eq!(doc["naampad_parts"], json!(["X9Y8Z7", "X9Y8Z7.K"]));
        assert_eq!(doc["naampad_parent"], "X9Y8Z7");
    }

    #[test]
    fn naampad_parent_absent_for_single_segment_path() {
        let mut doc = json!({ "NaampadObject_naampad": "X9Y8Z7" });
        assign_toestand_and_naampad(&mut doc);
        assert_eq!(doc["naampad_parts"], json!(["X9Y8Z7"]));
        assert!(doc.get("naampad_parent").is_none());
    }

    #[test]
    fn toezicht_keys_match_worked_example() {
        let mut doc = json!({
            "tz": {
                "Toezicht_toezichtgroep": { "DtcToezichtGroep_id": "11111111-1111-1111-1111-111111111111" },
                "Toezicht_toezichter": { "DtcToezichter_id": "00000000-0000-0000-0000-000000000000" },
                "Schadebeheerder_schadebeheerder": { "DtcBeheerder_referentie": "BEH-000" },
            }
        });
        let mut lookup = HashMap::new();
        lookup.insert("BEH-000".to_string(), ArcStr::from("4e77efda"));
        assign_toezicht_keys(&mut doc, &lookup);
        assert_eq!(doc["toezichtgroep_key"], "11111111");
        assert_eq!(doc["toezichter_key"], "00000000");
        assert_eq!(doc["beheerder_key"], "4e77efda");
    }

    #[test]
    fn beheerder_key_absent_on_lookup_miss() {
        let mut doc = json!({
            "tz": { "Schadebeheerder_schadebeheerder": { "DtcBeheerder_referentie": "UNKNOWN" } }
        });
        assign_toezicht_keys(&mut doc, &HashMap::new());
        assert!(doc.get("beheerder_key").is_none());
    }

    #[test]
    fn bestek_coupling_edge_matches_worked_example() {
        let doc = json!({
            "_key": "A00000000000000000000000000000000000",
            "bs": {
                "Bestek_bestekkoppeling": [{
                    "DtcBestekkoppeling_bestekId": { "DtcIdentificator_identificator": "00000000-0000-1111-2222-333333333333" },
                    "status": "https://example.org/id/status/actief",
                }]
            }
        });
        let mut couplings = Vec::new();
        collect_bestekkoppelingen(&doc, &mut couplings);
        assert_eq!(couplings.len(), 1);
        assert_eq!(couplings[0]["_from"], "assets/A00000000000000000000000000000000000");
        assert_eq!(couplings[0]["_to"], "bestekken/00000000");
        assert_eq!(couplings[0]["status"], "actief");
        assert!(couplings[0]["_key"].as_str().unwrap().len() > 0);
    }

    #[test]
    fn parse_offset_defaults_to_zero() {
        assert_eq!(parse_offset(None), 0);
        assert_eq!(parse_offset(Some("42")), 42);
        assert_eq!(parse_offset(Some("not-a-number")), 0);
    }
}
