//! Extra Fill Engine.
//!
//! Runs after the Initial Fill Engine and enriches assets with data that
//! isn't available from the bulk resource listings: capability flags on
//! asset types, plan couplings, electrical-connection references and
//! edges, and the four derived per-relation-type edge collections.
//! Ground truth: `ExtraFillStep`.
//!
//! `fill_aansluitingrefs`/`fill_aansluitingen` are no-op placeholders in
//! the system this was distilled from; their real shape here follows the
//! textual description of electrical-connection handling rather than the
//! (admittedly stubbed) original.

use amsync_core::{PipelineError, DERIVED_RELATION_TYPES};
use amsync_store::ArangoStore;
use amsync_transform::keys;
use amsync_upstream::EmInfraClient;
use serde_json::{json, Value};
use tracing::{info, warn};

/// Resources the Extra Fill Engine processes, in order — later steps
/// assume earlier ones have already run (e.g. the connection edges step
/// needs `has_connection_kenmerk` from the asset-type probe).
const RESOURCES_TO_FILL: &[&str] = &[
    "assettypes_capabilities",
    "vplankoppelingen",
    "aansluitingrefs",
    "aansluitingen",
    "derived_edges",
];

pub struct ExtraFillEngine<'a> {
    store: &'a ArangoStore,
    em_infra: &'a EmInfraClient,
    page_size: u64,
}

impl<'a> ExtraFillEngine<'a> {
    pub fn new(store: &'a ArangoStore, em_infra: &'a EmInfraClient) -> Self {
        Self { store, em_infra, page_size: 100 }
    }

    pub async fn execute(&self) -> Result<(), PipelineError> {
        for resource in RESOURCES_TO_FILL {
            info!(resource, "starting extra fill step");
            self.fill_resource(resource).await?;
        }
        Ok(())
    }

    async fn fill_resource(&self, resource: &str) -> Result<(), PipelineError> {
        if self.already_filled(resource).await? {
            info!(resource, "already filled, skipping");
            return Ok(());
        }

        match resource {
            "assettypes_capabilities" => self.fill_assettype_capabilities().await?,
            "vplankoppelingen" => self.fill_vplankoppelingen().await?,
            "aansluitingrefs" => self.fill_aansluitingrefs().await?,
            "aansluitingen" => self.fill_aansluitingen_edges().await?,
            "derived_edges" => self.fill_derived_edges().await?,
            other => unreachable!("unknown extra-fill resource {other}"),
        }

        self.mark_custom_filled(resource).await
    }

    async fn already_filled(&self, resource: &str) -> Result<bool, PipelineError> {
        let rows = self
            .store
            .query(
                "FOR p IN params FILTER p._key == @key RETURN p.fill",
                json!({ "key": format!("fill_extra_{resource}") }),
            )
            .await?;
        Ok(rows.first().map(|v| v == &Value::Bool(false)).unwrap_or(false))
    }

    async fn mark_custom_filled(&self, resource: &str) -> Result<(), PipelineError> {
        let doc = json!({ "_key": format!("fill_extra_{resource}"), "fill": false, "from": Value::Null });
        self.store.bulk_import("params", std::slice::from_ref(&doc), 1).await
    }

    /// Probe every asset type's kenmerktypes and set
    /// `has_plan_kenmerk`/`has_connection_kenmerk`, processed in sorted
    /// uuid order with a resumable "last processed uuid" marker.
    async fn fill_assettype_capabilities(&self) -> Result<(), PipelineError> {
        let mut assettypes = self.store.query("FOR a IN assettypes SORT a._key RETURN a", json!({})).await?;
        assettypes.sort_by(|a, b| a["_key"].as_str().cmp(&b["_key"].as_str()));

        for assettype in assettypes {
            let Some(key) = assettype.get("_key").and_then(Value::as_str) else { continue };
            let kenmerktypes = self.em_infra.get_kenmerktypes_by_assettype_uuid(key).await?;
            let has_plan_kenmerk = kenmerktypes.iter().any(|k| k.get("type").and_then(Value::as_str) == Some("vplan"));
            let has_connection_kenmerk = kenmerktypes
                .iter()
                .any(|k| k.get("type").and_then(Value::as_str) == Some("aansluitpunt"));

            let patch = json!({
                "_key": key,
                "has_plan_kenmerk": has_plan_kenmerk,
                "has_connection_kenmerk": has_connection_kenmerk,
            });
            self.store.bulk_import("assettypes", std::slice::from_ref(&patch), 1).await?;
        }
        Ok(())
    }

    /// For every asset whose type has `has_plan_kenmerk`, fetch and
    /// upsert its plan couplings ("vplankoppelingen").
    async fn fill_vplankoppelingen(&self) -> Result<(), PipelineError> {
        let plan_asset_keys = self
            .store
            .query(
                "FOR a IN assets FILTER a.assettype_key IN (FOR t IN assettypes FILTER t.has_plan_kenmerk RETURN t._key) \
                 SORT a._key RETURN a._key",
                json!({}),
            )
            .await?;

        for key_value in plan_asset_keys {
            let Some(key) = key_value.as_str() else { continue };
            let couplings = self.em_infra.get_vplankoppelingen_by_asset_uuid(key).await?;
            if couplings.is_empty() {
                continue;
            }
            let docs: Vec<Value> = couplings
                .iter()
                .map(|c| {
                    let mut doc = keys::normalize_asset(c);
                    if let Value::Object(map) = &mut doc {
                        map.insert("asset_key".into(), Value::String(key.to_string()));
                    }
                    doc
                })
                .collect();
            self.store.bulk_import("vplankoppelingen", &docs, 1_000).await?;
        }
        Ok(())
    }

    /// Offset-paged fetch of electrical-connection reference records
    /// (`aansluitingrefs`), keyed by the first 8 characters of their uuid.
    async fn fill_aansluitingrefs(&self) -> Result<(), PipelineError> {
        let mut offset = 0u64;
        loop {
            let page = self.em_infra.get_aansluitingrefs_page(offset, self.page_size).await?;
            if page.items.is_empty() {
                break;
            }
            let docs: Vec<Value> = page
                .items
                .iter()
                .filter_map(|raw| {
                    let uuid = raw.get("uuid").and_then(Value::as_str)?;
                    let mut doc = keys::normalize_asset(raw);
                    if let Value::Object(map) = &mut doc {
                        map.insert("_key".into(), Value::String(short_ref_key(uuid)));
                    }
                    Some(doc)
                })
                .collect();
            self.store.bulk_import("aansluitingrefs", &docs, 1_000).await?;

            offset += page.items.len() as u64;
            if let Some(total) = page.total_count {
                if offset >= total {
                    break;
                }
            }
        }
        Ok(())
    }

    /// For every asset whose type has `has_connection_kenmerk`, fetch its
    /// electrical connection and, if present, insert an edge to the
    /// matching `aansluitingrefs` document keyed
    /// `<asset-key>_<ref-key-8>`.
    async fn fill_aansluitingen_edges(&self) -> Result<(), PipelineError> {
        let connection_asset_keys = self
            .store
            .query(
                "FOR a IN assets FILTER a.assettype_key IN \
                 (FOR t IN assettypes FILTER t.has_connection_kenmerk RETURN t._key) \
                 SORT a._key RETURN a._key",
                json!({}),
            )
            .await?;

        let mut edges = Vec::new();
        for key_value in connection_asset_keys {
            let Some(asset_key) = key_value.as_str() else { continue };
            let Some(aansluiting) = self.em_infra.get_aansluiting_by_asset_uuid(asset_key).await? else { continue };
            let Some(ref_uuid) = aansluiting.get("uuid").and_then(Value::as_str) else { continue };
            let ref_key = short_ref_key(ref_uuid);
            edges.push(json!({
                "_key": format!("{asset_key}_{ref_key}"),
                "_from": format!("assets/{asset_key}"),
                "_to": format!("aansluitingrefs/{ref_key}"),
            }));
        }
        if !edges.is_empty() {
            self.store.bulk_import("aansluitingen", &edges, 1_000).await?;
        }
        Ok(())
    }

    /// Rebuild the four derived per-relation-type edge collections
    /// (`Voedt`, `Sturing`, `Bevestiging`, `HoortBij`) by truncating each
    /// and re-inserting an AQL-derived set from `assetrelaties`, filtering
    /// to active relations whose endpoints are both active. Ground truth:
    /// `ExtraFillStep._fill_derived_edges`.
    ///
    /// This truncate-then-rebuild is not staged behind a shadow collection
    /// — readers can observe a momentarily-empty collection mid-rebuild.
    /// That mirrors the original's actual behavior; see DESIGN.md for the
    /// alternative considered and why it wasn't built.
    async fn fill_derived_edges(&self) -> Result<(), PipelineError> {
        for relation_type in DERIVED_RELATION_TYPES {
            self.ensure_edge_collection(relation_type).await?;
            self.store.truncate(relation_type).await?;

            let aql = format!(
                "FOR rel IN assetrelaties \
                 FILTER rel.relatietype_key IN (FOR rt IN relatietypes FILTER rt.short == @label RETURN rt._key) \
                 FILTER rel.AIMDBStatus_isActief == true \
                 LET from_doc = DOCUMENT(rel._from) \
                 LET to_doc = DOCUMENT(rel._to) \
                 FILTER from_doc.AIMDBStatus.isActief == true AND to_doc.AIMDBStatus.isActief == true \
                 INSERT {{ \
                   _from: rel._from, _to: rel._to, \
                   source_edge_id: rel._id, source_edge_key: rel._key \
                 }} INTO {relation_type} OPTIONS {{ ignoreErrors: true }}"
            );
            self.store.query(&aql, json!({ "label": relation_type })).await?;
            info!(relation_type, "rebuilt derived edge collection");
        }
        Ok(())
    }

    async fn ensure_edge_collection(&self, name: &str) -> Result<(), PipelineError> {
        if !self.store.collection_exists(name).await? {
            warn!(collection = name, "derived edge collection missing at extra fill time, creating");
            self.store.ensure_collection(name, true).await?;
        }
        Ok(())
    }
}

fn short_ref_key(uuid: &str) -> String {
    uuid.chars().take(8).collect()
}
