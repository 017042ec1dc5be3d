//! Schema Provisioner.
//!
//! On an uninitialized database (`params` collection absent), drops any
//! leftover named graphs and non-system collections, (re)creates every
//! document/edge collection the pipeline knows about, seeds one
//! `feed_<name>` marker document per feed name, and advances the step
//! marker to [`DbStep::InitialFill`]. On an already-initialized database
//! this is a no-op, matching `CreateDBStep.execute`'s
//! `if not self.db.has_collection('params')` guard.

use amsync_core::{DbStep, PipelineError, DERIVED_RELATION_TYPES};
use amsync_store::ArangoStore;
use tracing::info;

use crate::settings::FEED_NAMES;

/// Document collections that hold typed entities.
pub const DOCUMENT_COLLECTIONS: &[&str] = &[
    "params",
    "assettypes",
    "relatietypes",
    "bestekken",
    "toezichtgroepen",
    "identiteiten",
    "beheerders",
    "agents",
    "assets",
    "aansluitingrefs",
    "vplankoppelingen",
];

/// Edge collections, including the four derived per-relation-type edge
/// collections the Extra Fill Engine rebuilds from `assetrelaties`.
pub fn edge_collections() -> Vec<&'static str> {
    let mut edges = vec!["assetrelaties", "betrokkenerelaties", "bestekkoppelingen", "aansluitingen"];
    edges.extend(DERIVED_RELATION_TYPES.iter());
    edges
}

pub struct Provisioner<'a> {
    store: &'a ArangoStore,
}

impl<'a> Provisioner<'a> {
    pub fn new(store: &'a ArangoStore) -> Self {
        Self { store }
    }

    pub async fn provision(&self) -> Result<(), PipelineError> {
        if self.store.collection_exists("params").await? {
            info!("params collection already present, skipping provisioning");
            return Ok(());
        }

        info!("provisioning database from scratch");
        self.reset().await?;

        for name in DOCUMENT_COLLECTIONS {
            self.store.ensure_collection(name, false).await?;
        }
        for name in edge_collections() {
            self.store.ensure_collection(name, true).await?;
        }

        let state = amsync_store::StateStore::new(self.store);
        state.seed_feed_markers(FEED_NAMES).await?;
        state.set_step(DbStep::InitialFill).await?;
        info!(step = ?DbStep::InitialFill, "provisioning complete");
        Ok(())
    }

    /// Drop every named graph and non-system collection, so a re-run from
    /// scratch never trips over stale schema left by a previous attempt.
    async fn reset(&self) -> Result<(), PipelineError> {
        for graph in self.store.list_graphs().await? {
            self.store.drop_graph(&graph).await?;
        }
        for collection in self.store.list_collections().await? {
            self.store.drop_collection(&collection).await?;
        }
        Ok(())
    }
}
