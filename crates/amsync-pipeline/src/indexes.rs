//! Index & Graph Builder.
//!
//! Creates the persistent indexes the query layer relies on and the four
//! named graphs used for graph traversal, both idempotently. Ground
//! truth: `CreateIndicesStep.add_indices`/`add_graphs`. The original's
//! `ensure_naampad_analyzer_and_view` is dead code upstream (it returns
//! before touching the ArangoSearch API) and has no counterpart here.

use amsync_core::PipelineError;
use amsync_store::arango::EdgeDefinition;
use amsync_store::ArangoStore;
use tracing::info;

/// `(collection, fields, sparse)` — every persistent index this pipeline
/// relies on for lookup/query performance. Ground truth: spec.md §4.8
/// (`CreateIndicesStep.add_indices`). `active` on assets is the nested
/// `AIMDBStatus.isActief` flag set by the Asset Transformer's namespace
/// bucketing, not a separate top-level field — ArangoDB persistent
/// indexes support dotted paths into sub-documents directly.
const INDEXES: &[(&str, &[&str], bool)] = &[
    ("assets", &["assettype_key"], false),
    ("assets", &["toezichter_key"], false),
    ("assets", &["toezichtgroep_key"], false),
    ("assets", &["beheerder_key"], false),
    ("assets", &["naampad_parts"], true),
    ("assets", &["assettype_key", "AIMDBStatus.isActief"], false),
    ("assets", &["assettype_key", "AIMDBStatus.isActief", "toestand"], false),
    ("assetrelaties", &["relatietype_key"], false),
    ("assetrelaties", &["relatietype_key", "AIMDBStatus_isActief"], false),
    ("assettypes", &["short_uri"], false),
    ("relatietypes", &["short"], false),
    ("betrokkenerelaties", &["_from", "rol"], false),
    ("betrokkenerelaties", &["_to", "rol"], false),
    ("bestekkoppelingen", &["_from"], false),
    ("vplankoppelingen", &["asset_key"], false),
];

pub struct IndexGraphBuilder<'a> {
    store: &'a ArangoStore,
}

impl<'a> IndexGraphBuilder<'a> {
    pub fn new(store: &'a ArangoStore) -> Self {
        Self { store }
    }

    pub async fn build(&self) -> Result<(), PipelineError> {
        self.add_indices().await?;
        self.add_graphs().await?;
        Ok(())
    }

    async fn add_indices(&self) -> Result<(), PipelineError> {
        for (collection, fields, sparse) in INDEXES {
            self.store.ensure_persistent_index(collection, fields, *sparse).await?;
            info!(collection, ?fields, sparse, "ensured persistent index");
        }
        Ok(())
    }

    async fn add_graphs(&self) -> Result<(), PipelineError> {
        self.store
            .ensure_graph(
                "assetrelaties_graph",
                &[EdgeDefinition {
                    collection: "assetrelaties".into(),
                    from: vec!["assets".into()],
                    to: vec!["assets".into()],
                }],
            )
            .await?;

        self.store
            .ensure_graph(
                "betrokkenerelaties_graph",
                &[EdgeDefinition {
                    collection: "betrokkenerelaties".into(),
                    from: vec!["assets".into(), "agents".into()],
                    to: vec!["agents".into()],
                }],
            )
            .await?;

        self.store
            .ensure_graph(
                "bestekkoppelingen_graph",
                &[EdgeDefinition {
                    collection: "bestekkoppelingen".into(),
                    from: vec!["assets".into()],
                    to: vec!["bestekken".into()],
                }],
            )
            .await?;

        self.store
            .ensure_graph(
                "aansluitingen_graph",
                &[EdgeDefinition {
                    collection: "aansluitingen".into(),
                    from: vec!["assets".into()],
                    to: vec!["aansluitingrefs".into()],
                }],
            )
            .await?;

        Ok(())
    }
}
