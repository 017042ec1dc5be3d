//! The `params` collection: a one-document-per-concern key/value store
//! used both for the monotonic [`DbStep`] marker and for per-resource fill
//! progress (`fill_<resource>` documents of shape `{fill: bool, from:
//! cursor|offset|null}`).

use amsync_core::{DbStep, PipelineError, ResourceKind};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::arango::ArangoStore;

const STEP_KEY: &str = "db_step";

/// Per-resource fill progress. `from` holds the last cursor/offset
/// successfully processed so a restart resumes rather than rescanning.
/// `fill == true` and `from == None` together mean "not yet started";
/// `fill == true` and `from == Some(_)` means "in progress, resume from
/// here"; the progress document is deleted entirely once the resource is
/// fully filled (see [`StateStore::mark_filled`]).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FillProgress {
    pub fill: bool,
    pub from: Option<String>,
}

pub struct StateStore<'a> {
    store: &'a ArangoStore,
}

impl<'a> StateStore<'a> {
    pub fn new(store: &'a ArangoStore) -> Self {
        Self { store }
    }

    pub async fn get_step(&self) -> Result<Option<DbStep>, PipelineError> {
        let rows = self
            .store
            .query("FOR p IN params FILTER p._key == @key RETURN p.step", json!({ "key": STEP_KEY }))
            .await?;
        match rows.into_iter().next() {
            Some(v) => Ok(Some(
                serde_json::from_value(v).map_err(|e| PipelineError::Storage(format!("bad db_step value: {e}")))?,
            )),
            None => Ok(None),
        }
    }

    pub async fn set_step(&self, step: DbStep) -> Result<(), PipelineError> {
        let doc = json!({ "_key": STEP_KEY, "step": step });
        self.store.bulk_import("params", std::slice::from_ref(&doc), 1).await
    }

    /// Fetch the fill-progress document for `resource`, creating it with
    /// `{fill: true, from: null}` on first read (mirrors
    /// `GenericDbFunctions`'s lazy progress-doc creation).
    pub async fn get_progress(&self, resource: ResourceKind) -> Result<FillProgress, PipelineError> {
        let key = fill_key(resource);
        let rows = self
            .store
            .query("FOR p IN params FILTER p._key == @key RETURN p", json!({ "key": key }))
            .await?;
        if let Some(row) = rows.into_iter().next() {
            let fill = row.get("fill").and_then(Value::as_bool).unwrap_or(true);
            let from = row.get("from").and_then(Value::as_str).map(str::to_string);
            return Ok(FillProgress { fill, from });
        }
        let progress = FillProgress { fill: true, from: None };
        self.write_progress(resource, &progress).await?;
        Ok(progress)
    }

    /// Persist the cursor/offset reached so far. Writes must land before
    /// the caller advances any dependent marker — callers are responsible
    /// for sequencing, this method only performs the write.
    pub async fn advance_progress(&self, resource: ResourceKind, from: &str) -> Result<(), PipelineError> {
        let progress = FillProgress { fill: true, from: Some(from.to_string()) };
        self.write_progress(resource, &progress).await
    }

    /// Mark a resource as fully filled: sets `fill: false` on its
    /// progress document. [`StateStore::is_filled`] is the read side of
    /// this.
    pub async fn mark_filled(&self, resource: ResourceKind) -> Result<(), PipelineError> {
        let progress = FillProgress { fill: false, from: None };
        self.write_progress(resource, &progress).await
    }

    pub async fn is_filled(&self, resource: ResourceKind) -> Result<bool, PipelineError> {
        Ok(!self.get_progress(resource).await?.fill)
    }

    async fn write_progress(&self, resource: ResourceKind, progress: &FillProgress) -> Result<(), PipelineError> {
        let key = fill_key(resource);
        let doc = json!({ "_key": key, "fill": progress.fill, "from": progress.from });
        self.store.bulk_import("params", std::slice::from_ref(&doc), 1).await
    }

    /// Remove every `fill_<resource>` progress document. Used when the
    /// Schema Provisioner resets the database from scratch.
    pub async fn sweep_fill_markers(&self) -> Result<(), PipelineError> {
        self.store
            .query(
                "FOR p IN params FILTER STARTS_WITH(p._key, 'fill_') REMOVE p IN params",
                json!({}),
            )
            .await?;
        Ok(())
    }

    /// Seed `{page: -1, event_uuid: null}` for every declared feed name —
    /// the on-disk trace that lets a future change-feed consumer resume,
    /// even though this pipeline never drains them itself.
    pub async fn seed_feed_markers(&self, feed_names: &[&str]) -> Result<(), PipelineError> {
        let docs: Vec<Value> = feed_names
            .iter()
            .map(|name| json!({ "_key": format!("feed_{name}"), "page": -1, "event_uuid": Value::Null }))
            .collect();
        self.store.bulk_import("params", &docs, docs.len().max(1)).await
    }
}

fn fill_key(resource: ResourceKind) -> String {
    format!("fill_{}", resource.collection_name())
}
