//! # amsync-store
//!
//! Storage layer: a hand-rolled HTTP client for ArangoDB's REST API
//! ([`arango::ArangoStore`]) and the `params`-collection-backed
//! [`state::StateStore`] built on top of it.
//!
//! A generated/SDK client (e.g. `arangors`) was deliberately not used: its
//! API surface can't be verified without running the toolchain, and the
//! pipeline only needs five REST endpoints (`/_api/collection`,
//! `/_api/import`, `/_api/cursor`, `/_api/gharial`, `/_api/index`), all
//! well documented and stable. This mirrors the upstream clients' own
//! choice of a bare `reqwest::Client` over a generated SDK.

pub mod arango;
pub mod state;

pub use arango::ArangoStore;
pub use state::{FillProgress, StateStore};
