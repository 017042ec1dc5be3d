//! # amsync-transform
//!
//! Pure functions that turn a raw upstream JSON record into the shape the
//! Storage Adapter can bulk-import: namespaced-key normalization
//! ([`keys`]) and WKT geometry extraction/reprojection ([`geometry`]).
//!
//! Nothing in this crate talks to the network or the database — every
//! function here is a total or `Result`-returning transformation of a
//! `serde_json::Value`, which is what makes the Initial Fill Engine able
//! to run them off the async runtime's worker threads without blocking
//! I/O.

pub mod geometry;
pub mod keys;

pub use geometry::{extract_wkt, reproject_wkt_to_wgs84, GeometryError};
pub use keys::{normalize_asset, short_key_from_uri, transform_keys};
