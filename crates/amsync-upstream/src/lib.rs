//! # amsync-upstream
//!
//! HTTP clients for the two AM APIs the pipeline reads from:
//!
//! - [`em_infra::EmInfraClient`]: the lower-level resource API, offset-
//!   paged for reference collections and cursor-paged (with optional
//!   field expansions) for `agents`/`betrokkenerelaties`. Also the home of
//!   the Extra Fill Engine's capability-probe and sub-resource calls.
//! - [`emson::EmsonClient`]: the higher-level "linked-data" API, cursor-
//!   paged, used for the two high-volume resources (`assets`,
//!   `assetrelaties`).
//!
//! Both clients are built over a bare [`reqwest::Client`] rather than a
//! generated SDK — there is no published Rust SDK for either API, and a
//! thin typed wrapper keeps the paging/retry contract explicit. Auth
//! method selection (JWT / client-cert / cookie) is handled by
//! [`auth::Requester`] implementations built by [`auth::build_requester`].

pub mod auth;
pub mod em_infra;
pub mod emson;

pub use auth::{build_requester, Requester};
pub use em_infra::EmInfraClient;
pub use emson::EmsonClient;
