//! # amsync-pipeline
//!
//! Orchestration layer: settings loading, schema provisioning, the
//! Initial Fill Engine, the Extra Fill Engine, the Index & Graph
//! Builder, and the Pipeline Controller that sequences them all behind
//! a single resumable step marker.

pub mod controller;
pub mod extra_fill;
pub mod indexes;
pub mod initial_fill;
pub mod provisioner;
pub mod settings;

pub use controller::PipelineController;
pub use extra_fill::ExtraFillEngine;
pub use indexes::IndexGraphBuilder;
pub use initial_fill::{GeometryErrorPolicy, InitialFillEngine};
pub use provisioner::Provisioner;
pub use settings::{load_settings, DbSettings, Settings};
