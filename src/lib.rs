//! GPU telemetry panel with an on-demand rolling graph window.
//!
//! The panel process samples the GPU and streams newline-delimited JSON
//! records to a separate graph process over its stdin.

pub mod app;
pub mod chart;
pub mod codec;
pub mod config;
pub mod graph;
pub mod history;
pub mod ingest;
pub mod logging;
pub mod models;
pub mod nvidia;
pub mod panel;
pub mod placement;
pub mod supervisor;
pub mod theme;
pub mod ui;
