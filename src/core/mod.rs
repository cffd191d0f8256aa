// logsmith - core/mod.rs
//
// Core business logic layer.
// Dependencies: chrono, regex, serde, serde_json, csv.
// Must NOT depend on: platform, app, or touch the filesystem.

pub mod analytics;
pub mod export;
pub mod filter;
pub mod model;
pub mod parser;
