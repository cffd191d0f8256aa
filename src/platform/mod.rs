// logsmith - platform/mod.rs
//
// Platform abstraction layer: file reading, filesystem helpers, config.
// Dependencies: standard library, memmap2, directories, toml, glob, chrono.
// Must NOT depend on: core, app.

pub mod config;
pub mod fs;
pub mod reader;
