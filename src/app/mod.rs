// logsmith - app/mod.rs
//
// Application layer: the engine operations. Resolves whitelisted files,
// drives the platform reader through the core parser, and owns every
// filesystem side effect (migration, truncation, archiving).
// Dependencies: core, platform, util.

pub mod analytics;
pub mod archive;
pub mod files;
pub mod migrate;
pub mod paginate;
pub mod scan;
