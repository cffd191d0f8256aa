// logsmith - lib.rs
//
// Library entry point. The `logsmith` binary in `main.rs` is a thin CLI
// over these modules; integration tests use them directly.

pub mod app;
pub mod core;
pub mod platform;
pub mod util;
