//! Test-only helpers: an isolated mock HTTP backend for exercising `Provider` impls.

pub mod server;
