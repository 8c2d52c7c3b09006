//! logtree: headless log receiver.
//!
//! Runs a set of configured receivers, funnels everything they parse into one
//! logger tree and prints visible events as they arrive. The building blocks
//! live in the workspace crates; this crate wires them together so the binary
//! and the integration tests share the same code path.
//!
//! # Architecture
//!
//! ```text
//! csv-file ─┐
//! csv-tcp  ─┼──► IngestBuffer ──► RegistryService ──► visible batches ──► stdout
//! csv-udp  ─┤                          │
//! search   ─┘                          └──► logger tree (printed on exit)
//! ```

pub mod app;
pub mod output;

pub use logtree_core;
pub use logtree_receivers;
