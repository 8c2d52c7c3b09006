//! Shared test utilities for logtree integration harnesses.
//!
//! Import everything you need via `mod common; use common::*;` at the top of
//! each harness file. Not every harness uses every helper, hence the
//! `#![allow(unused)]` at the top of each harness.

pub mod assertions;
pub mod builders;
pub mod fake_search_api;
pub mod fixtures;

pub use builders::*;
pub use fixtures::*;
