// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]

//! Unit tests for the pgrator operator
//!
//! This target covers:
//! - The planned actions for the create/update and delete paths
//! - The deletion guard
//! - The unreferenced-resource sweep selection
//! - Condition aggregation onto the owner status
//! - Name shortening under the cluster name limit

#[path = "../common/mod.rs"]
mod common;

mod conditions;
mod plan;
mod sweep;
