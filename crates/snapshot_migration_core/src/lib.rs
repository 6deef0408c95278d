//! Snapshot encryption migration primitives.
//!
//! This crate owns the migration state machine, its concurrency model, and the
//! persistence contract that lets an interrupted run resume without re-copying
//! or double-deleting. It intentionally excludes the AWS SDK; cloud access is
//! reached through the [`client::SnapshotClient`] and [`client::KeyService`]
//! traits, implemented by `snapshot_migration_aws`.

pub mod client;
pub mod config;
pub mod contract;
pub mod inventory;
pub mod keys;
pub mod naming;
pub mod orchestrator;
pub mod store;
pub mod telemetry;
pub mod worker;
