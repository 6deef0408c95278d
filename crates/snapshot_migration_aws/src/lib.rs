//! AWS-backed adapters and the operator CLI for snapshot encryption runs.
//!
//! The migration state machine lives in `snapshot_migration_core`; this crate
//! supplies RDS and KMS implementations of its client traits plus the
//! `rds_snapshot_encryptor` command surface.

pub mod adapters;
pub mod cli;
pub mod commands;
