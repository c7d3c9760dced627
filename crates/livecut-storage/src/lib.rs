//! Backup storage for finished recordings.
//!
//! This crate provides:
//! - The [`BackupStorage`] trait used by the session pipeline
//! - An S3-compatible implementation built on the AWS SDK

pub mod backup;
pub mod client;
pub mod error;

pub use backup::{object_key, BackupStorage};
pub use client::{S3BackupClient, S3BackupConfig};
pub use error::{StorageError, StorageResult};
