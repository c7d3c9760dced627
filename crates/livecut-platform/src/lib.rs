//! Broadcast platform client.
//!
//! This crate provides:
//! - The [`LiveStatusSource`] and [`VisibilityChecker`] collaborator traits
//! - A reqwest client for the Bilibili live-room and video APIs

pub mod client;
pub mod error;
pub mod source;

pub use client::{BilibiliClient, BilibiliConfig, BilibiliRoom, RoomStatus};
pub use error::{PlatformError, PlatformResult};
pub use source::{LiveStatusSource, RoomInfo, VisibilityChecker};
