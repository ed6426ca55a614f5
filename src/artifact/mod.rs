// src/artifact/mod.rs

//! Artifact identity.
//!
//! - [`refs`] holds the value types tasks use to name data: plain
//!   [`ArtifactRef`]s, content-addressed [`SourceArtifact`]s, task-owned
//!   [`OutputSlot`]s and forward [`PendingRef`]s.
//! - [`hash`] derives content ids from files and maps ids onto on-disk
//!   directory buckets.

pub mod hash;
pub mod refs;

pub use hash::{directory_hash_id, file_uuid};
pub use refs::{ArtifactId, ArtifactRef, InputRef, OutputSlot, PendingRef, SourceArtifact};
