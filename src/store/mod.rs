// src/store/mod.rs

//! Persistence collaborators used by the scheduler and workers.
//!
//! - [`jobrecord`] maps a task id to the inputs and outputs of its last
//!   successful run, for memoization.
//! - [`artifact`] is the content store for artifact data and metadata
//!   documents.

pub mod artifact;
pub mod jobrecord;

pub use artifact::{ArtifactStore, FileArtifactStore};
pub use jobrecord::{FileJobRecordStore, JobRecord, JobRecordStore, MemoryJobRecordStore};
