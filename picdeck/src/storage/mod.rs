//! Storage module
//!
//! Provides staged, atomically finalized storage for image blobs.

pub mod blob_store;

pub use blob_store::{BlobInfo, BlobStore, StagedBlob, Upload};
