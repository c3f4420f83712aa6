//! Clustering and blob tracking

pub mod blob;
pub mod cluster;
pub mod tracker;

pub use blob::{Blob, BlobSnapshot};
pub use cluster::{ClusterParams, build_blobs, dbscan};
pub use tracker::BlobTracker;
