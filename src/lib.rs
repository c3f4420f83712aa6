//! Drishti - networked range-sensor blob tracking
//!
//! Ingests 2D range scans from network sensors, merges them into one
//! millimeter coordinate space, filters them through geofences, clusters
//! them and keeps stable blob identities across ticks.
//!
//! ## Pipeline
//!
//! ```text
//! SensorLink (worker thread per sensor)
//!     → CoordinateAggregator → geofence filter
//!     → DBSCAN clusters → BlobTracker (per zone)
//! ```
//!
//! [`Scene`] owns the links and zones and drives everything from
//! [`Scene::update`].

pub mod aggregator;
pub mod config;
pub mod core;
pub mod devices;
pub mod error;
pub mod geofence;
pub mod link;
pub mod scene;
pub mod tracking;
pub mod zone;

// Re-export commonly used types
pub use config::AppConfig;
pub use crate::core::{Bounds, Point2D, ScanPoint, SensorPlacement};
pub use devices::{LinkCommand, ScanFrame, SensorKind};
pub use error::{Error, Result};
pub use geofence::{Geofence, GeofenceShape, ShapeKind};
pub use link::{ConnectionState, NetworkTarget, SensorLink};
pub use scene::Scene;
pub use tracking::{Blob, BlobSnapshot, BlobTracker};
pub use zone::CollectionZone;
