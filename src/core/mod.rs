//! Core geometric and placement types shared by every stage of the pipeline

pub mod types;

pub use types::{Bounds, Point2D, ScanPoint, SensorPlacement};
