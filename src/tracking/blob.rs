//! Blob: one tracked object

use crate::core::{Bounds, Point2D, ScanPoint};
use serde::Serialize;

/// A cluster of points, either a fresh candidate or a tracked object
#[derive(Clone, Debug, PartialEq)]
pub struct Blob {
    /// Zone-unique id; `None` while the blob is only a candidate
    pub index: Option<u32>,
    /// Mean member position (mm)
    pub centroid: Point2D,
    /// Axis-aligned extent of the members (mm)
    pub bounds: Bounds,
    pub mean_intensity: f32,
    pub point_count: usize,
    /// Seconds since the last match
    pub age: f32,
    /// Seconds a blob may stay unmatched before it is dropped
    pub ttl: f32,
    /// Matched during the current tick
    pub matched: bool,
}

impl Blob {
    /// Candidate blob from cluster members; `None` for an empty cluster
    pub fn from_members(points: &[ScanPoint], members: &[usize]) -> Option<Self> {
        if members.is_empty() {
            return None;
        }
        let mut bounds = Bounds::empty();
        let (mut sx, mut sy, mut si) = (0.0f64, 0.0f64, 0.0f64);
        let mut count = 0usize;
        for p in members.iter().filter_map(|&i| points.get(i)) {
            bounds.expand_to_include(p.position);
            sx += p.position.x as f64;
            sy += p.position.y as f64;
            si += p.intensity as f64;
            count += 1;
        }
        if count == 0 {
            return None;
        }
        let n = count as f64;
        Some(Self {
            index: None,
            centroid: Point2D::new((sx / n) as f32, (sy / n) as f32),
            bounds,
            mean_intensity: (si / n) as f32,
            point_count: count,
            age: 0.0,
            ttl: 0.0,
            matched: false,
        })
    }

    /// Take over the measured fields of `other`, keeping this blob's identity
    pub fn become_from(&mut self, other: &Blob) {
        self.centroid = other.centroid;
        self.bounds = other.bounds;
        self.mean_intensity = other.mean_intensity;
        self.point_count = other.point_count;
        self.age = 0.0;
    }

    /// Whether the unmatched time has run past the persistence window
    #[inline]
    pub fn is_expired(&self) -> bool {
        self.age > self.ttl
    }

    pub fn snapshot(&self) -> Option<BlobSnapshot> {
        Some(BlobSnapshot {
            index: self.index?,
            centroid: self.centroid,
            bounds: self.bounds,
            intensity: self.mean_intensity,
            point_count: self.point_count,
            age: self.age,
        })
    }
}

/// Plain copy of a tracked blob for collaborators (renderer, messaging)
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BlobSnapshot {
    pub index: u32,
    /// Millimeters
    pub centroid: Point2D,
    pub bounds: Bounds,
    pub intensity: f32,
    pub point_count: usize,
    pub age: f32,
}
