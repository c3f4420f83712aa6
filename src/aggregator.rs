//! Coordinate aggregation
//!
//! Converts angle-indexed distances into absolute points in the shared
//! millimeter frame and merges the sensors of one zone, applying the zone's
//! geofences on the way.
//!
//! Step `i` of an `n`-step sensor points at `i/n·2π - π/4`. A mirrored
//! sensor is read back to front with the offset shifted by a half turn:
//! `(n-1-i)/n·2π - 3π/4`.

use crate::core::{ScanPoint, SensorPlacement};
use crate::geofence::Geofence;
use crate::link::SensorLink;
use std::f32::consts::{FRAC_PI_4, TAU};

/// Offset of step 0 for a normally mounted sensor
const ANGLE_OFFSET: f32 = -FRAC_PI_4;
/// Offset of step 0 for a mirrored sensor
const MIRRORED_ANGLE_OFFSET: f32 = -3.0 * FRAC_PI_4;

/// Per-step beam angles (radians, sensor frame)
#[derive(Clone, Debug, PartialEq)]
pub struct AngleTable {
    angles: Vec<f32>,
    mirror: bool,
}

impl AngleTable {
    pub fn new(resolution: usize, mirror: bool) -> Self {
        let mut table = Self {
            angles: Vec::with_capacity(resolution),
            mirror,
        };
        table.rebuild(resolution);
        table
    }

    /// Switch traversal direction
    ///
    /// The table is recomputed from scratch, so toggling back restores it exactly.
    pub fn set_mirror(&mut self, mirror: bool) {
        self.mirror = mirror;
        self.rebuild(self.angles.len());
    }

    fn rebuild(&mut self, resolution: usize) {
        self.angles.clear();
        let n = resolution as f32;
        if self.mirror {
            self.angles.extend(
                (0..resolution).map(|i| (resolution - 1 - i) as f32 / n * TAU + MIRRORED_ANGLE_OFFSET),
            );
        } else {
            self.angles
                .extend((0..resolution).map(|i| i as f32 / n * TAU + ANGLE_OFFSET));
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.angles.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.angles.is_empty()
    }

    #[inline]
    pub fn is_mirrored(&self) -> bool {
        self.mirror
    }

    #[inline]
    pub fn angles(&self) -> &[f32] {
        &self.angles
    }
}

/// Convert one sensor's reading into absolute points, appending to `out`
///
/// Zero distances are skipped. Missing intensities count as zero.
pub fn project(
    distances: &[u32],
    intensities: &[u32],
    angles: &AngleTable,
    placement: &SensorPlacement,
    out: &mut Vec<ScanPoint>,
) {
    let origin = placement.position;
    for (i, (&distance, &angle)) in distances.iter().zip(angles.angles()).enumerate() {
        if distance == 0 {
            continue;
        }
        let d = distance as f32;
        let (sin, cos) = (angle + placement.rotation).sin_cos();
        out.push(ScanPoint::new(
            origin.x + d * cos,
            origin.y + d * sin,
            intensities.get(i).copied().unwrap_or(0) as f32,
        ));
    }
}

/// Merges a zone's sensors into one filtered point buffer
#[derive(Debug, Default)]
pub struct CoordinateAggregator {
    scratch: Vec<ScanPoint>,
}

impl CoordinateAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect the points of `sensors`, keeping those that pass `geofences`
    ///
    /// `out` is cleared first.
    pub fn collect<'a>(
        &mut self,
        sensors: impl IntoIterator<Item = &'a SensorLink>,
        geofences: &[Geofence],
        out: &mut Vec<ScanPoint>,
    ) {
        out.clear();
        for link in sensors {
            self.scratch.clear();
            project(
                link.distances(),
                link.intensities(),
                link.angles(),
                link.placement(),
                &mut self.scratch,
            );
            out.extend(
                self.scratch
                    .iter()
                    .filter(|p| crate::geofence::accepts(geofences, p.position)),
            );
        }
    }
}
