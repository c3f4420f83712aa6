//! Collection zones
//!
//! A zone is an independent tracking domain: it merges the readings of the
//! sensors that feed it, filters them through its geofences, clusters the
//! result and reconciles the clusters with its own tracked blobs.

use crate::aggregator::CoordinateAggregator;
use crate::core::ScanPoint;
use crate::error::{Error, Result};
use crate::geofence::{Geofence, ShapeKind};
use crate::link::SensorLink;
use crate::tracking::{BlobSnapshot, BlobTracker, ClusterParams, build_blobs, dbscan};

pub struct CollectionZone {
    name: String,
    /// Names of the sensors feeding this zone
    sensors: Vec<String>,
    params: ClusterParams,
    geofences: Vec<Geofence>,
    aggregator: CoordinateAggregator,
    points: Vec<ScanPoint>,
    tracker: BlobTracker,
    /// Time since the last processed tick (s)
    pending_dt: f32,
}

impl CollectionZone {
    /// New zone; `persistence` is the blob ttl in seconds
    pub fn new(name: impl Into<String>, epsilon: f32, min_pts: usize, persistence: f32) -> Self {
        Self {
            name: name.into(),
            sensors: Vec::new(),
            params: ClusterParams::new(epsilon, min_pts),
            geofences: Vec::new(),
            aggregator: CoordinateAggregator::new(),
            points: Vec::new(),
            tracker: BlobTracker::new(persistence),
            pending_dt: 0.0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    // Sensors

    pub fn sensors(&self) -> &[String] {
        &self.sensors
    }

    pub fn add_sensor(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.sensors.contains(&name) {
            self.sensors.push(name);
        }
    }

    pub fn remove_sensor(&mut self, name: &str) -> bool {
        let before = self.sensors.len();
        self.sensors.retain(|s| s != name);
        self.sensors.len() != before
    }

    pub fn is_fed_by(&self, sensor: &str) -> bool {
        self.sensors.iter().any(|s| s == sensor)
    }

    // Parameters

    pub fn params(&self) -> ClusterParams {
        self.params
    }

    pub fn set_epsilon(&mut self, epsilon: f32) {
        self.params.epsilon = epsilon;
    }

    pub fn set_min_pts(&mut self, min_pts: usize) {
        self.params.min_pts = min_pts;
    }

    pub fn persistence(&self) -> f32 {
        self.tracker.ttl()
    }

    pub fn set_persistence(&mut self, persistence: f32) {
        self.tracker.set_ttl(persistence);
    }

    // Geofences

    pub fn geofences(&self) -> &[Geofence] {
        &self.geofences
    }

    pub fn geofence_mut(&mut self, slot: usize) -> Option<&mut Geofence> {
        self.geofences.get_mut(slot)
    }

    pub fn add_geofence(&mut self, geofence: Geofence) {
        self.geofences.push(geofence);
    }

    pub fn remove_geofence(&mut self, slot: usize) -> Option<Geofence> {
        (slot < self.geofences.len()).then(|| self.geofences.remove(slot))
    }

    /// Rebuild the shape in `slot` as another kind, keeping its vertices
    /// and mask flag
    pub fn set_shape_kind(&mut self, slot: usize, kind: ShapeKind) -> Result<()> {
        let fence = self.geofences.get_mut(slot).ok_or_else(|| {
            Error::InvalidParameter(format!("zone '{}' has no shape {}", self.name, slot))
        })?;
        if fence.shape.kind() == kind {
            return Ok(());
        }
        *fence = Geofence::from_transfer(kind, fence.transfer())?;
        Ok(())
    }

    // Tick

    pub(crate) fn advance(&mut self, dt: f32) {
        self.pending_dt += dt;
    }

    /// Aggregate, cluster and track with the latest readings of `links`
    ///
    /// Only links feeding this zone contribute. A tick without any point
    /// leaves the tracked blobs untouched.
    pub fn process(&mut self, links: &[SensorLink]) {
        let dt = std::mem::take(&mut self.pending_dt);
        let sensors = &self.sensors;
        self.aggregator.collect(
            links.iter().filter(|l| sensors.iter().any(|s| s == l.name())),
            &self.geofences,
            &mut self.points,
        );
        if self.points.is_empty() {
            return;
        }

        let clusters = dbscan(&self.points, self.params);
        let candidates = build_blobs(&self.points, &clusters);
        log::trace!(
            "Zone '{}': {} points, {} clusters",
            self.name,
            self.points.len(),
            candidates.len()
        );
        self.tracker.update(candidates, dt);
    }

    /// Filtered points of the last processed tick (mm)
    pub fn points(&self) -> &[ScanPoint] {
        &self.points
    }

    pub fn tracker(&self) -> &BlobTracker {
        &self.tracker
    }

    pub fn snapshot(&self) -> Vec<BlobSnapshot> {
        self.tracker.snapshot()
    }

    /// Drop all tracked blobs and buffered points
    pub fn clear(&mut self) {
        self.points.clear();
        self.tracker.clear();
        self.pending_dt = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Point2D, SensorPlacement};
    use crate::devices::{ScanFrame, SensorKind};
    use crate::geofence::GeofenceShape;
    use crate::link::NetworkTarget;

    fn link_with(name: &str, hits: &[(usize, u32)]) -> SensorLink {
        let mut link = SensorLink::new(
            name,
            SensorKind::Text,
            NetworkTarget::default(),
            SensorPlacement::default(),
        );
        let mut frame = ScanFrame::new(1440);
        for &(i, d) in hits {
            frame.distances[i] = d;
        }
        link.inject_frame(frame);
        link
    }

    fn square(min: f32, max: f32, is_mask: bool) -> Geofence {
        let shape = GeofenceShape::from_points(
            ShapeKind::Polygon,
            vec![
                Point2D::new(min, min),
                Point2D::new(max, min),
                Point2D::new(max, max),
                Point2D::new(min, max),
            ],
        )
        .unwrap();
        Geofence::new(shape, is_mask)
    }

    #[test]
    fn test_only_declared_sensors_contribute() {
        let links = vec![link_with("a", &[(180, 1000)]), link_with("b", &[(180, 3000)])];
        let mut zone = CollectionZone::new("hall", 200.0, 0, 1.0);
        zone.add_sensor("a");
        zone.process(&links);
        assert_eq!(zone.points().len(), 1);
        assert_eq!(zone.snapshot().len(), 1);
    }

    #[test]
    fn test_empty_tick_keeps_blobs() {
        let mut zone = CollectionZone::new("hall", 200.0, 0, 0.0);
        zone.add_sensor("a");
        zone.process(&[link_with("a", &[(180, 1000)])]);
        assert_eq!(zone.snapshot().len(), 1);

        zone.advance(10.0);
        zone.process(&[link_with("a", &[])]);
        assert_eq!(zone.snapshot().len(), 1);
    }

    #[test]
    fn test_geofence_mask_filters_points() {
        // Index 180 hits (1000, 0) mm = (1, 0) m
        let links = vec![link_with("a", &[(180, 1000)])];
        let mut zone = CollectionZone::new("hall", 200.0, 0, 0.0);
        zone.add_sensor("a");
        zone.add_geofence(square(-2.0, 2.0, false));
        zone.add_geofence(square(-0.5, 1.5, true));
        zone.process(&links);
        assert!(zone.points().is_empty());

        zone.remove_geofence(1);
        zone.process(&links);
        assert_eq!(zone.points().len(), 1);
    }

    #[test]
    fn test_set_shape_kind_keeps_mask() {
        let mut zone = CollectionZone::new("hall", 200.0, 1, 0.0);
        zone.add_geofence(square(0.0, 1.0, true));
        zone.set_shape_kind(0, ShapeKind::Quad).unwrap();
        assert_eq!(zone.geofences()[0].shape.kind(), ShapeKind::Quad);
        assert!(zone.geofences()[0].is_mask);
        assert!(zone.set_shape_kind(3, ShapeKind::Ellipse).is_err());
    }

    #[test]
    fn test_sensor_list_edits() {
        let mut zone = CollectionZone::new("hall", 200.0, 1, 0.0);
        zone.add_sensor("a");
        zone.add_sensor("a");
        assert_eq!(zone.sensors().len(), 1);
        assert!(zone.is_fed_by("a"));
        assert!(zone.remove_sensor("a"));
        assert!(!zone.remove_sensor("a"));
    }
}
