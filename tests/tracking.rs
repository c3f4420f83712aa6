//! Tracker behaviour over whole clustering ticks
//!
//! Run with: `cargo test --test tracking`

use drishti::tracking::{BlobTracker, ClusterParams, build_blobs, dbscan};
use drishti::ScanPoint;

/// A 5-point cross of radius 20 mm around (x, y)
fn person(x: f32, y: f32) -> Vec<ScanPoint> {
    [(0.0, 0.0), (20.0, 0.0), (-20.0, 0.0), (0.0, 20.0), (0.0, -20.0)]
        .iter()
        .map(|&(dx, dy)| ScanPoint::new(x + dx, y + dy, 50.0))
        .collect()
}

fn tick(tracker: &mut BlobTracker, people: &[(f32, f32)], dt: f32) {
    let points: Vec<ScanPoint> = people.iter().flat_map(|&(x, y)| person(x, y)).collect();
    let clusters = dbscan(&points, ClusterParams::new(60.0, 2));
    tracker.update(build_blobs(&points, &clusters), dt);
}

fn index_near(tracker: &BlobTracker, x: f32, y: f32) -> Option<u32> {
    tracker
        .blobs()
        .iter()
        .find(|b| (b.centroid.x - x).abs() < 50.0 && (b.centroid.y - y).abs() < 50.0)
        .and_then(|b| b.index)
}

#[test]
fn test_stationary_cluster_index_is_constant() {
    let mut tracker = BlobTracker::new(0.0);
    let mut seen = Vec::new();
    for _ in 0..5 {
        tick(&mut tracker, &[(1000.0, 1000.0)], 0.1);
        assert_eq!(tracker.blobs().len(), 1);
        seen.push(tracker.blobs()[0].index);
    }
    assert_eq!(seen, vec![Some(0); 5]);
    assert_eq!(tracker.blobs()[0].point_count, 5);
    assert_eq!(tracker.blobs()[0].mean_intensity, 50.0);
}

#[test]
fn test_two_walkers_keep_their_indices() {
    let mut tracker = BlobTracker::new(0.0);
    tick(&mut tracker, &[(0.0, 0.0), (0.0, 1000.0)], 0.1);
    let a = index_near(&tracker, 0.0, 0.0).unwrap();
    let b = index_near(&tracker, 0.0, 1000.0).unwrap();
    assert_ne!(a, b);

    for step in 1..10 {
        let x = step as f32 * 60.0;
        tick(&mut tracker, &[(x, 0.0), (x, 1000.0)], 0.1);
        assert_eq!(index_near(&tracker, x, 0.0), Some(a));
        assert_eq!(index_near(&tracker, x, 1000.0), Some(b));
    }
}

#[test]
fn test_split_creates_new_identity() {
    let mut tracker = BlobTracker::new(0.0);
    tick(&mut tracker, &[(0.0, 0.0)], 0.1);

    // Two new clusters both closest to blob 0: the nearer one inherits it
    tick(&mut tracker, &[(30.0, 0.0), (300.0, 0.0)], 0.1);
    assert_eq!(index_near(&tracker, 30.0, 0.0), Some(0));
    assert_eq!(index_near(&tracker, 300.0, 0.0), Some(1));
}

#[test]
fn test_gap_in_indices_is_filled() {
    let mut tracker = BlobTracker::new(0.0);
    tick(&mut tracker, &[(0.0, 0.0), (1000.0, 0.0), (2000.0, 0.0)], 0.1);
    tick(&mut tracker, &[(0.0, 0.0), (2000.0, 0.0)], 0.1);
    tick(&mut tracker, &[(0.0, 0.0), (2000.0, 0.0), (5000.0, 5000.0)], 0.1);
    assert_eq!(index_near(&tracker, 5000.0, 5000.0), Some(1));
    assert_eq!(index_near(&tracker, 2000.0, 0.0), Some(2));
}

#[test]
fn test_persistence_bridges_missed_ticks() {
    let mut tracker = BlobTracker::new(0.3);
    tick(&mut tracker, &[(0.0, 0.0), (2000.0, 0.0)], 0.1);
    // Second person occluded for two ticks
    tick(&mut tracker, &[(0.0, 0.0)], 0.1);
    tick(&mut tracker, &[(0.0, 0.0)], 0.1);
    tick(&mut tracker, &[(0.0, 0.0), (2020.0, 0.0)], 0.1);
    assert_eq!(index_near(&tracker, 2020.0, 0.0), Some(1));
    assert_eq!(tracker.blobs().len(), 2);
}
