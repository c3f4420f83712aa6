//! Density-based clustering (DBSCAN)
//!
//! A point is a core point when at least `min_pts` *other* points lie within
//! `epsilon`. Clusters grow from core points through their neighborhoods and
//! absorb border points once. Everything else is noise and is dropped.
//!
//! Neighborhood queries go through an R-tree built once per call.

use super::blob::Blob;
use crate::core::ScanPoint;
use rstar::RTree;
use rstar::primitives::GeomWithData;

type IndexedPoint = GeomWithData<[f32; 2], usize>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Label {
    Unvisited,
    Noise,
    Cluster(usize),
}

/// Clustering parameters
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClusterParams {
    /// Neighborhood radius (mm)
    pub epsilon: f32,
    /// Other points needed within `epsilon` for a core point
    pub min_pts: usize,
}

impl ClusterParams {
    pub fn new(epsilon: f32, min_pts: usize) -> Self {
        Self { epsilon, min_pts }
    }
}

/// Partition `points` into clusters of indices; noise is left out
///
/// Clusters come out in discovery order, members sorted ascending.
pub fn dbscan(points: &[ScanPoint], params: ClusterParams) -> Vec<Vec<usize>> {
    if points.is_empty() {
        return Vec::new();
    }

    let tree: RTree<IndexedPoint> = RTree::bulk_load(
        points
            .iter()
            .enumerate()
            .map(|(i, p)| GeomWithData::new([p.position.x, p.position.y], i))
            .collect(),
    );
    let eps_sq = params.epsilon * params.epsilon;
    // Includes the query point itself
    let region = |i: usize, out: &mut Vec<usize>| {
        out.clear();
        let p = points[i].position;
        out.extend(
            tree.locate_within_distance([p.x, p.y], eps_sq)
                .map(|n| n.data),
        );
    };

    let mut labels = vec![Label::Unvisited; points.len()];
    let mut clusters: Vec<Vec<usize>> = Vec::new();
    let mut neighbors = Vec::new();
    let mut queue = Vec::new();

    for i in 0..points.len() {
        if labels[i] != Label::Unvisited {
            continue;
        }
        region(i, &mut neighbors);
        if neighbors.len().saturating_sub(1) < params.min_pts {
            labels[i] = Label::Noise;
            continue;
        }

        let id = clusters.len();
        let mut members = vec![i];
        labels[i] = Label::Cluster(id);
        queue.clear();
        queue.extend(neighbors.iter().copied().filter(|&j| j != i));

        while let Some(j) = queue.pop() {
            match labels[j] {
                Label::Noise => {
                    // Border point: joins, but does not expand
                    labels[j] = Label::Cluster(id);
                    members.push(j);
                    continue;
                }
                Label::Cluster(_) => continue,
                Label::Unvisited => {}
            }
            labels[j] = Label::Cluster(id);
            members.push(j);

            region(j, &mut neighbors);
            if neighbors.len().saturating_sub(1) >= params.min_pts {
                queue.extend(
                    neighbors
                        .iter()
                        .copied()
                        .filter(|&k| !matches!(labels[k], Label::Cluster(_))),
                );
            }
        }

        members.sort_unstable();
        clusters.push(members);
    }

    clusters
}

/// Candidate blobs for each cluster
pub fn build_blobs(points: &[ScanPoint], clusters: &[Vec<usize>]) -> Vec<Blob> {
    clusters
        .iter()
        .filter_map(|members| Blob::from_members(points, members))
        .collect()
}
