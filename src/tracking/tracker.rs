//! Blob tracker: keeps blob identities stable across ticks
//!
//! # Per-tick steps
//!
//! 1. Candidates arrive unindexed.
//! 2. With nothing tracked yet every candidate is admitted; no matching.
//! 3. Each candidate scores every tracked blob with `1 / (distance + 1)` and
//!    keeps only its best one (first maximum on ties).
//! 4. Candidates are walked best score first (stable order); a candidate
//!    claims its best tracked blob unless an earlier candidate already did.
//!    There is no fallback to a second choice.
//! 5. Unmatched tracked blobs age by `dt` and are dropped once `age > ttl`.
//! 6. Unclaimed candidates are admitted with the lowest free index.

use super::blob::{Blob, BlobSnapshot};

/// Best tracked blob for one candidate
#[derive(Clone, Copy, Debug)]
struct BestMatch {
    candidate: usize,
    tracked: Option<usize>,
    score: f32,
}

/// Tracked blob list of one zone
#[derive(Clone, Debug, Default)]
pub struct BlobTracker {
    blobs: Vec<Blob>,
    /// Persistence window for unmatched blobs (seconds)
    ttl: f32,
}

impl BlobTracker {
    pub fn new(ttl: f32) -> Self {
        Self {
            blobs: Vec::new(),
            ttl,
        }
    }

    pub fn blobs(&self) -> &[Blob] {
        &self.blobs
    }

    pub fn ttl(&self) -> f32 {
        self.ttl
    }

    pub fn set_ttl(&mut self, ttl: f32) {
        self.ttl = ttl;
        for blob in &mut self.blobs {
            blob.ttl = ttl;
        }
    }

    pub fn clear(&mut self) {
        self.blobs.clear();
    }

    pub fn snapshot(&self) -> Vec<BlobSnapshot> {
        self.blobs.iter().filter_map(Blob::snapshot).collect()
    }

    /// Reconcile this tick's candidates with the tracked list
    ///
    /// `dt` is the time since the previous update, used for ageing.
    pub fn update(&mut self, candidates: Vec<Blob>, dt: f32) {
        if self.blobs.is_empty() {
            for candidate in candidates {
                self.admit(candidate);
            }
            return;
        }

        for blob in &mut self.blobs {
            blob.matched = false;
        }

        let mut order: Vec<BestMatch> = candidates
            .iter()
            .enumerate()
            .map(|(candidate, blob)| self.best_match(candidate, blob))
            .collect();
        // sort_by is stable: equal scores keep candidate order
        order.sort_by(|a, b| b.score.total_cmp(&a.score));

        let mut claimed = vec![false; candidates.len()];
        for m in &order {
            let Some(t) = m.tracked else {
                continue;
            };
            if self.blobs[t].matched {
                continue;
            }
            let tracked = &mut self.blobs[t];
            tracked.become_from(&candidates[m.candidate]);
            tracked.matched = true;
            claimed[m.candidate] = true;
        }

        self.blobs.retain_mut(|blob| {
            if blob.matched {
                return true;
            }
            blob.age += dt;
            if blob.is_expired() {
                log::trace!("Blob {:?} expired after {:.2}s", blob.index, blob.age);
                false
            } else {
                true
            }
        });

        for (candidate, was_claimed) in candidates.into_iter().zip(claimed) {
            if !was_claimed {
                self.admit(candidate);
            }
        }
    }

    fn best_match(&self, candidate: usize, blob: &Blob) -> BestMatch {
        let mut best = BestMatch {
            candidate,
            tracked: None,
            score: f32::NEG_INFINITY,
        };
        for (t, tracked) in self.blobs.iter().enumerate() {
            let score = 1.0 / (blob.centroid.distance(&tracked.centroid) + 1.0);
            if score > best.score {
                best.tracked = Some(t);
                best.score = score;
            }
        }
        best
    }

    fn admit(&mut self, mut blob: Blob) {
        let index = self.next_free_index();
        blob.index = Some(index);
        blob.age = 0.0;
        blob.ttl = self.ttl;
        blob.matched = true;
        log::trace!("Blob {} admitted at {:?}", index, blob.centroid);
        self.blobs.push(blob);
    }

    /// Lowest non-negative index not held by a tracked blob
    fn next_free_index(&self) -> u32 {
        let mut used: Vec<u32> = self.blobs.iter().filter_map(|b| b.index).collect();
        used.sort_unstable();
        let mut next = 0;
        for index in used {
            if index == next {
                next += 1;
            } else if index > next {
                break;
            }
        }
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ScanPoint;

    fn candidate(x: f32, y: f32) -> Blob {
        Blob::from_members(&[ScanPoint::new(x, y, 0.0)], &[0]).unwrap()
    }

    fn indices(tracker: &BlobTracker) -> Vec<u32> {
        let mut v: Vec<u32> = tracker.blobs().iter().filter_map(|b| b.index).collect();
        v.sort_unstable();
        v
    }

    #[test]
    fn test_bootstrap_assigns_sequential_indices() {
        let mut tracker = BlobTracker::new(0.0);
        tracker.update(vec![candidate(0.0, 0.0), candidate(1000.0, 0.0)], 0.1);
        assert_eq!(indices(&tracker), vec![0, 1]);
    }

    #[test]
    fn test_stationary_blob_keeps_index() {
        let mut tracker = BlobTracker::new(0.0);
        let mut seen = Vec::new();
        for tick in 0..5 {
            let jitter = (tick % 2) as f32 * 5.0;
            tracker.update(vec![candidate(500.0 + jitter, 200.0)], 0.1);
            assert_eq!(tracker.blobs().len(), 1);
            seen.push(tracker.blobs()[0].index);
        }
        assert!(seen.iter().all(|&i| i == Some(0)));
    }

    #[test]
    fn test_ambiguous_claim_goes_to_closest() {
        let mut tracker = BlobTracker::new(0.0);
        tracker.update(vec![candidate(0.0, 0.0)], 0.1);

        // Both closest to blob 0; the farther one is listed first
        tracker.update(vec![candidate(80.0, 0.0), candidate(10.0, 0.0)], 0.1);
        assert_eq!(tracker.blobs().len(), 2);
        let zero = tracker.blobs().iter().find(|b| b.index == Some(0)).unwrap();
        assert_eq!(zero.centroid.x, 10.0);
        let one = tracker.blobs().iter().find(|b| b.index == Some(1)).unwrap();
        assert_eq!(one.centroid.x, 80.0);
    }

    #[test]
    fn test_lowest_free_index_is_reused() {
        let mut tracker = BlobTracker::new(0.0);
        tracker.update(
            vec![candidate(0.0, 0.0), candidate(1000.0, 0.0), candidate(2000.0, 0.0)],
            0.1,
        );
        assert_eq!(indices(&tracker), vec![0, 1, 2]);

        // Blob 1 goes unmatched and expires
        tracker.update(vec![candidate(0.0, 0.0), candidate(2000.0, 0.0)], 0.1);
        assert_eq!(indices(&tracker), vec![0, 2]);

        tracker.update(
            vec![candidate(0.0, 0.0), candidate(2000.0, 0.0), candidate(9000.0, 0.0)],
            0.1,
        );
        assert_eq!(indices(&tracker), vec![0, 1, 2]);
        let newcomer = tracker.blobs().iter().find(|b| b.index == Some(1)).unwrap();
        assert_eq!(newcomer.centroid.x, 9000.0);
    }

    #[test]
    fn test_ttl_keeps_blob_through_short_gaps() {
        let mut tracker = BlobTracker::new(0.25);
        tracker.update(vec![candidate(0.0, 0.0), candidate(3000.0, 0.0)], 0.1);

        tracker.update(vec![candidate(0.0, 0.0)], 0.1);
        tracker.update(vec![candidate(0.0, 0.0)], 0.1);
        assert_eq!(indices(&tracker), vec![0, 1]);

        // Back in time: matched again and age resets
        tracker.update(vec![candidate(0.0, 0.0), candidate(3010.0, 0.0)], 0.1);
        let back = tracker.blobs().iter().find(|b| b.index == Some(1)).unwrap();
        assert_eq!(back.age, 0.0);

        for _ in 0..3 {
            tracker.update(vec![candidate(0.0, 0.0)], 0.1);
        }
        assert_eq!(indices(&tracker), vec![0]);
    }

    #[test]
    fn test_no_candidates_ages_everything() {
        let mut tracker = BlobTracker::new(0.05);
        tracker.update(vec![candidate(0.0, 0.0)], 0.1);
        tracker.update(Vec::new(), 0.1);
        assert!(tracker.blobs().is_empty());
    }

    #[test]
    fn test_snapshot_lists_tracked_blobs() {
        let mut tracker = BlobTracker::new(1.0);
        tracker.update(vec![candidate(100.0, 200.0)], 0.1);
        let snap = tracker.snapshot();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].index, 0);
        assert_eq!(snap[0].centroid.y, 200.0);
    }
}
