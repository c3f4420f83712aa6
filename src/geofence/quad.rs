//! Quad geofence with a projective mapping onto the unit square
//!
//! Corner `k` maps to `UNIT_SQUARE[k]`. The homography is solved as the 8×8
//! linear system of the four correspondences with `h33 = 1`, and re-solved
//! whenever a corner moves.

use super::polygon::point_in_polygon;
use crate::core::Point2D;
use nalgebra::{Matrix3, SMatrix, SVector, Vector3};

/// Target of each corner, in corner order
pub const UNIT_SQUARE: [Point2D; 4] = [
    Point2D::new(1.0, 1.0),
    Point2D::new(0.0, 1.0),
    Point2D::new(0.0, 0.0),
    Point2D::new(1.0, 0.0),
];

/// Homography mapping `src[k]` onto `dst[k]`
///
/// Returns `None` when the correspondences are degenerate.
pub fn homography_from_4pt(src: &[Point2D; 4], dst: &[Point2D; 4]) -> Option<Matrix3<f64>> {
    let mut a = SMatrix::<f64, 8, 8>::zeros();
    let mut b = SVector::<f64, 8>::zeros();

    for k in 0..4 {
        let (x, y) = (src[k].x as f64, src[k].y as f64);
        let (u, v) = (dst[k].x as f64, dst[k].y as f64);
        let r = 2 * k;

        a[(r, 0)] = x;
        a[(r, 1)] = y;
        a[(r, 2)] = 1.0;
        a[(r, 6)] = -u * x;
        a[(r, 7)] = -u * y;
        b[r] = u;

        a[(r + 1, 3)] = x;
        a[(r + 1, 4)] = y;
        a[(r + 1, 5)] = 1.0;
        a[(r + 1, 6)] = -v * x;
        a[(r + 1, 7)] = -v * y;
        b[r + 1] = v;
    }

    let h = a.lu().solve(&b)?;
    if h.iter().any(|c| !c.is_finite()) {
        return None;
    }
    Some(Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], 1.0))
}

/// Apply a homography to a point
#[inline]
pub fn apply_homography(h: &Matrix3<f64>, p: Point2D) -> Point2D {
    let q = h * Vector3::new(p.x as f64, p.y as f64, 1.0);
    Point2D::new((q.x / q.z) as f32, (q.y / q.z) as f32)
}

#[derive(Clone, Debug, PartialEq)]
pub struct Quad {
    corners: [Point2D; 4],
    homography: Option<Matrix3<f64>>,
}

impl Quad {
    pub fn new(corners: [Point2D; 4]) -> Self {
        Self {
            corners,
            homography: homography_from_4pt(&corners, &UNIT_SQUARE),
        }
    }

    pub fn corners(&self) -> &[Point2D] {
        &self.corners
    }

    pub fn homography(&self) -> Option<&Matrix3<f64>> {
        self.homography.as_ref()
    }

    pub fn contains_point(&self, p: Point2D) -> bool {
        self.homography.is_some() && point_in_polygon(&self.corners, p)
    }

    /// Position in unit-square coordinates; NaN when the quad is degenerate
    pub fn normalize(&self, p: Point2D) -> Point2D {
        match &self.homography {
            Some(h) => apply_homography(h, p),
            None => Point2D::new(f32::NAN, f32::NAN),
        }
    }

    /// Size in unit-square coordinates, measured at the quad's center
    pub fn normalize_extent(&self, w: f32, h: f32) -> Point2D {
        let c = self.centroid();
        let d = self.normalize(c + Point2D::new(w, h)) - self.normalize(c);
        Point2D::new(d.x.abs(), d.y.abs())
    }

    fn centroid(&self) -> Point2D {
        let sum = self
            .corners
            .iter()
            .fold(Point2D::ZERO, |acc, &corner| acc + corner);
        sum * 0.25
    }

    pub fn translate(&mut self, delta: Point2D) {
        for c in &mut self.corners {
            *c = *c + delta;
        }
        self.homography = homography_from_4pt(&self.corners, &UNIT_SQUARE);
    }

    pub fn move_vertex(&mut self, index: usize, to: Point2D) -> bool {
        let Some(c) = self.corners.get_mut(index) else {
            return false;
        };
        *c = to;
        self.homography = homography_from_4pt(&self.corners, &UNIT_SQUARE);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_quad() -> Quad {
        Quad::new([
            Point2D::new(0.0, 0.0),
            Point2D::new(1.0, 0.0),
            Point2D::new(1.0, 1.0),
            Point2D::new(0.0, 1.0),
        ])
    }

    #[test]
    fn test_axis_aligned_containment() {
        let q = unit_quad();
        assert!(q.contains_point(Point2D::new(0.5, 0.5)));
        assert!(!q.contains_point(Point2D::new(2.0, 2.0)));
    }

    #[test]
    fn test_corners_map_to_unit_square() {
        let q = Quad::new([
            Point2D::new(3.0, 2.5),
            Point2D::new(0.5, 2.0),
            Point2D::new(0.0, 0.0),
            Point2D::new(2.0, 0.2),
        ]);
        for (corner, target) in q.corners().iter().zip(UNIT_SQUARE) {
            let n = q.normalize(*corner);
            assert_relative_eq!(n.x, target.x, epsilon = 1e-4);
            assert_relative_eq!(n.y, target.y, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_normalize_center_of_square() {
        let q = unit_quad();
        let n = q.normalize(Point2D::new(0.5, 0.5));
        assert_relative_eq!(n.x, 0.5, epsilon = 1e-5);
        assert_relative_eq!(n.y, 0.5, epsilon = 1e-5);

        let e = q.normalize_extent(0.2, 0.1);
        assert_relative_eq!(e.x, 0.2, epsilon = 1e-5);
        assert_relative_eq!(e.y, 0.1, epsilon = 1e-5);
    }

    #[test]
    fn test_homography_follows_corner_moves() {
        let mut q = unit_quad();
        assert!(q.move_vertex(2, Point2D::new(2.0, 2.0)));
        let n = q.normalize(Point2D::new(2.0, 2.0));
        assert_relative_eq!(n.x, 0.0, epsilon = 1e-4);
        assert_relative_eq!(n.y, 0.0, epsilon = 1e-4);
        assert!(q.contains_point(Point2D::new(1.5, 1.2)));

        q.translate(Point2D::new(5.0, 0.0));
        let n = q.normalize(Point2D::new(5.0, 0.0));
        assert_relative_eq!(n.x, 1.0, epsilon = 1e-4);
        assert_relative_eq!(n.y, 1.0, epsilon = 1e-4);
    }

    #[test]
    fn test_degenerate_quad() {
        let p = Point2D::new(1.0, 1.0);
        let q = Quad::new([p, p, p, Point2D::new(2.0, 2.0)]);
        assert!(q.homography().is_none());
        assert!(!q.contains_point(Point2D::new(1.5, 1.5)));
        assert!(!q.normalize(Point2D::new(1.5, 1.5)).is_finite());
    }
}
