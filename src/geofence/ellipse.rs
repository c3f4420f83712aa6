//! Ellipse geofence from four control points
//!
//! The most distant pair of control points spans the major axis, the other
//! two the minor axis. Axis lengths and rotation are re-derived whenever a
//! control point moves.

use crate::core::Point2D;

/// Sign applied to x in ellipse-relative coordinates
///
/// Normalized x grows opposite to the ellipse's major-axis direction; y is
/// left as is.
pub const ELLIPSE_NORMALIZE_X_SIGN: f32 = -1.0;

/// Index pairs of four points, in search order
const PAIRS: [(usize, usize); 6] = [(0, 1), (0, 2), (0, 3), (1, 2), (1, 3), (2, 3)];

#[derive(Clone, Debug, PartialEq)]
pub struct Ellipse {
    points: [Point2D; 4],
    center: Point2D,
    /// Semi-major axis
    a: f32,
    /// Semi-minor axis
    b: f32,
    rotation: f32,
}

impl Ellipse {
    pub fn new(points: [Point2D; 4]) -> Self {
        let mut ellipse = Self {
            points,
            center: Point2D::ZERO,
            a: 0.0,
            b: 0.0,
            rotation: 0.0,
        };
        ellipse.derive_axes();
        ellipse
    }

    fn derive_axes(&mut self) {
        let p = &self.points;
        self.center = Point2D::new(
            (p[0].x + p[1].x + p[2].x + p[3].x) / 4.0,
            (p[0].y + p[1].y + p[2].y + p[3].y) / 4.0,
        );

        let mut major = PAIRS[0];
        let mut major_len = p[major.0].distance(&p[major.1]);
        for &(i, j) in &PAIRS[1..] {
            let len = p[i].distance(&p[j]);
            if len > major_len {
                major = (i, j);
                major_len = len;
            }
        }
        let mut rest = (0..4).filter(|&k| k != major.0 && k != major.1);
        let (m0, m1) = match (rest.next(), rest.next()) {
            (Some(m0), Some(m1)) => (m0, m1),
            _ => (0, 0),
        };

        self.a = major_len / 2.0;
        self.b = p[m0].distance(&p[m1]) / 2.0;
        self.rotation = (p[major.1] - p[major.0]).angle();
    }

    pub fn points(&self) -> &[Point2D] {
        &self.points
    }

    pub fn center(&self) -> Point2D {
        self.center
    }

    pub fn semi_axes(&self) -> (f32, f32) {
        (self.a, self.b)
    }

    pub fn rotation(&self) -> f32 {
        self.rotation
    }

    /// Point in the ellipse's own frame (centered, unrotated)
    #[inline]
    fn to_local(&self, p: Point2D) -> Point2D {
        (p - self.center).rotate(-self.rotation)
    }

    pub fn contains_point(&self, p: Point2D) -> bool {
        let local = self.to_local(p);
        let (u, v) = (local.x / self.a, local.y / self.b);
        u * u + v * v <= 1.0
    }

    /// Ellipse-relative coordinate: unit circle maps to the ellipse
    pub fn normalize(&self, p: Point2D) -> Point2D {
        let local = self.to_local(p);
        Point2D::new(
            ELLIPSE_NORMALIZE_X_SIGN * local.x / self.a,
            local.y / self.b,
        )
    }

    /// Size in semi-axis units
    pub fn normalize_extent(&self, w: f32, h: f32) -> Point2D {
        let v = Point2D::new(w, h).rotate(-self.rotation);
        Point2D::new((v.x / self.a).abs(), (v.y / self.b).abs())
    }

    pub fn translate(&mut self, delta: Point2D) {
        for p in &mut self.points {
            *p = *p + delta;
        }
        self.center = self.center + delta;
    }

    pub fn move_vertex(&mut self, index: usize, to: Point2D) -> bool {
        let Some(p) = self.points.get_mut(index) else {
            return false;
        };
        *p = to;
        self.derive_axes();
        true
    }
}
