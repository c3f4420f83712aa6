//! Core data types: planar points, bounding boxes and sensor placement.
//!
//! All coordinates in the shared space are millimeters. Geofence shapes work
//! in meters; the conversion happens at the filter boundary.

use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul, Sub};

/// Planar point / vector (f32)
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct Point2D {
    pub x: f32,
    pub y: f32,
}

impl Point2D {
    /// Origin
    pub const ZERO: Point2D = Point2D { x: 0.0, y: 0.0 };

    #[inline]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point
    #[inline]
    pub fn distance(&self, other: &Point2D) -> f32 {
        self.distance_squared(other).sqrt()
    }

    /// Squared distance (avoids sqrt)
    #[inline]
    pub fn distance_squared(&self, other: &Point2D) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    /// Rotate around the origin by `angle` radians (CCW)
    #[inline]
    pub fn rotate(&self, angle: f32) -> Point2D {
        let (sin_a, cos_a) = angle.sin_cos();
        Point2D::new(
            self.x * cos_a - self.y * sin_a,
            self.x * sin_a + self.y * cos_a,
        )
    }

    /// Angle of this vector (radians, CCW from +X)
    #[inline]
    pub fn angle(&self) -> f32 {
        self.y.atan2(self.x)
    }

    /// Component-wise minimum
    #[inline]
    pub fn min(&self, other: Point2D) -> Point2D {
        Point2D::new(self.x.min(other.x), self.y.min(other.y))
    }

    /// Component-wise maximum
    #[inline]
    pub fn max(&self, other: Point2D) -> Point2D {
        Point2D::new(self.x.max(other.x), self.y.max(other.y))
    }

    /// Both components finite
    #[inline]
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl Add for Point2D {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Point2D::new(self.x + other.x, self.y + other.y)
    }
}

impl Sub for Point2D {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Point2D::new(self.x - other.x, self.y - other.y)
    }
}

impl Mul<f32> for Point2D {
    type Output = Self;

    #[inline]
    fn mul(self, scalar: f32) -> Self {
        Point2D::new(self.x * scalar, self.y * scalar)
    }
}

/// Axis-aligned bounding box.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    /// Minimum corner (smallest x and y values).
    pub min: Point2D,
    /// Maximum corner (largest x and y values).
    pub max: Point2D,
}

impl Bounds {
    #[inline]
    pub const fn new(min: Point2D, max: Point2D) -> Self {
        Self { min, max }
    }

    /// Create an empty (invalid) bounding box.
    ///
    /// min > max, so it expands to fit the first point added.
    #[inline]
    pub fn empty() -> Self {
        Self {
            min: Point2D::new(f32::INFINITY, f32::INFINITY),
            max: Point2D::new(f32::NEG_INFINITY, f32::NEG_INFINITY),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y
    }

    #[inline]
    pub fn width(&self) -> f32 {
        self.max.x - self.min.x
    }

    #[inline]
    pub fn height(&self) -> f32 {
        self.max.y - self.min.y
    }

    #[inline]
    pub fn center(&self) -> Point2D {
        Point2D::new(
            (self.min.x + self.max.x) * 0.5,
            (self.min.y + self.max.y) * 0.5,
        )
    }

    /// Check if a point is inside (inclusive).
    #[inline]
    pub fn contains(&self, point: Point2D) -> bool {
        point.x >= self.min.x
            && point.x <= self.max.x
            && point.y >= self.min.y
            && point.y <= self.max.y
    }

    /// Expand bounds to include a point.
    #[inline]
    pub fn expand_to_include(&mut self, point: Point2D) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self::empty()
    }
}

/// One absolute point in the shared coordinate space.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct ScanPoint {
    /// Position in millimeters
    pub position: Point2D,
    /// Return intensity (0 when the sensor does not report it)
    pub intensity: f32,
}

impl ScanPoint {
    #[inline]
    pub fn new(x: f32, y: f32, intensity: f32) -> Self {
        Self {
            position: Point2D::new(x, y),
            intensity,
        }
    }
}

/// Where a sensor sits in the shared coordinate space.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SensorPlacement {
    /// Sensor origin (mm)
    pub position: Point2D,
    /// Rotation (radians, CCW)
    pub rotation: f32,
    /// Sensor mounted upside down: scan direction is reversed
    pub mirror: bool,
    /// Number of angular samples per revolution
    pub angular_resolution: usize,
}

impl SensorPlacement {
    pub fn new(position: Point2D, rotation: f32, angular_resolution: usize) -> Self {
        Self {
            position,
            rotation,
            mirror: false,
            angular_resolution,
        }
    }
}

impl Default for SensorPlacement {
    fn default() -> Self {
        Self::new(Point2D::ZERO, 0.0, 1440)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_point_distance() {
        let a = Point2D::new(0.0, 0.0);
        let b = Point2D::new(3.0, 4.0);
        assert_relative_eq!(a.distance(&b), 5.0);
    }

    #[test]
    fn test_point_rotate() {
        let p = Point2D::new(1.0, 0.0);
        let rotated = p.rotate(std::f32::consts::FRAC_PI_2);
        assert_relative_eq!(rotated.x, 0.0, epsilon = 1e-6);
        assert_relative_eq!(rotated.y, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_bounds_expand() {
        let mut bounds = Bounds::empty();
        assert!(bounds.is_empty());

        bounds.expand_to_include(Point2D::new(1.0, 1.0));
        bounds.expand_to_include(Point2D::new(-2.0, 3.0));

        assert!(!bounds.is_empty());
        assert_eq!(bounds.min, Point2D::new(-2.0, 1.0));
        assert_eq!(bounds.max, Point2D::new(1.0, 3.0));
        assert!(bounds.contains(Point2D::new(0.0, 2.0)));
        assert!(!bounds.contains(Point2D::new(2.0, 2.0)));
    }
}
