//! Polygon geofence

use crate::core::{Bounds, Point2D};

/// Even-odd ray casting test
pub fn point_in_polygon(vertices: &[Point2D], p: Point2D) -> bool {
    let n = vertices.len();
    if n < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let a = vertices[i];
        let b = vertices[j];
        if (a.y > p.y) != (b.y > p.y) {
            let x_cross = (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x;
            if p.x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// Polygon with an ordered vertex list (meters)
#[derive(Clone, Debug, PartialEq)]
pub struct Polygon {
    vertices: Vec<Point2D>,
}

impl Polygon {
    pub const MIN_VERTICES: usize = 3;

    pub fn new(vertices: Vec<Point2D>) -> Self {
        Self { vertices }
    }

    pub fn vertices(&self) -> &[Point2D] {
        &self.vertices
    }

    pub fn contains_point(&self, p: Point2D) -> bool {
        point_in_polygon(&self.vertices, p)
    }

    pub fn bounds(&self) -> Bounds {
        let mut bounds = Bounds::empty();
        for &v in &self.vertices {
            bounds.expand_to_include(v);
        }
        bounds
    }

    /// Position relative to the bounding box, `(0,0)` at min and `(1,1)` at max
    pub fn normalize(&self, p: Point2D) -> Point2D {
        let b = self.bounds();
        Point2D::new((p.x - b.min.x) / b.width(), (p.y - b.min.y) / b.height())
    }

    /// Size relative to the bounding box
    pub fn normalize_extent(&self, w: f32, h: f32) -> Point2D {
        let b = self.bounds();
        Point2D::new((w / b.width()).abs(), (h / b.height()).abs())
    }

    pub fn translate(&mut self, delta: Point2D) {
        for v in &mut self.vertices {
            *v = *v + delta;
        }
    }

    pub fn move_vertex(&mut self, index: usize, to: Point2D) -> bool {
        match self.vertices.get_mut(index) {
            Some(v) => {
                *v = to;
                true
            }
            None => false,
        }
    }

    /// Insert a vertex before `index` (appends when `index == len`)
    pub fn insert_vertex(&mut self, index: usize, at: Point2D) -> bool {
        if index > self.vertices.len() {
            return false;
        }
        self.vertices.insert(index, at);
        true
    }

    /// Remove a vertex, keeping at least a triangle
    pub fn remove_vertex(&mut self, index: usize) -> bool {
        if self.vertices.len() <= Self::MIN_VERTICES || index >= self.vertices.len() {
            return false;
        }
        self.vertices.remove(index);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn square() -> Polygon {
        Polygon::new(vec![
            Point2D::new(0.0, 0.0),
            Point2D::new(2.0, 0.0),
            Point2D::new(2.0, 2.0),
            Point2D::new(0.0, 2.0),
        ])
    }

    #[test]
    fn test_contains_square() {
        let poly = square();
        assert!(poly.contains_point(Point2D::new(1.0, 1.0)));
        assert!(!poly.contains_point(Point2D::new(3.0, 1.0)));
        assert!(!poly.contains_point(Point2D::new(-0.1, 1.0)));
    }

    #[test]
    fn test_contains_concave() {
        // U shape opening upward
        let poly = Polygon::new(vec![
            Point2D::new(0.0, 0.0),
            Point2D::new(3.0, 0.0),
            Point2D::new(3.0, 3.0),
            Point2D::new(2.0, 3.0),
            Point2D::new(2.0, 1.0),
            Point2D::new(1.0, 1.0),
            Point2D::new(1.0, 3.0),
            Point2D::new(0.0, 3.0),
        ]);
        assert!(poly.contains_point(Point2D::new(0.5, 2.0)));
        assert!(poly.contains_point(Point2D::new(2.5, 2.0)));
        assert!(!poly.contains_point(Point2D::new(1.5, 2.0)));
        assert!(poly.contains_point(Point2D::new(1.5, 0.5)));
    }

    #[test]
    fn test_degenerate_polygon_contains_nothing() {
        let line = Polygon::new(vec![Point2D::new(0.0, 0.0), Point2D::new(1.0, 1.0)]);
        assert!(!line.contains_point(Point2D::new(0.5, 0.5)));

        let flat = Polygon::new(vec![
            Point2D::new(0.0, 0.0),
            Point2D::new(1.0, 0.0),
            Point2D::new(2.0, 0.0),
        ]);
        assert!(!flat.contains_point(Point2D::new(1.0, 0.0)));
        assert!(!flat.normalize(Point2D::new(1.0, 0.0)).is_finite());
    }

    #[test]
    fn test_normalize_into_bounds() {
        let poly = square();
        let n = poly.normalize(Point2D::new(0.5, 1.5));
        assert_relative_eq!(n.x, 0.25);
        assert_relative_eq!(n.y, 0.75);
        let e = poly.normalize_extent(-1.0, 0.5);
        assert_relative_eq!(e.x, 0.5);
        assert_relative_eq!(e.y, 0.25);
    }

    #[test]
    fn test_translate_and_edit() {
        let mut poly = square();
        poly.translate(Point2D::new(10.0, 0.0));
        assert!(poly.contains_point(Point2D::new(11.0, 1.0)));
        assert!(!poly.contains_point(Point2D::new(1.0, 1.0)));

        assert!(poly.move_vertex(2, Point2D::new(14.0, 4.0)));
        assert!(!poly.move_vertex(7, Point2D::ZERO));

        assert!(poly.insert_vertex(4, Point2D::new(10.0, 1.0)));
        assert_eq!(poly.vertices().len(), 5);
        assert!(poly.remove_vertex(4));
        assert!(poly.remove_vertex(0));
        assert!(!poly.remove_vertex(0));
    }
}
