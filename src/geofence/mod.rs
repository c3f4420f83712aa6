//! Geofence shapes and point filtering
//!
//! Shapes are defined in meters. Points arrive in millimeters and are scaled
//! by [`MM_TO_M`] before any shape is evaluated.
//!
//! A point is rejected by any mask shape that contains it. Otherwise it is
//! kept only when at least one inclusion shape contains it. A zone without
//! any shape keeps every point; a zone with only masks keeps none.

pub mod ellipse;
pub mod polygon;
pub mod quad;

pub use ellipse::Ellipse;
pub use polygon::Polygon;
pub use quad::Quad;

use crate::core::{Bounds, Point2D};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Millimeter to meter scale applied to points before shape evaluation
pub const MM_TO_M: f32 = 0.001;

/// Shape variant tag
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeKind {
    Polygon,
    Ellipse,
    Quad,
}

impl std::fmt::Display for ShapeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShapeKind::Polygon => write!(f, "polygon"),
            ShapeKind::Ellipse => write!(f, "ellipse"),
            ShapeKind::Quad => write!(f, "quad"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum GeofenceShape {
    Polygon(Polygon),
    Ellipse(Ellipse),
    Quad(Quad),
}

impl GeofenceShape {
    /// Build a shape from its control points
    ///
    /// Ellipses and quads take exactly four points, polygons at least three.
    pub fn from_points(kind: ShapeKind, points: Vec<Point2D>) -> Result<Self> {
        match kind {
            ShapeKind::Polygon => {
                if points.len() < Polygon::MIN_VERTICES {
                    return Err(Error::InvalidParameter(format!(
                        "polygon needs at least {} vertices, got {}",
                        Polygon::MIN_VERTICES,
                        points.len()
                    )));
                }
                Ok(GeofenceShape::Polygon(Polygon::new(points)))
            }
            ShapeKind::Ellipse => Ok(GeofenceShape::Ellipse(Ellipse::new(four(kind, &points)?))),
            ShapeKind::Quad => Ok(GeofenceShape::Quad(Quad::new(four(kind, &points)?))),
        }
    }

    pub fn kind(&self) -> ShapeKind {
        match self {
            GeofenceShape::Polygon(_) => ShapeKind::Polygon,
            GeofenceShape::Ellipse(_) => ShapeKind::Ellipse,
            GeofenceShape::Quad(_) => ShapeKind::Quad,
        }
    }

    /// Containment test for a point in meters
    pub fn contains_point(&self, p: Point2D) -> bool {
        match self {
            GeofenceShape::Polygon(s) => s.contains_point(p),
            GeofenceShape::Ellipse(s) => s.contains_point(p),
            GeofenceShape::Quad(s) => s.contains_point(p),
        }
    }

    /// Shape-relative coordinate; non-finite while the shape is degenerate
    pub fn normalize(&self, p: Point2D) -> Point2D {
        match self {
            GeofenceShape::Polygon(s) => s.normalize(p),
            GeofenceShape::Ellipse(s) => s.normalize(p),
            GeofenceShape::Quad(s) => s.normalize(p),
        }
    }

    /// Shape-relative size of a `w × h` extent
    pub fn normalize_extent(&self, w: f32, h: f32) -> Point2D {
        match self {
            GeofenceShape::Polygon(s) => s.normalize_extent(w, h),
            GeofenceShape::Ellipse(s) => s.normalize_extent(w, h),
            GeofenceShape::Quad(s) => s.normalize_extent(w, h),
        }
    }

    pub fn translate(&mut self, delta: Point2D) {
        match self {
            GeofenceShape::Polygon(s) => s.translate(delta),
            GeofenceShape::Ellipse(s) => s.translate(delta),
            GeofenceShape::Quad(s) => s.translate(delta),
        }
    }

    /// Move one control point; false if `index` is out of range
    pub fn move_vertex(&mut self, index: usize, to: Point2D) -> bool {
        match self {
            GeofenceShape::Polygon(s) => s.move_vertex(index, to),
            GeofenceShape::Ellipse(s) => s.move_vertex(index, to),
            GeofenceShape::Quad(s) => s.move_vertex(index, to),
        }
    }

    /// Control points (polygon vertices, ellipse points, quad corners)
    pub fn vertices(&self) -> &[Point2D] {
        match self {
            GeofenceShape::Polygon(s) => s.vertices(),
            GeofenceShape::Ellipse(s) => s.points(),
            GeofenceShape::Quad(s) => s.corners(),
        }
    }

    fn bounds(&self) -> Bounds {
        let mut bounds = Bounds::empty();
        for &v in self.vertices() {
            bounds.expand_to_include(v);
        }
        bounds
    }
}

fn four(kind: ShapeKind, points: &[Point2D]) -> Result<[Point2D; 4]> {
    points.try_into().map_err(|_| {
        Error::InvalidParameter(format!(
            "{} needs exactly 4 points, got {}",
            kind,
            points.len()
        ))
    })
}

/// Fields kept when a shape is rebuilt as another kind
#[derive(Clone, Debug, PartialEq)]
pub struct ShapeTransfer {
    pub vertices: Vec<Point2D>,
    pub is_mask: bool,
}

/// A shape plus its inclusion/mask role
#[derive(Clone, Debug, PartialEq)]
pub struct Geofence {
    pub shape: GeofenceShape,
    /// Mask shapes exclude the points they contain
    pub is_mask: bool,
}

impl Geofence {
    pub fn new(shape: GeofenceShape, is_mask: bool) -> Self {
        Self { shape, is_mask }
    }

    pub fn transfer(&self) -> ShapeTransfer {
        ShapeTransfer {
            vertices: self.shape.vertices().to_vec(),
            is_mask: self.is_mask,
        }
    }

    /// Rebuild from transferred fields as `kind`
    ///
    /// When the vertex count does not suit the new kind, the corners of the
    /// old vertices' bounding box are used instead.
    pub fn from_transfer(kind: ShapeKind, transfer: ShapeTransfer) -> Result<Self> {
        let fits = match kind {
            ShapeKind::Polygon => transfer.vertices.len() >= Polygon::MIN_VERTICES,
            ShapeKind::Ellipse | ShapeKind::Quad => transfer.vertices.len() == 4,
        };
        let vertices = if fits {
            transfer.vertices
        } else {
            let mut bounds = Bounds::empty();
            for &v in &transfer.vertices {
                bounds.expand_to_include(v);
            }
            if bounds.is_empty() {
                return Err(Error::InvalidParameter(
                    "cannot rebuild a shape without vertices".to_string(),
                ));
            }
            bounding_corners(&bounds, kind)
        };
        Ok(Self {
            shape: GeofenceShape::from_points(kind, vertices)?,
            is_mask: transfer.is_mask,
        })
    }

    /// Containment for a point in meters
    #[inline]
    pub fn contains_point(&self, p: Point2D) -> bool {
        self.shape.contains_point(p)
    }

    /// Bounding box of the control points (meters)
    pub fn bounds(&self) -> Bounds {
        self.shape.bounds()
    }
}

/// Bounding box corners in the order the kind expects
fn bounding_corners(b: &Bounds, kind: ShapeKind) -> Vec<Point2D> {
    match kind {
        // Quad corner k maps to unit-square corner k: (1,1),(0,1),(0,0),(1,0)
        ShapeKind::Quad => vec![
            b.max,
            Point2D::new(b.min.x, b.max.y),
            b.min,
            Point2D::new(b.max.x, b.min.y),
        ],
        // Edge midpoints: one axis pair per dimension
        ShapeKind::Ellipse => {
            let c = b.center();
            vec![
                Point2D::new(b.min.x, c.y),
                Point2D::new(c.x, b.max.y),
                Point2D::new(b.max.x, c.y),
                Point2D::new(c.x, b.min.y),
            ]
        }
        ShapeKind::Polygon => vec![
            b.min,
            Point2D::new(b.max.x, b.min.y),
            b.max,
            Point2D::new(b.min.x, b.max.y),
        ],
    }
}

/// Whether a point (millimeters) passes a zone's geofences
pub fn accepts(geofences: &[Geofence], point_mm: Point2D) -> bool {
    if geofences.is_empty() {
        return true;
    }
    let p = point_mm * MM_TO_M;
    let mut included = false;
    for fence in geofences {
        if fence.is_mask {
            if fence.contains_point(p) {
                return false;
            }
        } else {
            included = included || fence.contains_point(p);
        }
    }
    included
}
