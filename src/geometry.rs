//! The decoded geometry data model: a sum type over Point / LineString /
//! Polygon / MultiPoint / MultiLineString / MultiPolygon, each with an
//! optional Z ordinate.
//!
//! Values are created once by a decode call, never mutated, and carry no
//! identity: two geometries with equal field contents are behaviorally
//! identical.

use crate::error::{Error, Result};

/// A single XY (optionally XYZ) coordinate pair.
pub type Coord = (f64, f64);

/// An axis-aligned bounding box over a geometry's coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
}

impl BoundingBox {
    fn from_coords<'a>(coords: impl Iterator<Item = &'a Coord>) -> Self {
        let mut xmin = f64::INFINITY;
        let mut ymin = f64::INFINITY;
        let mut xmax = f64::NEG_INFINITY;
        let mut ymax = f64::NEG_INFINITY;
        for &(x, y) in coords {
            xmin = xmin.min(x);
            ymin = ymin.min(y);
            xmax = xmax.max(x);
            ymax = ymax.max(y);
        }
        BoundingBox { xmin, ymin, xmax, ymax }
    }

    fn union(boxes: impl Iterator<Item = BoundingBox>) -> Self {
        let mut acc = BoundingBox {
            xmin: f64::INFINITY,
            ymin: f64::INFINITY,
            xmax: f64::NEG_INFINITY,
            ymax: f64::NEG_INFINITY,
        };
        for b in boxes {
            acc.xmin = acc.xmin.min(b.xmin);
            acc.ymin = acc.ymin.min(b.ymin);
            acc.xmax = acc.xmax.max(b.xmax);
            acc.ymax = acc.ymax.max(b.ymax);
        }
        acc
    }

    /// Whether `coord` lies within this box, widened by `tolerance` on
    /// every side (spec §8: "up to one effective-scale ULP").
    pub fn contains_within(&self, coord: Coord, tolerance: f64) -> bool {
        let (x, y) = coord;
        x >= self.xmin - tolerance
            && x <= self.xmax + tolerance
            && y >= self.ymin - tolerance
            && y <= self.ymax + tolerance
    }
}

/// A line of points, with an optional parallel array of Z ordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct LineString {
    pub points: Vec<Coord>,
    pub z_values: Option<Vec<f64>>,
}

impl LineString {
    pub fn new(points: Vec<Coord>, z_values: Option<Vec<f64>>) -> Result<Self> {
        if points.is_empty() {
            return Err(Error::GeometryInvariant("LineString has no points"));
        }
        if let Some(z) = &z_values {
            if z.len() != points.len() {
                return Err(Error::GeometryInvariant(
                    "LineString z_values length does not match points length",
                ));
            }
        }
        Ok(LineString { points, z_values })
    }

    pub fn has_z(&self) -> bool {
        self.z_values.is_some()
    }

    pub fn bounds(&self) -> BoundingBox {
        BoundingBox::from_coords(self.points.iter())
    }
}

/// A polygon: ring 0 is the exterior, the rest are interior holes.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    pub rings: Vec<Vec<Coord>>,
    pub z_values: Option<Vec<Vec<f64>>>,
}

impl Polygon {
    pub fn new(rings: Vec<Vec<Coord>>, z_values: Option<Vec<Vec<f64>>>) -> Result<Self> {
        if rings.is_empty() || rings.iter().any(|r| r.is_empty()) {
            return Err(Error::GeometryInvariant("Polygon has an empty ring"));
        }
        if let Some(z) = &z_values {
            if z.len() != rings.len() {
                return Err(Error::GeometryInvariant(
                    "Polygon z_values ring count does not match rings count",
                ));
            }
            for (ring, ring_z) in rings.iter().zip(z.iter()) {
                if ring.len() != ring_z.len() {
                    return Err(Error::GeometryInvariant(
                        "Polygon z_values ring length does not match ring length",
                    ));
                }
            }
        }
        Ok(Polygon { rings, z_values })
    }

    pub fn has_z(&self) -> bool {
        self.z_values.is_some()
    }

    /// The exterior (outer) ring — ring 0.
    pub fn exterior(&self) -> &[Coord] {
        &self.rings[0]
    }

    /// Interior rings (holes): every ring after the exterior.
    pub fn interiors(&self) -> &[Vec<Coord>] {
        &self.rings[1..]
    }

    pub fn bounds(&self) -> BoundingBox {
        BoundingBox::from_coords(self.rings.iter().flatten())
    }
}

/// The decoded geometry sum type.
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Point { x: f64, y: f64, z: Option<f64> },
    LineString(LineString),
    Polygon(Polygon),
    MultiPoint(Vec<(f64, f64, Option<f64>)>),
    MultiLineString(Vec<LineString>),
    MultiPolygon(Vec<Polygon>),
}

impl Geometry {
    pub fn has_z(&self) -> bool {
        match self {
            Geometry::Point { z, .. } => z.is_some(),
            Geometry::LineString(ls) => ls.has_z(),
            Geometry::Polygon(p) => p.has_z(),
            Geometry::MultiPoint(pts) => pts.iter().any(|(_, _, z)| z.is_some()),
            Geometry::MultiLineString(lines) => lines.iter().any(LineString::has_z),
            Geometry::MultiPolygon(polys) => polys.iter().any(Polygon::has_z),
        }
    }

    /// The number of coordinates this geometry carries, summed across all
    /// parts — what spec §4's invariant 4 checks against a blob's header
    /// point count.
    pub fn point_count(&self) -> usize {
        match self {
            Geometry::Point { .. } => 1,
            Geometry::LineString(ls) => ls.points.len(),
            Geometry::Polygon(p) => p.rings.iter().map(Vec::len).sum(),
            Geometry::MultiPoint(pts) => pts.len(),
            Geometry::MultiLineString(lines) => lines.iter().map(|l| l.points.len()).sum(),
            Geometry::MultiPolygon(polys) => polys
                .iter()
                .flat_map(|p| p.rings.iter().map(Vec::len))
                .sum(),
        }
    }

    pub fn bounds(&self) -> BoundingBox {
        match self {
            Geometry::Point { x, y, .. } => BoundingBox {
                xmin: *x,
                ymin: *y,
                xmax: *x,
                ymax: *y,
            },
            Geometry::LineString(ls) => ls.bounds(),
            Geometry::Polygon(p) => p.bounds(),
            Geometry::MultiPoint(pts) => {
                BoundingBox::from_coords(pts.iter().map(|(x, y, _)| (x, y)))
            }
            Geometry::MultiLineString(lines) => {
                BoundingBox::union(lines.iter().map(LineString::bounds))
            }
            Geometry::MultiPolygon(polys) => BoundingBox::union(polys.iter().map(Polygon::bounds)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linestring_rejects_mismatched_z() {
        let err = LineString::new(vec![(0.0, 0.0), (1.0, 1.0)], Some(vec![1.0]));
        assert!(matches!(err, Err(Error::GeometryInvariant(_))));
    }

    #[test]
    fn linestring_rejects_empty_points() {
        assert!(LineString::new(vec![], None).is_err());
    }

    #[test]
    fn polygon_exterior_and_interiors() {
        let poly = Polygon::new(
            vec![
                vec![(0.0, 0.0), (4.0, 0.0), (4.0, 4.0), (0.0, 4.0)],
                vec![(1.0, 1.0), (2.0, 1.0), (2.0, 2.0)],
            ],
            None,
        )
        .unwrap();
        assert_eq!(poly.exterior().len(), 4);
        assert_eq!(poly.interiors().len(), 1);
    }

    #[test]
    fn point_count_sums_parts() {
        let g = Geometry::MultiLineString(vec![
            LineString::new(vec![(0.0, 0.0), (1.0, 1.0)], None).unwrap(),
            LineString::new(vec![(2.0, 2.0), (3.0, 3.0), (4.0, 4.0)], None).unwrap(),
        ]);
        assert_eq!(g.point_count(), 5);
    }

    #[test]
    fn bounds_contains_within_tolerance() {
        let bb = BoundingBox { xmin: 0.0, ymin: 0.0, xmax: 10.0, ymax: 10.0 };
        assert!(bb.contains_within((10.0001, 5.0), 0.001));
        assert!(!bb.contains_within((11.0, 5.0), 0.001));
    }
}
