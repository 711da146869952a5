//! Optional coordinate reprojection, backed by PROJ.
//!
//! Not part of the blob decoder proper: the decoder always emits geometry
//! in the file's declared spatial reference. This module is the external,
//! optional post-processor spec §4.4/§9 describes — callers who need
//! WGS84 (for GeoJSON) or some other CRS compose it themselves.
//!
//! Only built with the `reproject` feature: linking PROJ is a real,
//! non-default cost most callers reading a geodatabase in its native
//! SRID don't pay.

use proj::Proj;

use crate::error::{Error, Result};
use crate::geometry::{Geometry, LineString, Polygon};

/// A reusable coordinate transform between two spatial references,
/// identified by strings PROJ accepts (`"EPSG:3857"`, a WKT string, a
/// PROJ pipeline, …).
pub struct Reprojector {
    inner: Proj,
}

impl Reprojector {
    /// Builds a transform from `from` to `to`. Construction does the
    /// expensive CRS database lookups; keep one instance and reuse it
    /// across every geometry in a table scan rather than rebuilding it
    /// per feature.
    pub fn new(from: &str, to: &str) -> Result<Self> {
        let inner = Proj::new_known_crs(from, to, None)
            .map_err(|e| Error::Reprojection(e.to_string()))?;
        Ok(Reprojector { inner })
    }

    /// Convenience constructor for the common case of reprojecting into
    /// WGS84 (EPSG:4326), the CRS GeoJSON requires.
    pub fn to_wgs84(from: &str) -> Result<Self> {
        Self::new(from, "EPSG:4326")
    }

    fn convert_xy(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        self.inner
            .convert((x, y))
            .map(|p| (p.0, p.1))
            .map_err(|e| Error::Reprojection(e.to_string()))
    }

    /// Returns a copy of `geom` with every XY coordinate reprojected. Z
    /// ordinates, if present, pass through unchanged — PROJ pipelines
    /// that also transform vertical datums are out of scope here.
    pub fn reproject(&self, geom: &Geometry) -> Result<Geometry> {
        Ok(match geom {
            Geometry::Point { x, y, z } => {
                let (x, y) = self.convert_xy(*x, *y)?;
                Geometry::Point { x, y, z: *z }
            }
            Geometry::LineString(ls) => Geometry::LineString(self.reproject_line(ls)?),
            Geometry::Polygon(p) => Geometry::Polygon(self.reproject_polygon(p)?),
            Geometry::MultiPoint(pts) => {
                let mut out = Vec::with_capacity(pts.len());
                for &(x, y, z) in pts {
                    let (x, y) = self.convert_xy(x, y)?;
                    out.push((x, y, z));
                }
                Geometry::MultiPoint(out)
            }
            Geometry::MultiLineString(lines) => {
                let mut out = Vec::with_capacity(lines.len());
                for ls in lines {
                    out.push(self.reproject_line(ls)?);
                }
                Geometry::MultiLineString(out)
            }
            Geometry::MultiPolygon(polys) => {
                let mut out = Vec::with_capacity(polys.len());
                for p in polys {
                    out.push(self.reproject_polygon(p)?);
                }
                Geometry::MultiPolygon(out)
            }
        })
    }

    fn reproject_line(&self, ls: &LineString) -> Result<LineString> {
        let mut points = Vec::with_capacity(ls.points.len());
        for &(x, y) in &ls.points {
            points.push(self.convert_xy(x, y)?);
        }
        LineString::new(points, ls.z_values.clone())
    }

    fn reproject_polygon(&self, p: &Polygon) -> Result<Polygon> {
        let mut rings = Vec::with_capacity(p.rings.len());
        for ring in &p.rings {
            let mut out_ring = Vec::with_capacity(ring.len());
            for &(x, y) in ring {
                out_ring.push(self.convert_xy(x, y)?);
            }
            rings.push(out_ring);
        }
        Polygon::new(rings, p.z_values.clone())
    }
}
