//! Well-Known Text rendering for [`Geometry`] (component C5).

use std::fmt::Write as _;

use crate::geometry::{Geometry, LineString, Polygon};

/// Renders `geom` as canonical OGC WKT, tagging the `Z` variant when any
/// part carries a Z ordinate.
pub fn to_wkt(geom: &Geometry) -> String {
    let mut out = String::new();
    match geom {
        Geometry::Point { x, y, z } => {
            out.push_str(if z.is_some() { "POINT Z " } else { "POINT " });
            out.push('(');
            write_coord(&mut out, *x, *y, *z);
            out.push(')');
        }
        Geometry::LineString(ls) => {
            out.push_str(if ls.has_z() { "LINESTRING Z " } else { "LINESTRING " });
            write_line_body(&mut out, ls);
        }
        Geometry::Polygon(p) => {
            out.push_str(if p.has_z() { "POLYGON Z " } else { "POLYGON " });
            write_polygon_body(&mut out, p);
        }
        Geometry::MultiPoint(pts) => {
            let has_z = pts.iter().any(|(_, _, z)| z.is_some());
            out.push_str(if has_z { "MULTIPOINT Z " } else { "MULTIPOINT " });
            out.push('(');
            for (i, &(x, y, z)) in pts.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                out.push('(');
                write_coord(&mut out, x, y, z);
                out.push(')');
            }
            out.push(')');
        }
        Geometry::MultiLineString(lines) => {
            let has_z = lines.iter().any(LineString::has_z);
            out.push_str(if has_z { "MULTILINESTRING Z " } else { "MULTILINESTRING " });
            out.push('(');
            for (i, ls) in lines.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_line_body(&mut out, ls);
            }
            out.push(')');
        }
        Geometry::MultiPolygon(polys) => {
            let has_z = polys.iter().any(Polygon::has_z);
            out.push_str(if has_z { "MULTIPOLYGON Z " } else { "MULTIPOLYGON " });
            out.push('(');
            for (i, p) in polys.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_polygon_body(&mut out, p);
            }
            out.push(')');
        }
    }
    out
}

fn write_coord(out: &mut String, x: f64, y: f64, z: Option<f64>) {
    match z {
        Some(z) => write!(out, "{x} {y} {z}").unwrap(),
        None => write!(out, "{x} {y}").unwrap(),
    }
}

fn write_line_body(out: &mut String, ls: &LineString) {
    out.push('(');
    for (i, &(x, y)) in ls.points.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        let z = ls.z_values.as_ref().map(|z| z[i]);
        write_coord(out, x, y, z);
    }
    out.push(')');
}

fn write_polygon_body(out: &mut String, p: &Polygon) {
    out.push('(');
    for (ring_idx, ring) in p.rings.iter().enumerate() {
        if ring_idx > 0 {
            out.push_str(", ");
        }
        out.push('(');
        for (i, &(x, y)) in ring.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            let z = p.z_values.as_ref().map(|zv| zv[ring_idx][i]);
            write_coord(out, x, y, z);
        }
        out.push(')');
    }
    out.push(')');
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_point() {
        let geom = Geometry::Point { x: 1.0, y: 2.0, z: None };
        assert_eq!(to_wkt(&geom), "POINT (1 2)");
    }

    #[test]
    fn renders_point_z() {
        let geom = Geometry::Point { x: 1.0, y: 2.0, z: Some(3.0) };
        assert_eq!(to_wkt(&geom), "POINT Z (1 2 3)");
    }

    #[test]
    fn renders_linestring() {
        let geom = Geometry::LineString(
            LineString::new(vec![(0.0, 0.0), (1.0, 1.0)], None).unwrap(),
        );
        assert_eq!(to_wkt(&geom), "LINESTRING (0 0, 1 1)");
    }

    #[test]
    fn renders_polygon_with_hole() {
        let geom = Geometry::Polygon(
            Polygon::new(
                vec![
                    vec![(0.0, 0.0), (4.0, 0.0), (4.0, 4.0), (0.0, 0.0)],
                    vec![(1.0, 1.0), (2.0, 1.0), (1.0, 1.0)],
                ],
                None,
            )
            .unwrap(),
        );
        assert_eq!(
            to_wkt(&geom),
            "POLYGON ((0 0, 4 0, 4 4, 0 0), (1 1, 2 1, 1 1))"
        );
    }

    #[test]
    fn renders_multilinestring() {
        let geom = Geometry::MultiLineString(vec![
            LineString::new(vec![(0.0, 0.0), (1.0, 1.0)], None).unwrap(),
            LineString::new(vec![(2.0, 2.0), (3.0, 3.0)], None).unwrap(),
        ]);
        assert_eq!(
            to_wkt(&geom),
            "MULTILINESTRING ((0 0, 1 1), (2 2, 3 3))"
        );
    }
}
