//! GeoJSON serialization for [`Geometry`] (component C5), plus the
//! Feature/FeatureCollection wrapping the database layer uses to hand back
//! a table scan.

use serde_json::{json, Value};

use crate::geometry::{Geometry, LineString, Polygon};

/// Renders `geom` as a GeoJSON geometry object. Z ordinates, when present,
/// are included as a third coordinate element (RFC 7946 §3.1.1).
pub fn to_geojson_geometry(geom: &Geometry) -> Value {
    match geom {
        Geometry::Point { x, y, z } => json!({
            "type": "Point",
            "coordinates": point_coords(*x, *y, *z),
        }),
        Geometry::LineString(ls) => json!({
            "type": "LineString",
            "coordinates": line_coords(ls),
        }),
        Geometry::Polygon(p) => json!({
            "type": "Polygon",
            "coordinates": polygon_coords(p),
        }),
        Geometry::MultiPoint(pts) => json!({
            "type": "MultiPoint",
            "coordinates": pts.iter().map(|&(x, y, z)| point_coords(x, y, z)).collect::<Vec<_>>(),
        }),
        Geometry::MultiLineString(lines) => json!({
            "type": "MultiLineString",
            "coordinates": lines.iter().map(line_coords).collect::<Vec<_>>(),
        }),
        Geometry::MultiPolygon(polys) => json!({
            "type": "MultiPolygon",
            "coordinates": polys.iter().map(polygon_coords).collect::<Vec<_>>(),
        }),
    }
}

/// Wraps a decoded geometry and its attribute columns as a GeoJSON Feature.
/// `fid`, when present, is attached as the Feature's `"id"` member (RFC 7946
/// §3.2); it is omitted entirely when `None`.
pub fn feature_to_geojson(geometry: Option<&Geometry>, properties: Value, fid: Option<i64>) -> Value {
    let mut feature = json!({
        "type": "Feature",
        "geometry": geometry.map(to_geojson_geometry).unwrap_or(Value::Null),
        "properties": properties,
    });
    if let Some(fid) = fid {
        feature["id"] = json!(fid);
    }
    feature
}

/// Wraps a sequence of already-built Features as a FeatureCollection.
pub fn features_to_geojson(features: Vec<Value>) -> Value {
    json!({
        "type": "FeatureCollection",
        "features": features,
    })
}

fn point_coords(x: f64, y: f64, z: Option<f64>) -> Value {
    match z {
        Some(z) => json!([x, y, z]),
        None => json!([x, y]),
    }
}

fn line_coords(ls: &LineString) -> Vec<Value> {
    ls.points
        .iter()
        .enumerate()
        .map(|(i, &(x, y))| point_coords(x, y, ls.z_values.as_ref().map(|z| z[i])))
        .collect()
}

fn polygon_coords(p: &Polygon) -> Vec<Vec<Value>> {
    p.rings
        .iter()
        .enumerate()
        .map(|(ring_idx, ring)| {
            ring.iter()
                .enumerate()
                .map(|(i, &(x, y))| {
                    point_coords(x, y, p.z_values.as_ref().map(|z| z[ring_idx][i]))
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_geojson() {
        let geom = Geometry::Point { x: 1.0, y: 2.0, z: None };
        assert_eq!(
            to_geojson_geometry(&geom),
            json!({"type": "Point", "coordinates": [1.0, 2.0]})
        );
    }

    #[test]
    fn point_z_geojson() {
        let geom = Geometry::Point { x: 1.0, y: 2.0, z: Some(3.0) };
        assert_eq!(
            to_geojson_geometry(&geom),
            json!({"type": "Point", "coordinates": [1.0, 2.0, 3.0]})
        );
    }

    #[test]
    fn linestring_geojson() {
        let geom = Geometry::LineString(
            LineString::new(vec![(0.0, 0.0), (1.0, 1.0)], None).unwrap(),
        );
        assert_eq!(
            to_geojson_geometry(&geom),
            json!({"type": "LineString", "coordinates": [[0.0, 0.0], [1.0, 1.0]]})
        );
    }

    #[test]
    fn feature_wraps_geometry_and_properties() {
        let geom = Geometry::Point { x: 1.0, y: 2.0, z: None };
        let feature = feature_to_geojson(Some(&geom), json!({"name": "test"}), Some(42));
        assert_eq!(feature["type"], "Feature");
        assert_eq!(feature["properties"]["name"], "test");
        assert_eq!(feature["geometry"]["type"], "Point");
        assert_eq!(feature["id"], 42);
    }

    #[test]
    fn feature_without_geometry_is_null() {
        let feature = feature_to_geojson(None, json!({}), None);
        assert_eq!(feature["geometry"], Value::Null);
    }

    #[test]
    fn feature_without_fid_omits_id() {
        let feature = feature_to_geojson(None, json!({}), None);
        assert!(feature.as_object().unwrap().get("id").is_none());
    }

    #[test]
    fn collection_wraps_features() {
        let collection = features_to_geojson(vec![json!({"type": "Feature"})]);
        assert_eq!(collection["type"], "FeatureCollection");
        assert_eq!(collection["features"].as_array().unwrap().len(), 1);
    }
}
