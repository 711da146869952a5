//! The ST_Geometry blob decoder (component C4): parses the proprietary,
//! undocumented binary layout Esri Mobile Geodatabases use for feature
//! geometry into this crate's [`Geometry`] sum type.
//!
//! Single-threaded, side-effect-free per call: a byte slice and a borrowed
//! [`CoordinateSystem`] go in, a `Geometry` or an [`Error`] comes out.

use crate::coordinate_system::CoordinateSystem;
use crate::error::{Error, Result};
use crate::geometry::{Geometry, LineString, Polygon};
use crate::varint::{read_varint, zigzag_decode};

const MAGIC: [u8; 4] = [0x64, 0x11, 0x0F, 0x00];

/// The dividing line between "this varint is part-structure metadata" and
/// "this varint is a raw coordinate in fixed-point space" (spec §4.3.1).
pub const DEFAULT_COORD_THRESHOLD: u64 = 100_000_000_000;

/// Safety bound on how many small part-info varints may be read before one
/// crosses the coordinate threshold (spec §4.3.1, §8).
const PART_INFO_RUNAWAY_LIMIT: usize = 10_000;

/// Decodes ST_Geometry blobs against a fixed [`CoordinateSystem`].
///
/// Cheap to construct; holds no state beyond its configuration, so a
/// single instance can be reused (or shared, immutably, across threads)
/// for every row in a table scan.
#[derive(Debug, Clone)]
pub struct StGeometryDecoder {
    coordinate_system: CoordinateSystem,
    threshold: u64,
}

impl Default for StGeometryDecoder {
    fn default() -> Self {
        StGeometryDecoder {
            coordinate_system: CoordinateSystem::default(),
            threshold: DEFAULT_COORD_THRESHOLD,
        }
    }
}

impl StGeometryDecoder {
    pub fn new(coordinate_system: CoordinateSystem) -> Self {
        StGeometryDecoder {
            coordinate_system,
            threshold: DEFAULT_COORD_THRESHOLD,
        }
    }

    /// Overrides the coordinate threshold `T` that separates part-info
    /// metadata varints from raw coordinates. Spec §4.3.1 says the default
    /// (100 billion) must be used for this format; this exists for callers
    /// who have independently confirmed a different threshold fits their
    /// files.
    pub fn with_threshold(mut self, threshold: u64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn coordinate_system(&self) -> &CoordinateSystem {
        &self.coordinate_system
    }

    /// Decodes a single ST_Geometry blob.
    pub fn decode(&self, blob: &[u8]) -> Result<Geometry> {
        if blob.len() < 8 {
            return Err(Error::BlobTooShort { len: blob.len() });
        }
        if blob[0..4] != MAGIC {
            return Err(Error::InvalidMagic {
                observed: hex(&blob[0..4]),
            });
        }
        let point_count = u32::from_le_bytes([blob[4], blob[5], blob[6], blob[7]]);
        if point_count == 0 {
            return Err(Error::EmptyGeometry);
        }

        if point_count == 1 && blob.len() == 30 {
            self.decode_point(blob)
        } else {
            self.decode_complex(blob, point_count)
        }
    }

    fn decode_point(&self, blob: &[u8]) -> Result<Geometry> {
        let pos = 18;
        let (x_raw, pos) = read_varint(blob, pos)?;
        let (y_raw, _pos) = read_varint(blob, pos)?;
        let (x, y) = self.coordinate_system.raw_to_xy(raw_i64(x_raw), raw_i64(y_raw));
        Ok(Geometry::Point { x, y, z: None })
    }

    fn decode_complex(&self, blob: &[u8], point_count: u32) -> Result<Geometry> {
        let mut pos = 8;

        let (_size_hint, new_pos) = read_varint(blob, pos)?;
        pos = new_pos;
        let (geom_flags, new_pos) = read_varint(blob, pos)?;
        pos = new_pos;

        // Bounding box — preserved only for diagnostics, not required for
        // reconstruction.
        for _ in 0..4 {
            let (_v, new_pos) = read_varint(blob, pos)?;
            pos = new_pos;
        }

        let (part_info, x_raw0, new_pos) = self.read_part_info_prefix(blob, pos)?;
        pos = new_pos;
        let (y_raw0, new_pos) = read_varint(blob, pos)?;
        pos = new_pos;

        let points_per_part = infer_part_structure(&part_info, point_count);
        tracing::trace!(
            num_parts = points_per_part.len(),
            ?points_per_part,
            "part structure resolved"
        );

        let (parts, pos) = self.read_coordinate_stream(
            blob,
            pos,
            raw_i64(x_raw0),
            raw_i64(y_raw0),
            &points_per_part,
        )?;

        let actual: usize = parts.iter().map(Vec::len).sum();
        if actual != point_count as usize {
            return Err(Error::PointCountMismatch {
                expected: point_count,
                actual: actual as u32,
            });
        }

        let z_flat = self.try_decode_z(blob, pos, geom_flags, point_count);

        assemble_geometry(geom_flags, parts, z_flat)
    }

    /// Reads the indeterminate-length run of "small" varints describing
    /// part structure, stopping at the first varint that crosses the
    /// coordinate threshold — which is the blob's first raw X coordinate.
    fn read_part_info_prefix(&self, blob: &[u8], mut pos: usize) -> Result<(Vec<u64>, u64, usize)> {
        let mut part_info = Vec::new();
        loop {
            let (v, new_pos) = read_varint(blob, pos)?;
            pos = new_pos;
            if v > self.threshold {
                return Ok((part_info, v, pos));
            }
            part_info.push(v);
            if part_info.len() > PART_INFO_RUNAWAY_LIMIT {
                return Err(Error::PartInfoRunaway {
                    offset: pos,
                    limit: PART_INFO_RUNAWAY_LIMIT,
                });
            }
        }
    }

    /// Runs the part-boundary state machine over the coordinate stream
    /// (spec §4.3.2 / §9): deltas accumulate onto a running position;
    /// absolute resets above the threshold are held in a one-slot pending
    /// buffer so that two resets in a row can be recognized as a part
    /// boundary, while a lone reset followed by a delta is just an
    /// in-part refresh.
    fn read_coordinate_stream(
        &self,
        blob: &[u8],
        mut pos: usize,
        x_raw0: i64,
        y_raw0: i64,
        points_per_part: &[u64],
    ) -> Result<(Vec<Vec<(f64, f64)>>, usize)> {
        let mut curr_x = x_raw0;
        let mut curr_y = y_raw0;
        let mut parts: Vec<Vec<(f64, f64)>> = Vec::new();

        for (part_idx, &declared_count) in points_per_part.iter().enumerate() {
            let mut current_part: Vec<(f64, f64)> = Vec::new();
            let mut pending: Option<(f64, f64)> = None;
            let points_to_read;
            let mut prev_was_absolute;

            if part_idx == 0 {
                current_part.push(self.coordinate_system.raw_to_xy(curr_x, curr_y));
                points_to_read = declared_count.saturating_sub(1);
                prev_was_absolute = true;
            } else {
                points_to_read = declared_count;
                prev_was_absolute = false;
            }

            let mut remaining = points_to_read;
            while remaining > 0 {
                if pos >= blob.len() {
                    break;
                }
                let (v1, new_pos) = read_varint(blob, pos)?;
                pos = new_pos;
                let (v2, new_pos) = read_varint(blob, pos)?;
                pos = new_pos;

                if v1 > self.threshold {
                    curr_x = raw_i64(v1);
                    curr_y = raw_i64(v2);
                    let coord = self.coordinate_system.raw_to_xy(curr_x, curr_y);

                    if prev_was_absolute {
                        if let Some(p) = pending.take() {
                            current_part.push(p);
                            parts.push(std::mem::take(&mut current_part));
                            current_part.push(coord);
                            pending = None;
                        } else {
                            pending = Some(coord);
                        }
                    } else {
                        pending = Some(coord);
                    }
                    prev_was_absolute = true;
                } else {
                    if let Some(p) = pending.take() {
                        current_part.push(p);
                    }
                    let dx = zigzag_decode(v1);
                    let dy = zigzag_decode(v2);
                    curr_x += dx;
                    curr_y += dy;
                    current_part.push(self.coordinate_system.raw_to_xy(curr_x, curr_y));
                    prev_was_absolute = false;
                }
                remaining -= 1;
            }

            if let Some(p) = pending.take() {
                current_part.push(p);
            }
            if !current_part.is_empty() {
                parts.push(current_part);
            }
        }

        Ok((parts, pos))
    }

    /// Best-effort Z decoding: spec §4.3.3 marks the trailing Z stream's
    /// layout as unconfirmed. If the flags bit this crate treats as "Z
    /// present" is set and exactly `point_count` further varints can be
    /// read, they're taken as zigzag-encoded raw Z values in point order;
    /// any parse failure or flag mismatch is treated as "no Z" rather than
    /// a hard error, per spec guidance.
    fn try_decode_z(&self, blob: &[u8], pos: usize, geom_flags: u64, point_count: u32) -> Option<Vec<f64>> {
        const Z_PRESENT_BIT: u64 = 0x20;
        if geom_flags & Z_PRESENT_BIT == 0 {
            return None;
        }
        let mut cursor = pos;
        let mut z_values = Vec::with_capacity(point_count as usize);
        for _ in 0..point_count {
            match read_varint(blob, cursor) {
                Ok((v, new_pos)) => {
                    cursor = new_pos;
                    z_values.push(self.coordinate_system.raw_to_z(zigzag_decode(v)));
                }
                Err(_) => {
                    tracing::debug!("Z flag set but trailing Z stream unreadable; leaving geometry 2D");
                    return None;
                }
            }
        }
        Some(z_values)
    }
}

/// Accepts a candidate `[num_parts, count_1, .., count_M]` part-info
/// prefix only if every check in spec §4.3.1 passes; otherwise falls back
/// to a single part spanning the whole header point count.
fn infer_part_structure(part_info: &[u64], point_count: u32) -> Vec<u64> {
    if let Some(&potential_num_parts) = part_info.first() {
        let has_valid_structure =
            potential_num_parts > 0 && potential_num_parts < 10_000 && (part_info.len() as u64) > potential_num_parts;
        if has_valid_structure {
            let m = potential_num_parts as usize;
            let potential_counts = &part_info[1..=m];
            let sum: u64 = potential_counts.iter().sum();
            if !potential_counts.is_empty() && sum == point_count as u64 {
                tracing::trace!(num_parts = m, "accepted declared part structure");
                return potential_counts.to_vec();
            }
        }
        tracing::trace!("rejected part-info candidate; falling back to single part");
    }
    vec![point_count as u64]
}

fn assemble_geometry(
    geom_flags: u64,
    parts: Vec<Vec<(f64, f64)>>,
    z_flat: Option<Vec<f64>>,
) -> Result<Geometry> {
    let base_type = geom_flags & 0x0F;
    let z_per_part = distribute_z(&parts, z_flat);

    if base_type == 8 {
        Ok(Geometry::Polygon(Polygon::new(parts, z_per_part)?))
    } else if parts.len() == 1 {
        let mut points = parts;
        let points = points.remove(0);
        let z = z_per_part.map(|mut v| v.remove(0));
        Ok(Geometry::LineString(LineString::new(points, z)?))
    } else {
        let mut z_per_part = z_per_part.map(|v| v.into_iter().map(Some).collect::<Vec<_>>());
        let mut lines = Vec::with_capacity(parts.len());
        for (idx, points) in parts.into_iter().enumerate() {
            let z = z_per_part.as_mut().and_then(|v| v[idx].take());
            lines.push(LineString::new(points, z)?);
        }
        Ok(Geometry::MultiLineString(lines))
    }
}

/// Slices a flat, point-order Z array into one Vec per part, aligned with
/// `parts`' own per-part point counts. Returns `None` if no Z stream was
/// decoded.
fn distribute_z(parts: &[Vec<(f64, f64)>], z_flat: Option<Vec<f64>>) -> Option<Vec<Vec<f64>>> {
    let z_flat = z_flat?;
    let mut out = Vec::with_capacity(parts.len());
    let mut cursor = 0;
    for part in parts {
        let end = cursor + part.len();
        if end > z_flat.len() {
            return None;
        }
        out.push(z_flat[cursor..end].to_vec());
        cursor = end;
    }
    Some(out)
}

fn raw_i64(v: u64) -> i64 {
    v as i64
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::varint::write_varint;

    fn header(point_count: u32) -> Vec<u8> {
        let mut v = MAGIC.to_vec();
        v.extend_from_slice(&point_count.to_le_bytes());
        v
    }

    #[test]
    fn blob_too_short_errors() {
        let decoder = StGeometryDecoder::default();
        assert!(matches!(
            decoder.decode(&[0x64, 0x11, 0x0F]),
            Err(Error::BlobTooShort { len: 3 })
        ));
    }

    #[test]
    fn invalid_magic_errors() {
        let decoder = StGeometryDecoder::default();
        let mut blob = vec![0xAA, 0xBB, 0xCC, 0xDD];
        blob.extend_from_slice(&[0u8; 4]);
        assert!(matches!(decoder.decode(&blob), Err(Error::InvalidMagic { .. })));
    }

    #[test]
    fn empty_geometry_errors() {
        let decoder = StGeometryDecoder::default();
        let blob = header(0);
        assert!(matches!(decoder.decode(&blob), Err(Error::EmptyGeometry)));
    }

    #[test]
    fn decodes_seed_point() {
        let decoder = StGeometryDecoder::default();
        let mut blob = header(1);
        blob.extend_from_slice(&[0u8; 10]); // opaque flags/size/padding
        write_varint(137_695_015_937, &mut blob);
        write_varint(724_105_586_082, &mut blob);
        assert_eq!(blob.len(), 30);

        let geom = decoder.decode(&blob).unwrap();
        match geom {
            Geometry::Point { x, y, z } => {
                assert!((x - (-13_152_949.2)).abs() < 0.1);
                assert!((y - 5_964_179.3).abs() < 0.1);
                assert!(z.is_none());
            }
            other => panic!("expected Point, got {other:?}"),
        }
    }

    fn complex_header(point_count: u32, flags: u64, bbox: [u64; 4]) -> Vec<u8> {
        let mut v = header(point_count);
        write_varint(0, &mut v); // size hint
        write_varint(flags, &mut v);
        for b in bbox {
            write_varint(b, &mut v);
        }
        v
    }

    #[test]
    fn decodes_single_part_linestring_with_deltas() {
        use crate::varint::zigzag_encode;
        let decoder = StGeometryDecoder::default();
        let mut blob = complex_header(3, 4, [0, 0, 0, 0]);
        write_varint(0, &mut blob); // trailing zero part-info slot
        write_varint(137_695_015_937, &mut blob); // first X (crosses T)
        write_varint(724_105_586_082, &mut blob); // first Y
        write_varint(zigzag_encode(100), &mut blob);
        write_varint(zigzag_encode(-50), &mut blob);
        write_varint(zigzag_encode(-25), &mut blob);
        write_varint(zigzag_encode(25), &mut blob);

        let geom = decoder.decode(&blob).unwrap();
        match geom {
            Geometry::LineString(ls) => assert_eq!(ls.points.len(), 3),
            other => panic!("expected LineString, got {other:?}"),
        }
    }

    #[test]
    fn multilinestring_via_consecutive_absolutes() {
        use crate::varint::zigzag_encode;
        let decoder = StGeometryDecoder::default();
        // N=4: first absolute pair, one delta, then an absolute pair
        // followed by another absolute pair. The first absolute of that
        // pending pair flushes into the outgoing part on the boundary, so
        // part 1 ends up with 3 points (initial + delta + flushed pending)
        // and part 2 starts with the 1 remaining point.
        let mut blob = complex_header(4, 4, [0, 0, 0, 0]);
        write_varint(0, &mut blob);
        write_varint(200_000_000_000, &mut blob); // first X
        write_varint(300_000_000_000, &mut blob); // first Y
        write_varint(zigzag_encode(10), &mut blob);
        write_varint(zigzag_encode(10), &mut blob); // delta -> point 2 of part 1
        write_varint(400_000_000_000, &mut blob); // absolute (pending)
        write_varint(500_000_000_000, &mut blob);
        write_varint(600_000_000_000, &mut blob); // second absolute in a row -> boundary
        write_varint(700_000_000_000, &mut blob);

        let geom = decoder.decode(&blob).unwrap();
        match geom {
            Geometry::MultiLineString(lines) => {
                assert_eq!(lines.len(), 2);
                assert_eq!(lines[0].points.len(), 3);
                assert_eq!(lines[1].points.len(), 1);
            }
            other => panic!("expected MultiLineString, got {other:?}"),
        }
    }

    #[test]
    fn decodes_two_ring_polygon_with_declared_parts() {
        use crate::varint::zigzag_encode;
        let decoder = StGeometryDecoder::default();
        let mut blob = complex_header(10, 8, [0, 0, 0, 0]);
        // part-info: [num_parts=2, count_1=5, count_2=5, trailing 0]
        write_varint(2, &mut blob);
        write_varint(5, &mut blob);
        write_varint(5, &mut blob);
        write_varint(0, &mut blob);
        write_varint(200_000_000_000, &mut blob); // first X of ring 1
        write_varint(300_000_000_000, &mut blob); // first Y of ring 1
        for _ in 0..4 {
            write_varint(zigzag_encode(1), &mut blob);
            write_varint(zigzag_encode(1), &mut blob);
        }
        // ring 2's first point must also be introduced with an absolute read
        write_varint(400_000_000_000, &mut blob);
        write_varint(500_000_000_000, &mut blob);
        for _ in 0..4 {
            write_varint(zigzag_encode(1), &mut blob);
            write_varint(zigzag_encode(1), &mut blob);
        }

        let geom = decoder.decode(&blob).unwrap();
        match geom {
            Geometry::Polygon(p) => {
                assert_eq!(p.rings.len(), 2);
                assert_eq!(p.rings[0].len(), 5);
                assert_eq!(p.rings[1].len(), 5);
            }
            other => panic!("expected Polygon, got {other:?}"),
        }
    }

    #[test]
    fn rejects_spurious_part_structure_and_falls_back() {
        use crate::varint::zigzag_encode;
        let decoder = StGeometryDecoder::default();
        // N=4, part-info prefix looks like [3, 1, 1, 1] but 1+1+1 != 4,
        // so the candidate must be rejected and treated as one part of 4.
        let mut blob = complex_header(4, 4, [0, 0, 0, 0]);
        write_varint(3, &mut blob);
        write_varint(1, &mut blob);
        write_varint(1, &mut blob);
        write_varint(1, &mut blob);
        write_varint(200_000_000_000, &mut blob);
        write_varint(300_000_000_000, &mut blob);
        for _ in 0..3 {
            write_varint(zigzag_encode(1), &mut blob);
            write_varint(zigzag_encode(1), &mut blob);
        }

        let geom = decoder.decode(&blob).unwrap();
        match geom {
            Geometry::LineString(ls) => assert_eq!(ls.points.len(), 4),
            other => panic!("expected single LineString, got {other:?}"),
        }
    }

    #[test]
    fn part_info_runaway_errors() {
        let decoder = StGeometryDecoder::default();
        let mut blob = complex_header(1, 4, [0, 0, 0, 0]);
        for _ in 0..=PART_INFO_RUNAWAY_LIMIT {
            write_varint(0, &mut blob);
        }
        assert!(matches!(
            decoder.decode(&blob),
            Err(Error::PartInfoRunaway { .. })
        ));
    }
}
