//! Well-Known Binary encoding for [`Geometry`] (component C5).
//!
//! Follows the same little-endian, byte-order-marked layout as the OGC WKB
//! family: a 1-byte endianness marker, a 4-byte geometry type code, then
//! type-specific payload. Z-carrying geometries set the high bit of the
//! type code (`0x8000_0000`), matching the convention this crate's source
//! format's own conversion tooling uses rather than the ISO `1000+` codes.

use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read, Write};

use crate::error::{Error, Result};
use crate::geometry::{Geometry, LineString, Polygon};

const WKB_POINT: u32 = 1;
const WKB_LINESTRING: u32 = 2;
const WKB_POLYGON: u32 = 3;
const WKB_MULTIPOINT: u32 = 4;
const WKB_MULTILINESTRING: u32 = 5;
const WKB_MULTIPOLYGON: u32 = 6;
const WKB_Z_FLAG: u32 = 0x8000_0000;

/// Encodes `geom` as little-endian WKB.
pub fn to_wkb(geom: &Geometry) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    write_geometry(geom, &mut out)?;
    Ok(out)
}

/// Decodes a WKB byte string, honoring whichever endianness its marker
/// byte declares.
pub fn from_wkb(bytes: &[u8]) -> Result<Geometry> {
    let mut cursor = Cursor::new(bytes);
    read_geometry(&mut cursor)
}

fn write_geometry(geom: &Geometry, w: &mut impl Write) -> Result<()> {
    w.write_u8(1)?; // always emit little-endian

    match geom {
        Geometry::Point { x, y, z } => {
            write_type(w, WKB_POINT, z.is_some())?;
            w.write_f64::<LittleEndian>(*x)?;
            w.write_f64::<LittleEndian>(*y)?;
            if let Some(z) = z {
                w.write_f64::<LittleEndian>(*z)?;
            }
        }
        Geometry::LineString(ls) => {
            write_type(w, WKB_LINESTRING, ls.has_z())?;
            write_line(ls, w)?;
        }
        Geometry::Polygon(p) => {
            write_type(w, WKB_POLYGON, p.has_z())?;
            write_polygon(p, w)?;
        }
        Geometry::MultiPoint(pts) => {
            let has_z = pts.iter().any(|(_, _, z)| z.is_some());
            write_type(w, WKB_MULTIPOINT, has_z)?;
            w.write_u32::<LittleEndian>(pts.len() as u32)?;
            for &(x, y, z) in pts {
                w.write_u8(1)?;
                write_type(w, WKB_POINT, z.is_some())?;
                w.write_f64::<LittleEndian>(x)?;
                w.write_f64::<LittleEndian>(y)?;
                if let Some(z) = z {
                    w.write_f64::<LittleEndian>(z)?;
                }
            }
        }
        Geometry::MultiLineString(lines) => {
            let has_z = lines.iter().any(LineString::has_z);
            write_type(w, WKB_MULTILINESTRING, has_z)?;
            w.write_u32::<LittleEndian>(lines.len() as u32)?;
            for ls in lines {
                w.write_u8(1)?;
                write_type(w, WKB_LINESTRING, ls.has_z())?;
                write_line(ls, w)?;
            }
        }
        Geometry::MultiPolygon(polys) => {
            let has_z = polys.iter().any(Polygon::has_z);
            write_type(w, WKB_MULTIPOLYGON, has_z)?;
            w.write_u32::<LittleEndian>(polys.len() as u32)?;
            for p in polys {
                w.write_u8(1)?;
                write_type(w, WKB_POLYGON, p.has_z())?;
                write_polygon(p, w)?;
            }
        }
    }
    Ok(())
}

fn write_type(w: &mut impl Write, base: u32, has_z: bool) -> Result<()> {
    let code = if has_z { base | WKB_Z_FLAG } else { base };
    w.write_u32::<LittleEndian>(code)?;
    Ok(())
}

fn write_line(ls: &LineString, w: &mut impl Write) -> Result<()> {
    w.write_u32::<LittleEndian>(ls.points.len() as u32)?;
    for (i, &(x, y)) in ls.points.iter().enumerate() {
        w.write_f64::<LittleEndian>(x)?;
        w.write_f64::<LittleEndian>(y)?;
        if let Some(z) = ls.z_values.as_ref().map(|z| z[i]) {
            w.write_f64::<LittleEndian>(z)?;
        }
    }
    Ok(())
}

fn write_polygon(p: &Polygon, w: &mut impl Write) -> Result<()> {
    w.write_u32::<LittleEndian>(p.rings.len() as u32)?;
    for (ring_idx, ring) in p.rings.iter().enumerate() {
        w.write_u32::<LittleEndian>(ring.len() as u32)?;
        for (i, &(x, y)) in ring.iter().enumerate() {
            w.write_f64::<LittleEndian>(x)?;
            w.write_f64::<LittleEndian>(y)?;
            if let Some(z) = p.z_values.as_ref().map(|zv| zv[ring_idx][i]) {
                w.write_f64::<LittleEndian>(z)?;
            }
        }
    }
    Ok(())
}

fn read_geometry<R: Read>(r: &mut R) -> Result<Geometry> {
    let little_endian = match r.read_u8()? {
        1 => true,
        0 => false,
        _ => return Err(Error::GeometryInvariant("unrecognized WKB byte order marker")),
    };
    let raw_type = read_u32(r, little_endian)?;
    let has_z = raw_type & WKB_Z_FLAG != 0;
    let base = raw_type & !WKB_Z_FLAG;

    match base {
        WKB_POINT => {
            let x = read_f64(r, little_endian)?;
            let y = read_f64(r, little_endian)?;
            let z = if has_z { Some(read_f64(r, little_endian)?) } else { None };
            Ok(Geometry::Point { x, y, z })
        }
        WKB_LINESTRING => Ok(Geometry::LineString(read_line(r, little_endian, has_z)?)),
        WKB_POLYGON => Ok(Geometry::Polygon(read_polygon(r, little_endian, has_z)?)),
        WKB_MULTIPOINT => {
            let n = read_u32(r, little_endian)?;
            let mut pts = Vec::with_capacity(n as usize);
            for _ in 0..n {
                let _endian = r.read_u8()?;
                let pt_type = read_u32(r, little_endian)?;
                let pt_has_z = pt_type & WKB_Z_FLAG != 0;
                let x = read_f64(r, little_endian)?;
                let y = read_f64(r, little_endian)?;
                let z = if pt_has_z { Some(read_f64(r, little_endian)?) } else { None };
                pts.push((x, y, z));
            }
            Ok(Geometry::MultiPoint(pts))
        }
        WKB_MULTILINESTRING => {
            let n = read_u32(r, little_endian)?;
            let mut lines = Vec::with_capacity(n as usize);
            for _ in 0..n {
                let _endian = r.read_u8()?;
                let ls_type = read_u32(r, little_endian)?;
                lines.push(read_line(r, little_endian, ls_type & WKB_Z_FLAG != 0)?);
            }
            Ok(Geometry::MultiLineString(lines))
        }
        WKB_MULTIPOLYGON => {
            let n = read_u32(r, little_endian)?;
            let mut polys = Vec::with_capacity(n as usize);
            for _ in 0..n {
                let _endian = r.read_u8()?;
                let p_type = read_u32(r, little_endian)?;
                polys.push(read_polygon(r, little_endian, p_type & WKB_Z_FLAG != 0)?);
            }
            Ok(Geometry::MultiPolygon(polys))
        }
        _ => Err(Error::GeometryInvariant("unsupported WKB geometry type code")),
    }
}

fn read_line<R: Read>(r: &mut R, little_endian: bool, has_z: bool) -> Result<LineString> {
    let n = read_u32(r, little_endian)? as usize;
    let mut points = Vec::with_capacity(n);
    let mut z_values = has_z.then(|| Vec::with_capacity(n));
    for _ in 0..n {
        points.push((read_f64(r, little_endian)?, read_f64(r, little_endian)?));
        if has_z {
            z_values.as_mut().unwrap().push(read_f64(r, little_endian)?);
        }
    }
    Ok(LineString::new(points, z_values)?)
}

fn read_polygon<R: Read>(r: &mut R, little_endian: bool, has_z: bool) -> Result<Polygon> {
    let num_rings = read_u32(r, little_endian)? as usize;
    let mut rings = Vec::with_capacity(num_rings);
    let mut z_values = has_z.then(|| Vec::with_capacity(num_rings));
    for _ in 0..num_rings {
        let n = read_u32(r, little_endian)? as usize;
        let mut ring = Vec::with_capacity(n);
        let mut ring_z = has_z.then(|| Vec::with_capacity(n));
        for _ in 0..n {
            ring.push((read_f64(r, little_endian)?, read_f64(r, little_endian)?));
            if has_z {
                ring_z.as_mut().unwrap().push(read_f64(r, little_endian)?);
            }
        }
        rings.push(ring);
        if let Some(rz) = ring_z {
            z_values.as_mut().unwrap().push(rz);
        }
    }
    Ok(Polygon::new(rings, z_values)?)
}

fn read_u32<R: Read>(r: &mut R, little_endian: bool) -> Result<u32> {
    Ok(if little_endian {
        r.read_u32::<LittleEndian>()?
    } else {
        r.read_u32::<BigEndian>()?
    })
}

fn read_f64<R: Read>(r: &mut R, little_endian: bool) -> Result<f64> {
    Ok(if little_endian {
        r.read_f64::<LittleEndian>()?
    } else {
        r.read_f64::<BigEndian>()?
    })
}
