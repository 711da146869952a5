//! A from-scratch reader for Esri Mobile Geodatabase (`.geodatabase`)
//! files, built around a decoder for the proprietary, undocumented
//! ST_Geometry blob format feature tables use to store geometry.
//!
//! The decoder ([`StGeometryDecoder`]) is the hard part and the crate's
//! reason for existing: it recovers points, lines, and polygons (with
//! their multi-part and Z-enabled variants) from raw blob bytes without
//! Esri's native library. Everything else — opening the underlying
//! SQLite file, reading table and coordinate-system metadata, iterating
//! rows, and serializing the decoded geometries back out as WKT/WKB/
//! GeoJSON — is conventional glue around that core.
//!
//! ```no_run
//! use mobile_gdb::database::{GeoDatabase, ReadOptions};
//! use mobile_gdb::wkt::to_wkt;
//!
//! # fn main() -> mobile_gdb::error::Result<()> {
//! let db = GeoDatabase::open("rivers.geodatabase")?;
//! for feature in db.read_table("Rivers", &ReadOptions::default())? {
//!     if let Some(geom) = &feature.geometry {
//!         println!("{}", to_wkt(geom));
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod coordinate_system;
pub mod database;
pub mod decoder;
pub mod error;
pub mod geojson;
pub mod geometry;
pub mod varint;
pub mod wkb;
pub mod wkt;

#[cfg(feature = "reproject")]
pub mod reproject;

pub use coordinate_system::CoordinateSystem;
pub use database::{Feature, GeoDatabase, ReadOptions, TableInfo};
pub use decoder::StGeometryDecoder;
pub use error::{Error, Result};
pub use geometry::{BoundingBox, Geometry, LineString, Polygon};
