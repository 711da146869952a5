/// The result type returned by most operations in this crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Everything that can go wrong decoding an ST_Geometry blob or reading a
/// Mobile Geodatabase.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("blob too short: {len} bytes (need at least 8)")]
    BlobTooShort { len: usize },

    #[error("invalid magic header: expected 64110f00, got {observed}")]
    InvalidMagic { observed: String },

    #[error("empty geometry: point count is 0")]
    EmptyGeometry,

    #[error("varint truncated at offset {offset}")]
    Truncated { offset: usize },

    #[error("varint at offset {offset} exceeds 64 bits")]
    Overflow { offset: usize },

    #[error(
        "part-info prefix ran past {limit} varints at offset {offset} without crossing the coordinate threshold"
    )]
    PartInfoRunaway { offset: usize, limit: usize },

    #[error(
        "point count mismatch: header declared {expected} points, decoded {actual}"
    )]
    PointCountMismatch { expected: u32, actual: u32 },

    #[error("geometry invariant violated: {0}")]
    GeometryInvariant(&'static str),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error("table not found: {0}")]
    MissingTable(String),

    #[error("table {0} has no geometry column")]
    MissingGeometryColumn(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[cfg(feature = "reproject")]
    #[error("reprojection failed: {0}")]
    Reprojection(String),
}
