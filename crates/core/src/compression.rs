//! Compression vocabulary for NAR file variants.
//!
//! NAR files are keyed by `(hash, compression, query)`, and the compression
//! column is free text coming from upstream narinfo files. Background
//! re-compression sweeps only look at rows whose compression is a real codec,
//! so both the empty string and `"none"` count as uncompressed.

/// Compression column values that mean "not compressed".
pub const UNCOMPRESSED_VALUES: [&str; 2] = ["", "none"];

/// Whether a raw compression column value names a real codec.
pub fn is_compressed(value: &str) -> bool {
    !UNCOMPRESSED_VALUES.contains(&value)
}
