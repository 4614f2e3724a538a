//! Database models mapping to the metadata schema.

use sqlx::any::Any;
use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::{Database, Decode, Encode, FromRow, Type};
use std::fmt;
use time::OffsetDateTime;

// =============================================================================
// Timestamps
// =============================================================================

/// A UTC instant with microsecond precision, stored as unix microseconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(OffsetDateTime);

impl Timestamp {
    pub fn now() -> Self {
        Self::from(OffsetDateTime::now_utc())
    }

    pub fn from_micros(micros: i64) -> Result<Self, time::error::ComponentRange> {
        OffsetDateTime::from_unix_timestamp_nanos(i128::from(micros) * 1_000).map(Self)
    }

    pub fn as_micros(&self) -> i64 {
        // Values always originate from `from_micros` or a truncated `OffsetDateTime`.
        (self.0.unix_timestamp_nanos() / 1_000) as i64
    }

    pub fn as_offset_date_time(&self) -> OffsetDateTime {
        self.0
    }
}

impl From<OffsetDateTime> for Timestamp {
    fn from(value: OffsetDateTime) -> Self {
        let truncated = value.to_offset(time::UtcOffset::UTC);
        let micros = truncated.microsecond();
        Self(truncated.replace_nanosecond(micros * 1_000).unwrap_or(truncated))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Type<Any> for Timestamp {
    fn type_info() -> <Any as Database>::TypeInfo {
        <i64 as Type<Any>>::type_info()
    }

    fn compatible(ty: &<Any as Database>::TypeInfo) -> bool {
        <i64 as Type<Any>>::compatible(ty)
    }
}

impl<'q> Encode<'q, Any> for Timestamp {
    fn encode_by_ref(
        &self,
        buf: &mut <Any as Database>::ArgumentBuffer<'q>,
    ) -> Result<IsNull, BoxDynError> {
        <i64 as Encode<'q, Any>>::encode_by_ref(&self.as_micros(), buf)
    }
}

impl<'r> Decode<'r, Any> for Timestamp {
    fn decode(value: <Any as Database>::ValueRef<'r>) -> Result<Self, BoxDynError> {
        let micros = <i64 as Decode<'r, Any>>::decode(value)?;
        Ok(Self::from_micros(micros)?)
    }
}

// =============================================================================
// NarInfo
// =============================================================================

/// Metadata record for one store path.
///
/// A row with `url == None` is a placeholder that reserves the hash until the
/// upstream narinfo has been fetched.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct NarInfo {
    pub id: i64,
    pub hash: String,
    pub store_path: Option<String>,
    pub url: Option<String>,
    pub compression: Option<String>,
    pub file_hash: Option<String>,
    pub file_size: Option<i64>,
    pub nar_hash: Option<String>,
    pub nar_size: Option<i64>,
    pub deriver: Option<String>,
    pub system: Option<String>,
    pub ca: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Option<Timestamp>,
    pub last_accessed_at: Timestamp,
}

impl NarInfo {
    pub fn is_migrated(&self) -> bool {
        self.url.is_some()
    }
}

/// Fields written by `create_nar_info` and `update_nar_info`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NarInfoParams {
    pub hash: String,
    pub store_path: Option<String>,
    pub url: Option<String>,
    pub compression: Option<String>,
    pub file_hash: Option<String>,
    pub file_size: Option<u64>,
    pub nar_hash: Option<String>,
    pub nar_size: Option<u64>,
    pub deriver: Option<String>,
    pub system: Option<String>,
    pub ca: Option<String>,
}

impl NarInfoParams {
    /// Parameters for a placeholder row reserving `hash`.
    pub fn placeholder(hash: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            ..Self::default()
        }
    }
}

// =============================================================================
// NarFile
// =============================================================================

/// One stored encoding of a NAR.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct NarFile {
    pub id: i64,
    pub hash: String,
    pub compression: String,
    pub query: String,
    #[sqlx(try_from = "i64")]
    pub file_size: u64,
    /// Zero until the file has been chunked.
    #[sqlx(try_from = "i64")]
    pub total_chunks: u64,
    pub chunking_started_at: Option<Timestamp>,
    pub verified_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Option<Timestamp>,
    pub last_accessed_at: Timestamp,
}

impl NarFile {
    pub fn key(&self) -> NarFileKey {
        NarFileKey {
            hash: self.hash.clone(),
            compression: self.compression.clone(),
            query: self.query.clone(),
        }
    }

    pub fn is_chunked(&self) -> bool {
        self.total_chunks > 0
    }
}

/// Composite natural key of a NAR file variant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct NarFileKey {
    pub hash: String,
    pub compression: String,
    pub query: String,
}

impl NarFileKey {
    pub fn new(
        hash: impl Into<String>,
        compression: impl Into<String>,
        query: impl Into<String>,
    ) -> Self {
        Self {
            hash: hash.into(),
            compression: compression.into(),
            query: query.into(),
        }
    }
}

impl fmt::Display for NarFileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.hash)?;
        if !self.compression.is_empty() {
            write!(f, " ({})", self.compression)?;
        }
        if !self.query.is_empty() {
            write!(f, "?{}", self.query)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateNarFileParams {
    pub hash: String,
    pub compression: String,
    pub query: String,
    pub file_size: u64,
    pub total_chunks: u64,
}

impl CreateNarFileParams {
    pub fn key(&self) -> NarFileKey {
        NarFileKey::new(&self.hash, &self.compression, &self.query)
    }
}

// =============================================================================
// Chunks
// =============================================================================

/// Content-addressed block of a chunked NAR file.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Chunk {
    pub id: i64,
    pub hash: String,
    #[sqlx(try_from = "i64")]
    pub size: u32,
    pub created_at: Timestamp,
    pub updated_at: Option<Timestamp>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateChunkParams {
    pub hash: String,
    pub size: u32,
}

// =============================================================================
// Config
// =============================================================================

/// Key/value setting persisted alongside the cache.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Config {
    pub id: i64,
    pub key: String,
    pub value: String,
    pub created_at: Timestamp,
    pub updated_at: Option<Timestamp>,
}
