//! Definitions of error related thins.

use crate::las::laszip::{CompressorType, LazItemType};
use std::fmt;

/// Errors of this crate
#[derive(Debug)]
#[non_exhaustive]
pub enum LasZipError {
    /// The Laz item it not known
    UnknownLazItem(u16),
    /// The compression version used for the item is not supported
    UnsupportedLazItemVersion(LazItemType, u16),
    /// The type of compressor used is not known
    UnknownCompressorType(u16),
    /// The type of compressor exists but it is not supported
    UnsupportedCompressorType(CompressorType),
    /// The point format id is not supported
    UnsupportedPointFormat(u8),
    /// Wrapper around and io error from the std lib
    IoError(std::io::Error),
    BufferLenNotMultipleOfPointSize {
        buffer_len: usize,
        point_size: usize,
    },
    /// The chunk table could not be found in the file
    /// and it is required for the operation.
    MissingChunkTable,
}

impl From<std::io::Error> for LasZipError {
    fn from(e: std::io::Error) -> Self {
        LasZipError::IoError(e)
    }
}

impl fmt::Display for LasZipError {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        match self {
            LasZipError::UnknownLazItem(t) => write!(f, "Item with type code: {} is unknown", t),
            LasZipError::UnsupportedLazItemVersion(item_type, version) => write!(
                f,
                "Item {:?} with compression version: {} is not supported",
                item_type, version
            ),
            LasZipError::UnknownCompressorType(compressor_type) => {
                write!(f, "Compressor type {} is not valid", compressor_type)
            }
            LasZipError::UnsupportedCompressorType(compressor_type) => {
                write!(f, "Compressor type {:?} is not supported", compressor_type)
            }
            LasZipError::IoError(e) => write!(f, "IoError: {}", e),

            LasZipError::BufferLenNotMultipleOfPointSize {
                buffer_len: bl,
                point_size: ps,
            } => write!(
                f,
                "The len of the buffer ({}) is not a multiple of the point size {}",
                bl, ps
            ),
            LasZipError::UnsupportedPointFormat(id) => {
                write!(f, "Point format {} is not supported", id)
            }
            LasZipError::MissingChunkTable => write!(f, "The chunk table could not be found"),
        }
    }
}

impl std::error::Error for LasZipError {}

/// Errors surfaced by the LAS-level reader/writer (header, VLR, chunk table,
/// spatial index), as opposed to [`LasZipError`] which is specific to the
/// LAZ codec layer.
#[derive(Debug)]
#[non_exhaustive]
pub enum LasError {
    /// The file signature isn't `"LASF"`.
    BadSignature([u8; 4]),
    /// `header_size` doesn't match the value mandated by the file's version.
    BadHeaderSize { expected: u16, got: u16 },
    /// Point formats 4, 5, 8, 9 and 10 are recognised but not implemented.
    UnsupportedPointFormat(u8),
    /// The file is flagged as LAZ-compressed but carries no LAZ special VLR.
    MissingLazVlr,
    /// `chunk_table_offset == -1` on read, which this engine does not support.
    UnresolvedChunkTableOffset,
    /// The chunk table's running sums are not monotone / strictly positive.
    CorruptChunkTable,
    /// The quadtree spatial index signature (`"LASX"`/`"LASS"`/`"LASQ"`/`"LASV"`) didn't match.
    BadSpatialIndexSignature,
    /// A writer method was called in a writing stage where it isn't allowed.
    WrongWritingStage {
        called: &'static str,
        stage: &'static str,
    },
    /// Wrapper around the LAZ codec layer's own error type.
    LasZip(LasZipError),
    /// Wrapper around an io error.
    Io(std::io::Error),
}

impl From<std::io::Error> for LasError {
    fn from(e: std::io::Error) -> Self {
        LasError::Io(e)
    }
}

impl From<LasZipError> for LasError {
    fn from(e: LasZipError) -> Self {
        LasError::LasZip(e)
    }
}

impl fmt::Display for LasError {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        match self {
            LasError::BadSignature(sig) => write!(
                f,
                "Bad file signature: {:?}, expected \"LASF\"",
                String::from_utf8_lossy(sig)
            ),
            LasError::BadHeaderSize { expected, got } => write!(
                f,
                "Header size {} does not match the {} mandated by the file version",
                got, expected
            ),
            LasError::UnsupportedPointFormat(id) => {
                write!(f, "Point format {} is not supported", id)
            }
            LasError::MissingLazVlr => {
                write!(f, "File is flagged as LAZ compressed but has no LAZ VLR")
            }
            LasError::UnresolvedChunkTableOffset => write!(
                f,
                "Chunk table offset is -1 (unresolved); reading such files is not supported"
            ),
            LasError::CorruptChunkTable => write!(f, "Chunk table is corrupt"),
            LasError::BadSpatialIndexSignature => {
                write!(f, "Spatial index signature is invalid")
            }
            LasError::WrongWritingStage { called, stage } => write!(
                f,
                "Cannot call {} while writer is in stage {}",
                called, stage
            ),
            LasError::LasZip(e) => write!(f, "{}", e),
            LasError::Io(e) => write!(f, "IoError: {}", e),
        }
    }
}

impl std::error::Error for LasError {}
