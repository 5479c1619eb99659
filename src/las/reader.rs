//! Whole-file LAS/LAZ reader: header + VLR/EVLR directory parsed eagerly,
//! points decoded on demand, chunk-indexed random access.
//!
//! Opens either a memory-mapped file or an owning stream (mmap-or-stream
//! dual path, gated by `LASPP_DISABLE_MMAP`), eagerly parses the VLR/EVLR
//! directory and assembles GeoKeys, and builds `read_chunk`/`read_chunks` on
//! the codec layer's own chunk-table-aware `LasZipDecompressor::seek`.

use std::fs::File;
use std::io::{Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::errors::LasError;
use crate::las::header::LasHeader;
use crate::las::laszip::{LasZipDecompressor, LazVlr};
use crate::las::spatial_index::QuadtreeSpatialIndex;
use crate::las::vlr_record::{Evlr, GeoKeys, Vlr};

/// Read-only byte source that prefers a memory map but falls back to plain
/// stream I/O, matching the reference reader's mmap-or-stream behaviour.
pub struct FileSource {
    inner: FileSourceInner,
    pos: u64,
}

enum FileSourceInner {
    Mmap(memmap2::Mmap),
    File(File),
}

impl FileSource {
    /// Opens `path`, memory-mapping it unless `LASPP_DISABLE_MMAP` is set to
    /// a non-empty value other than `"0"`, or the mapping fails.
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = File::open(path)?;
        if mmap_disabled() {
            log::debug!("LASPP_DISABLE_MMAP set, using stream I/O");
            return Ok(Self {
                inner: FileSourceInner::File(file),
                pos: 0,
            });
        }
        match unsafe { memmap2::Mmap::map(&file) } {
            Ok(mmap) => Ok(Self {
                inner: FileSourceInner::Mmap(mmap),
                pos: 0,
            }),
            Err(e) => {
                log::warn!("mmap failed ({}), falling back to stream I/O", e);
                Ok(Self {
                    inner: FileSourceInner::File(file),
                    pos: 0,
                })
            }
        }
    }
}

fn mmap_disabled() -> bool {
    match std::env::var("LASPP_DISABLE_MMAP") {
        Ok(val) => {
            let val = if val.len() > 1023 { &val[..1023] } else { &val[..] };
            !val.is_empty() && val != "0"
        }
        Err(_) => false,
    }
}

impl Read for FileSource {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            FileSourceInner::Mmap(mmap) => {
                let start = self.pos as usize;
                if start >= mmap.len() {
                    return Ok(0);
                }
                let end = (start + buf.len()).min(mmap.len());
                let n = end - start;
                buf[..n].copy_from_slice(&mmap[start..end]);
                self.pos += n as u64;
                Ok(n)
            }
            FileSourceInner::File(file) => file.read(buf),
        }
    }
}

impl Seek for FileSource {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        match &mut self.inner {
            FileSourceInner::Mmap(mmap) => {
                let new_pos = match pos {
                    SeekFrom::Start(p) => p as i64,
                    SeekFrom::End(p) => mmap.len() as i64 + p,
                    SeekFrom::Current(p) => self.pos as i64 + p,
                };
                if new_pos < 0 {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        "seek to a negative position",
                    ));
                }
                self.pos = new_pos as u64;
                Ok(self.pos)
            }
            FileSourceInner::File(file) => {
                self.pos = file.seek(pos)?;
                Ok(self.pos)
            }
        }
    }
}

enum PointSource<R: Read + Seek + 'static> {
    Compressed(LasZipDecompressor<R>),
    Raw { stream: R, data_start: u64 },
}

/// A whole LAS/LAZ file opened for reading.
pub struct Reader<R: Read + Seek + 'static> {
    header: LasHeader,
    vlrs: Vec<Vlr>,
    evlrs: Vec<Evlr>,
    laz_vlr: Option<LazVlr>,
    point_size: usize,
    source: PointSource<R>,
    lax_sidecar: Option<PathBuf>,
}

impl<R: Read + Seek + 'static> Reader<R> {
    /// Parses the header and VLR/EVLR directory from `stream` and prepares
    /// it for point reads.
    pub fn from_stream(mut stream: R) -> Result<Self, LasError> {
        let header = LasHeader::read_from(&mut stream)?;
        log::debug!(
            "opened LAS {}.{} file, {} points, format {}",
            header.version_major,
            header.version_minor,
            header.num_points(),
            header.point_format()
        );

        stream.seek(SeekFrom::Start(header.vlr_offset() as u64))?;
        let mut vlrs = Vec::with_capacity(header.vlr_count() as usize);
        let mut laz_vlr_data: Option<Vec<u8>> = None;
        for _ in 0..header.vlr_count() {
            let vlr = Vlr::read_from(&mut stream)?;
            if vlr.header.is_laz_vlr() {
                laz_vlr_data = Some(vlr.data.clone());
            }
            vlrs.push(vlr);
        }

        let mut evlrs = Vec::with_capacity(header.evlr_count() as usize);
        if header.evlr_count() > 0 {
            stream.seek(SeekFrom::Start(header.evlr_offset()))?;
            for _ in 0..header.evlr_count() {
                evlrs.push(Evlr::read_from(&mut stream)?);
            }
        }

        stream.seek(SeekFrom::Start(header.offset_to_point_data as u64))?;

        let point_size = header.point_data_record_length as usize;
        let laz_vlr = if header.is_laz_compressed() {
            let record_data = laz_vlr_data.ok_or(LasError::MissingLazVlr)?;
            Some(LazVlr::from_buffer(&record_data)?)
        } else {
            None
        };
        let source = if let Some(vlr) = laz_vlr.clone() {
            PointSource::Compressed(LasZipDecompressor::new(stream, vlr)?)
        } else {
            let data_start = header.offset_to_point_data as u64;
            PointSource::Raw { stream, data_start }
        };

        Ok(Self {
            header,
            vlrs,
            evlrs,
            laz_vlr,
            point_size,
            source,
            lax_sidecar: None,
        })
    }

    pub fn header(&self) -> &LasHeader {
        &self.header
    }

    pub fn vlr_headers(&self) -> &[Vlr] {
        &self.vlrs
    }

    pub fn evlr_headers(&self) -> &[Evlr] {
        &self.evlrs
    }

    pub fn num_points(&self) -> u64 {
        self.header.num_points()
    }

    pub fn points_per_chunk(&self) -> u64 {
        match &self.laz_vlr {
            Some(vlr) if vlr.chunk_size() > 0 => vlr.chunk_size() as u64,
            _ => self.num_points(),
        }
    }

    pub fn num_chunks(&self) -> u64 {
        let per_chunk = self.points_per_chunk();
        if per_chunk == 0 {
            0
        } else {
            (self.num_points() + per_chunk - 1) / per_chunk
        }
    }

    pub fn read_vlr_data(&self, vlr: &Vlr) -> Vec<u8> {
        vlr.data.clone()
    }

    pub fn read_evlr_data(&self, evlr: &Evlr) -> Vec<u8> {
        evlr.data.clone()
    }

    /// Decompresses/reads chunk `chunk_index` into `buf`, which must be
    /// exactly `points_in_chunk * point_size` bytes long.
    pub fn read_chunk(&mut self, buf: &mut [u8], chunk_index: u64) -> Result<(), LasError> {
        let per_chunk = self.points_per_chunk();
        let start_point = chunk_index * per_chunk;
        let points_in_chunk = per_chunk.min(self.num_points().saturating_sub(start_point));
        let expected_len = points_in_chunk as usize * self.point_size;
        if buf.len() != expected_len {
            return Err(LasError::CorruptChunkTable);
        }

        match &mut self.source {
            PointSource::Compressed(decompressor) => {
                decompressor.seek(start_point)?;
                for i in 0..points_in_chunk as usize {
                    let dst = &mut buf[i * self.point_size..(i + 1) * self.point_size];
                    decompressor.decompress_one(dst)?;
                }
            }
            PointSource::Raw { stream, data_start } => {
                stream.seek(SeekFrom::Start(
                    *data_start + start_point * self.point_size as u64,
                ))?;
                stream.read_exact(buf)?;
            }
        }
        Ok(())
    }

    /// Reads chunks `[start, end)` into `buf`, laid out contiguously.
    ///
    /// For a LAZ-compressed source, the compressed bytes covering the whole
    /// range are read once (a single sequential I/O span), then each chunk is
    /// handed to its own task on the [`crate::las::thread_pool`] worker pool
    /// for decompression -- cross-chunk ordering is by chunk index, not
    /// completion order, since every worker decodes straight into its own
    /// disjoint slice of `buf`. Uncompressed sources have no per-chunk
    /// encoding cost worth parallelising and are read directly.
    pub fn read_chunks(&mut self, buf: &mut [u8], start: u64, end: u64) -> Result<(), LasError> {
        let per_chunk = self.points_per_chunk();
        match &mut self.source {
            PointSource::Compressed(decompressor) => {
                crate::las::laszip::par_decompress_chunk_range(
                    decompressor,
                    start,
                    end,
                    per_chunk,
                    self.point_size,
                    buf,
                )?;
            }
            PointSource::Raw { stream, data_start } => {
                let start_point = start * per_chunk;
                stream.seek(SeekFrom::Start(
                    *data_start + start_point * self.point_size as u64,
                ))?;
                stream.read_exact(buf)?;
            }
        }
        Ok(())
    }

    fn find_evlr(&self, pred: impl Fn(&Evlr) -> bool) -> Option<&Evlr> {
        self.evlrs.iter().find(|e| pred(e))
    }

    fn find_vlr(&self, pred: impl Fn(&Vlr) -> bool) -> Option<&Vlr> {
        self.vlrs.iter().find(|v| pred(v))
    }

    pub fn has_lastools_spatial_index(&self) -> bool {
        self.find_evlr(|e| e.header.is_lastools_spatial_index()).is_some()
            || self.lax_sidecar.as_ref().map(|p| p.exists()).unwrap_or(false)
    }

    /// Resolves the quadtree spatial index from an EVLR, falling back to a
    /// `.lax` sidecar sharing the file's stem.
    pub fn lastools_spatial_index(&self) -> Result<Option<QuadtreeSpatialIndex>, LasError> {
        if let Some(evlr) = self.find_evlr(|e| e.header.is_lastools_spatial_index()) {
            let mut cursor = Cursor::new(&evlr.data);
            return Ok(Some(QuadtreeSpatialIndex::read_from(&mut cursor)?));
        }
        if let Some(path) = &self.lax_sidecar {
            if path.exists() {
                let mut file = File::open(path)?;
                return Ok(Some(QuadtreeSpatialIndex::read_from(&mut file)?));
            }
        }
        Ok(None)
    }

    pub fn math_wkt(&self) -> Option<String> {
        self.find_vlr(|v| v.header.is_ogc_math_transform_wkt())
            .map(|v| wkt_string(&v.data))
    }

    pub fn coordinate_wkt(&self) -> Option<String> {
        self.find_vlr(|v| v.header.is_ogc_coordinate_system_wkt())
            .map(|v| wkt_string(&v.data))
    }

    pub fn geo_keys(&self) -> Option<GeoKeys> {
        self.find_vlr(|v| v.header.is_geo_key_directory())
            .and_then(|v| GeoKeys::parse(&v.data).ok())
    }
}

impl Reader<FileSource> {
    /// Opens a LAS/LAZ file by path, preferring a memory map, and remembers
    /// the `.lax` sidecar path (same stem, `.lax` extension) as a fallback
    /// spatial-index source.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LasError> {
        let path = path.as_ref();
        let source = FileSource::open(path)?;
        let mut reader = Self::from_stream(source)?;
        reader.lax_sidecar = Some(path.with_extension("lax"));
        Ok(reader)
    }
}

fn wkt_string(data: &[u8]) -> String {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    String::from_utf8_lossy(&data[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::las::laszip::{LasZipCompressor, LazItemRecordBuilder, LazItemType};
    use std::io::Cursor;

    fn make_compressed_laz_file(points: &[[u8; 20]]) -> Vec<u8> {
        let mut header = LasHeader::new(0 | 0x80, 20);
        header.number_of_point_records = points.len() as u64;
        for p in points {
            let x = i32::from_le_bytes(p[0..4].try_into().unwrap());
            let y = i32::from_le_bytes(p[4..8].try_into().unwrap());
            let z = i32::from_le_bytes(p[8..12].try_into().unwrap());
            header.update_bounds([x, y, z]);
        }
        header.refresh_legacy_counts();

        let items = LazItemRecordBuilder::new().add_item(LazItemType::Point10).build();
        let laz_vlr = crate::las::laszip::LazVlr::from_laz_items(items.clone());
        let mut record_data = Vec::new();
        laz_vlr.write_to(&mut record_data).unwrap();

        let vlr = Vlr::new("laszip encoded", 22204, record_data);
        header.offset_to_point_data = header.header_size() as u32 + vlr.size_in_file() as u32;
        header.number_of_vlrs = 1;

        let mut file = Cursor::new(Vec::new());
        header.write_to(&mut file).unwrap();
        vlr.write_to(&mut file).unwrap();

        let mut compressor = LasZipCompressor::from_laz_items(file, items).unwrap();
        for p in points {
            compressor.compress_one(p).unwrap();
        }
        compressor.done().unwrap();
        compressor.into_stream().into_inner()
    }

    #[test]
    fn reads_header_and_points_back() {
        let points: Vec<[u8; 20]> = (0..40u32)
            .map(|i| {
                let mut p = [0u8; 20];
                p[0..4].copy_from_slice(&(i as i32).to_le_bytes());
                p
            })
            .collect();
        let bytes = make_compressed_laz_file(&points);

        let mut reader = Reader::from_stream(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.num_points(), 40);

        let mut buf = vec![0u8; 40 * 20];
        reader.read_chunks(&mut buf, 0, reader.num_chunks()).unwrap();
        for (i, p) in points.iter().enumerate() {
            assert_eq!(&buf[i * 20..(i + 1) * 20], &p[..]);
        }
    }

    #[test]
    fn read_chunks_is_deterministic_across_chunk_boundaries() {
        // Five chunks of 4 points each, small enough that `read_chunks`
        // dispatches multiple worker-pool tasks instead of taking the
        // single-chunk path `reads_header_and_points_back` exercises.
        let points: Vec<[u8; 20]> = (0..20u32)
            .map(|i| {
                let mut p = [0u8; 20];
                p[0..4].copy_from_slice(&(i as i32).to_le_bytes());
                p
            })
            .collect();

        let mut header = LasHeader::new(0 | 0x80, 20);
        header.number_of_point_records = points.len() as u64;
        header.refresh_legacy_counts();

        let items = LazItemRecordBuilder::new()
            .add_item(LazItemType::Point10)
            .build();
        let laz_vlr = crate::las::laszip::LazVlrBuilder::from_laz_items(items.clone())
            .with_chunk_size(4)
            .build();
        let mut record_data = Vec::new();
        laz_vlr.write_to(&mut record_data).unwrap();

        let vlr = Vlr::new("laszip encoded", 22204, record_data);
        header.offset_to_point_data = header.header_size() as u32 + vlr.size_in_file() as u32;
        header.number_of_vlrs = 1;

        let mut file = Cursor::new(Vec::new());
        header.write_to(&mut file).unwrap();
        vlr.write_to(&mut file).unwrap();

        let mut compressor = LasZipCompressor::from_laz_vlr(file, laz_vlr).unwrap();
        for p in &points {
            compressor.compress_one(p).unwrap();
        }
        compressor.done().unwrap();
        let bytes = compressor.into_stream().into_inner();

        let mut reader = Reader::from_stream(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.num_chunks(), 5);

        let mut buf = vec![0u8; points.len() * 20];
        reader.read_chunks(&mut buf, 0, reader.num_chunks()).unwrap();
        for (i, p) in points.iter().enumerate() {
            assert_eq!(&buf[i * 20..(i + 1) * 20], &p[..]);
        }
    }

    #[test]
    fn rejects_truncated_signature() {
        let bytes = vec![0u8; 10];
        let err = Reader::from_stream(Cursor::new(bytes));
        assert!(err.is_err());
    }

    #[test]
    fn opens_from_path_via_mmap_and_reads_points_back() {
        let points: Vec<[u8; 20]> = (0..8u32)
            .map(|i| {
                let mut p = [0u8; 20];
                p[0..4].copy_from_slice(&(i as i32).to_le_bytes());
                p
            })
            .collect();
        let bytes = make_compressed_laz_file(&points);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("points.laz");
        std::fs::write(&path, &bytes).unwrap();

        let mut reader = Reader::open(&path).unwrap();
        assert_eq!(reader.num_points(), 8);

        let mut buf = vec![0u8; 8 * 20];
        reader.read_chunks(&mut buf, 0, reader.num_chunks()).unwrap();
        for (i, p) in points.iter().enumerate() {
            assert_eq!(&buf[i * 20..(i + 1) * 20], &p[..]);
        }
    }

    #[test]
    fn falls_back_to_lax_sidecar_for_spatial_index() {
        use crate::las::spatial_index::QuadtreeSpatialIndex;

        let points: Vec<[u8; 20]> = (0..4u32)
            .map(|i| {
                let mut p = [0u8; 20];
                p[0..4].copy_from_slice(&(i as i32).to_le_bytes());
                p
            })
            .collect();
        let bytes = make_compressed_laz_file(&points);

        let dir = tempfile::tempdir().unwrap();
        let las_path = dir.path().join("tile.laz");
        std::fs::write(&las_path, &bytes).unwrap();

        let index = QuadtreeSpatialIndex::build((0.0, 0.0), (10.0, 10.0), &[(1.0, 1.0), (9.0, 9.0)], 5.0);
        let lax_path = dir.path().join("tile.lax");
        let mut lax_file = std::fs::File::create(&lax_path).unwrap();
        index.write_to(&mut lax_file).unwrap();
        drop(lax_file);

        let reader = Reader::open(&las_path).unwrap();
        assert!(reader.has_lastools_spatial_index());
        let read_back = reader.lastools_spatial_index().unwrap().unwrap();
        assert_eq!(read_back, index);
    }
}
