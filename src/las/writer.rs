//! Whole-file LAS/LAZ writer: a small state machine (VLRs, then points, then
//! the chunk table, then EVLRs, then the final header) built on top of the
//! codec layer's [`LasZipCompressor`].
//!
//! The writer emits a placeholder header up front, accumulates bounds/return
//! histograms as points stream through, and only finalises the header once
//! every point has been seen.

use std::io::{Seek, SeekFrom, Write};

use crate::errors::LasError;
use crate::las::header::{global_encoding, LasHeader};
use crate::las::laszip::{LasZipCompressor, LazItemRecordBuilder, LazVlr};
use crate::las::point0::{LasPoint0, Point0};
use crate::las::point6::{LasPoint6, Point6};
use crate::las::reader::Reader;
use crate::las::spatial_index::QuadtreeSpatialIndex;
use crate::las::vlr_record::{Evlr, Vlr};
use crate::packers::Packable;

fn point_record_size(point_format: u8, extra_bytes: u16) -> Result<u16, LasError> {
    let base: u16 = match point_format {
        0 => 20,
        1 => 28,
        2 => 26,
        3 => 34,
        6 => 30,
        7 => 36,
        other => return Err(LasError::UnsupportedPointFormat(other)),
    };
    Ok(base + extra_bytes)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WritingStage {
    Vlrs,
    Points,
    ChunkTable,
    Evlrs,
    Header,
}

impl WritingStage {
    fn name(self) -> &'static str {
        match self {
            WritingStage::Vlrs => "vlrs",
            WritingStage::Points => "points",
            WritingStage::ChunkTable => "chunk_table",
            WritingStage::Evlrs => "evlrs",
            WritingStage::Header => "header",
        }
    }
}

enum Stream<W: Write + Seek> {
    Raw(W),
    Compressing(LasZipCompressor<W>),
    /// Transient placeholder only ever observed mid-transition.
    Empty,
}

impl<W: Write + Seek + 'static> Stream<W> {
    fn raw_mut(&mut self) -> &mut W {
        match self {
            Stream::Raw(w) => w,
            Stream::Compressing(c) => c.get_mut(),
            Stream::Empty => unreachable!("stream taken and not restored"),
        }
    }
}

/// A whole LAS/LAZ file being written.
pub struct Writer<W: Write + Seek + 'static> {
    header: LasHeader,
    stream: Stream<W>,
    stage: WritingStage,
    point_format: u8,
    extra_bytes: u16,
    point_size: usize,
    is_laz: bool,
    chunk_size: u32,
    evlrs: Vec<Evlr>,
}

impl<W: Write + Seek + 'static> Writer<W> {
    /// Starts a new file: writes a placeholder header and positions the
    /// stream for VLR writes. `point_format`'s bit 7 selects LAZ
    /// compression, matching the on-disk `point_data_record_format` byte.
    pub fn new(mut stream: W, point_format: u8, extra_bytes: u16) -> Result<Self, LasError> {
        let is_laz = point_format & 0x80 != 0;
        let base_format = point_format & 0x7f;
        let point_size = point_record_size(base_format, extra_bytes)?;

        let header = LasHeader::new(point_format, point_size);
        header.write_to(&mut stream)?;

        Ok(Self {
            header,
            stream: Stream::Raw(stream),
            stage: WritingStage::Vlrs,
            point_format: base_format,
            extra_bytes,
            point_size: point_size as usize,
            is_laz,
            chunk_size: 0,
            evlrs: Vec::new(),
        })
    }

    pub fn header_mut(&mut self) -> &mut LasHeader {
        &mut self.header
    }

    fn require_stage(&self, called: &'static str, expected: WritingStage) -> Result<(), LasError> {
        if self.stage != expected {
            return Err(LasError::WrongWritingStage {
                called,
                stage: self.stage.name(),
            });
        }
        Ok(())
    }

    /// Writes a VLR. Only valid before the first point is written.
    pub fn write_vlr(&mut self, vlr: Vlr) -> Result<(), LasError> {
        self.require_stage("write_vlr", WritingStage::Vlrs)?;
        vlr.write_to(self.stream.raw_mut())?;
        self.header.offset_to_point_data += vlr.size_in_file() as u32;
        self.header.number_of_vlrs += 1;
        Ok(())
    }

    /// Writes a WKT string VLR (math transform or coordinate system), and
    /// flags the header's global encoding bit accordingly.
    pub fn write_wkt(&mut self, wkt: &str, is_math_transform: bool) -> Result<(), LasError> {
        let record_id = if is_math_transform { 2111 } else { 2112 };
        let mut data = wkt.as_bytes().to_vec();
        data.push(0);
        self.write_vlr(Vlr::new("LASF_Projection", record_id, data))?;
        self.header.global_encoding |= global_encoding::WKT;
        Ok(())
    }

    fn enter_points_stage(&mut self) -> Result<(), LasError> {
        if self.is_laz {
            let items = LazItemRecordBuilder::default_for_point_format_id(
                self.point_format,
                self.extra_bytes,
            );
            let mut vlr = LazVlr::from_laz_items(items);
            if self.chunk_size > 0 {
                vlr = rebuild_with_chunk_size(vlr, self.chunk_size);
            }
            let mut record_data = Vec::new();
            vlr.write_to(&mut record_data)?;
            self.write_vlr(Vlr::new("laszip encoded", 22204, record_data))?;

            let stream = std::mem::replace(&mut self.stream, Stream::Empty);
            let raw = match stream {
                Stream::Raw(w) => w,
                _ => unreachable!("points stage entered twice"),
            };
            self.stream = Stream::Compressing(LasZipCompressor::from_laz_vlr(raw, vlr)?);
        }
        self.stage = WritingStage::Points;
        Ok(())
    }

    fn accumulate_stats(&mut self, point_bytes: &[u8]) {
        match self.point_format {
            0..=5 => {
                let p = Point0::unpack_from(point_bytes);
                self.header.update_bounds([p.x(), p.y(), p.z()]);
                let r = p.return_number();
                if (1..=5).contains(&r) {
                    self.header.number_of_points_by_return[r as usize - 1] += 1;
                }
            }
            _ => {
                let p = Point6::unpack_from(point_bytes);
                self.header.update_bounds([p.x(), p.y(), p.z()]);
                let r = p.return_number();
                if (1..=15).contains(&r) {
                    self.header.number_of_points_by_return[r as usize - 1] += 1;
                }
            }
        }
        self.header.number_of_point_records += 1;
    }

    /// Writes one chunk's worth of points (a whole number of point records).
    /// Does not split `points` further: callers wanting automatic chunk-size
    /// splitting should use [`Self::write_points`].
    pub fn write_chunk(&mut self, points: &[u8]) -> Result<(), LasError> {
        if self.stage == WritingStage::Vlrs {
            self.enter_points_stage()?;
        }
        self.require_stage("write_chunk", WritingStage::Points)?;
        if points.len() % self.point_size != 0 {
            return Err(LasError::CorruptChunkTable);
        }

        for point in points.chunks(self.point_size) {
            self.accumulate_stats(point);
        }

        match &mut self.stream {
            Stream::Compressing(compressor) => {
                compressor.compress_many(points, self.point_size)?;
            }
            Stream::Raw(w) => {
                w.write_all(points)?;
            }
            Stream::Empty => unreachable!(),
        }
        Ok(())
    }

    /// Writes `points`, optionally overriding the LAZ chunk size. Must be
    /// called before the first chunk is written if `chunk_size` is to take
    /// effect. Forwards to [`Self::write_chunk`]: the LAZ encoder tracks its
    /// own chunk-boundary counter and dispatches whole chunks to the worker
    /// pool internally (see [`crate::las::laszip::LasZipCompressor::compress_many`]),
    /// so the distinction from `write_chunk` is caller intent, not dispatch.
    pub fn write_points(&mut self, points: &[u8], chunk_size: Option<u32>) -> Result<(), LasError> {
        if let Some(size) = chunk_size {
            if self.stage != WritingStage::Vlrs {
                return Err(LasError::WrongWritingStage {
                    called: "write_points(chunk_size)",
                    stage: self.stage.name(),
                });
            }
            self.chunk_size = size;
        }
        self.write_chunk(points)
    }

    /// Writes multiple chunks back to back.
    pub fn write_chunks(&mut self, chunks: &[&[u8]]) -> Result<(), LasError> {
        for chunk in chunks {
            self.write_chunk(chunk)?;
        }
        Ok(())
    }

    /// Writes an EVLR. Only valid after the chunk table has been flushed.
    pub fn write_evlr(&mut self, evlr: Evlr) -> Result<(), LasError> {
        if self.stage == WritingStage::Points {
            self.flush_chunk_table()?;
        }
        self.require_stage("write_evlr", WritingStage::Evlrs)?;
        evlr.write_to(self.stream.raw_mut())?;
        self.header.number_of_evlrs += 1;
        self.evlrs.push(evlr);
        Ok(())
    }

    /// Builds and writes a LAStools-compatible quadtree spatial index EVLR.
    pub fn write_lastools_spatial_index(&mut self, index: &QuadtreeSpatialIndex) -> Result<(), LasError> {
        let mut data = Vec::new();
        index.write_to(&mut data)?;
        self.write_evlr(Evlr::new("LAStools", 30, data))
    }

    fn flush_chunk_table(&mut self) -> Result<(), LasError> {
        self.require_stage("<finalize>", WritingStage::Points)?;
        self.stage = WritingStage::ChunkTable;
        if let Stream::Compressing(compressor) = &mut self.stream {
            compressor.done()?;
        }
        self.header.start_of_first_evlr = self.stream.raw_mut().seek(SeekFrom::Current(0))?;
        self.stage = WritingStage::Evlrs;
        Ok(())
    }

    /// Finalises the file: flushes the chunk table if needed, rewrites the
    /// header with the accumulated bounds/counts, and returns the
    /// underlying stream.
    ///
    /// Writing a LAZ-compressed file with zero points isn't supported: the
    /// codec layer needs at least one [`Self::write_chunk`] call to know
    /// where to plant the chunk-table offset placeholder.
    pub fn close(mut self) -> Result<W, LasError> {
        if self.is_laz && self.stage == WritingStage::Vlrs {
            return Err(LasError::WrongWritingStage {
                called: "close",
                stage: self.stage.name(),
            });
        }
        if self.stage == WritingStage::Points {
            self.flush_chunk_table()?;
        }
        if self.stage == WritingStage::Evlrs {
            self.stage = WritingStage::Header;
        }
        self.header.refresh_legacy_counts();

        let stream = std::mem::replace(&mut self.stream, Stream::Empty);
        let mut raw = match stream {
            Stream::Raw(w) => w,
            Stream::Compressing(c) => c.into_stream(),
            Stream::Empty => unreachable!(),
        };
        self.header.write_to(&mut raw)?;
        raw.seek(SeekFrom::End(0))?;
        Ok(raw)
    }

    /// Copies every VLR, all points and every EVLR from `reader` into this
    /// writer, optionally appending a freshly built quadtree spatial index.
    pub fn copy_from_reader<R: std::io::Read + Seek + 'static>(
        &mut self,
        reader: &mut Reader<R>,
        add_spatial_index: bool,
    ) -> Result<(), LasError> {
        for vlr in reader.vlr_headers().to_vec() {
            if !vlr.header.is_laz_vlr() {
                self.write_vlr(vlr)?;
            }
        }

        let num_chunks = reader.num_chunks();
        let per_chunk = reader.points_per_chunk() as usize;
        let mut buf = vec![0u8; per_chunk * self.point_size];
        for chunk_index in 0..num_chunks {
            let points_in_chunk =
                (reader.num_points() as usize).min((chunk_index as usize + 1) * per_chunk)
                    - chunk_index as usize * per_chunk;
            let len = points_in_chunk * self.point_size;
            reader.read_chunk(&mut buf[..len], chunk_index)?;
            self.write_chunk(&buf[..len])?;
        }

        for evlr in reader.evlr_headers().to_vec() {
            if !evlr.header.is_lastools_spatial_index() {
                self.write_evlr(evlr)?;
            }
        }

        if add_spatial_index {
            if let Some(index) = reader.lastools_spatial_index()? {
                self.write_lastools_spatial_index(&index)?;
            }
        }
        Ok(())
    }
}

fn rebuild_with_chunk_size(vlr: LazVlr, chunk_size: u32) -> LazVlr {
    // LazVlr has no chunk_size setter; go through the builder instead.
    crate::las::laszip::LazVlrBuilder::new()
        .with_laz_items(vlr.items().clone())
        .with_chunk_size(chunk_size)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn writes_and_reads_back_uncompressed_format0() {
        let mut writer = Writer::new(Cursor::new(Vec::new()), 0, 0).unwrap();
        let mut points = Vec::new();
        for i in 0..10u32 {
            let p = Point0 {
                x: i as i32,
                y: (i * 2) as i32,
                z: (i * 3) as i32,
                return_number: 1,
                number_of_returns_of_given_pulse: 1,
                ..Default::default()
            };
            let mut buf = [0u8; 20];
            p.pack_into(&mut buf);
            points.extend_from_slice(&buf);
        }
        writer.write_points(&points, None).unwrap();
        let stream = writer.close().unwrap();

        let bytes = stream.into_inner();
        let mut reader = Reader::from_stream(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.num_points(), 10);
        let mut buf = vec![0u8; 10 * 20];
        reader.read_chunks(&mut buf, 0, reader.num_chunks()).unwrap();
        assert_eq!(buf, points);
        assert_eq!(reader.header().number_of_points_by_return[0], 10);
    }

    #[test]
    fn writes_and_reads_back_compressed_format1() {
        let mut writer = Writer::new(Cursor::new(Vec::new()), 1 | 0x80, 0).unwrap();
        writer.write_points(&[0u8; 28], Some(20)).unwrap();
        let stream = writer.close().unwrap();
        let bytes = stream.into_inner();

        let mut reader = Reader::from_stream(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.num_points(), 1);
        let mut buf = vec![0u8; 28];
        reader.read_chunk(&mut buf, 0).unwrap();
        assert_eq!(buf, vec![0u8; 28]);
    }

    #[test]
    fn rejects_write_vlr_after_points_started() {
        let mut writer = Writer::new(Cursor::new(Vec::new()), 0, 0).unwrap();
        writer.write_points(&[0u8; 20], None).unwrap();
        let err = writer.write_vlr(Vlr::new("X", 1, vec![]));
        assert!(err.is_err());
    }
}
