//! Fixed-width LAS header (versions 1.0 through 1.4).
//!
//! Layout and field order are grounded on the original C++ `LASHeader`
//! (`LASHeaderPacked` / `LASHeader14Packed`): 227 bytes for versions 1.0-1.3,
//! 375 bytes for version 1.4. Every multi-byte field is little-endian.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Seek, SeekFrom, Write};

use crate::errors::LasError;

/// Size in bytes of the 1.0-1.3 header.
pub const HEADER_SIZE_LEGACY: u16 = 227;
/// Size in bytes of the 1.4 header.
pub const HEADER_SIZE_1_4: u16 = 375;

/// Bitmask values of the header's `global_encoding` field.
///
/// Values follow the reference implementation bit-for-bit: each flag
/// occupies the bit immediately above its ordinal, not a tightly packed
/// `1 << n` sequence.
pub mod global_encoding {
    pub const GPS_TIME: u16 = 2;
    pub const WAVEFORM_DATA_INTERNAL: u16 = 4;
    pub const WAVEFORM_DATA_EXTERNAL: u16 = 8;
    pub const SYNTHETIC_RETURN_NUMBERS: u16 = 16;
    pub const WKT: u16 = 32;
}

/// Scale factors and offsets used to turn integer XYZ into real-world coordinates.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Transform {
    pub scale: [f64; 3],
    pub offset: [f64; 3],
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            scale: [0.001, 0.001, 0.001],
            offset: [0.0, 0.0, 0.0],
        }
    }
}

impl Transform {
    fn read_from<R: Read>(src: &mut R) -> std::io::Result<Self> {
        let mut scale = [0f64; 3];
        let mut offset = [0f64; 3];
        for v in scale.iter_mut() {
            *v = src.read_f64::<LittleEndian>()?;
        }
        for v in offset.iter_mut() {
            *v = src.read_f64::<LittleEndian>()?;
        }
        Ok(Self { scale, offset })
    }

    fn write_to<W: Write>(&self, dst: &mut W) -> std::io::Result<()> {
        for v in &self.scale {
            dst.write_f64::<LittleEndian>(*v)?;
        }
        for v in &self.offset {
            dst.write_f64::<LittleEndian>(*v)?;
        }
        Ok(())
    }

    /// Converts an integer XYZ point position into real-world space.
    pub fn apply(&self, pos: [i32; 3]) -> [f64; 3] {
        [
            pos[0] as f64 * self.scale[0] + self.offset[0],
            pos[1] as f64 * self.scale[1] + self.offset[1],
            pos[2] as f64 * self.scale[2] + self.offset[2],
        ]
    }
}

/// Real-world 3D bounding box, maintained in scaled space.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Bounds3D {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl Default for Bounds3D {
    fn default() -> Self {
        Self {
            min: [f64::MAX; 3],
            max: [f64::MIN; 3],
        }
    }
}

impl Bounds3D {
    pub fn update(&mut self, pos: [f64; 3]) {
        for i in 0..3 {
            self.min[i] = self.min[i].min(pos[i]);
            self.max[i] = self.max[i].max(pos[i]);
        }
    }

    pub fn merge(&mut self, other: &Bounds3D) {
        self.update(other.min);
        self.update(other.max);
    }

    fn is_empty(&self) -> bool {
        self.min[0] > self.max[0]
    }
}

/// A LAS header, versions 1.0 through 1.4.
///
/// The legacy (227 byte) and extended (375 byte) layouts share a common
/// prefix; the struct always carries the extended fields, zeroed when the
/// file is a pre-1.4 version.
#[derive(Debug, Clone, PartialEq)]
pub struct LasHeader {
    pub file_source_id: u16,
    pub global_encoding: u16,
    pub project_id: [u8; 16],
    pub version_major: u8,
    pub version_minor: u8,
    pub system_id: [u8; 32],
    pub generating_software: [u8; 32],
    pub file_creation_day: u16,
    pub file_creation_year: u16,
    header_size: u16,
    pub offset_to_point_data: u32,
    pub number_of_vlrs: u32,
    pub point_data_record_format: u8,
    pub point_data_record_length: u16,
    pub legacy_number_of_point_records: u32,
    pub legacy_number_of_points_by_return: [u32; 5],
    pub transform: Transform,
    pub bounds: Bounds3D,
    pub start_of_waveform_data_packet_record: u64,
    pub start_of_first_evlr: u64,
    pub number_of_evlrs: u32,
    pub number_of_point_records: u64,
    pub number_of_points_by_return: [u64; 15],
}

impl Default for LasHeader {
    fn default() -> Self {
        Self {
            file_source_id: 0,
            global_encoding: 0,
            project_id: [0u8; 16],
            version_major: 1,
            version_minor: 4,
            system_id: [0u8; 32],
            generating_software: generating_software_default(),
            file_creation_day: 0,
            file_creation_year: 0,
            header_size: HEADER_SIZE_1_4,
            offset_to_point_data: 0,
            number_of_vlrs: 0,
            point_data_record_format: 0,
            point_data_record_length: 0,
            legacy_number_of_point_records: 0,
            legacy_number_of_points_by_return: [0; 5],
            transform: Transform::default(),
            bounds: Bounds3D::default(),
            start_of_waveform_data_packet_record: 0,
            start_of_first_evlr: 0,
            number_of_evlrs: 0,
            number_of_point_records: 0,
            number_of_points_by_return: [0; 15],
        }
    }
}

fn generating_software_default() -> [u8; 32] {
    let mut arr = [0u8; 32];
    let name = b"laz-rs";
    arr[..name.len()].copy_from_slice(name);
    arr
}

impl LasHeader {
    /// Creates a new default header for the given point format (1.4, laz bit as requested).
    pub fn new(point_data_record_format: u8, point_data_record_length: u16) -> Self {
        let mut header = Self::default();
        header.point_data_record_format = point_data_record_format;
        header.point_data_record_length = point_data_record_length;
        header.offset_to_point_data = header.header_size as u32;
        header
    }

    pub fn header_size(&self) -> u16 {
        self.header_size
    }

    /// Matches exactly what `read_from` parses as the 1.4 header tail
    /// (EVLR offset/count, 64-bit point counts): minor version `4` only, not
    /// "4 or newer".
    fn is_v1_4(&self) -> bool {
        self.version_major == 1 && self.version_minor == 4
    }

    pub fn is_laz_compressed(&self) -> bool {
        self.point_data_record_format & 128 != 0
    }

    pub fn point_format(&self) -> u8 {
        self.point_data_record_format & 0x7f
    }

    /// Authoritative point count: legacy field unless it is zero (required
    /// when the 1.4 extended count does not fit in 32 bits).
    pub fn num_points(&self) -> u64 {
        if self.legacy_number_of_point_records == 0 {
            self.number_of_point_records
        } else {
            u64::from(self.legacy_number_of_point_records)
        }
    }

    pub fn vlr_offset(&self) -> u32 {
        u32::from(self.header_size)
    }

    pub fn vlr_count(&self) -> u32 {
        self.number_of_vlrs
    }

    /// EVLR fields only exist in the 1.4 tail; pre-1.4 files report none.
    pub fn evlr_offset(&self) -> u64 {
        if self.is_v1_4() {
            self.start_of_first_evlr
        } else {
            0
        }
    }

    pub fn evlr_count(&self) -> u32 {
        if self.is_v1_4() {
            self.number_of_evlrs
        } else {
            0
        }
    }

    pub fn update_bounds(&mut self, pos: [i32; 3]) {
        self.bounds.update(self.transform.apply(pos));
    }

    /// Refreshes the legacy point-count mirrors, zeroing them out when the
    /// count overflows 32 bits or the format is an extended one (>= 6).
    pub fn refresh_legacy_counts(&mut self) {
        if self.point_format() < 6 && self.number_of_point_records <= u64::from(u32::MAX) {
            self.legacy_number_of_point_records = self.number_of_point_records as u32;
            for i in 0..5 {
                self.legacy_number_of_points_by_return[i] = self.number_of_points_by_return[i] as u32;
            }
        } else {
            self.legacy_number_of_point_records = 0;
            self.legacy_number_of_points_by_return = [0; 5];
        }
    }

    pub fn read_from<R: Read + Seek>(src: &mut R) -> Result<Self, LasError> {
        src.seek(SeekFrom::Start(0))?;
        let mut file_signature = [0u8; 4];
        src.read_exact(&mut file_signature)?;
        if &file_signature != b"LASF" {
            return Err(LasError::BadSignature(file_signature));
        }

        let file_source_id = src.read_u16::<LittleEndian>()?;
        let global_encoding = src.read_u16::<LittleEndian>()?;
        let mut project_id = [0u8; 16];
        src.read_exact(&mut project_id)?;
        let version_major = src.read_u8()?;
        let version_minor = src.read_u8()?;
        let mut system_id = [0u8; 32];
        src.read_exact(&mut system_id)?;
        let mut generating_software = [0u8; 32];
        src.read_exact(&mut generating_software)?;
        let file_creation_day = src.read_u16::<LittleEndian>()?;
        let file_creation_year = src.read_u16::<LittleEndian>()?;
        let header_size = src.read_u16::<LittleEndian>()?;
        let offset_to_point_data = src.read_u32::<LittleEndian>()?;
        let number_of_vlrs = src.read_u32::<LittleEndian>()?;
        let point_data_record_format = src.read_u8()?;
        let point_data_record_length = src.read_u16::<LittleEndian>()?;
        let legacy_number_of_point_records = src.read_u32::<LittleEndian>()?;
        let mut legacy_number_of_points_by_return = [0u32; 5];
        for v in legacy_number_of_points_by_return.iter_mut() {
            *v = src.read_u32::<LittleEndian>()?;
        }
        let transform = Transform::read_from(src)?;
        let max_x = src.read_f64::<LittleEndian>()?;
        let min_x = src.read_f64::<LittleEndian>()?;
        let max_y = src.read_f64::<LittleEndian>()?;
        let min_y = src.read_f64::<LittleEndian>()?;
        let max_z = src.read_f64::<LittleEndian>()?;
        let min_z = src.read_f64::<LittleEndian>()?;
        let bounds = Bounds3D {
            min: [min_x, min_y, min_z],
            max: [max_x, max_y, max_z],
        };

        let is_1_4 = version_major == 1 && version_minor == 4;
        if is_1_4 {
            if header_size != HEADER_SIZE_1_4 {
                return Err(LasError::BadHeaderSize {
                    expected: HEADER_SIZE_1_4,
                    got: header_size,
                });
            }
        } else if header_size != HEADER_SIZE_LEGACY {
            return Err(LasError::BadHeaderSize {
                expected: HEADER_SIZE_LEGACY,
                got: header_size,
            });
        }

        let (
            start_of_waveform_data_packet_record,
            start_of_first_evlr,
            number_of_evlrs,
            number_of_point_records,
            number_of_points_by_return,
        ) = if is_1_4 {
            let wave = src.read_u64::<LittleEndian>()?;
            let evlr_start = src.read_u64::<LittleEndian>()?;
            let evlr_count = src.read_u32::<LittleEndian>()?;
            let point_count = src.read_u64::<LittleEndian>()?;
            let mut by_return = [0u64; 15];
            for v in by_return.iter_mut() {
                *v = src.read_u64::<LittleEndian>()?;
            }
            (wave, evlr_start, evlr_count, point_count, by_return)
        } else {
            (0, 0, 0, 0, [0u64; 15])
        };

        Ok(Self {
            file_source_id,
            global_encoding,
            project_id,
            version_major,
            version_minor,
            system_id,
            generating_software,
            file_creation_day,
            file_creation_year,
            header_size,
            offset_to_point_data,
            number_of_vlrs,
            point_data_record_format,
            point_data_record_length,
            legacy_number_of_point_records,
            legacy_number_of_points_by_return,
            transform,
            bounds,
            start_of_waveform_data_packet_record,
            start_of_first_evlr,
            number_of_evlrs,
            number_of_point_records,
            number_of_points_by_return,
        })
    }

    pub fn write_to<W: Write + Seek>(&self, dst: &mut W) -> std::io::Result<()> {
        dst.seek(SeekFrom::Start(0))?;
        dst.write_all(b"LASF")?;
        dst.write_u16::<LittleEndian>(self.file_source_id)?;
        dst.write_u16::<LittleEndian>(self.global_encoding)?;
        dst.write_all(&self.project_id)?;
        dst.write_u8(self.version_major)?;
        dst.write_u8(self.version_minor)?;
        dst.write_all(&self.system_id)?;
        dst.write_all(&self.generating_software)?;
        dst.write_u16::<LittleEndian>(self.file_creation_day)?;
        dst.write_u16::<LittleEndian>(self.file_creation_year)?;
        dst.write_u16::<LittleEndian>(self.header_size)?;
        dst.write_u32::<LittleEndian>(self.offset_to_point_data)?;
        dst.write_u32::<LittleEndian>(self.number_of_vlrs)?;
        dst.write_u8(self.point_data_record_format)?;
        dst.write_u16::<LittleEndian>(self.point_data_record_length)?;
        dst.write_u32::<LittleEndian>(self.legacy_number_of_point_records)?;
        for v in &self.legacy_number_of_points_by_return {
            dst.write_u32::<LittleEndian>(*v)?;
        }
        self.transform.write_to(dst)?;
        let bounds = if self.bounds.is_empty() {
            Bounds3D {
                min: [0.0; 3],
                max: [0.0; 3],
            }
        } else {
            self.bounds
        };
        dst.write_f64::<LittleEndian>(bounds.max[0])?;
        dst.write_f64::<LittleEndian>(bounds.min[0])?;
        dst.write_f64::<LittleEndian>(bounds.max[1])?;
        dst.write_f64::<LittleEndian>(bounds.min[1])?;
        dst.write_f64::<LittleEndian>(bounds.max[2])?;
        dst.write_f64::<LittleEndian>(bounds.min[2])?;

        if self.is_v1_4() {
            dst.write_u64::<LittleEndian>(self.start_of_waveform_data_packet_record)?;
            dst.write_u64::<LittleEndian>(self.start_of_first_evlr)?;
            dst.write_u32::<LittleEndian>(self.number_of_evlrs)?;
            dst.write_u64::<LittleEndian>(self.number_of_point_records)?;
            for v in &self.number_of_points_by_return {
                dst.write_u64::<LittleEndian>(*v)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn header_round_trip_is_byte_identical() {
        let mut header = LasHeader::new(1, 28);
        header.number_of_point_records = 100;
        header.update_bounds([0, 0, 0]);
        header.update_bounds([99, 5, -3]);
        header.refresh_legacy_counts();

        let mut buf = Cursor::new(vec![0u8; HEADER_SIZE_1_4 as usize]);
        header.write_to(&mut buf).unwrap();

        let bytes_a = buf.into_inner();
        let mut cursor = Cursor::new(bytes_a.clone());
        let read_back = LasHeader::read_from(&mut cursor).unwrap();

        let mut buf2 = Cursor::new(vec![0u8; HEADER_SIZE_1_4 as usize]);
        read_back.write_to(&mut buf2).unwrap();
        assert_eq!(bytes_a, buf2.into_inner());
        assert_eq!(read_back.num_points(), 100);
    }

    #[test]
    fn legacy_header_has_no_evlr_fields() {
        let mut header = LasHeader::new(0, 20);
        header.version_minor = 3;
        header.header_size = HEADER_SIZE_LEGACY;
        assert_eq!(header.evlr_offset(), 0);
        assert_eq!(header.evlr_count(), 0);
    }

    #[test]
    fn is_laz_compressed_checks_bit_7() {
        let mut header = LasHeader::new(1, 28);
        assert!(!header.is_laz_compressed());
        header.point_data_record_format = 1 | 128;
        assert!(header.is_laz_compressed());
        assert_eq!(header.point_format(), 1);
    }
}
