//! Variable-length (VLR) and extended variable-length (EVLR) sidecar records.
//!
//! Layouts and the well-known `(user_id, record_id)` classification pairs are
//! grounded on the original C++ `LASVariableLengthRecord` /
//! `LASExtendedVariableLengthRecord` (`vlr.hpp`): VLR headers are 54 bytes
//! (`u16` payload length), EVLR headers are 60 bytes (`u64` payload length).

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

const USER_ID_LEN: usize = 16;
const DESCRIPTION_LEN: usize = 32;

fn fixed_str<const N: usize>(s: &str) -> [u8; N] {
    let mut arr = [0u8; N];
    let bytes = s.as_bytes();
    let len = bytes.len().min(N);
    arr[..len].copy_from_slice(&bytes[..len]);
    arr
}

fn str_from_fixed(arr: &[u8]) -> String {
    let end = arr.iter().position(|&b| b == 0).unwrap_or(arr.len());
    String::from_utf8_lossy(&arr[..end]).into_owned()
}

/// Common header shape shared by VLR and EVLR, factored out so the
/// classification predicates are written once.
#[derive(Debug, Clone, PartialEq)]
pub struct VlrHeader {
    pub reserved: u16,
    pub user_id: [u8; USER_ID_LEN],
    pub record_id: u16,
    pub description: [u8; DESCRIPTION_LEN],
}

impl VlrHeader {
    pub fn new(user_id: &str, record_id: u16) -> Self {
        Self {
            reserved: 0,
            user_id: fixed_str(user_id),
            record_id,
            description: [0u8; DESCRIPTION_LEN],
        }
    }

    pub fn user_id_str(&self) -> String {
        str_from_fixed(&self.user_id)
    }

    pub fn description_str(&self) -> String {
        str_from_fixed(&self.description)
    }

    pub fn is_projection(&self) -> bool {
        self.user_id_str() == "LASF_Projection"
    }

    pub fn is_ogc_math_transform_wkt(&self) -> bool {
        self.is_projection() && self.record_id == 2111
    }

    pub fn is_ogc_coordinate_system_wkt(&self) -> bool {
        self.is_projection() && self.record_id == 2112
    }

    pub fn is_geo_key_directory(&self) -> bool {
        self.is_projection() && self.record_id == 34735
    }

    pub fn is_geo_double_params(&self) -> bool {
        self.is_projection() && self.record_id == 34736
    }

    pub fn is_geo_ascii_params(&self) -> bool {
        self.is_projection() && self.record_id == 34737
    }

    pub fn is_spec(&self) -> bool {
        self.user_id_str() == "LASF_Spec"
    }

    pub fn is_classification_lookup(&self) -> bool {
        self.is_spec() && self.record_id == 0
    }

    pub fn is_extra_bytes_info(&self) -> bool {
        self.is_spec() && self.record_id == 4
    }

    pub fn is_waveform_packet_descriptor(&self) -> bool {
        self.is_spec() && self.record_id > 99 && self.record_id < 355
    }

    /// LAZ special VLR: either historical `"laszip encoded"` or `"LAZ encoded"`
    /// user id, record id 22204, reserved either 0 or 0xAABB.
    pub fn is_laz_vlr(&self) -> bool {
        (self.reserved == 0 || self.reserved == 0xAABB)
            && (self.user_id_str() == "LAZ encoded" || self.user_id_str() == "laszip encoded")
            && self.record_id == 22204
    }

    /// LAStools quadtree spatial index EVLR.
    pub fn is_lastools_spatial_index(&self) -> bool {
        self.user_id_str() == "LAStools" && self.record_id == 30
    }
}

/// A VLR header plus its payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Vlr {
    pub header: VlrHeader,
    pub data: Vec<u8>,
}

/// Byte size of a VLR header (54 bytes: 2 + 16 + 2 + 2 + 32).
pub const VLR_HEADER_SIZE: usize = 54;

impl Vlr {
    pub fn new(user_id: &str, record_id: u16, data: Vec<u8>) -> Self {
        Self {
            header: VlrHeader::new(user_id, record_id),
            data,
        }
    }

    pub fn read_from<R: Read>(src: &mut R) -> std::io::Result<Self> {
        let reserved = src.read_u16::<LittleEndian>()?;
        let mut user_id = [0u8; USER_ID_LEN];
        src.read_exact(&mut user_id)?;
        let record_id = src.read_u16::<LittleEndian>()?;
        let record_length = src.read_u16::<LittleEndian>()?;
        let mut description = [0u8; DESCRIPTION_LEN];
        src.read_exact(&mut description)?;
        let mut data = vec![0u8; record_length as usize];
        src.read_exact(&mut data)?;
        Ok(Self {
            header: VlrHeader {
                reserved,
                user_id,
                record_id,
                description,
            },
            data,
        })
    }

    pub fn write_to<W: Write>(&self, dst: &mut W) -> std::io::Result<()> {
        dst.write_u16::<LittleEndian>(self.header.reserved)?;
        dst.write_all(&self.header.user_id)?;
        dst.write_u16::<LittleEndian>(self.header.record_id)?;
        dst.write_u16::<LittleEndian>(self.data.len() as u16)?;
        dst.write_all(&self.header.description)?;
        dst.write_all(&self.data)?;
        Ok(())
    }

    pub fn size_in_file(&self) -> usize {
        VLR_HEADER_SIZE + self.data.len()
    }
}

/// Byte size of an EVLR header (60 bytes: 2 + 16 + 2 + 8 + 32).
pub const EVLR_HEADER_SIZE: usize = 60;

/// A EVLR header plus its payload. Identical to [`Vlr`] except the payload
/// length is a `u64`, allowing EVLRs to carry arbitrarily large records
/// (e.g. WKT strings, the LAStools spatial index).
#[derive(Debug, Clone, PartialEq)]
pub struct Evlr {
    pub header: VlrHeader,
    pub data: Vec<u8>,
}

impl Evlr {
    pub fn new(user_id: &str, record_id: u16, data: Vec<u8>) -> Self {
        Self {
            header: VlrHeader::new(user_id, record_id),
            data,
        }
    }

    pub fn read_from<R: Read>(src: &mut R) -> std::io::Result<Self> {
        let reserved = src.read_u16::<LittleEndian>()?;
        let mut user_id = [0u8; USER_ID_LEN];
        src.read_exact(&mut user_id)?;
        let record_id = src.read_u16::<LittleEndian>()?;
        let record_length = src.read_u64::<LittleEndian>()?;
        let mut description = [0u8; DESCRIPTION_LEN];
        src.read_exact(&mut description)?;
        let mut data = vec![0u8; record_length as usize];
        src.read_exact(&mut data)?;
        Ok(Self {
            header: VlrHeader {
                reserved,
                user_id,
                record_id,
                description,
            },
            data,
        })
    }

    pub fn write_to<W: Write>(&self, dst: &mut W) -> std::io::Result<()> {
        dst.write_u16::<LittleEndian>(self.header.reserved)?;
        dst.write_all(&self.header.user_id)?;
        dst.write_u16::<LittleEndian>(self.header.record_id)?;
        dst.write_u64::<LittleEndian>(self.data.len() as u64)?;
        dst.write_all(&self.header.description)?;
        dst.write_all(&self.data)?;
        Ok(())
    }

    pub fn size_in_file(&self) -> usize {
        EVLR_HEADER_SIZE + self.data.len()
    }
}

/// GeoTIFF `GeoKeyDirectoryTag` (record id 34735): a fixed 4-`u16` header
/// followed by `wNumberOfKeys` 4-`u16` key entries.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoKeys {
    pub key_directory_version: u16,
    pub key_revision: u16,
    pub minor_revision: u16,
    pub keys: Vec<GeoKeyEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoKeyEntry {
    pub key_id: u16,
    pub tiff_tag_location: u16,
    pub count: u16,
    pub value_offset: u16,
}

impl GeoKeys {
    pub fn parse(data: &[u8]) -> std::io::Result<Self> {
        let mut cursor = std::io::Cursor::new(data);
        let key_directory_version = cursor.read_u16::<LittleEndian>()?;
        let key_revision = cursor.read_u16::<LittleEndian>()?;
        let minor_revision = cursor.read_u16::<LittleEndian>()?;
        let num_keys = cursor.read_u16::<LittleEndian>()?;
        let mut keys = Vec::with_capacity(num_keys as usize);
        for _ in 0..num_keys {
            keys.push(GeoKeyEntry {
                key_id: cursor.read_u16::<LittleEndian>()?,
                tiff_tag_location: cursor.read_u16::<LittleEndian>()?,
                count: cursor.read_u16::<LittleEndian>()?,
                value_offset: cursor.read_u16::<LittleEndian>()?,
            });
        }
        Ok(Self {
            key_directory_version,
            key_revision,
            minor_revision,
            keys,
        })
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + self.keys.len() * 8);
        out.extend_from_slice(&self.key_directory_version.to_le_bytes());
        out.extend_from_slice(&self.key_revision.to_le_bytes());
        out.extend_from_slice(&self.minor_revision.to_le_bytes());
        out.extend_from_slice(&(self.keys.len() as u16).to_le_bytes());
        for key in &self.keys {
            out.extend_from_slice(&key.key_id.to_le_bytes());
            out.extend_from_slice(&key.tiff_tag_location.to_le_bytes());
            out.extend_from_slice(&key.count.to_le_bytes());
            out.extend_from_slice(&key.value_offset.to_le_bytes());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn vlr_round_trip() {
        let vlr = Vlr::new("LASF_Projection", 34735, vec![1, 2, 3, 4]);
        let mut buf = Cursor::new(Vec::new());
        vlr.write_to(&mut buf).unwrap();
        let bytes = buf.into_inner();
        assert_eq!(bytes.len(), vlr.size_in_file());

        let mut cursor = Cursor::new(bytes);
        let read_back = Vlr::read_from(&mut cursor).unwrap();
        assert_eq!(read_back, vlr);
        assert!(read_back.header.is_geo_key_directory());
    }

    #[test]
    fn laz_vlr_classification_accepts_both_user_ids() {
        let a = VlrHeader::new("laszip encoded", 22204);
        let b = VlrHeader::new("LAZ encoded", 22204);
        assert!(a.is_laz_vlr());
        assert!(b.is_laz_vlr());
    }

    #[test]
    fn geo_keys_round_trip() {
        let keys = GeoKeys {
            key_directory_version: 1,
            key_revision: 1,
            minor_revision: 0,
            keys: vec![GeoKeyEntry {
                key_id: 1024,
                tiff_tag_location: 0,
                count: 1,
                value_offset: 2,
            }],
        };
        let bytes = keys.serialize();
        let parsed = GeoKeys::parse(&bytes).unwrap();
        assert_eq!(parsed, keys);
    }
}
