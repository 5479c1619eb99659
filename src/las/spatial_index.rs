//! LAStools-compatible quadtree spatial index (the `.lax`-style sidecar,
//! here carried inline as an EVLR).
//!
//! Wire framing, the level-offset recurrence and the bit-packing order match
//! LAStools' own `QuadtreeSpatialIndex`: `"LASX"` wraps a `"LASS"`/`"LASQ"`
//! quadtree header which wraps a `"LASV"` interval list. Cell indices encode
//! the quadtree path with the root at the MSB and the deepest level at the
//! LSB, offset by `calculate_level_offset(level)`.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::collections::BTreeMap;
use std::io::{Read, Write};

use crate::errors::LasError;

/// `[min_x, min_y, max_x, max_y)` bounds of a quadtree cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bound2D {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

/// A contiguous run of point indices (inclusive) falling in one cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointInterval {
    pub start: u32,
    pub end: u32,
}

#[derive(Debug, Clone, PartialEq)]
struct CellIntervals {
    number_points: u32,
    intervals: Vec<PointInterval>,
}

/// Returns `sum_{l=0}^{level-1} 4^l`, i.e. the number of cells in all levels
/// shallower than `level`.
fn level_offset(level: u32) -> u32 {
    let mut offset = 0u32;
    for l in 0..level {
        offset += (1u32 << l) * (1u32 << l);
    }
    offset
}

/// A built or loaded LAStools quadtree spatial index.
#[derive(Debug, Clone, PartialEq)]
pub struct QuadtreeSpatialIndex {
    levels: u32,
    level_index: u32,
    implicit_levels: u32,
    min_x: f32,
    min_y: f32,
    max_x: f32,
    max_y: f32,
    cells: BTreeMap<i32, CellIntervals>,
}

impl Default for QuadtreeSpatialIndex {
    fn default() -> Self {
        Self {
            levels: 0,
            level_index: 0,
            implicit_levels: 0,
            min_x: 0.0,
            min_y: 0.0,
            max_x: 0.0,
            max_y: 0.0,
            cells: BTreeMap::new(),
        }
    }
}

impl QuadtreeSpatialIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an index from a set of `(x, y)` point coordinates (already
    /// converted to real-world units) and the file's bounds, choosing a
    /// quadtree depth so the finest cell is roughly `tile_size` wide.
    pub fn build(bounds_min: (f64, f64), bounds_max: (f64, f64), points: &[(f64, f64)], tile_size: f64) -> Self {
        let (min_x, min_y) = bounds_min;
        let (max_x, max_y) = bounds_max;
        let dx = max_x - min_x;
        let dy = max_y - min_y;
        let max_dim = dx.max(dy);

        let levels = if max_dim > 0.0 && tile_size > 0.0 {
            let raw = (max_dim / tile_size).log2().ceil();
            let raw = if raw.is_finite() { raw as i64 } else { 1 };
            raw.clamp(1, 20) as u32
        } else {
            4
        };

        let mut index = Self {
            levels,
            level_index: 0,
            implicit_levels: 0,
            min_x: min_x as f32,
            min_y: min_y as f32,
            max_x: max_x as f32,
            max_y: max_y as f32,
            cells: BTreeMap::new(),
        };

        let mut cell_to_points: BTreeMap<i32, Vec<u32>> = BTreeMap::new();
        for (i, &(x, y)) in points.iter().enumerate() {
            let cell_index = index.get_cell_index(x, y);
            cell_to_points.entry(cell_index).or_default().push(i as u32);
        }

        for (cell_index, point_indices) in cell_to_points {
            let mut intervals = Vec::new();
            let mut interval_start = point_indices[0];
            let mut interval_end = interval_start;
            for &idx in &point_indices[1..] {
                if idx == interval_end + 1 {
                    interval_end = idx;
                } else {
                    intervals.push(PointInterval {
                        start: interval_start,
                        end: interval_end,
                    });
                    interval_start = idx;
                    interval_end = idx;
                }
            }
            intervals.push(PointInterval {
                start: interval_start,
                end: interval_end,
            });
            index.add_cell(cell_index, point_indices.len() as u32, intervals);
        }

        index
    }

    pub fn add_cell(&mut self, cell_index: i32, number_points: u32, intervals: Vec<PointInterval>) {
        self.cells.insert(
            cell_index,
            CellIntervals {
                number_points,
                intervals,
            },
        );
    }

    pub fn num_cells(&self) -> usize {
        self.cells.len()
    }

    pub fn levels(&self) -> u32 {
        self.levels
    }

    pub fn bounds(&self) -> Bound2D {
        Bound2D {
            min_x: self.min_x as f64,
            min_y: self.min_y as f64,
            max_x: self.max_x as f64,
            max_y: self.max_y as f64,
        }
    }

    /// The LAStools cell index for `(x, y)` at the deepest level.
    pub fn get_cell_index(&self, x: f64, y: f64) -> i32 {
        self.get_cell_index_at_level(x, y, self.levels)
    }

    fn get_cell_index_at_level(&self, x: f64, y: f64, target_level: u32) -> i32 {
        if target_level == 0 || self.levels == 0 {
            return 0;
        }
        let target_level = target_level.min(self.levels);

        let mut min_x = self.min_x as f64;
        let mut min_y = self.min_y as f64;
        let dx = self.max_x as f64 - min_x;
        let dy = self.max_y as f64 - min_y;
        if dx <= 0.0 || dy <= 0.0 {
            return 0;
        }

        let mut cell_path: u32 = 0;
        let mut cell_size_x = dx;
        let mut cell_size_y = dy;
        for level in 0..target_level {
            cell_size_x /= 2.0;
            cell_size_y /= 2.0;
            let mut quadrant = 0u32;
            if x >= min_x + cell_size_x {
                quadrant |= 1;
                min_x += cell_size_x;
            }
            if y >= min_y + cell_size_y {
                quadrant |= 2;
                min_y += cell_size_y;
            }
            let shift = 2 * (target_level - 1 - level);
            cell_path |= quadrant << shift;
        }

        (level_offset(target_level) + cell_path) as i32
    }

    /// Climbs from the deepest level to the root looking for an existing
    /// cell, mirroring LAStools' handling of adaptively-merged quadtrees.
    pub fn find_cell_index(&self, x: f64, y: f64) -> i32 {
        let mut level = self.levels;
        while level > 0 {
            let cell_index = self.get_cell_index_at_level(x, y, level);
            if self.cells.contains_key(&cell_index) {
                return cell_index;
            }
            level -= 1;
        }
        if self.cells.contains_key(&0) {
            0
        } else {
            -1
        }
    }

    fn get_cell_level_from_index(&self, cell_index: i32) -> u32 {
        if self.levels == 0 || cell_index == 0 {
            return 0;
        }
        let mut level = self.levels;
        while level > 0 {
            let offset = level_offset(level);
            if cell_index as u32 >= offset {
                return level - 1;
            }
            level -= 1;
        }
        0
    }

    /// Inverts [`Self::get_cell_index`], recovering the bounds a cell index refers to.
    pub fn get_cell_bounds(&self, cell_index: i32) -> Bound2D {
        if self.levels == 0 {
            return self.bounds();
        }

        let cell_level = self.get_cell_level_from_index(cell_index);
        let offset = level_offset(cell_level + 1);
        let cell_path = cell_index as u32 - offset;

        let min_x = self.min_x as f64;
        let min_y = self.min_y as f64;
        let dx = self.max_x as f64 - min_x;
        let dy = self.max_y as f64 - min_y;
        if dx <= 0.0 || dy <= 0.0 {
            return self.bounds();
        }

        let mut cell_size_x = dx;
        let mut cell_size_y = dy;
        let mut current_min_x = min_x;
        let mut current_min_y = min_y;

        for level in 0..=cell_level {
            let shift = 2 * (cell_level - level);
            let bits = (cell_path >> shift) & 3;
            cell_size_x /= 2.0;
            cell_size_y /= 2.0;
            if bits & 1 != 0 {
                current_min_x += cell_size_x;
            }
            if bits & 2 != 0 {
                current_min_y += cell_size_y;
            }
        }

        Bound2D {
            min_x: current_min_x,
            min_y: current_min_y,
            max_x: current_min_x + cell_size_x,
            max_y: current_min_y + cell_size_y,
        }
    }

    pub fn read_from<R: Read>(src: &mut R) -> Result<Self, LasError> {
        let mut sig = [0u8; 4];
        src.read_exact(&mut sig)?;
        if &sig != b"LASX" {
            return Err(LasError::BadSpatialIndexSignature);
        }
        let _version = src.read_u32::<LittleEndian>()?;

        src.read_exact(&mut sig)?;
        if &sig != b"LASS" {
            return Err(LasError::BadSpatialIndexSignature);
        }
        let _ty = src.read_u32::<LittleEndian>()?;
        src.read_exact(&mut sig)?;
        if &sig != b"LASQ" {
            return Err(LasError::BadSpatialIndexSignature);
        }
        let _qt_version = src.read_u32::<LittleEndian>()?;
        let levels = src.read_u32::<LittleEndian>()?;
        let level_index = src.read_u32::<LittleEndian>()?;
        let implicit_levels = src.read_u32::<LittleEndian>()?;
        let min_x = src.read_f32::<LittleEndian>()?;
        let max_x = src.read_f32::<LittleEndian>()?;
        let min_y = src.read_f32::<LittleEndian>()?;
        let max_y = src.read_f32::<LittleEndian>()?;

        src.read_exact(&mut sig)?;
        if &sig != b"LASV" {
            return Err(LasError::BadSpatialIndexSignature);
        }
        let _interval_version = src.read_u32::<LittleEndian>()?;
        let number_cells = src.read_u32::<LittleEndian>()?;

        let mut cells = BTreeMap::new();
        for _ in 0..number_cells {
            let cell_index = src.read_i32::<LittleEndian>()?;
            let number_intervals = src.read_u32::<LittleEndian>()?;
            let number_points = src.read_u32::<LittleEndian>()?;
            let mut intervals = Vec::with_capacity(number_intervals as usize);
            for _ in 0..number_intervals {
                let start = src.read_u32::<LittleEndian>()?;
                let end = src.read_u32::<LittleEndian>()?;
                intervals.push(PointInterval { start, end });
            }
            cells.insert(
                cell_index,
                CellIntervals {
                    number_points,
                    intervals,
                },
            );
        }

        Ok(Self {
            levels,
            level_index,
            implicit_levels,
            min_x,
            min_y,
            max_x,
            max_y,
            cells,
        })
    }

    pub fn write_to<W: Write>(&self, dst: &mut W) -> std::io::Result<()> {
        dst.write_all(b"LASX")?;
        dst.write_u32::<LittleEndian>(0)?;

        dst.write_all(b"LASS")?;
        dst.write_u32::<LittleEndian>(0)?;
        dst.write_all(b"LASQ")?;
        dst.write_u32::<LittleEndian>(0)?;
        dst.write_u32::<LittleEndian>(self.levels)?;
        dst.write_u32::<LittleEndian>(self.level_index)?;
        dst.write_u32::<LittleEndian>(self.implicit_levels)?;
        dst.write_f32::<LittleEndian>(self.min_x)?;
        dst.write_f32::<LittleEndian>(self.max_x)?;
        dst.write_f32::<LittleEndian>(self.min_y)?;
        dst.write_f32::<LittleEndian>(self.max_y)?;

        dst.write_all(b"LASV")?;
        dst.write_u32::<LittleEndian>(0)?;
        dst.write_u32::<LittleEndian>(self.cells.len() as u32)?;
        for (&cell_index, cell) in &self.cells {
            dst.write_i32::<LittleEndian>(cell_index)?;
            dst.write_u32::<LittleEndian>(cell.intervals.len() as u32)?;
            dst.write_u32::<LittleEndian>(cell.number_points)?;
            for interval in &cell.intervals {
                dst.write_u32::<LittleEndian>(interval.start)?;
                dst.write_u32::<LittleEndian>(interval.end)?;
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
    fn level_offset_matches_power_of_four_recurrence() {
        assert_eq!(level_offset(0), 0);
        assert_eq!(level_offset(1), 1);
        assert_eq!(level_offset(2), 1 + 4);
        assert_eq!(level_offset(3), 1 + 4 + 16);
    }

    #[test]
    fn cell_bounds_inverts_cell_index() {
        let points: Vec<(f64, f64)> = vec![(1.0, 1.0), (99.0, 99.0), (1.5, 1.5)];
        let index = QuadtreeSpatialIndex::build((0.0, 0.0), (100.0, 100.0), &points, 25.0);
        for &(x, y) in &points {
            let cell = index.get_cell_index(x, y);
            let bounds = index.get_cell_bounds(cell);
            assert!(x >= bounds.min_x && x < bounds.max_x || x == bounds.max_x);
            assert!(y >= bounds.min_y && y < bounds.max_y || y == bounds.max_y);
        }
    }

    #[test]
    fn find_cell_index_climbs_to_existing_ancestor() {
        let mut index = QuadtreeSpatialIndex::new();
        index.levels = 3;
        index.max_x = 100.0;
        index.max_y = 100.0;
        index.add_cell(0, 1, vec![PointInterval { start: 0, end: 0 }]);
        assert_eq!(index.find_cell_index(50.0, 50.0), 0);
    }

    #[test]
    fn round_trip_through_wire_format() {
        let points: Vec<(f64, f64)> = vec![(1.0, 1.0), (2.0, 2.0), (50.0, 50.0)];
        let index = QuadtreeSpatialIndex::build((0.0, 0.0), (100.0, 100.0), &points, 25.0);
        let mut buf = Cursor::new(Vec::new());
        index.write_to(&mut buf).unwrap();
        let bytes = buf.into_inner();

        let mut cursor = Cursor::new(bytes);
        let read_back = QuadtreeSpatialIndex::read_from(&mut cursor).unwrap();
        assert_eq!(read_back, index);
    }

    #[test]
    fn rejects_bad_signature() {
        let bad = Cursor::new(vec![b'X', b'X', b'X', b'X', 0, 0, 0, 0]);
        let mut cursor = bad;
        assert!(QuadtreeSpatialIndex::read_from(&mut cursor).is_err());
    }
}
