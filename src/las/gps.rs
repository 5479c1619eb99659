/*
===============================================================================

  PROGRAMMERS:

    martin.isenburg@rapidlasso.com  -  http://rapidlasso.com
    uday.karan@gmail.com - Hobu, Inc.

  COPYRIGHT:

    (c) 2007-2014, martin isenburg, rapidlasso - tools to catch reality
    (c) 2014, Uday Verma, Hobu, Inc.
    (c) 2019, Thomas Montaigu

    This is free software; you can redistribute and/or modify it under the
    terms of the GNU Lesser General Licence as published by the Free Software
    Foundation. See the COPYING file for more information.

    This software is distributed WITHOUT ANY WARRANTY and without even the
    implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.

  CHANGE HISTORY:
    6 June 2019: Translated to Rust
===============================================================================
*/

//! Defines the GpsTime field and its v1 / v2 compressors & decompressors

use crate::packers::Packable;

const LASZIP_GPS_TIME_MULTI: i32 = 500;
const LASZIP_GPS_TIME_MULTI_MINUS: i32 = -10;
const LASZIP_GPS_TIME_MULTI_UNCHANGED: i32 =
    LASZIP_GPS_TIME_MULTI - LASZIP_GPS_TIME_MULTI_MINUS + 1;
const LASZIP_GPS_TIME_MULTI_CODE_FULL: i32 =
    LASZIP_GPS_TIME_MULTI - LASZIP_GPS_TIME_MULTI_MINUS + 2;
const LASZIP_GPS_TIME_MULTI_TOTAL: i32 = LASZIP_GPS_TIME_MULTI - LASZIP_GPS_TIME_MULTI_MINUS + 6;

#[inline]
fn i32_quantize(n: f32) -> i32 {
    if n >= 0.0f32 {
        (n + 0.5f32) as i32
    } else {
        (n - 0.5f32) as i32
    }
}

#[derive(Default, Copy, Clone, Debug, PartialEq)]
pub struct GpsTime {
    pub value: i64,
}

impl Packable for GpsTime {
    fn unpack_from(input: &[u8]) -> Self {
        assert!(
            input.len() >= 8,
            "GpsTime::unpack_from expected a slice of 8 bytes"
        );
        unsafe { Self::unpack_from_unchecked(input) }
    }

    fn pack_into(&self, output: &mut [u8]) {
        assert!(
            output.len() >= 8,
            "GpsTime::pack_into expected a slice of 8 bytes"
        );
        unsafe { self.pack_into_unchecked(output) }
    }

    unsafe fn unpack_from_unchecked(input: &[u8]) -> Self {
        let lower = u32::unpack_from_unchecked(input.get_unchecked(0..4));
        let upper = u32::unpack_from_unchecked(input.get_unchecked(4..8));
        Self {
            value: (upper as i64) << 32 | lower as i64,
        }
    }

    unsafe fn pack_into_unchecked(&self, output: &mut [u8]) {
        u32::pack_into_unchecked(&((self.value & 0xFFFF_FFFF) as u32), output.get_unchecked_mut(0..4));
        u32::pack_into_unchecked(&((self.value >> 32) as u32), output.get_unchecked_mut(4..8));
    }
}

/// Simpler, first-generation GpsTime compressor: encodes the raw 64 bit value
/// as a single 32-bit-corrected difference, with no multi-sequence tracking.
pub mod v1 {
    use std::io::{Read, Write};

    use super::GpsTime;
    use crate::compressors::{IntegerCompressor, IntegerCompressorBuilder};
    use crate::decoders::ArithmeticDecoder;
    use crate::decompressors::{IntegerDecompressor, IntegerDecompressorBuilder};
    use crate::encoders::ArithmeticEncoder;
    use crate::packers::Packable;
    use crate::record::{FieldCompressor, FieldDecompressor};

    pub struct LasGpsTimeCompressor {
        have_last: bool,
        last: GpsTime,
        ic_gps_time: IntegerCompressor,
    }

    impl Default for LasGpsTimeCompressor {
        fn default() -> Self {
            Self {
                have_last: false,
                last: GpsTime::default(),
                ic_gps_time: IntegerCompressorBuilder::new()
                    .bits(32)
                    .contexts(6)
                    .build_initialized(),
            }
        }
    }

    impl<W: Write> FieldCompressor<W> for LasGpsTimeCompressor {
        fn size_of_field(&self) -> usize {
            8
        }

        fn compress_first(&mut self, dst: &mut W, buf: &[u8]) -> std::io::Result<()> {
            self.last = GpsTime::unpack_from(buf);
            dst.write_all(buf)
        }

        fn compress_with(
            &mut self,
            encoder: &mut ArithmeticEncoder<W>,
            buf: &[u8],
        ) -> std::io::Result<()> {
            let current = GpsTime::unpack_from(buf);
            let diff_64 = current.value - self.last.value;
            let diff_32 = diff_64 as i32;
            if diff_64 == diff_32 as i64 {
                self.ic_gps_time.compress(encoder, 0, diff_32, 0)?;
            } else {
                self.ic_gps_time
                    .compress(encoder, 0, (self.last.value >> 32) as i32, 1)?;
                encoder.write_int(current.value as u32)?;
            }
            self.have_last = true;
            self.last = current;
            Ok(())
        }
    }

    pub struct LasGpsTimeDecompressor {
        have_last: bool,
        last: GpsTime,
        ic_gps_time: IntegerDecompressor,
    }

    impl Default for LasGpsTimeDecompressor {
        fn default() -> Self {
            Self {
                have_last: false,
                last: GpsTime::default(),
                ic_gps_time: IntegerDecompressorBuilder::new()
                    .bits(32)
                    .contexts(6)
                    .build_initialized(),
            }
        }
    }

    impl<R: Read> FieldDecompressor<R> for LasGpsTimeDecompressor {
        fn size_of_field(&self) -> usize {
            8
        }

        fn decompress_first(&mut self, src: &mut R, first_point: &mut [u8]) -> std::io::Result<()> {
            src.read_exact(first_point)?;
            self.last = GpsTime::unpack_from(first_point);
            self.have_last = true;
            Ok(())
        }

        fn decompress_with(
            &mut self,
            decoder: &mut ArithmeticDecoder<R>,
            buf: &mut [u8],
        ) -> std::io::Result<()> {
            let diff_32 = self.ic_gps_time.decompress(decoder, 0, 0)?;
            self.last.value += diff_32 as i64;
            self.last.pack_into(buf);
            Ok(())
        }
    }
}

/// Full featured GpsTime v2 compressor/decompressor: tracks 4 candidate
/// reference time sequences and codes the multiplier between consecutive
/// differences, per the LASzip GPSTime11 scheme.
pub mod v2 {
    use std::io::{Read, Write};

    use super::{
        i32_quantize, GpsTime, LASZIP_GPS_TIME_MULTI, LASZIP_GPS_TIME_MULTI_CODE_FULL,
        LASZIP_GPS_TIME_MULTI_UNCHANGED,
    };
    use crate::compressors::{IntegerCompressor, IntegerCompressorBuilder};
    use crate::decoders::ArithmeticDecoder;
    use crate::decompressors::{IntegerDecompressor, IntegerDecompressorBuilder};
    use crate::encoders::ArithmeticEncoder;
    use crate::models::{ArithmeticModel, ArithmeticModelBuilder};
    use crate::packers::Packable;
    use crate::record::{FieldCompressor, FieldDecompressor};

    struct Common {
        have_last: bool,
        gps_time_multi: ArithmeticModel,
        gps_time_0_diff: ArithmeticModel,
        last: usize,
        next: usize,
        last_gps_times: [GpsTime; 4],
        last_gps_time_diffs: [i32; 4],
        multi_extreme_counters: [i32; 4],
    }

    impl Common {
        fn new() -> Self {
            Self {
                have_last: false,
                gps_time_multi: ArithmeticModelBuilder::new(LASZIP_GPS_TIME_MULTI_TOTAL as u32)
                    .build(),
                gps_time_0_diff: ArithmeticModelBuilder::new(6).build(),
                last: 0,
                next: 0,
                last_gps_times: [GpsTime::default(); 4],
                last_gps_time_diffs: [0i32; 4],
                multi_extreme_counters: [0i32; 4],
            }
        }
    }

    use super::LASZIP_GPS_TIME_MULTI_TOTAL;

    pub struct GpsTimeCompressor {
        ic_gps_time: IntegerCompressor,
        common: Common,
    }

    impl Default for GpsTimeCompressor {
        fn default() -> Self {
            Self {
                ic_gps_time: IntegerCompressorBuilder::new()
                    .bits(32)
                    .contexts(9)
                    .build_initialized(),
                common: Common::new(),
            }
        }
    }

    impl<W: Write> FieldCompressor<W> for GpsTimeCompressor {
        fn size_of_field(&self) -> usize {
            8
        }

        fn compress_first(&mut self, dst: &mut W, buf: &[u8]) -> std::io::Result<()> {
            self.common.last_gps_times[0] = GpsTime::unpack_from(buf);
            self.common.have_last = true;
            dst.write_all(buf)
        }

        fn compress_with(
            &mut self,
            encoder: &mut ArithmeticEncoder<W>,
            buf: &[u8],
        ) -> std::io::Result<()> {
            let this_val = GpsTime::unpack_from(buf);

            if self.common.last_gps_time_diffs[self.common.last] == 0 {
                if this_val.value == self.common.last_gps_times[self.common.last].value {
                    encoder.encode_symbol(&mut self.common.gps_time_0_diff, 0)?;
                } else {
                    let curr_gps_time_diff_64 =
                        this_val.value - self.common.last_gps_times[self.common.last].value;
                    let curr_gps_time_diff_32 = curr_gps_time_diff_64 as i32;

                    if curr_gps_time_diff_64 == curr_gps_time_diff_32 as i64 {
                        encoder.encode_symbol(&mut self.common.gps_time_0_diff, 1)?;
                        self.ic_gps_time
                            .compress(encoder, 0, curr_gps_time_diff_32, 0)?;
                        self.common.last_gps_time_diffs[self.common.last] = curr_gps_time_diff_32;
                        self.common.multi_extreme_counters[self.common.last] = 0;
                    } else {
                        let mut found = false;
                        for i in 1..4u32 {
                            let other_gps_time_diff_64 = this_val.value
                                - self.common.last_gps_times[(self.common.last + i as usize) & 3]
                                    .value;
                            let other_gps_time_diff_32 = other_gps_time_diff_64 as i32;

                            if other_gps_time_diff_64 == other_gps_time_diff_32 as i64 {
                                encoder
                                    .encode_symbol(&mut self.common.gps_time_0_diff, i + 2)?;
                                self.common.last = (self.common.last + i as usize) & 3;
                                found = true;
                                break;
                            }
                        }
                        if found {
                            return self.compress_with(encoder, buf);
                        }
                        encoder.encode_symbol(&mut self.common.gps_time_0_diff, 2)?;
                        self.ic_gps_time.compress(
                            encoder,
                            (self.common.last_gps_times[self.common.last].value >> 32) as i32,
                            (this_val.value >> 32) as i32,
                            8,
                        )?;
                        encoder.write_int(this_val.value as u32)?;

                        self.common.next = (self.common.next + 1) & 3;
                        self.common.last = self.common.next;
                        self.common.last_gps_time_diffs[self.common.last] = 0;
                        self.common.multi_extreme_counters[self.common.last] = 0;
                    }
                    self.common.last_gps_times[self.common.last] = this_val;
                }
            } else {
                let curr_gps_time_diff_64 =
                    this_val.value - self.common.last_gps_times[self.common.last].value;
                let curr_gps_time_diff_32 = curr_gps_time_diff_64 as i32;

                if curr_gps_time_diff_64 == curr_gps_time_diff_32 as i64 {
                    let multi_f = curr_gps_time_diff_32 as f32
                        / self.common.last_gps_time_diffs[self.common.last] as f32;
                    let multi = i32_quantize(multi_f);

                    if multi == 1 {
                        encoder.encode_symbol(&mut self.common.gps_time_multi, 1)?;
                        self.ic_gps_time.compress(
                            encoder,
                            self.common.last_gps_time_diffs[self.common.last],
                            curr_gps_time_diff_32,
                            1,
                        )?;
                        self.common.multi_extreme_counters[self.common.last] = 0;
                    } else if multi > 0 {
                        if multi < LASZIP_GPS_TIME_MULTI {
                            encoder.encode_symbol(&mut self.common.gps_time_multi, multi as u32)?;
                            let context = if multi < 10 { 2u32 } else { 3u32 };
                            self.ic_gps_time.compress(
                                encoder,
                                multi * self.common.last_gps_time_diffs[self.common.last],
                                curr_gps_time_diff_32,
                                context,
                            )?;
                        } else {
                            encoder.encode_symbol(
                                &mut self.common.gps_time_multi,
                                LASZIP_GPS_TIME_MULTI as u32,
                            )?;
                            self.ic_gps_time.compress(
                                encoder,
                                LASZIP_GPS_TIME_MULTI
                                    * self.common.last_gps_time_diffs[self.common.last],
                                curr_gps_time_diff_32,
                                3,
                            )?;
                        }
                    } else if multi < 0 {
                        if multi > super::LASZIP_GPS_TIME_MULTI_MINUS {
                            encoder.encode_symbol(
                                &mut self.common.gps_time_multi,
                                (LASZIP_GPS_TIME_MULTI - multi) as u32,
                            )?;
                            self.ic_gps_time.compress(
                                encoder,
                                multi * self.common.last_gps_time_diffs[self.common.last],
                                curr_gps_time_diff_32,
                                5,
                            )?;
                        } else {
                            encoder.encode_symbol(
                                &mut self.common.gps_time_multi,
                                (LASZIP_GPS_TIME_MULTI - super::LASZIP_GPS_TIME_MULTI_MINUS) as u32,
                            )?;
                            self.ic_gps_time.compress(
                                encoder,
                                super::LASZIP_GPS_TIME_MULTI_MINUS
                                    * self.common.last_gps_time_diffs[self.common.last],
                                curr_gps_time_diff_32,
                                6,
                            )?;
                            self.common.multi_extreme_counters[self.common.last] += 1;
                            if self.common.multi_extreme_counters[self.common.last] > 3 {
                                self.common.last_gps_time_diffs[self.common.last] =
                                    curr_gps_time_diff_32;
                                self.common.multi_extreme_counters[self.common.last] = 0;
                            }
                        }
                    } else {
                        encoder.encode_symbol(&mut self.common.gps_time_multi, 0)?;
                        self.ic_gps_time
                            .compress(encoder, 7, curr_gps_time_diff_32, 7)?;
                        self.common.multi_extreme_counters[self.common.last] += 1;
                        if self.common.multi_extreme_counters[self.common.last] > 3 {
                            self.common.last_gps_time_diffs[self.common.last] =
                                curr_gps_time_diff_32;
                            self.common.multi_extreme_counters[self.common.last] = 0;
                        }
                    }
                } else {
                    let mut found = false;
                    for i in 1..4usize {
                        let other_gps_time_diff_64 = this_val.value
                            - self.common.last_gps_times[(self.common.last + i) & 3].value;
                        let other_gps_time_diff_32 = other_gps_time_diff_64 as i32;

                        if other_gps_time_diff_64 == other_gps_time_diff_32 as i64 {
                            encoder.encode_symbol(
                                &mut self.common.gps_time_multi,
                                (LASZIP_GPS_TIME_MULTI_CODE_FULL + i as i32) as u32,
                            )?;
                            self.common.last = (self.common.last + i) & 3;
                            found = true;
                            break;
                        }
                    }
                    if found {
                        return self.compress_with(encoder, buf);
                    }

                    encoder.encode_symbol(
                        &mut self.common.gps_time_multi,
                        LASZIP_GPS_TIME_MULTI_CODE_FULL as u32,
                    )?;
                    self.ic_gps_time.compress(
                        encoder,
                        (self.common.last_gps_times[self.common.last].value >> 32) as i32,
                        (this_val.value >> 32) as i32,
                        8,
                    )?;

                    encoder.write_int(this_val.value as u32)?;
                    self.common.next = (self.common.next + 1) & 3;
                    self.common.last = self.common.next;
                    self.common.last_gps_time_diffs[self.common.last] = 0;
                    self.common.multi_extreme_counters[self.common.last] = 0;
                }
                self.common.last_gps_times[self.common.last] = this_val;
            }
            Ok(())
        }
    }

    pub struct GpsTimeDecompressor {
        common: Common,
        ic_gps_time: IntegerDecompressor,
    }

    impl Default for GpsTimeDecompressor {
        fn default() -> Self {
            Self {
                common: Common::new(),
                ic_gps_time: IntegerDecompressorBuilder::new()
                    .bits(32)
                    .contexts(9)
                    .build_initialized(),
            }
        }
    }

    impl<R: Read> FieldDecompressor<R> for GpsTimeDecompressor {
        fn size_of_field(&self) -> usize {
            8
        }

        fn decompress_first(&mut self, src: &mut R, first_point: &mut [u8]) -> std::io::Result<()> {
            src.read_exact(first_point)?;
            self.common.last_gps_times[0] = GpsTime::unpack_from(first_point);
            self.common.have_last = true;
            Ok(())
        }

        fn decompress_with(
            &mut self,
            decoder: &mut ArithmeticDecoder<R>,
            buf: &mut [u8],
        ) -> std::io::Result<()> {
            let mut multi: i32;

            if self.common.last_gps_time_diffs[self.common.last] == 0 {
                multi = decoder.decode_symbol(&mut self.common.gps_time_0_diff)? as i32;

                if multi == 1 {
                    self.common.last_gps_time_diffs[self.common.last] =
                        self.ic_gps_time.decompress(decoder, 0, 0)?;
                    self.common.last_gps_times[self.common.last].value +=
                        self.common.last_gps_time_diffs[self.common.last] as i64;
                    self.common.multi_extreme_counters[self.common.last] = 0;
                } else if multi == 2 {
                    self.common.next = (self.common.next + 1) & 3;
                    self.common.last_gps_times[self.common.next].value = self.ic_gps_time.decompress(
                        decoder,
                        (self.common.last_gps_times[self.common.last].value >> 32) as i32,
                        8,
                    )? as i64;
                    self.common.last_gps_times[self.common.next].value <<= 32;
                    self.common.last_gps_times[self.common.next].value |=
                        decoder.read_int()? as i64;
                    self.common.last = self.common.next;
                    self.common.last_gps_time_diffs[self.common.last] = 0;
                    self.common.multi_extreme_counters[self.common.last] = 0;
                } else if multi > 2 {
                    self.common.last = (self.common.last + multi as usize - 2) & 3;
                    return self.decompress_with(decoder, buf);
                }
            } else {
                multi = decoder.decode_symbol(&mut self.common.gps_time_multi)? as i32;

                if multi == 1 {
                    self.common.last_gps_times[self.common.last].value += self.ic_gps_time.decompress(
                        decoder,
                        self.common.last_gps_time_diffs[self.common.last],
                        1,
                    )? as i64;
                    self.common.multi_extreme_counters[self.common.last] = 0;
                } else if multi < LASZIP_GPS_TIME_MULTI_UNCHANGED {
                    let gps_time_diff: i32;
                    if multi == 0 {
                        gps_time_diff = self.ic_gps_time.decompress(decoder, 0, 7)?;
                        self.common.multi_extreme_counters[self.common.last] += 1;
                        if self.common.multi_extreme_counters[self.common.last] > 3 {
                            self.common.last_gps_time_diffs[self.common.last] = gps_time_diff;
                            self.common.multi_extreme_counters[self.common.last] = 0;
                        }
                    } else if multi < LASZIP_GPS_TIME_MULTI {
                        let context = if multi < 10 { 2 } else { 3 };
                        gps_time_diff = self.ic_gps_time.decompress(
                            decoder,
                            multi * self.common.last_gps_time_diffs[self.common.last],
                            context,
                        )?;
                    } else if multi == LASZIP_GPS_TIME_MULTI {
                        gps_time_diff = self.ic_gps_time.decompress(
                            decoder,
                            multi * self.common.last_gps_time_diffs[self.common.last],
                            4,
                        )?;
                        self.common.multi_extreme_counters[self.common.last] += 1;
                        if self.common.multi_extreme_counters[self.common.last] > 3 {
                            self.common.last_gps_time_diffs[self.common.last] = gps_time_diff;
                            self.common.multi_extreme_counters[self.common.last] = 0;
                        }
                    } else {
                        multi = LASZIP_GPS_TIME_MULTI - multi;
                        if multi > super::LASZIP_GPS_TIME_MULTI_MINUS {
                            gps_time_diff = self.ic_gps_time.decompress(
                                decoder,
                                multi * self.common.last_gps_time_diffs[self.common.last],
                                5,
                            )?;
                        } else {
                            gps_time_diff = self.ic_gps_time.decompress(
                                decoder,
                                super::LASZIP_GPS_TIME_MULTI_MINUS
                                    * self.common.last_gps_time_diffs[self.common.last],
                                6,
                            )?;
                            self.common.multi_extreme_counters[self.common.last] += 1;
                            if self.common.multi_extreme_counters[self.common.last] > 3 {
                                self.common.last_gps_time_diffs[self.common.last] = gps_time_diff;
                                self.common.multi_extreme_counters[self.common.last] = 0;
                            }
                        }
                    }
                    self.common.last_gps_times[self.common.last].value += gps_time_diff as i64;
                } else if multi == LASZIP_GPS_TIME_MULTI_CODE_FULL {
                    self.common.next = (self.common.next + 1) & 3;
                    self.common.last_gps_times[self.common.next].value = self.ic_gps_time.decompress(
                        decoder,
                        (self.common.last_gps_times[self.common.last].value >> 32) as i32,
                        8,
                    )? as i64;
                    self.common.last_gps_times[self.common.next].value <<= 32;
                    self.common.last_gps_times[self.common.next].value |=
                        decoder.read_int()? as i64;
                    self.common.last = self.common.next;
                    self.common.last_gps_time_diffs[self.common.last] = 0;
                    self.common.multi_extreme_counters[self.common.last] = 0;
                } else if multi > LASZIP_GPS_TIME_MULTI_CODE_FULL {
                    self.common.last = (self.common.last + multi as usize
                        - LASZIP_GPS_TIME_MULTI_CODE_FULL as usize)
                        & 3;
                    return self.decompress_with(decoder, buf);
                }
            }
            self.common.last_gps_times[self.common.last].pack_into(buf);
            Ok(())
        }
    }
}
