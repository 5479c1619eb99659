use crate::las::nir::LasNIR;
use crate::las::rgb::LasRGB;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

#[derive(Default, Copy, Clone)]
pub struct RGBNIR {
    red: u16,
    green: u16,
    blue: u16,
    nir: u16,
}

impl RGBNIR {
    pub const SIZE: usize = 8;

    pub fn read_from<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        self.red = src.read_u16::<LittleEndian>()?;
        self.green = src.read_u16::<LittleEndian>()?;
        self.blue = src.read_u16::<LittleEndian>()?;
        self.nir = src.read_u16::<LittleEndian>()?;
        Ok(())
    }

    pub fn write_to<W: Write>(&self, dst: &mut W) -> std::io::Result<()> {
        dst.write_u16::<LittleEndian>(self.red)?;
        dst.write_u16::<LittleEndian>(self.green)?;
        dst.write_u16::<LittleEndian>(self.blue)?;
        dst.write_u16::<LittleEndian>(self.nir)?;
        Ok(())
    }
}

impl LasNIR for RGBNIR {
    fn nir(&self) -> u16 {
        self.nir
    }

    fn set_nir(&mut self, new_val: u16) {
        self.nir = new_val;
    }
}

impl LasRGB for RGBNIR {
    fn red(&self) -> u16 {
        self.red
    }

    fn green(&self) -> u16 {
        self.green
    }

    fn blue(&self) -> u16 {
        self.blue
    }

    fn set_red(&mut self, new_val: u16) {
        self.red = new_val;
    }

    fn set_green(&mut self, new_val: u16) {
        self.green = new_val;
    }

    fn set_blue(&mut self, new_val: u16) {
        self.blue = new_val;
    }
}

pub mod v3 {
    use crate::las::nir::v3::{LasNIRCompressor, LasNIRDecompressor};
    use crate::las::rgb::v3::{LasRGBCompressor, LasRGBDecompressor};

    use crate::las::selective::DecompressionSelection;
    use crate::las::utils::copy_bytes_into_decoder;
    use crate::record::{LayeredFieldCompressor, LayeredFieldDecompressor};
    use byteorder::{LittleEndian, ReadBytesExt};
    use std::io::{Read, Seek, Write};

    use super::RGBNIR;

    pub struct LasRGBNIRDecompressor {
        rgb_layer_size: u32,
        nir_layer_size: u32,
        rgb_decompressor: LasRGBDecompressor,
        nir_decompressor: LasNIRDecompressor,
    }

    impl LasRGBNIRDecompressor {
        pub fn new() -> Self {
            Self {
                rgb_layer_size: 0,
                nir_layer_size: 0,
                rgb_decompressor: LasRGBDecompressor::new(),
                nir_decompressor: LasNIRDecompressor::new(),
            }
        }
    }

    impl Default for LasRGBNIRDecompressor {
        fn default() -> Self {
            Self::new()
        }
    }

    impl<R: Read + Seek> LayeredFieldDecompressor<R> for LasRGBNIRDecompressor {
        fn size_of_field(&self) -> usize {
            RGBNIR::SIZE
        }

        fn set_selection(&mut self, _selection: DecompressionSelection) {
            // Neither RGB nor Nir support selective decompression
        }

        fn init_first_point(
            &mut self,
            src: &mut R,
            first_point: &mut [u8],
            context: &mut usize,
        ) -> std::io::Result<()> {
            self.rgb_decompressor
                .init_first_point(src, &mut first_point[0..6], context)?;
            self.nir_decompressor
                .init_first_point(src, &mut first_point[6..8], context)
        }

        fn decompress_field_with(
            &mut self,
            current_point: &mut [u8],
            context: &mut usize,
        ) -> std::io::Result<()> {
            self.rgb_decompressor
                .decompress_field_with(&mut current_point[0..6], context)?;
            self.nir_decompressor
                .decompress_field_with(&mut current_point[6..8], context)
        }

        fn read_layers_sizes(&mut self, src: &mut R) -> std::io::Result<()> {
            self.rgb_layer_size = src.read_u32::<LittleEndian>()?;
            self.nir_layer_size = src.read_u32::<LittleEndian>()?;
            Ok(())
        }

        fn read_layers(&mut self, src: &mut R) -> std::io::Result<()> {
            self.rgb_decompressor.changed_rgb = copy_bytes_into_decoder(
                true,
                self.rgb_layer_size as usize,
                &mut self.rgb_decompressor.decoder,
                src,
            )?;

            self.nir_decompressor.changed_nir = copy_bytes_into_decoder(
                true,
                self.nir_layer_size as usize,
                &mut self.nir_decompressor.decoder,
                src,
            )?;

            Ok(())
        }
    }

    pub struct LasRGBNIRCompressor {
        rgb_compressor: LasRGBCompressor,
        nir_compressor: LasNIRCompressor,
    }

    impl LasRGBNIRCompressor {
        pub fn new() -> Self {
            Self {
                rgb_compressor: LasRGBCompressor::new(),
                nir_compressor: LasNIRCompressor::new(),
            }
        }
    }

    impl Default for LasRGBNIRCompressor {
        fn default() -> Self {
            Self::new()
        }
    }

    impl<W: Write> LayeredFieldCompressor<W> for LasRGBNIRCompressor {
        fn size_of_field(&self) -> usize {
            RGBNIR::SIZE
        }

        fn init_first_point(
            &mut self,
            dst: &mut W,
            first_point: &[u8],
            context: &mut usize,
        ) -> std::io::Result<()> {
            self.rgb_compressor
                .init_first_point(dst, &first_point[0..6], context)?;
            self.nir_compressor
                .init_first_point(dst, &first_point[6..8], context)
        }

        fn compress_field_with(
            &mut self,
            current_point: &[u8],
            context: &mut usize,
        ) -> std::io::Result<()> {
            self.rgb_compressor
                .compress_field_with(&current_point[0..6], context)?;
            self.nir_compressor
                .compress_field_with(&current_point[6..8], context)
        }

        fn write_layers_sizes(&mut self, dst: &mut W) -> std::io::Result<()> {
            self.rgb_compressor.write_layers_sizes(dst)?;
            self.nir_compressor.write_layers_sizes(dst)
        }

        fn write_layers(&mut self, dst: &mut W) -> std::io::Result<()> {
            self.rgb_compressor.write_layers(dst)?;
            self.nir_compressor.write_layers(dst)
        }
    }
}
