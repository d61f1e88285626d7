use std::io::{self, Read, Write};

use crate::solver::{Axis, Dimensions};
use crate::{BitmapHeader, Error, HEADER_SIZE};

/// One complete output file, borrowing its color table and pixels from the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairedImage<'a> {
    pub header: BitmapHeader,
    pub palette: &'a [u8],
    pub pixels: &'a [u8],
    /// Zero bytes appended to complete the last row; only a best-effort guess has any.
    pub padding: usize,
    /// Which dimension was moved to find this image, `None` for the default fix.
    pub varied: Option<Axis>,
}

impl RepairedImage<'_> {
    pub fn dimensions(&self) -> Dimensions {
        Dimensions::declared(&self.header.image_header)
    }

    /// Size of the serialized file, equal to the header's `size` field.
    pub fn file_len(&self) -> usize {
        HEADER_SIZE + self.palette.len() + self.pixels.len() + self.padding
    }

    pub fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        out.write_all(&self.header.to_bytes())?;
        out.write_all(self.palette)?;
        out.write_all(self.pixels)?;
        io::copy(&mut io::repeat(0).take(self.padding as u64), out)?;
        Ok(())
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.file_len());
        buf.extend_from_slice(&self.header.to_bytes());
        buf.extend_from_slice(self.palette);
        buf.extend_from_slice(self.pixels);
        buf.resize(buf.len() + self.padding, 0);
        buf
    }
}

/// The corrected header fields every variant of one input shares.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Template<'a> {
    /// Declared width, height and sizes are overwritten per variant.
    pub header: BitmapHeader,
    pub palette: &'a [u8],
    /// Everything after the color table.
    pub available: &'a [u8],
}

impl<'a> Template<'a> {
    pub fn variant(
        &self,
        dimensions: Dimensions,
        varied: Option<Axis>,
    ) -> Result<RepairedImage<'a>, Error> {
        let image = &self.header.image_header;
        let needed = dimensions.pixel_bytes(image.bit_depth);
        let file_size = (HEADER_SIZE + self.palette.len()) as u64 + needed;
        let size = u32::try_from(file_size).map_err(|_| {
            Error::MalformedInput(format!(
                "{} at {} bpp needs a {}-byte file, past the 4 GiB size field",
                dimensions, image.bit_depth, file_size
            ))
        })?;
        // fits in u32 along with the headers
        let needed = needed as usize;
        let available: &'a [u8] = self.available;
        let pixels = &available[..needed.min(available.len())];

        let mut header = self.header;
        header.image_header.width = dimensions.width as i32;
        header.image_header.height = if image.height < 0 {
            -(dimensions.height as i32)
        } else {
            dimensions.height as i32
        };
        // 0 is a valid "work it out" value for uncompressed data
        if image.image_size != 0 {
            header.image_header.image_size = needed as u32;
        }
        header.file_header.size = size;

        Ok(RepairedImage {
            header,
            palette: self.palette,
            pixels,
            padding: needed - pixels.len(),
            varied,
        })
    }
}
