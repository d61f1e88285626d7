/*!
 * Bitmap Header Repair
 *
 * Supported Compression: BI_RGB (Uncompressed)
 * Supported Bit Depth: 1, 4, 8, 16, 24 and 32 bit
 * Supported Info Header: BITMAPINFOHEADER (Windows V3, 40 bytes)
 *
 * Rebuilds tampered file and info headers from what the file actually holds.
 * The bit depth is the one header field taken at face value: everything else
 * (sizes, offsets, width, height) is recomputed from the byte count.
 */
mod error;
mod repair;
mod report;
mod solver;
mod variant;

use std::ops::Range;

use byteorder::{ByteOrder, LittleEndian};

pub use crate::error::Error;
pub use crate::repair::{
    repair, Confidence, RepairOptions, RepairResult, DEFAULT_SEARCH_RADIUS, MAX_SEARCH_RADIUS,
};
pub use crate::report::HeaderReport;
pub use crate::solver::{row_stride, Axis, Candidate, Dimensions, Solver};
pub use crate::variant::RepairedImage;

pub const FILE_HEADER_SIZE: usize = 14;
pub const DIB_HEADER_SIZE: usize = 40;
/// Both headers; the palette (if any) starts right after.
pub const HEADER_SIZE: usize = FILE_HEADER_SIZE + DIB_HEADER_SIZE;
pub const SIGNATURE: [u8; 2] = *b"BM";
pub const PALETTE_ENTRY_SIZE: usize = 4;

pub const SUPPORTED_BIT_DEPTH: [u16; 6] = [1, 4, 8, 16, 24, 32];
pub const BI_RGB: u32 = 0;

/// Byte offsets of every header field, counted from the start of the file.
mod offset {
    pub const SIGNATURE: usize = 0;
    pub const SIZE: usize = 2;
    pub const RESERVED: usize = 6;
    pub const BITS_OFFSET: usize = 10;
    pub const HEADER_SIZE: usize = 14;
    pub const WIDTH: usize = 18;
    pub const HEIGHT: usize = 22;
    pub const COLOR_PLANES: usize = 26;
    pub const BIT_DEPTH: usize = 28;
    pub const COMPRESSION_METHOD: usize = 30;
    pub const IMAGE_SIZE: usize = 34;
    pub const PIX_PER_METER_X: usize = 38;
    pub const PIX_PER_METER_Y: usize = 42;
    pub const COLOR_COUNT: usize = 46;
    pub const IMP_COLOR_COUNT: usize = 50;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitmapFileHeader {
    pub signature: [u8; 2],
    pub size: u32,
    pub reserved: u32,
    pub bits_offset: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitmapImageHeader {
    pub header_size: u32,
    pub width: i32,
    /// Negative for top-down row order.
    pub height: i32,
    pub color_planes: u16,
    pub bit_depth: u16,
    pub compression_method: u32,
    pub image_size: u32,
    pub pix_per_meter_x: i32,
    pub pix_per_meter_y: i32,
    pub color_count: u32,
    pub imp_color_count: u32,
}

/// The 14-byte file header followed by the 40-byte info header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitmapHeader {
    pub file_header: BitmapFileHeader,
    pub image_header: BitmapImageHeader,
}

/// Where the parts of a bitmap sit inside the buffer it was parsed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitmapLayout {
    pub header: BitmapHeader,
    /// Color table as sized by the declared bit depth, cut short at end of file.
    pub palette: Range<usize>,
    /// From the declared pixel offset (kept inside the buffer) to end of file.
    pub pixels: Range<usize>,
}

/// Largest palette a bit depth can index, or `None` for direct-color depths.
pub fn max_palette_entries(bit_depth: u16) -> Option<u32> {
    match bit_depth {
        1 | 4 | 8 => Some(1 << bit_depth),
        _ => None,
    }
}

impl BitmapImageHeader {
    /// Number of color table entries, treating 0 or an impossible count as "full table".
    pub fn palette_entries(&self) -> u32 {
        match max_palette_entries(self.bit_depth) {
            Some(max) if self.color_count > 0 && self.color_count <= max => self.color_count,
            Some(max) => max,
            None => 0,
        }
    }

    pub fn palette_len(&self) -> usize {
        self.palette_entries() as usize * PALETTE_ENTRY_SIZE
    }
}

impl BitmapHeader {
    /// A well-formed header for an uncompressed bitmap with a full color table.
    pub fn new(width: i32, height: i32, bit_depth: u16) -> BitmapHeader {
        let mut image_header = BitmapImageHeader {
            header_size: DIB_HEADER_SIZE as u32,
            width,
            height,
            color_planes: 1,
            bit_depth,
            compression_method: BI_RGB,
            image_size: 0,
            pix_per_meter_x: 2835,
            pix_per_meter_y: 2835,
            color_count: 0,
            imp_color_count: 0,
        };
        let image_size = row_stride(width.unsigned_abs(), bit_depth) * height.unsigned_abs() as u64;
        image_header.image_size = image_size as u32;

        let bits_offset = (HEADER_SIZE + image_header.palette_len()) as u32;
        BitmapHeader {
            file_header: BitmapFileHeader {
                signature: SIGNATURE,
                size: bits_offset + image_size as u32,
                reserved: 0,
                bits_offset,
            },
            image_header,
        }
    }

    pub fn from_bytes(buf: &[u8]) -> Result<BitmapHeader, Error> {
        if buf.len() < HEADER_SIZE {
            return Err(Error::MalformedInput(format!(
                "{} bytes is shorter than the {HEADER_SIZE}-byte header",
                buf.len()
            )));
        }

        let signature = [buf[offset::SIGNATURE], buf[offset::SIGNATURE + 1]];
        if signature != SIGNATURE {
            return Err(Error::MalformedInput(format!(
                "signature {} is not BM",
                hex::encode_upper(signature)
            )));
        }

        let file_header = BitmapFileHeader {
            signature,
            size: LittleEndian::read_u32(&buf[offset::SIZE..]),
            reserved: LittleEndian::read_u32(&buf[offset::RESERVED..]),
            bits_offset: LittleEndian::read_u32(&buf[offset::BITS_OFFSET..]),
        };

        let image_header = BitmapImageHeader {
            header_size: LittleEndian::read_u32(&buf[offset::HEADER_SIZE..]),
            width: LittleEndian::read_i32(&buf[offset::WIDTH..]),
            height: LittleEndian::read_i32(&buf[offset::HEIGHT..]),
            color_planes: LittleEndian::read_u16(&buf[offset::COLOR_PLANES..]),
            bit_depth: LittleEndian::read_u16(&buf[offset::BIT_DEPTH..]),
            compression_method: LittleEndian::read_u32(&buf[offset::COMPRESSION_METHOD..]),
            image_size: LittleEndian::read_u32(&buf[offset::IMAGE_SIZE..]),
            pix_per_meter_x: LittleEndian::read_i32(&buf[offset::PIX_PER_METER_X..]),
            pix_per_meter_y: LittleEndian::read_i32(&buf[offset::PIX_PER_METER_Y..]),
            color_count: LittleEndian::read_u32(&buf[offset::COLOR_COUNT..]),
            imp_color_count: LittleEndian::read_u32(&buf[offset::IMP_COLOR_COUNT..]),
        };

        Ok(BitmapHeader {
            file_header,
            image_header,
        })
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        let (file, image) = (&self.file_header, &self.image_header);

        buf[offset::SIGNATURE..offset::SIZE].copy_from_slice(&file.signature);
        LittleEndian::write_u32(&mut buf[offset::SIZE..], file.size);
        LittleEndian::write_u32(&mut buf[offset::RESERVED..], file.reserved);
        LittleEndian::write_u32(&mut buf[offset::BITS_OFFSET..], file.bits_offset);

        LittleEndian::write_u32(&mut buf[offset::HEADER_SIZE..], image.header_size);
        LittleEndian::write_i32(&mut buf[offset::WIDTH..], image.width);
        LittleEndian::write_i32(&mut buf[offset::HEIGHT..], image.height);
        LittleEndian::write_u16(&mut buf[offset::COLOR_PLANES..], image.color_planes);
        LittleEndian::write_u16(&mut buf[offset::BIT_DEPTH..], image.bit_depth);
        LittleEndian::write_u32(&mut buf[offset::COMPRESSION_METHOD..], image.compression_method);
        LittleEndian::write_u32(&mut buf[offset::IMAGE_SIZE..], image.image_size);
        LittleEndian::write_i32(&mut buf[offset::PIX_PER_METER_X..], image.pix_per_meter_x);
        LittleEndian::write_i32(&mut buf[offset::PIX_PER_METER_Y..], image.pix_per_meter_y);
        LittleEndian::write_u32(&mut buf[offset::COLOR_COUNT..], image.color_count);
        LittleEndian::write_u32(&mut buf[offset::IMP_COLOR_COUNT..], image.imp_color_count);

        buf
    }
}

/// Split a raw file into header, color table and pixel regions.
///
/// Only a short buffer or a wrong signature is rejected; every other field is
/// returned as read, however inconsistent.
pub fn parse(bytes: &[u8]) -> Result<BitmapLayout, Error> {
    let header = BitmapHeader::from_bytes(bytes)?;

    let palette_end = (HEADER_SIZE + header.image_header.palette_len()).min(bytes.len());
    let pixels_start = (header.file_header.bits_offset as usize).clamp(palette_end, bytes.len());

    Ok(BitmapLayout {
        header,
        palette: HEADER_SIZE..palette_end,
        pixels: pixels_start..bytes.len(),
    })
}

/// Read the declared header without touching anything else.
pub fn parse_only(bytes: &[u8]) -> Result<BitmapHeader, Error> {
    BitmapHeader::from_bytes(bytes)
}

pub fn serialize(header: &BitmapHeader) -> [u8; HEADER_SIZE] {
    header.to_bytes()
}
