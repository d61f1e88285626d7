use std::iter;

use crate::solver::{Dimensions, Solver};
use crate::variant::{RepairedImage, Template};
use crate::{
    max_palette_entries, parse_only, BitmapHeader, Error, BI_RGB, DIB_HEADER_SIZE, HEADER_SIZE,
    SUPPORTED_BIT_DEPTH,
};

/// How far brute mode moves the declared width and height by default.
pub const DEFAULT_SEARCH_RADIUS: u32 = 16;
/// Larger radii are clamped. The search is linear in the radius.
pub const MAX_SEARCH_RADIUS: u32 = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepairOptions {
    /// Also collect alternate dimensions near the declared ones.
    pub brute: bool,
    /// Clamped to [`MAX_SEARCH_RADIUS`].
    pub search_radius: u32,
    /// Bit depth to trust instead of the declared one.
    pub bit_depth: Option<u16>,
}

impl Default for RepairOptions {
    fn default() -> Self {
        RepairOptions {
            brute: false,
            search_radius: DEFAULT_SEARCH_RADIUS,
            bit_depth: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confidence {
    /// The primary image uses every pixel byte with nothing left over.
    Exact,
    /// No exact fit exists; the primary is a clamped guess.
    Low,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairResult<'a> {
    /// Header as it was read.
    pub original: BitmapHeader,
    pub primary: RepairedImage<'a>,
    /// Brute mode only, closest to the declared dimensions first.
    pub alternates: Vec<RepairedImage<'a>>,
    pub confidence: Confidence,
    /// Bytes past the primary's pixel array. None of the outputs carry them.
    pub trailing: &'a [u8],
}

impl<'a> RepairResult<'a> {
    pub fn images(&self) -> impl Iterator<Item = &RepairedImage<'a>> {
        iter::once(&self.primary).chain(self.alternates.iter())
    }
}

fn check_format(bit_depth: u16, compression_method: u32) -> Result<(), Error> {
    if compression_method != BI_RGB {
        return Err(Error::UnsupportedCompression(compression_method));
    }
    if !SUPPORTED_BIT_DEPTH.contains(&bit_depth) {
        return Err(Error::UnsupportedBitDepth(bit_depth));
    }
    Ok(())
}

/// Fields that do not depend on the chosen width and height.
fn corrected_header(original: &BitmapHeader, bit_depth: u16) -> BitmapHeader {
    let mut header = *original;

    let image = &mut header.image_header;
    image.header_size = DIB_HEADER_SIZE as u32;
    image.color_planes = 1;
    image.bit_depth = bit_depth;
    if max_palette_entries(bit_depth).is_some_and(|max| image.color_count > max) {
        image.color_count = 0;
    }

    header.file_header.bits_offset = (HEADER_SIZE + header.image_header.palette_len()) as u32;
    header
}

fn log_corrections(before: &BitmapHeader, after: &BitmapHeader) {
    let (bf, bi) = (&before.file_header, &before.image_header);
    let (af, ai) = (&after.file_header, &after.image_header);
    let fields = [
        ("file_size", bf.size as i64, af.size as i64),
        ("pixel_offset", bf.bits_offset as i64, af.bits_offset as i64),
        ("dib_size", bi.header_size as i64, ai.header_size as i64),
        ("width", bi.width as i64, ai.width as i64),
        ("height", bi.height as i64, ai.height as i64),
        ("planes", bi.color_planes as i64, ai.color_planes as i64),
        ("bpp", bi.bit_depth as i64, ai.bit_depth as i64),
        ("image_size", bi.image_size as i64, ai.image_size as i64),
        ("colors_used", bi.color_count as i64, ai.color_count as i64),
    ];
    for (name, was, now) in fields {
        if was != now {
            tracing::debug!("{}: {} -> {}", name, was, now);
        }
    }
}

/// Rebuild the headers of a tampered bitmap from the bytes it actually holds.
///
/// The declared bit depth (or `options.bit_depth`) is trusted; sizes, offsets,
/// width and height are not. The color table is kept byte for byte. Anything
/// after the pixel rows of the chosen dimensions is left out of every output,
/// see [`RepairResult::trailing`].
///
/// Fails only when the input is not a usable bitmap at all, or when a repaired
/// file would not fit the 32-bit size field. When no width and
/// height consume the pixel bytes exactly, the result is a best-effort guess
/// marked [`Confidence::Low`].
pub fn repair<'a>(bytes: &'a [u8], options: &RepairOptions) -> Result<RepairResult<'a>, Error> {
    let original = parse_only(bytes)?;
    let bit_depth = options
        .bit_depth
        .unwrap_or(original.image_header.bit_depth);
    check_format(bit_depth, original.image_header.compression_method)?;

    let header = corrected_header(&original, bit_depth);
    let pixels_start = header.file_header.bits_offset as usize;
    if pixels_start > bytes.len() {
        return Err(Error::MalformedInput(format!(
            "color table runs to byte {}, past the end of the {}-byte file",
            pixels_start,
            bytes.len()
        )));
    }

    let template = Template {
        header,
        palette: &bytes[HEADER_SIZE..pixels_start],
        available: &bytes[pixels_start..],
    };
    let solver = Solver::new(
        template.available.len() as u64,
        bit_depth,
        Dimensions::declared(&original.image_header),
    );
    tracing::debug!(
        "{} pixel bytes at {} bpp, declared {}",
        template.available.len(),
        bit_depth,
        solver.declared()
    );

    let ranked = if options.brute {
        let radius = options.search_radius.min(MAX_SEARCH_RADIUS);
        if radius < options.search_radius {
            tracing::warn!(
                "search radius {} clamped to {}",
                options.search_radius,
                radius
            );
        }
        solver
            .enumerate(radius)
            .unwrap_or_else(|err| {
                tracing::debug!("brute search: {}", err);
                Vec::new()
            })
    } else {
        Vec::new()
    };

    let (primary, confidence) = match (solver.solve(), ranked.first()) {
        (Ok(dimensions), _) => (template.variant(dimensions, None)?, Confidence::Exact),
        (Err(_), Some(best)) => (
            template.variant(best.dimensions, Some(best.varied))?,
            Confidence::Exact,
        ),
        (Err(err), None) => {
            let guess = solver.best_effort();
            tracing::warn!("{}; falling back to {}", err, guess);
            (template.variant(guess, None)?, Confidence::Low)
        }
    };

    let alternates = ranked
        .iter()
        .filter(|candidate| candidate.dimensions != primary.dimensions())
        .map(|candidate| template.variant(candidate.dimensions, Some(candidate.varied)))
        .collect::<Result<Vec<RepairedImage<'a>>, Error>>()?;

    let trailing = &template.available[primary.pixels.len()..];
    if !trailing.is_empty() {
        tracing::warn!(
            "dropping {} bytes after the pixel array at offset {}",
            trailing.len(),
            pixels_start + primary.pixels.len()
        );
    }
    log_corrections(&original, &primary.header);

    Ok(RepairResult {
        original,
        primary,
        alternates,
        confidence,
        trailing,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::Axis;
    use byteorder::{ByteOrder, LittleEndian};

    fn bitmap(width: i32, height: i32, bit_depth: u16) -> Vec<u8> {
        let header = BitmapHeader::new(width, height, bit_depth);
        let mut bytes = header.to_bytes().to_vec();
        for i in 0..header.image_header.palette_entries() {
            bytes.extend([i as u8, (i * 3) as u8, (i * 7) as u8, 0]);
        }
        let pixels = header.image_header.image_size as usize;
        bytes.extend((0..pixels).map(|i| (i % 251) as u8));
        bytes
    }

    fn brute() -> RepairOptions {
        RepairOptions {
            brute: true,
            ..RepairOptions::default()
        }
    }

    #[test]
    fn tampered_offset_is_reset() {
        let mut bytes = bitmap(8, 50, 24);
        LittleEndian::write_u32(&mut bytes[10..14], 999_999);

        let result = repair(&bytes, &RepairOptions::default()).unwrap();
        assert_eq!(result.primary.header.file_header.bits_offset, 54);
        assert_eq!(result.confidence, Confidence::Exact);
        assert_eq!(result.primary.to_bytes(), bitmap(8, 50, 24));
    }

    #[test]
    fn every_size_field_is_recomputed() {
        let clean = bitmap(16, 16, 8);
        let mut bytes = clean.clone();
        LittleEndian::write_u32(&mut bytes[2..6], 7);
        LittleEndian::write_u32(&mut bytes[10..14], 54);
        LittleEndian::write_u32(&mut bytes[14..18], 12);
        LittleEndian::write_i32(&mut bytes[18..22], 16);
        LittleEndian::write_i32(&mut bytes[22..26], 3);
        LittleEndian::write_u16(&mut bytes[26..28], 9);

        let result = repair(&bytes, &RepairOptions::default()).unwrap();
        assert_eq!(result.primary.to_bytes(), clean);
        assert_eq!(result.original.image_header.height, 3);
    }

    #[test]
    fn oversized_color_count_means_full_table() {
        let mut bytes = bitmap(4, 4, 4);
        LittleEndian::write_u32(&mut bytes[46..50], 5000);

        let result = repair(&bytes, &RepairOptions::default()).unwrap();
        assert_eq!(result.primary.header.image_header.color_count, 0);
        assert_eq!(result.primary.palette, &bytes[54..54 + 64]);
    }

    #[test]
    fn trailing_junk_is_dropped() {
        let clean = bitmap(8, 50, 24);
        let mut bytes = clean.clone();
        bytes.extend(b"flag{hidden}");

        let result = repair(&bytes, &RepairOptions::default()).unwrap();
        assert_eq!(result.trailing, b"flag{hidden}");
        assert_eq!(result.primary.to_bytes(), clean);
    }

    #[test]
    fn truncated_palette_is_malformed() {
        let bytes = bitmap(4, 4, 8);
        let err = repair(&bytes[..300], &RepairOptions::default()).unwrap_err();
        assert!(matches!(err, Error::MalformedInput(_)));
    }

    #[test]
    fn compressed_input_is_unsupported() {
        let mut bytes = bitmap(4, 4, 24);
        LittleEndian::write_u32(&mut bytes[30..34], 1);
        let err = repair(&bytes, &RepairOptions::default()).unwrap_err();
        assert_eq!(err, Error::UnsupportedCompression(1));
        assert!(err.is_fatal());
    }

    #[test]
    fn odd_bit_depth_is_unsupported() {
        let bytes = bitmap(4, 4, 24);
        let options = RepairOptions {
            bit_depth: Some(12),
            ..RepairOptions::default()
        };
        assert_eq!(
            repair(&bytes, &options).unwrap_err(),
            Error::UnsupportedBitDepth(12)
        );
    }

    #[test]
    fn bit_depth_override_replaces_the_anchor() {
        let clean = bitmap(6, 5, 32);
        let mut bytes = clean.clone();
        LittleEndian::write_u16(&mut bytes[28..30], 24);

        let options = RepairOptions {
            bit_depth: Some(32),
            ..RepairOptions::default()
        };
        let result = repair(&bytes, &options).unwrap();
        assert_eq!(result.primary.header.image_header.bit_depth, 32);
        assert_eq!(result.primary.to_bytes(), clean);
    }

    #[test]
    fn no_exact_fit_falls_back_to_low_confidence() {
        let mut bytes = bitmap(8, 50, 24);
        bytes.push(0xff);
        LittleEndian::write_i32(&mut bytes[22..26], 7);

        let result = repair(&bytes, &brute()).unwrap();
        assert_eq!(result.confidence, Confidence::Low);
        assert!(result.alternates.is_empty());
        assert_eq!(result.primary.dimensions(), Dimensions { width: 8, height: 50 });
        assert_eq!(result.trailing, &[0xff]);
    }

    #[test]
    fn brute_mode_promotes_best_candidate() {
        let pixels = 4 * 24990;
        let mut bytes = BitmapHeader::new(100, 1000, 32).to_bytes().to_vec();
        bytes.resize(54 + pixels, 0x11);

        let options = RepairOptions {
            search_radius: 5,
            ..brute()
        };
        let result = repair(&bytes, &options).unwrap();
        assert_eq!(result.confidence, Confidence::Exact);
        assert_eq!(result.primary.varied, Some(Axis::Width));

        let widths: Vec<u32> = result.images().map(|i| i.dimensions().width).collect();
        assert_eq!(widths, vec![98, 102, 105]);
        assert!(result.images().all(|i| i.file_len() == bytes.len()));
    }

    #[test]
    fn brute_mode_skips_the_primary() {
        let bytes = bitmap(8, 50, 24);
        let result = repair(&bytes, &brute()).unwrap();

        assert_eq!(result.primary.varied, None);
        assert!(result
            .alternates
            .iter()
            .all(|image| image.dimensions() != Dimensions { width: 8, height: 50 }));
        assert!(!result.alternates.is_empty());
    }

    #[test]
    fn held_height_variant_is_a_width_move() {
        let bytes = bitmap(7, 50, 24);
        let options = RepairOptions {
            search_radius: 2,
            ..brute()
        };
        let result = repair(&bytes, &options).unwrap();

        assert_eq!(result.primary.dimensions(), Dimensions { width: 7, height: 50 });
        let alternates: Vec<(u32, u32, Option<Axis>)> = result
            .alternates
            .iter()
            .map(|i| (i.dimensions().width, i.dimensions().height, i.varied))
            .collect();
        assert_eq!(
            alternates,
            vec![
                (6, 60, Some(Axis::Width)),
                (8, 50, Some(Axis::Width)),
                (5, 75, Some(Axis::Width)),
            ]
        );
    }

    #[test]
    fn oversized_search_radius_is_clamped() {
        let bytes = bitmap(8, 50, 24);
        let clamped = RepairOptions {
            search_radius: MAX_SEARCH_RADIUS,
            ..brute()
        };
        let huge = RepairOptions {
            search_radius: u32::MAX,
            ..brute()
        };
        assert_eq!(repair(&bytes, &huge).unwrap(), repair(&bytes, &clamped).unwrap());
    }

    #[test]
    fn empty_pixel_array_still_yields_a_file() {
        let bytes = BitmapHeader::new(3, 3, 24).to_bytes();
        let result = repair(&bytes, &RepairOptions::default()).unwrap();

        assert_eq!(result.confidence, Confidence::Low);
        assert_eq!(result.primary.dimensions(), Dimensions { width: 1, height: 1 });
        assert_eq!(result.primary.padding, 4);
        assert_eq!(result.primary.to_bytes().len(), 58);
    }
}
