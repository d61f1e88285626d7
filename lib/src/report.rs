use std::fmt;

use crate::BitmapHeader;

/// Titled dump of every header field, followed by the raw 54 header bytes in hex.
pub struct HeaderReport<'a> {
    title: &'a str,
    header: &'a BitmapHeader,
}

impl<'a> HeaderReport<'a> {
    pub fn new(title: &'a str, header: &'a BitmapHeader) -> HeaderReport<'a> {
        HeaderReport { title, header }
    }
}

impl fmt::Display for HeaderReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let file = &self.header.file_header;
        let image = &self.header.image_header;

        writeln!(f, "{}", self.title)?;
        writeln!(
            f,
            "  {:<16}: {} ({})",
            "signature",
            String::from_utf8_lossy(&file.signature),
            hex::encode(file.signature)
        )?;
        writeln!(f, "  {:<16}: {}", "file_size", file.size)?;
        writeln!(f, "  {:<16}: {}", "reserved", hex::encode(file.reserved.to_le_bytes()))?;
        writeln!(f, "  {:<16}: {}", "offset", file.bits_offset)?;
        writeln!(f, "  {:<16}: {}", "dib_size", image.header_size)?;
        writeln!(f, "  {:<16}: {}", "width", image.width)?;
        writeln!(f, "  {:<16}: {}", "height", image.height)?;
        writeln!(f, "  {:<16}: {}", "planes", image.color_planes)?;
        writeln!(f, "  {:<16}: {}", "bpp", image.bit_depth)?;
        writeln!(f, "  {:<16}: {}", "compression", image.compression_method)?;
        writeln!(f, "  {:<16}: {}", "image_size", image.image_size)?;
        writeln!(f, "  {:<16}: {}", "x_ppm", image.pix_per_meter_x)?;
        writeln!(f, "  {:<16}: {}", "y_ppm", image.pix_per_meter_y)?;
        writeln!(f, "  {:<16}: {}", "colors_used", image.color_count)?;
        writeln!(f, "  {:<16}: {}", "colors_important", image.imp_color_count)?;

        let raw = self.header.to_bytes();
        for (i, line) in raw.chunks(16).enumerate() {
            let label = if i == 0 { "raw" } else { "" };
            writeln!(f, "  {:<16}  {:04x}: {}", label, i * 16, hex::encode(line))?;
        }
        Ok(())
    }
}
