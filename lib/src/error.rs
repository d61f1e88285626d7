use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Malformed bitmap: {0}")]
    MalformedInput(String),

    #[error("Unsupported compression method: {0}")]
    UnsupportedCompression(u32),

    #[error("Unsupported bit depth: {0}")]
    UnsupportedBitDepth(u16),

    #[error("No width/height consumes exactly {pixel_bytes} pixel bytes at {bit_depth} bpp")]
    NoConsistentDimensions { pixel_bytes: u64, bit_depth: u16 },
}

impl Error {
    /// Whether the error aborts a repair. Only dimension ambiguity is recoverable.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::NoConsistentDimensions { .. })
    }
}
