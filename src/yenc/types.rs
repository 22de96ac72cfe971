/// Position of one encoded part within its file
///
/// `offset` is 0-based; the `=ypart` line carries the 1-based inclusive range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartInfo<'a> {
    /// File name placed in `=ybegin name=`
    pub name: &'a str,
    /// Part number, 1-based
    pub part: u32,
    /// Total number of parts of the file
    pub total: u32,
    /// Offset of the part's first byte in the file
    pub offset: u64,
    /// Size of the whole file
    pub file_size: u64,
    /// CRC32 of the whole file, written as `crc32=` in the trailer
    pub file_crc32: Option<u32>,
}

/// yEnc header from =ybegin line
#[derive(Debug, Clone, PartialEq)]
pub struct YencHeader {
    /// Line length (typically 128, max 997)
    pub line: usize,
    /// Total file size in bytes
    pub size: u64,
    /// Original filename
    pub name: String,
    /// Part number (for multi-part files)
    pub part: Option<u32>,
    /// Total number of parts (for multi-part files)
    pub total: Option<u32>,
}

/// yEnc part header from =ypart line (for multi-part files)
#[derive(Debug, Clone, PartialEq)]
pub struct YencPart {
    /// Byte offset where this part begins in the original file (1-based)
    pub begin: u64,
    /// Byte offset where this part ends in the original file (inclusive)
    pub end: u64,
}

/// yEnc trailer from =yend line
#[derive(Debug, Clone, PartialEq)]
pub struct YencEnd {
    /// Size of decoded data in bytes
    pub size: u64,
    /// Part number repeated in the trailer
    pub part: Option<u32>,
    /// CRC32 of the entire file
    pub crc32: Option<u32>,
    /// CRC32 of this part only (for multi-part files)
    pub pcrc32: Option<u32>,
}

/// Complete yEnc decoded result
#[derive(Debug, Clone)]
pub struct YencDecoded {
    /// Parsed header information
    pub header: YencHeader,
    /// Part information (for multi-part files)
    pub part: Option<YencPart>,
    /// Trailer information
    pub trailer: YencEnd,
    /// Decoded binary data
    pub data: Vec<u8>,
    /// Calculated CRC32 of decoded data
    pub calculated_crc32: u32,
}

impl YencDecoded {
    /// Verify the decoded size and CRC32 against the trailer
    ///
    /// Multi-part bodies are checked against `pcrc32`, single-part bodies
    /// against `crc32`. A trailer without any CRC never verifies.
    pub fn verify_crc32(&self) -> bool {
        if self.trailer.size != self.data.len() as u64 {
            return false;
        }
        match (self.trailer.pcrc32, self.trailer.crc32) {
            (Some(expected), _) => self.calculated_crc32 == expected,
            (None, Some(expected)) => self.calculated_crc32 == expected,
            (None, None) => false,
        }
    }

    /// Check if this is a multi-part file
    pub fn is_multipart(&self) -> bool {
        self.header.part.is_some() && self.header.total.is_some()
    }
}
