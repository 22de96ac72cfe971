//! File segmentation into article-sized byte ranges
//!
//! A file is read in chunks of `chunk_size` bytes and every chunk is split into
//! pieces of at most `article_size` bytes. Pieces never straddle a chunk
//! boundary, so each piece belongs to exactly one chunk. Part numbers are
//! contiguous and start at 1.

use std::path::Path;

use crc32fast::Hasher;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, SeekFrom};
use tracing::{debug, trace};

use crate::error::{PostError, PostResult};

/// Byte layout of one file
///
/// # Example
///
/// ```
/// use nntp_poster::SegmentPlan;
///
/// let plan = SegmentPlan::new(25_000, 10_240, None);
/// let lengths: Vec<u64> = plan.ranges().map(|r| r.len).collect();
/// assert_eq!(lengths, vec![10_240, 10_240, 4_520]);
/// assert_eq!(plan.total_parts(), 3);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentPlan {
    file_size: u64,
    chunk_size: u64,
    piece_size: u64,
}

impl SegmentPlan {
    /// Plan the segmentation of a file
    ///
    /// When `article_size` is unset or not smaller than `chunk_size`, pieces
    /// equal chunks. Otherwise `chunk_size` is rounded down to a multiple of
    /// `article_size`. Zero sizes are treated as 1.
    pub fn new(file_size: u64, chunk_size: u64, article_size: Option<u64>) -> Self {
        let chunk_size = chunk_size.max(1);
        match article_size.map(|a| a.max(1)) {
            Some(article) if article < chunk_size => Self {
                file_size,
                chunk_size: chunk_size / article * article,
                piece_size: article,
            },
            _ => Self {
                file_size,
                chunk_size,
                piece_size: chunk_size,
            },
        }
    }

    /// Size of the planned file
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Effective chunk size, a multiple of the piece size
    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Payload of every article except possibly the last
    pub fn piece_size(&self) -> u64 {
        self.piece_size
    }

    /// Number of articles (0 for an empty file)
    ///
    /// Saturates at `u32::MAX`; [`check`](Self::check) rejects such plans.
    pub fn total_parts(&self) -> u32 {
        u32::try_from(self.file_size.div_ceil(self.piece_size)).unwrap_or(u32::MAX)
    }

    /// Number of chunks
    pub fn chunk_count(&self) -> u32 {
        u32::try_from(self.file_size.div_ceil(self.chunk_size)).unwrap_or(u32::MAX)
    }

    /// Check that every part and chunk number fits the u32 numbering
    ///
    /// # Errors
    ///
    /// [`PostError::Encoding`] when the file needs more than `u32::MAX` parts.
    pub fn check(&self) -> PostResult<()> {
        let parts = self.file_size.div_ceil(self.piece_size);
        if u32::try_from(parts).is_err() {
            return Err(PostError::Encoding(format!(
                "{} bytes in pieces of {} need {} parts, more than {}",
                self.file_size,
                self.piece_size,
                parts,
                u32::MAX
            )));
        }
        Ok(())
    }

    /// Fresh iterator over every byte range, in part order
    pub fn ranges(&self) -> ByteRanges {
        ByteRanges {
            plan: *self,
            offset: 0,
            part: 1,
        }
    }
}

/// One article's slice of the source file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    /// Part number, 1-based
    pub part: u32,
    /// Index of the enclosing chunk, 0-based
    pub chunk: u32,
    /// Offset of the first byte in the file
    pub offset: u64,
    /// Number of bytes
    pub len: u64,
}

impl ByteRange {
    /// Offset one past the last byte
    pub fn end(&self) -> u64 {
        self.offset + self.len
    }
}

/// Lazy iterator returned by [`SegmentPlan::ranges`]
#[derive(Debug, Clone)]
pub struct ByteRanges {
    plan: SegmentPlan,
    offset: u64,
    part: u32,
}

impl Iterator for ByteRanges {
    type Item = ByteRange;

    fn next(&mut self) -> Option<ByteRange> {
        if self.offset >= self.plan.file_size {
            return None;
        }
        let chunk = self.offset / self.plan.chunk_size;
        let chunk_end = ((chunk + 1) * self.plan.chunk_size).min(self.plan.file_size);
        let len = self.plan.piece_size.min(chunk_end - self.offset);

        let range = ByteRange {
            part: self.part,
            chunk: chunk as u32,
            offset: self.offset,
            len,
        };
        self.offset += len;
        self.part += 1;
        Some(range)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.plan.total_parts() + 1).saturating_sub(self.part) as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for ByteRanges {}

/// Checksums gathered by [`scan_file`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDigest {
    /// CRC32 of every piece, indexed by `part - 1`
    pub piece_crcs: Vec<u32>,
    /// CRC32 of every chunk
    pub chunk_crcs: Vec<u32>,
    /// CRC32 of the whole file
    pub file_crc32: u32,
}

/// Read a file once, chunk by chunk, and checksum it according to `plan`
///
/// # Errors
///
/// [`PostError::EmptyFile`] for an empty plan, [`PostError::Encoding`] when
/// the plan has too many parts or its chunks do not fit in memory,
/// [`PostError::File`] when the file cannot be opened or ends before the
/// planned size.
pub async fn scan_file(path: &Path, plan: &SegmentPlan) -> PostResult<FileDigest> {
    if plan.file_size() == 0 {
        return Err(PostError::EmptyFile(path.to_path_buf()));
    }
    plan.check()?;
    // Never larger than the file, whatever the configured chunk size
    let buffer_len = usize::try_from(plan.chunk_size().min(plan.file_size())).map_err(|_| {
        PostError::Encoding(format!(
            "chunk of {} bytes does not fit in memory",
            plan.chunk_size()
        ))
    })?;
    let file_error = |source| PostError::File {
        path: path.to_path_buf(),
        source,
    };

    let mut file = File::open(path).await.map_err(file_error)?;
    let mut buffer = vec![0u8; buffer_len];
    let mut file_hasher = Hasher::new();
    let mut piece_crcs = Vec::with_capacity(plan.total_parts() as usize);
    let mut chunk_crcs = Vec::with_capacity(plan.chunk_count() as usize);
    let mut ranges = plan.ranges().peekable();

    for chunk in 0..plan.chunk_count() {
        let chunk_start = u64::from(chunk) * plan.chunk_size();
        let chunk_len = plan.chunk_size().min(plan.file_size() - chunk_start) as usize;
        let data = &mut buffer[..chunk_len];
        file.read_exact(data).await.map_err(file_error)?;

        chunk_crcs.push(crc32fast::hash(data));
        file_hasher.update(data);

        while let Some(range) = ranges.next_if(|r| r.chunk == chunk) {
            let start = (range.offset - chunk_start) as usize;
            piece_crcs.push(crc32fast::hash(&data[start..start + range.len as usize]));
        }
        trace!(path = %path.display(), chunk, "chunk scanned");
    }

    let digest = FileDigest {
        piece_crcs,
        chunk_crcs,
        file_crc32: file_hasher.finalize(),
    };
    debug!(
        path = %path.display(),
        parts = digest.piece_crcs.len(),
        crc32 = %format!("{:08x}", digest.file_crc32),
        "file scanned"
    );
    Ok(digest)
}

/// Read one byte range of a file
///
/// # Errors
///
/// [`PostError::File`] when the file cannot be opened, or is shorter than the range.
pub async fn read_range(path: &Path, range: &ByteRange) -> PostResult<Vec<u8>> {
    let file_error = |source| PostError::File {
        path: path.to_path_buf(),
        source,
    };
    let mut file = File::open(path).await.map_err(file_error)?;
    file.seek(SeekFrom::Start(range.offset))
        .await
        .map_err(file_error)?;
    let mut data = vec![0u8; range.len as usize];
    file.read_exact(&mut data).await.map_err(file_error)?;
    Ok(data)
}
