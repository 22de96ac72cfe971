use std::io::Write;

use crc32fast::Hasher;

use super::types::PartInfo;
use crate::error::{PostError, PostResult};

/// Longest line the yEnc draft permits
pub const MAX_LINE_LENGTH: usize = 997;

/// Encode one part of a file as a multipart yEnc body
///
/// The body consists of the `=ybegin`/`=ypart` header lines, the encoded data
/// lines and the `=yend` trailer carrying `pcrc32` (this part) and, when known,
/// `crc32` (the whole file). Every line ends in CRLF.
///
/// # Example
///
/// ```
/// use nntp_poster::yenc::{self, PartInfo};
///
/// let info = PartInfo {
///     name: "data.bin",
///     part: 1,
///     total: 1,
///     offset: 0,
///     file_size: 5,
///     file_crc32: None,
/// };
/// let body = yenc::encode_part(b"Hello", &info, 128).unwrap();
/// let decoded = yenc::decode(&body).unwrap();
/// assert_eq!(decoded.data, b"Hello");
/// ```
///
/// # Errors
///
/// [`PostError::Encoding`] when `line_length` is outside 1..=997 or the part
/// does not fit inside the file.
pub fn encode_part(data: &[u8], info: &PartInfo<'_>, line_length: usize) -> PostResult<Vec<u8>> {
    if line_length == 0 || line_length > MAX_LINE_LENGTH {
        return Err(PostError::Encoding(format!(
            "Invalid line length: {} (must be 1-{})",
            line_length, MAX_LINE_LENGTH
        )));
    }
    let end = info.offset + data.len() as u64;
    if end > info.file_size || info.part == 0 || info.part > info.total {
        return Err(PostError::Encoding(format!(
            "part {}/{} at {}..{} does not fit a file of {} bytes",
            info.part, info.total, info.offset, end, info.file_size
        )));
    }

    // ~2% escape overhead plus CRLF per line plus header and trailer
    let mut output =
        Vec::with_capacity(data.len() + data.len() / 32 + 2 * (data.len() / line_length + 1) + 256);

    // Write on a Vec<u8> cannot fail
    let _ = write!(
        output,
        "=ybegin part={} total={} line={} size={} name={}\r\n=ypart begin={} end={}\r\n",
        info.part,
        info.total,
        line_length,
        info.file_size,
        info.name,
        info.offset + 1,
        end
    );

    encode_lines(data, line_length, &mut output);

    let mut hasher = Hasher::new();
    hasher.update(data);
    let pcrc32 = hasher.finalize();

    let _ = write!(
        output,
        "=yend size={} part={} pcrc32={:08x}",
        data.len(),
        info.part,
        pcrc32
    );
    if let Some(crc32) = info.file_crc32 {
        let _ = write!(output, " crc32={:08x}", crc32);
    }
    output.extend_from_slice(b"\r\n");

    Ok(output)
}

/// Encode data lines into `output`
///
/// yEnc encoding: output = (input + 42) mod 256, escaped bytes are written as
/// `=` followed by (output + 64) mod 256.
fn encode_lines(data: &[u8], line_length: usize, output: &mut Vec<u8>) {
    let last = data.len().saturating_sub(1);
    let mut column = 0;

    for (i, &byte) in data.iter().enumerate() {
        let encoded = byte.wrapping_add(42);
        let mut escape = needs_escape(encoded, column, line_length, i == last);
        let width = if escape { 2 } else { 1 };

        if column > 0 && column + width > line_length {
            // The line now ends one byte early; whitespace there must not stay raw
            if let Some(&space @ (b' ' | b'\t')) = output.last() {
                output.pop();
                output.push(b'=');
                output.push(space.wrapping_add(64));
            }
            output.extend_from_slice(b"\r\n");
            column = 0;
            escape = needs_escape(encoded, column, line_length, i == last);
        }

        if escape {
            output.push(b'=');
            output.push(encoded.wrapping_add(64));
            column += 2;
        } else {
            output.push(encoded);
            column += 1;
        }

        if column >= line_length {
            output.extend_from_slice(b"\r\n");
            column = 0;
        }
    }

    if column > 0 {
        output.extend_from_slice(b"\r\n");
    }
}

/// Whether an encoded byte must be escaped at `column`
///
/// NUL, LF, CR and '=' always; TAB and SPACE at the start or end of a line;
/// '.' at the start of a line.
fn needs_escape(encoded: u8, column: usize, line_length: usize, is_last: bool) -> bool {
    match encoded {
        0x00 | b'\n' | b'\r' | b'=' => true,
        b'\t' | b' ' => column == 0 || column + 1 >= line_length || is_last,
        b'.' => column == 0,
        _ => false,
    }
}
