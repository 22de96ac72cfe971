use crc32fast::Hasher;

use super::params::{parse_ybegin, parse_yend, parse_ypart};
use super::types::YencDecoded;
use crate::error::{PostError, PostResult};

/// Decode a yEnc encoded body
///
/// Accepts single-part and multipart bodies with CRLF or bare LF line endings.
/// The CRC32 of the decoded bytes is computed; compare it against the trailer
/// with [`YencDecoded::verify_crc32`].
///
/// # Errors
///
/// [`PostError::Encoding`] when the header or trailer is missing or malformed,
/// or an escape sequence is cut off.
pub fn decode(input: &[u8]) -> PostResult<YencDecoded> {
    let lines: Vec<&[u8]> = input
        .split(|&b| b == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
        .collect();

    let header_idx = lines
        .iter()
        .position(|line| line.starts_with(b"=ybegin "))
        .ok_or_else(|| PostError::Encoding("Missing =ybegin header".to_string()))?;
    let header = parse_ybegin(ascii_line(lines[header_idx], "header")?)?;

    let mut part = None;
    let mut data_start = header_idx + 1;
    if let Some(line) = lines.get(data_start)
        && line.starts_with(b"=ypart ")
    {
        part = Some(parse_ypart(ascii_line(line, "part header")?)?);
        data_start += 1;
    }

    let trailer_idx = lines
        .iter()
        .rposition(|line| line.starts_with(b"=yend "))
        .filter(|&idx| idx >= data_start)
        .ok_or_else(|| PostError::Encoding("Missing =yend trailer".to_string()))?;
    let trailer = parse_yend(ascii_line(lines[trailer_idx], "trailer")?)?;

    let mut data = Vec::with_capacity(trailer.size as usize);
    for line in &lines[data_start..trailer_idx] {
        decode_line_bytes(line, &mut data)?;
    }

    let mut hasher = Hasher::new();
    hasher.update(&data);
    let calculated_crc32 = hasher.finalize();

    Ok(YencDecoded {
        header,
        part,
        trailer,
        data,
        calculated_crc32,
    })
}

fn ascii_line<'a>(line: &'a [u8], what: &str) -> PostResult<&'a str> {
    std::str::from_utf8(line)
        .map_err(|_| PostError::Encoding(format!("Invalid UTF-8 in {}", what)))
}

/// Decode a single yEnc encoded line
///
/// yEnc decoding: output = (input - 42) mod 256; `=X` decodes to (X - 64 - 42) mod 256.
fn decode_line_bytes(line: &[u8], output: &mut Vec<u8>) -> PostResult<()> {
    let mut bytes = line.iter();
    while let Some(&byte) = bytes.next() {
        if byte == b'=' {
            let &escaped = bytes.next().ok_or_else(|| {
                PostError::Encoding("Incomplete escape sequence at end of line".to_string())
            })?;
            output.push(escaped.wrapping_sub(64).wrapping_sub(42));
        } else {
            output.push(byte.wrapping_sub(42));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_simple() {
        // "Test" is 126 143 157 158 after adding 42
        let mut input = Vec::new();
        input.extend_from_slice(b"=ybegin line=128 size=4 name=test.txt\n");
        input.extend_from_slice(&[126, 143, 157, 158]);
        input.push(b'\n');
        input.extend_from_slice(b"=yend size=4 crc32=784dd132\n");

        let result = decode(&input).unwrap();
        assert_eq!(result.data, b"Test");
        assert_eq!(result.header.name, "test.txt");
        assert_eq!(result.calculated_crc32, crc32fast::hash(b"Test"));
    }

    #[test]
    fn test_decode_with_escape() {
        // Byte 214 encodes to NUL and is written as =@
        let input = b"=ybegin line=128 size=1 name=test.bin\r\n=@\r\n=yend size=1\r\n";
        let result = decode(input).unwrap();
        assert_eq!(result.data, b"\xd6");
        assert!(!result.verify_crc32(), "no CRC in trailer");
    }

    #[test]
    fn test_decode_multipart() {
        let input = b"=ybegin part=1 total=2 line=128 size=768000 name=file.rar\n\
                      =ypart begin=1 end=384000\n\
                      test_data_here\n\
                      =yend size=384000 part=1 pcrc32=abcd1234\n";

        let result = decode(input).unwrap();
        assert!(result.is_multipart());
        assert_eq!(result.header.part, Some(1));
        assert_eq!(result.header.total, Some(2));
        let part = result.part.unwrap();
        assert_eq!((part.begin, part.end), (1, 384000));
        assert_eq!(result.trailer.part, Some(1));
    }

    #[test]
    fn test_decode_errors() {
        assert!(decode(b"").is_err());
        assert!(decode(b"=ybegin line=128 size=1 name=a\r\nkk\r\n").is_err());
        assert!(decode(b"=ybegin line=128 size=1 name=a\r\nk=\r\n=yend size=1\r\n").is_err());
    }

    #[test]
    fn test_decode_line_bytes() {
        let mut output = Vec::new();
        decode_line_bytes(b"k=j", &mut output).unwrap();
        assert_eq!(output, b"A\x00");
    }
}
