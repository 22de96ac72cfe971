use std::collections::HashMap;

use super::types::{YencEnd, YencHeader, YencPart};
use crate::error::{PostError, PostResult};

fn invalid(message: impl Into<String>) -> PostError {
    PostError::Encoding(message.into())
}

fn required<T: std::str::FromStr>(params: &HashMap<&str, &str>, key: &str) -> PostResult<T> {
    params
        .get(key)
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| invalid(format!("Missing '{}' parameter", key)))
}

/// Parse yEnc =ybegin header line
///
/// Format: =ybegin [part=1 total=5] line=128 size=123456 name=file.bin
pub(crate) fn parse_ybegin(line: &str) -> PostResult<YencHeader> {
    let rest = line
        .strip_prefix("=ybegin ")
        .ok_or_else(|| invalid(format!("Invalid yEnc header: {}", line)))?;
    let params = parse_yenc_params(rest);

    let name = params
        .get("name")
        .ok_or_else(|| invalid("Missing 'name' parameter"))?
        .to_string();

    Ok(YencHeader {
        line: required(&params, "line")?,
        size: required(&params, "size")?,
        name,
        part: params.get("part").and_then(|s| s.parse().ok()),
        total: params.get("total").and_then(|s| s.parse().ok()),
    })
}

/// Parse yEnc =ypart line
///
/// Format: =ypart begin=1 end=123456
pub(crate) fn parse_ypart(line: &str) -> PostResult<YencPart> {
    let rest = line
        .strip_prefix("=ypart ")
        .ok_or_else(|| invalid(format!("Invalid yEnc part header: {}", line)))?;
    let params = parse_yenc_params(rest);

    let part = YencPart {
        begin: required(&params, "begin")?,
        end: required(&params, "end")?,
    };
    if part.begin == 0 || part.end < part.begin {
        return Err(invalid(format!(
            "Invalid part range {}-{}",
            part.begin, part.end
        )));
    }
    Ok(part)
}

/// Parse yEnc =yend line
///
/// Format: =yend size=123456 [part=1] [pcrc32=87654321] [crc32=12345678]
pub(crate) fn parse_yend(line: &str) -> PostResult<YencEnd> {
    let rest = line
        .strip_prefix("=yend ")
        .ok_or_else(|| invalid(format!("Invalid yEnc trailer: {}", line)))?;
    let params = parse_yenc_params(rest);

    // CRCs are hex
    let hex = |key: &str| {
        params
            .get(key)
            .and_then(|s| u32::from_str_radix(s, 16).ok())
    };

    Ok(YencEnd {
        size: required(&params, "size")?,
        part: params.get("part").and_then(|s| s.parse().ok()),
        crc32: hex("crc32"),
        pcrc32: hex("pcrc32"),
    })
}

/// Parse yEnc key=value parameters
///
/// `name` is always the last parameter and takes the rest of the line, so
/// file names may contain spaces and '=' characters.
fn parse_yenc_params(params: &str) -> HashMap<&str, &str> {
    let mut result = HashMap::new();
    let mut rest = params;

    loop {
        rest = rest.trim_start_matches(' ');
        let Some((key, after)) = rest.split_once('=') else {
            break;
        };
        if key.is_empty() || key.contains(' ') {
            break;
        }
        if key == "name" {
            result.insert(key, after);
            break;
        }
        let (value, remaining) = after.split_once(' ').unwrap_or((after, ""));
        result.insert(key, value);
        rest = remaining;
    }

    result
}
