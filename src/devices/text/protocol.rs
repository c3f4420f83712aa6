//! Text protocol codec
//!
//! Response format (one block, terminated by an empty line):
//!
//! ```text
//! MD0000108001000\n     echo of the command (no checksum)
//! 99b\n                 status (2 chars) + checksum
//! ABCD?\n               timestamp (4 chars) + checksum
//! <64 data chars>X\n    data lines, each with its own checksum
//! ...
//! \n                    empty line ends the block
//! ```
//!
//! Checksum: `(sum(payload) & 0x3F) + 0x30`.
//! Values use 6-bit packing: each character contributes `c - 0x30`,
//! most significant group first.

/// Block delimiter (end of last line + empty line)
pub const BLOCK_DELIMITER: &[u8] = b"\n\n";

/// Maximum data characters per line before the checksum
pub const DATA_LINE_LENGTH: usize = 64;

// Command codes
pub const CMD_STREAM_DISTANCES: [u8; 2] = *b"MD";
pub const CMD_STREAM_DISTANCES_INTENSITIES: [u8; 2] = *b"ME";
pub const CMD_GET_DISTANCES: [u8; 2] = *b"GD";
pub const CMD_GET_DISTANCES_INTENSITIES: [u8; 2] = *b"GE";
pub const CMD_LASER_ON: [u8; 2] = *b"BM";
pub const CMD_LASER_OFF: [u8; 2] = *b"QT";
pub const CMD_STATUS_INFO: [u8; 2] = *b"II";
pub const CMD_VERSION_INFO: [u8; 2] = *b"VV";
pub const CMD_PARAMETER_INFO: [u8; 2] = *b"PP";
pub const CMD_MOTOR_SPEED: [u8; 2] = *b"CR";
pub const CMD_REBOOT: [u8; 2] = *b"RB";
pub const CMD_RESET_STATUS: [u8; 2] = *b"RS";

// Status codes
pub const STATUS_OK: &[u8] = b"00";
pub const STATUS_STREAMING: &[u8] = b"99";

/// Characters per 12-bit value
pub const ENCODING_2_CHAR: usize = 2;
/// Characters per 18-bit value
pub const ENCODING_3_CHAR: usize = 3;

/// Compute the checksum character for a payload
#[inline]
pub fn checksum(payload: &[u8]) -> u8 {
    let sum = payload.iter().fold(0u32, |acc, &b| acc + b as u32);
    (sum & 0x3F) as u8 + 0x30
}

/// Validate a line and strip its trailing bytes
///
/// The checksum character is the last byte of `line` and covers everything
/// except the last `reserved` bytes. `reserved` is 1 for data/status lines
/// and 2 for info lines that end in `;` + checksum.
///
/// Returns the payload, or `None` if the checksum does not match.
pub fn decode_line(line: &[u8], reserved: usize) -> Option<&[u8]> {
    if reserved == 0 || line.len() <= reserved {
        return None;
    }
    let payload = &line[..line.len() - reserved];
    let received = line[line.len() - 1];
    (checksum(payload) == received).then_some(payload)
}

/// Append the checksum character to a payload
pub fn encode_line(payload: &[u8]) -> Vec<u8> {
    let mut line = Vec::with_capacity(payload.len() + 1);
    line.extend_from_slice(payload);
    line.push(checksum(payload));
    line
}

/// Decode one 6-bit packed group (2 chars = 12 bit, 3 chars = 18 bit)
#[inline]
pub fn decode_value(chars: &[u8]) -> u32 {
    chars.iter().fold(0u32, |acc, &c| {
        (acc << 6) | (c.wrapping_sub(0x30) & 0x3F) as u32
    })
}

/// Encode a value into `width` 6-bit packed characters
pub fn encode_value(value: u32, width: usize) -> Vec<u8> {
    (0..width)
        .rev()
        .map(|pos| ((value >> (6 * pos)) & 0x3F) as u8 + 0x30)
        .collect()
}

/// Decode `point_count` 3-character distances
///
/// Returns `None` if `raw` holds fewer than `point_count * 3` characters.
pub fn decode_distance_block(raw: &[u8], point_count: usize) -> Option<Vec<u32>> {
    let needed = point_count * ENCODING_3_CHAR;
    if raw.len() < needed {
        return None;
    }
    Some(
        raw[..needed]
            .chunks_exact(ENCODING_3_CHAR)
            .map(decode_value)
            .collect(),
    )
}

/// Decode `point_count` (distance, intensity) pairs, 3 characters each
pub fn decode_distance_intensity_block(
    raw: &[u8],
    point_count: usize,
) -> Option<(Vec<u32>, Vec<u32>)> {
    let needed = point_count * ENCODING_3_CHAR * 2;
    if raw.len() < needed {
        return None;
    }
    let mut distances = Vec::with_capacity(point_count);
    let mut intensities = Vec::with_capacity(point_count);
    for pair in raw[..needed].chunks_exact(ENCODING_3_CHAR * 2) {
        distances.push(decode_value(&pair[..ENCODING_3_CHAR]));
        intensities.push(decode_value(&pair[ENCODING_3_CHAR..]));
    }
    Some((distances, intensities))
}

/// Split encoded data characters into checksummed lines of at most 64 chars
pub fn encode_data_lines(data: &[u8]) -> Vec<Vec<u8>> {
    data.chunks(DATA_LINE_LENGTH).map(encode_line).collect()
}

/// Fixed-width header shared by every distance command echo
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    pub command: [u8; 2],
    pub start_step: u16,
    pub end_step: u16,
    pub cluster_count: u8,
}

impl Header {
    /// Number of values in the response
    pub fn point_count(&self) -> usize {
        if self.end_step < self.start_step {
            return 0;
        }
        let cluster = self.cluster_count.max(1) as usize;
        let span = (self.end_step - self.start_step) as usize + 1;
        span.div_ceil(cluster)
    }
}

/// Parse `CCssssEEEEcc` (command, start step, end step, cluster count)
pub fn parse_header(line: &[u8]) -> Option<Header> {
    if line.len() < 12 {
        return None;
    }
    Some(Header {
        command: [line[0], line[1]],
        start_step: parse_decimal(&line[2..6])? as u16,
        end_step: parse_decimal(&line[6..10])? as u16,
        cluster_count: parse_decimal(&line[10..12])? as u8,
    })
}

fn parse_decimal(digits: &[u8]) -> Option<u32> {
    digits.iter().try_fold(0u32, |acc, &d| {
        d.is_ascii_digit().then(|| acc * 10 + (d - b'0') as u32)
    })
}

/// Build `code` followed by zero-padded decimal fields, newline-terminated
///
/// Values wider than their field are clamped to the field's maximum.
pub fn build_command(code: [u8; 2], fields: &[(u32, usize)]) -> Vec<u8> {
    let mut cmd = Vec::with_capacity(2 + fields.iter().map(|f| f.1).sum::<usize>() + 1);
    cmd.extend_from_slice(&code);
    for &(value, width) in fields {
        let max = 10u32.saturating_pow(width as u32).saturating_sub(1);
        cmd.extend_from_slice(format!("{:0width$}", value.min(max), width = width).as_bytes());
    }
    cmd.push(b'\n');
    cmd
}

/// Streaming request: scan interval 0, scan count 00 (stream indefinitely)
pub fn stream_command(code: [u8; 2], start_step: u16, end_step: u16, cluster: u8) -> Vec<u8> {
    build_command(
        code,
        &[
            (start_step as u32, 4),
            (end_step as u32, 4),
            (cluster as u32, 2),
            (0, 1),
            (0, 2),
        ],
    )
}

/// Single-shot request
pub fn single_command(code: [u8; 2], start_step: u16, end_step: u16, cluster: u8) -> Vec<u8> {
    build_command(
        code,
        &[(start_step as u32, 4), (end_step as u32, 4), (cluster as u32, 2)],
    )
}

/// Split a `KEY:value` info payload
pub fn parse_info_field(payload: &[u8]) -> Option<(String, String)> {
    let colon = payload.iter().position(|&b| b == b':')?;
    let key = String::from_utf8_lossy(&payload[..colon]).trim().to_string();
    let value = String::from_utf8_lossy(&payload[colon + 1..]).to_string();
    (!key.is_empty()).then_some((key, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_known_status() {
        // "00" -> 0x60 & 0x3F = 0x20 -> 'P'
        assert_eq!(checksum(b"00"), b'P');
        // "99" -> 0x72 & 0x3F = 0x32 -> 'b'
        assert_eq!(checksum(b"99"), b'b');
    }

    #[test]
    fn test_checksum_round_trip() {
        for payload in [&b"00"[..], b"99", b"0C0C0C", b"VEND:Example Corp.", b"a"] {
            let line = encode_line(payload);
            assert_eq!(decode_line(&line, 1), Some(payload));
        }
    }

    #[test]
    fn test_corrupted_byte_rejected() {
        let payload = b"1Dh1Dh1Dh";
        let line = encode_line(payload);
        for i in 0..line.len() {
            let mut corrupted = line.clone();
            corrupted[i] = corrupted[i].wrapping_add(1);
            assert_eq!(decode_line(&corrupted, 1), None, "byte {} corrupted", i);
        }
    }

    #[test]
    fn test_decode_line_with_separator() {
        let payload = b"MODL:URG-04LX";
        let mut line = payload.to_vec();
        line.push(b';');
        line.push(checksum(payload));
        assert_eq!(decode_line(&line, 2), Some(&payload[..]));
    }

    #[test]
    fn test_decode_line_too_short() {
        assert_eq!(decode_line(b"P", 1), None);
        assert_eq!(decode_line(b"", 1), None);
    }

    #[test]
    fn test_decode_value_boundaries() {
        assert_eq!(decode_value(b"00"), 0);
        assert_eq!(decode_value(b"000"), 0);
        assert_eq!(decode_value(b"oo"), 0xFFF);
        assert_eq!(decode_value(b"ooo"), 0x3FFFF);
        // Worked example: "1Dh" -> (1 << 12) | (20 << 6) | 56 = 5432
        assert_eq!(decode_value(b"1Dh"), 5432);
        // "CB" -> (19 << 6) | 18 = 1234
        assert_eq!(decode_value(b"CB"), 1234);
    }

    #[test]
    fn test_encode_value_inverts_decode() {
        for value in [0u32, 1, 63, 64, 1234, 0xFFF] {
            assert_eq!(decode_value(&encode_value(value, 2)), value);
        }
        for value in [0u32, 5432, 65533, 0x3FFFF] {
            assert_eq!(decode_value(&encode_value(value, 3)), value);
        }
    }

    #[test]
    fn test_decode_distance_block() {
        let mut raw = Vec::new();
        for d in [1000u32, 0, 5432] {
            raw.extend(encode_value(d, 3));
        }
        assert_eq!(decode_distance_block(&raw, 3), Some(vec![1000, 0, 5432]));
        assert_eq!(decode_distance_block(&raw, 2), Some(vec![1000, 0]));
        assert_eq!(decode_distance_block(&raw, 4), None);
    }

    #[test]
    fn test_decode_distance_intensity_block() {
        let mut raw = Vec::new();
        for (d, i) in [(1500u32, 800u32), (20, 3000)] {
            raw.extend(encode_value(d, 3));
            raw.extend(encode_value(i, 3));
        }
        let (d, i) = decode_distance_intensity_block(&raw, 2).unwrap();
        assert_eq!(d, vec![1500, 20]);
        assert_eq!(i, vec![800, 3000]);
    }

    #[test]
    fn test_parse_header() {
        let header = parse_header(b"MD0044072501000").unwrap();
        assert_eq!(header.command, *b"MD");
        assert_eq!(header.start_step, 44);
        assert_eq!(header.end_step, 725);
        assert_eq!(header.cluster_count, 1);
        assert_eq!(header.point_count(), 682);

        let clustered = parse_header(b"GD0000000903").unwrap();
        assert_eq!(clustered.point_count(), 4); // steps 0,3,6,9

        assert!(parse_header(b"MD00x0072501").is_none());
        assert!(parse_header(b"MD0044").is_none());
    }

    #[test]
    fn test_build_stream_command() {
        assert_eq!(stream_command(*b"MD", 0, 1080, 1), b"MD0000108001000\n".to_vec());
        assert_eq!(single_command(*b"GD", 44, 725, 1), b"GD0044072501\n".to_vec());
        assert_eq!(build_command(*b"CR", &[(3, 2)]), b"CR03\n".to_vec());
        // Oversized values clamp to the field width
        assert_eq!(build_command(*b"CR", &[(250, 2)]), b"CR99\n".to_vec());
    }

    #[test]
    fn test_encode_data_lines_splits_at_64() {
        let data = vec![b'0'; 150];
        let lines = encode_data_lines(&data);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].len(), 65);
        assert_eq!(lines[2].len(), 23);
        assert!(lines.iter().all(|l| decode_line(l, 1).is_some()));
    }

    #[test]
    fn test_parse_info_field() {
        assert_eq!(
            parse_info_field(b"PROT:SCIP 2.0"),
            Some(("PROT".to_string(), "SCIP 2.0".to_string()))
        );
        assert_eq!(parse_info_field(b"no separator"), None);
    }
}
