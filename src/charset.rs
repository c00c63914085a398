//! Character set conversions between the encodings the phone uses and UTF-8.

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charset {
    Windows1252,
    Utf16BigEndian,
    Utf16LittleEndian,
    Utf8,
}

/// Code points of the Windows-1252 bytes 0x80..=0x9F. Bytes the code page
/// leaves undefined map to the matching C1 control character.
const WINDOWS_1252_HIGH: [char; 32] = [
    '\u{20AC}', '\u{0081}', '\u{201A}', '\u{0192}', '\u{201E}', '\u{2026}', '\u{2020}', '\u{2021}',
    '\u{02C6}', '\u{2030}', '\u{0160}', '\u{2039}', '\u{0152}', '\u{008D}', '\u{017D}', '\u{008F}',
    '\u{0090}', '\u{2018}', '\u{2019}', '\u{201C}', '\u{201D}', '\u{2022}', '\u{2013}', '\u{2014}',
    '\u{02DC}', '\u{2122}', '\u{0161}', '\u{203A}', '\u{0153}', '\u{009D}', '\u{017E}', '\u{0178}',
];

pub fn decode_windows_1252(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| match b {
            0x80..=0x9F => WINDOWS_1252_HIGH[(b - 0x80) as usize],
            _ => char::from(b),
        })
        .collect()
}

fn encode_windows_1252(text: &str) -> Result<Vec<u8>> {
    text.chars()
        .map(|c| {
            let code = c as u32;
            if code < 0x80 || (0xA0..=0xFF).contains(&code) {
                return Ok(code as u8);
            }
            WINDOWS_1252_HIGH
                .iter()
                .position(|&h| h == c)
                .map(|i| 0x80 + i as u8)
                .ok_or_else(|| Error::format(format!("{c:?} has no Windows-1252 representation")))
        })
        .collect()
}

fn decode_utf16(bytes: &[u8], big_endian: bool) -> Result<String> {
    if bytes.len() % 2 != 0 {
        return Err(Error::format("UTF-16 data has an odd number of bytes"));
    }
    let units = bytes.chunks_exact(2).map(|pair| {
        if big_endian {
            u16::from_be_bytes([pair[0], pair[1]])
        } else {
            u16::from_le_bytes([pair[0], pair[1]])
        }
    });
    char::decode_utf16(units)
        .collect::<std::result::Result<String, _>>()
        .map_err(|e| Error::format(format!("invalid UTF-16 data: {e}")))
}

pub fn decode_utf16_be(bytes: &[u8]) -> Result<String> {
    decode_utf16(bytes, true)
}

/// Decode a zero-terminated UTF-16LE field, ignoring everything after the
/// first NUL code unit.
pub fn decode_utf16_le_field(bytes: &[u8]) -> Result<String> {
    let end = bytes
        .chunks_exact(2)
        .position(|pair| pair == [0, 0])
        .map_or(bytes.len() - bytes.len() % 2, |units| units * 2);
    decode_utf16(&bytes[..end], false)
}

pub fn encode_utf16_be(text: &str) -> Vec<u8> {
    text.encode_utf16().flat_map(u16::to_be_bytes).collect()
}

/// Convert `input` from one character set to another, failing when the
/// result would exceed `max_output` bytes.
pub fn convert(input: &[u8], from: Charset, to: Charset, max_output: usize) -> Result<Vec<u8>> {
    let text = match from {
        Charset::Windows1252 => decode_windows_1252(input),
        Charset::Utf16BigEndian => decode_utf16(input, true)?,
        Charset::Utf16LittleEndian => decode_utf16(input, false)?,
        Charset::Utf8 => std::str::from_utf8(input)
            .map_err(|e| Error::format(format!("invalid UTF-8 data: {e}")))?
            .to_string(),
    };
    let output = match to {
        Charset::Windows1252 => encode_windows_1252(&text)?,
        Charset::Utf16BigEndian => encode_utf16_be(&text),
        Charset::Utf16LittleEndian => text.encode_utf16().flat_map(u16::to_le_bytes).collect(),
        Charset::Utf8 => text.into_bytes(),
    };
    if output.len() > max_output {
        return Err(Error::BufferTooSmall {
            max_length: max_output,
        });
    }
    Ok(output)
}
