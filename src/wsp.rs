//! Wireless Session Protocol value encodings used by MMS PDUs.

use crate::charset::{decode_utf16_be, decode_windows_1252};
use crate::cursor::ByteCursor;
use crate::error::{Error, Result};
use log::warn;

pub const MAXIMUM_UINTVAR_LENGTH: usize = 5;

/// Value-length octet announcing a uintvar length.
const LENGTH_QUOTE: u8 = 31;

const TEXT_QUOTE: u8 = 0x7F;
const STRING_QUOTE: u8 = b'"';

const CHARSET_US_ASCII: u64 = 3;
const CHARSET_ISO_8859_1: u64 = 4;
const CHARSET_UTF_8: u64 = 106;
const CHARSET_UCS_2: u64 = 1000;

/// Decode a variable length unsigned integer: 7 bits per byte, most
/// significant first, high bit set on every byte but the last.
pub fn read_uintvar(cursor: &mut ByteCursor) -> Result<u32> {
    let mut value: u64 = 0;
    for _ in 0..MAXIMUM_UINTVAR_LENGTH {
        let byte = cursor.read_u8("uintvar")?;
        value = (value << 7) | (byte & 0x7F) as u64;
        if byte & 0x80 == 0 {
            return u32::try_from(value)
                .map_err(|_| Error::format(format!("uintvar {value} does not fit 32 bits")));
        }
    }
    Err(Error::format(format!(
        "uintvar longer than {MAXIMUM_UINTVAR_LENGTH} bytes"
    )))
}

pub fn encode_uintvar(value: u32) -> Vec<u8> {
    let mut bytes = vec![(value & 0x7F) as u8];
    let mut rest = value >> 7;
    while rest != 0 {
        bytes.push((rest & 0x7F) as u8 | 0x80);
        rest >>= 7;
    }
    bytes.reverse();
    bytes
}

/// Decode a value length: a short length (0 to 30) or 31 followed by a uintvar.
/// Octets above 31 do not start a length; they are consumed and read as 0.
pub fn read_value_length(cursor: &mut ByteCursor) -> Result<u32> {
    match cursor.read_u8("value length")? {
        length @ 0..=30 => Ok(length as u32),
        LENGTH_QUOTE => read_uintvar(cursor),
        other => {
            warn!("0x{:02X} is not a value length, using 0", other);
            Ok(0)
        }
    }
}

/// Read a NUL terminated text string, dropping a leading quote octet.
pub fn read_text_string(cursor: &mut ByteCursor) -> Result<String> {
    let bytes = read_until_nul(cursor)?;
    let bytes = match bytes.first() {
        Some(&TEXT_QUOTE) | Some(&STRING_QUOTE) => &bytes[1..],
        _ => bytes,
    };
    Ok(String::from_utf8_lossy(bytes).into_owned())
}

fn read_until_nul<'a>(cursor: &mut ByteCursor<'a>) -> Result<&'a [u8]> {
    let length = cursor
        .rest()
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| Error::format("text string is not NUL terminated"))?;
    let bytes = cursor.take(length, "text string")?;
    cursor.skip(1, "text string terminator")?;
    Ok(bytes)
}

pub fn read_short_integer(cursor: &mut ByteCursor) -> Result<u8> {
    let byte = cursor.read_u8("short integer")?;
    if byte & 0x80 == 0 {
        return Err(Error::format(format!(
            "0x{byte:02X} is not a short integer"
        )));
    }
    Ok(byte & 0x7F)
}

/// Read a long integer: a length octet (1 to 8) then that many big-endian bytes.
pub fn read_long_integer(cursor: &mut ByteCursor) -> Result<u64> {
    let length = cursor.read_u8("long integer length")? as usize;
    if length == 0 || length > 8 {
        return Err(Error::format(format!(
            "long integer of {length} bytes"
        )));
    }
    let bytes = cursor.take(length, "long integer")?;
    Ok(bytes.iter().fold(0u64, |value, &b| (value << 8) | b as u64))
}

/// Read a short or a long integer, whichever is present.
pub fn read_integer(cursor: &mut ByteCursor) -> Result<u64> {
    match cursor.peek() {
        Some(byte) if byte & 0x80 != 0 => read_short_integer(cursor).map(u64::from),
        _ => read_long_integer(cursor),
    }
}

/// Read an encoded string: either a plain text string, or a value length
/// followed by a character set and the text in that character set.
pub fn read_encoded_string(cursor: &mut ByteCursor) -> Result<String> {
    match cursor.peek() {
        Some(byte) if byte < 0x20 => {}
        _ => return read_text_string(cursor),
    }

    let length = read_value_length(cursor)? as usize;
    let mut value = ByteCursor::new(cursor.take(length, "encoded string")?);
    let charset = read_integer(&mut value)?;
    let text = value.rest();

    if charset == CHARSET_UCS_2 {
        let text = text.strip_prefix(&[0xFE, 0xFF]).unwrap_or(text);
        return decode_utf16_be(text.strip_suffix(&[0, 0]).unwrap_or(text));
    }
    let text = text.strip_suffix(&[0]).unwrap_or(text);
    let text = text.strip_prefix(&[TEXT_QUOTE]).unwrap_or(text);
    match charset {
        CHARSET_ISO_8859_1 => Ok(decode_windows_1252(text)),
        CHARSET_UTF_8 | CHARSET_US_ASCII => Ok(String::from_utf8_lossy(text).into_owned()),
        other => {
            warn!("Unsupported character set {}, reading as UTF-8", other);
            Ok(String::from_utf8_lossy(text).into_owned())
        }
    }
}

/// Name of a well-known content type code, for the codes MMS messages use.
pub fn well_known_media_type(code: u8) -> Option<&'static str> {
    let name = match code {
        0x00 => "*/*",
        0x01 => "text/*",
        0x02 => "text/html",
        0x03 => "text/plain",
        0x06 => "text/x-vCalendar",
        0x07 => "text/x-vCard",
        0x0C => "multipart/mixed",
        0x0F => "multipart/alternative",
        0x1D => "image/gif",
        0x1E => "image/jpeg",
        0x1F => "image/tiff",
        0x20 => "image/png",
        0x21 => "image/vnd.wap.wbmp",
        0x23 => "application/vnd.wap.multipart.mixed",
        0x26 => "application/vnd.wap.multipart.alternative",
        0x33 => "application/vnd.wap.multipart.related",
        _ => return None,
    };
    Some(name)
}

/// Read a content type value and return its media type. Parameters of the
/// general form are skipped.
pub fn read_content_type(cursor: &mut ByteCursor) -> Result<String> {
    match cursor.peek() {
        Some(byte) if byte >= 0x80 => return read_media(cursor),
        Some(byte) if byte >= 0x20 => return read_text_string(cursor),
        _ => {}
    }

    let length = read_value_length(cursor)? as usize;
    let mut value = ByteCursor::new(cursor.take(length, "content type")?);
    read_media(&mut value)
}

fn read_media(cursor: &mut ByteCursor) -> Result<String> {
    match cursor.peek() {
        Some(byte) if byte >= 0x80 => {
            let code = read_short_integer(cursor)?;
            Ok(well_known_media_type(code)
                .map(str::to_string)
                .unwrap_or_else(|| format!("application/x-wsp-0x{code:02X}")))
        }
        _ => read_text_string(cursor),
    }
}
