use crate::cursor::ByteCursor;
use crate::error::{Error, Result};
use crate::models::{SmsRecord, StorageLocation};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::sync::OnceLock;

/// Longest numeric address the decoder accepts, in digits.
pub const MAXIMUM_NUMBER_DIGITS: usize = 15;

const ESCAPE_SEPTET: u8 = 0x1B;

/// Concatenation information element identifiers.
const IEI_CONCATENATED_8_BIT: u8 = 0x00;
const IEI_CONCATENATED_16_BIT: u8 = 0x08;

static GSM_ALPHABET: OnceLock<Vec<char>> = OnceLock::new();

fn gsm_alphabet() -> &'static [char] {
    GSM_ALPHABET.get_or_init(|| {
        "@£$¥èéùìòÇ\nØø\rÅåΔ_ΦΓΛΩΠΨΣΘΞ\x1bÆæßÉ !\"#¤%&'()*+,-./0123456789:;<=>?¡ABCDEFGHIJKLMNOPQRSTUVWXYZÄÖÑÜ§¿abcdefghijklmnopqrstuvwxyzäöñüà"
            .chars()
            .collect()
    })
}

fn gsm_extension(septet: u8) -> char {
    match septet {
        0x0A => '\u{000C}',
        0x14 => '^',
        0x28 => '{',
        0x29 => '}',
        0x2F => '\\',
        0x3C => '[',
        0x3D => '~',
        0x3E => ']',
        0x40 => '|',
        0x65 => '€',
        _ => ' ',
    }
}

/// Unpack `length` septets from GSM 7-bit packed data.
pub fn decode_7bit(encoded_bytes: &[u8], length: usize) -> Vec<u8> {
    let mut septets: Vec<u8> = Vec::with_capacity(length);
    let mut tmp: u16 = 0;
    let mut shift: u8 = 0;
    for &b in encoded_bytes {
        tmp |= (b as u16) << shift;
        shift += 8;
        while shift >= 7 {
            septets.push((tmp & 0x7F) as u8);
            tmp >>= 7;
            shift -= 7;
        }
    }
    septets.truncate(length);
    septets
}

/// Map septets of the GSM default alphabet (and its escape extension) to text.
pub fn gsm_to_text(septets: &[u8]) -> String {
    let table = gsm_alphabet();
    let mut text = String::with_capacity(septets.len());
    let mut escaped = false;
    for &septet in septets {
        if escaped {
            text.push(gsm_extension(septet));
            escaped = false;
        } else if septet == ESCAPE_SEPTET {
            escaped = true;
        } else {
            text.push(table[(septet & 0x7F) as usize]);
        }
    }
    text
}

pub fn decode_ucs2(encoded_bytes: &[u8]) -> String {
    let units = encoded_bytes
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]));
    char::decode_utf16(units)
        .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

fn bcd_swap(byte: u8) -> u32 {
    ((byte & 0x0F) as u32 * 10) + (byte >> 4) as u32
}

/// Decode the six semi-octet fields of a service centre time stamp
/// (year, month, day, hour, minute, second). The time zone byte is ignored.
pub fn decode_timestamp(timestamp_bytes: &[u8]) -> Option<NaiveDateTime> {
    if timestamp_bytes.len() < 6 {
        return None;
    }
    let year = 2000 + bcd_swap(timestamp_bytes[0]) as i32;
    let date = NaiveDate::from_ymd_opt(
        year,
        bcd_swap(timestamp_bytes[1]),
        bcd_swap(timestamp_bytes[2]),
    )?;
    let time = NaiveTime::from_hms_opt(
        bcd_swap(timestamp_bytes[3]),
        bcd_swap(timestamp_bytes[4]),
        bcd_swap(timestamp_bytes[5]),
    )?;
    Some(date.and_time(time))
}

pub fn decode_number(number_bytes: &[u8], number_length: usize) -> String {
    let mut number = String::with_capacity(number_length);
    for &byte in number_bytes {
        let d1 = byte & 0x0F;
        let d2 = byte >> 4;
        if number.len() < number_length && d1 <= 9 {
            number.push(char::from(b'0' + d1));
        }
        if number.len() < number_length && d2 <= 9 {
            number.push(char::from(b'0' + d2));
        }
    }
    number
}

/// Read an address field: semi-octet count, type of address, value.
fn read_address(cursor: &mut ByteCursor) -> Result<String> {
    let digits = cursor.read_u8("address length")? as usize;
    let address_type = cursor.read_u8("address type")?;
    let value = cursor.take(digits.div_ceil(2), "address")?;

    if address_type & 0x70 == 0x50 {
        return Ok(gsm_to_text(&decode_7bit(value, digits * 4 / 7)));
    }
    if digits > MAXIMUM_NUMBER_DIGITS {
        return Err(Error::format(format!(
            "phone number has {digits} digits, at most {MAXIMUM_NUMBER_DIGITS} are supported"
        )));
    }
    Ok(decode_number(value, digits))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Concatenation {
    pub reference: u16,
    pub parts_count: u8,
    pub part_number: u8,
}

/// Parse the user data header at the start of `user_data`. Returns the
/// concatenation element, if any, and the header size in bytes including
/// its length byte.
fn parse_user_data_header(user_data: &[u8]) -> Result<(Option<Concatenation>, usize)> {
    let mut cursor = ByteCursor::new(user_data);
    let header_length = cursor.read_u8("user data header length")? as usize;
    let mut elements = ByteCursor::new(cursor.take(header_length, "user data header")?);

    let mut concatenation = None;
    while !elements.is_empty() {
        let identifier = elements.read_u8("information element identifier")?;
        let length = elements.read_u8("information element length")? as usize;
        let data = elements.take(length, "information element")?;
        let info = match identifier {
            IEI_CONCATENATED_8_BIT => {
                if length != 3 {
                    return Err(Error::format(format!(
                        "8-bit concatenation element has length {length}, expected 3"
                    )));
                }
                Concatenation {
                    reference: data[0] as u16,
                    parts_count: data[1],
                    part_number: data[2],
                }
            }
            IEI_CONCATENATED_16_BIT => {
                if length != 4 {
                    return Err(Error::format(format!(
                        "16-bit concatenation element has length {length}, expected 4"
                    )));
                }
                Concatenation {
                    reference: u16::from_be_bytes([data[0], data[1]]),
                    parts_count: data[2],
                    part_number: data[3],
                }
            }
            _ => continue,
        };
        if info.part_number == 0 || info.part_number > info.parts_count {
            return Err(Error::format(format!(
                "part {} of a {}-part message",
                info.part_number, info.parts_count
            )));
        }
        concatenation = Some(info);
    }
    Ok((concatenation, header_length + 1))
}

/// Decode one stored PDU. Received messages carry the full deliver header
/// with a time stamp; sent messages and drafts carry the shorter submit
/// header without one.
pub fn decode_pdu(pdu: &[u8], location: StorageLocation) -> Result<SmsRecord> {
    let mut cursor = ByteCursor::new(pdu);

    let has_header = match location {
        StorageLocation::Inbox => {
            cursor.skip(8, "service centre address")?;
            let first_octet = cursor.read_u8("first octet")?;
            first_octet & 0x40 != 0
        }
        StorageLocation::Sent | StorageLocation::Draft => {
            cursor.skip(1, "service centre address")?;
            let flags = cursor.read_u8("message flags")?;
            let has_header = match flags & 0xF0 {
                0x90 => false,
                0xD0 => true,
                _ => {
                    return Err(Error::format(format!(
                        "unsupported message flags 0x{flags:02X}"
                    )))
                }
            };
            cursor.skip(1, "message reference")?;
            has_header
        }
    };

    let phone_number = read_address(&mut cursor)?;
    cursor.skip(1, "protocol identifier")?;
    let is_ucs2 = cursor.read_u8("data coding scheme")? & 0x08 != 0;

    let timestamp = match location {
        StorageLocation::Inbox => decode_timestamp(cursor.take(7, "time stamp")?),
        StorageLocation::Sent | StorageLocation::Draft => {
            cursor.skip(1, "validity period")?;
            None
        }
    };

    let text_length = cursor.read_u8("user data length")? as usize;
    let user_data = cursor.rest();

    let (concatenation, header_size) = if has_header {
        parse_user_data_header(user_data)?
    } else {
        (None, 0)
    };

    let text = if is_ucs2 {
        if text_length > user_data.len() || header_size > text_length {
            return Err(Error::format(format!(
                "user data length {text_length} does not match the {} bytes present",
                user_data.len()
            )));
        }
        decode_ucs2(&user_data[header_size..text_length])
    } else {
        let needed = (text_length * 7).div_ceil(8);
        if needed > user_data.len() {
            return Err(Error::format(format!(
                "{text_length} septets need {needed} bytes, {} present",
                user_data.len()
            )));
        }
        let header_septets = (header_size * 8).div_ceil(7);
        let septets = decode_7bit(user_data, text_length);
        gsm_to_text(septets.get(header_septets..).unwrap_or_default())
    };

    let concatenation = concatenation.unwrap_or(Concatenation {
        reference: 0,
        parts_count: 1,
        part_number: 1,
    });

    Ok(SmsRecord {
        phone_number,
        text,
        storage_location: location,
        record_id: concatenation.reference,
        total_parts: concatenation.parts_count,
        part_number: concatenation.part_number,
        timestamp,
    })
}
