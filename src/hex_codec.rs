//! Binary/hexadecimal conversion. Everything the phone exchanges over the AT
//! interface (paths, file chunks, PDUs) is carried as hexadecimal text.

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HexError {
    #[error("odd number of hexadecimal characters")]
    OddLength,

    #[error("invalid hexadecimal character {character:?} at position {position}")]
    InvalidCharacter { character: char, position: usize },

    #[error("{needed} decoded bytes do not fit in {max} bytes")]
    TooLong { needed: usize, max: usize },
}

/// Encode each byte as two uppercase hexadecimal characters.
pub fn bytes_to_hex(bytes: &[u8]) -> String {
    hex::encode_upper(bytes)
}

/// Decode a hexadecimal string (either case) of at most `max_output` bytes.
pub fn hex_to_bytes(text: &str, max_output: usize) -> Result<Vec<u8>, HexError> {
    if text.len() % 2 != 0 {
        return Err(HexError::OddLength);
    }
    let needed = text.len() / 2;
    if needed > max_output {
        return Err(HexError::TooLong {
            needed,
            max: max_output,
        });
    }
    hex::decode(text).map_err(|e| match e {
        hex::FromHexError::InvalidHexCharacter { c, index } => HexError::InvalidCharacter {
            character: c,
            position: index,
        },
        _ => HexError::OddLength,
    })
}
