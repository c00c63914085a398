use crate::cursor::ByteCursor;
use crate::error::{Error, Result};
use crate::wsp::{
    read_content_type, read_encoded_string, read_integer, read_long_integer, read_short_integer,
    read_text_string, read_uintvar, read_value_length,
};
use chrono::{DateTime, NaiveDateTime};
use log::{debug, warn};

/// Header field introducing the file name in an attachment header block.
const PART_FILE_NAME_FIELD: u8 = 0x8E;

const FROM_ADDRESS_PRESENT: u8 = 0x80;
const FROM_INSERT_ADDRESS: u8 = 0x81;

/// How the value of an MMS header field is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    ShortInteger,
    LongInteger,
    Integer,
    TextString,
    EncodedString,
    /// A value-length prefixed value that is skipped as a whole.
    ValueLength,
    /// Token text or a short integer, for fields carrying either.
    TokenOrShort,
    From,
    ContentType,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HeaderValue {
    Integer(u64),
    Text(String),
    /// A From field; `None` when the sender asked the relay to insert it.
    Address(Option<String>),
    Skipped,
    ContentType(String),
}

impl FieldKind {
    pub fn decode(self, cursor: &mut ByteCursor) -> Result<HeaderValue> {
        Ok(match self {
            FieldKind::ShortInteger => HeaderValue::Integer(read_short_integer(cursor)?.into()),
            FieldKind::LongInteger => HeaderValue::Integer(read_long_integer(cursor)?),
            FieldKind::Integer => HeaderValue::Integer(read_integer(cursor)?),
            FieldKind::TextString => HeaderValue::Text(read_text_string(cursor)?),
            FieldKind::EncodedString => HeaderValue::Text(read_encoded_string(cursor)?),
            FieldKind::ValueLength => {
                let length = read_value_length(cursor)? as usize;
                cursor.skip(length, "header value")?;
                HeaderValue::Skipped
            }
            FieldKind::TokenOrShort => match cursor.peek() {
                Some(byte) if byte & 0x80 != 0 => {
                    HeaderValue::Integer(read_short_integer(cursor)?.into())
                }
                _ => HeaderValue::Text(read_text_string(cursor)?),
            },
            FieldKind::From => HeaderValue::Address(read_from(cursor)?),
            FieldKind::ContentType => HeaderValue::ContentType(read_content_type(cursor)?),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderField {
    pub id: u8,
    pub name: &'static str,
    pub kind: FieldKind,
}

const fn field(id: u8, name: &'static str, kind: FieldKind) -> HeaderField {
    HeaderField { id, name, kind }
}

/// Every MMS header field, indexed by `id - 1`.
static FIELDS: [HeaderField; 63] = [
    field(0x01, "Bcc", FieldKind::EncodedString),
    field(0x02, "Cc", FieldKind::EncodedString),
    field(0x03, "Content-Location", FieldKind::TextString),
    field(0x04, "Content-Type", FieldKind::ContentType),
    field(0x05, "Date", FieldKind::LongInteger),
    field(0x06, "Delivery-Report", FieldKind::ShortInteger),
    field(0x07, "Delivery-Time", FieldKind::ValueLength),
    field(0x08, "Expiry", FieldKind::ValueLength),
    field(0x09, "From", FieldKind::From),
    field(0x0A, "Message-Class", FieldKind::TokenOrShort),
    field(0x0B, "Message-ID", FieldKind::TextString),
    field(0x0C, "Message-Type", FieldKind::ShortInteger),
    field(0x0D, "MMS-Version", FieldKind::ShortInteger),
    field(0x0E, "Message-Size", FieldKind::LongInteger),
    field(0x0F, "Priority", FieldKind::ShortInteger),
    field(0x10, "Read-Report", FieldKind::ShortInteger),
    field(0x11, "Report-Allowed", FieldKind::ShortInteger),
    field(0x12, "Response-Status", FieldKind::ShortInteger),
    field(0x13, "Response-Text", FieldKind::EncodedString),
    field(0x14, "Sender-Visibility", FieldKind::ShortInteger),
    field(0x15, "Status", FieldKind::ShortInteger),
    field(0x16, "Subject", FieldKind::EncodedString),
    field(0x17, "To", FieldKind::EncodedString),
    field(0x18, "Transaction-Id", FieldKind::TextString),
    field(0x19, "Retrieve-Status", FieldKind::ShortInteger),
    field(0x1A, "Retrieve-Text", FieldKind::EncodedString),
    field(0x1B, "Read-Status", FieldKind::ShortInteger),
    field(0x1C, "Reply-Charging", FieldKind::ShortInteger),
    field(0x1D, "Reply-Charging-Deadline", FieldKind::ValueLength),
    field(0x1E, "Reply-Charging-ID", FieldKind::TextString),
    field(0x1F, "Reply-Charging-Size", FieldKind::LongInteger),
    field(0x20, "Previously-Sent-By", FieldKind::ValueLength),
    field(0x21, "Previously-Sent-Date", FieldKind::ValueLength),
    field(0x22, "Store", FieldKind::ShortInteger),
    field(0x23, "MM-State", FieldKind::ShortInteger),
    field(0x24, "MM-Flags", FieldKind::ValueLength),
    field(0x25, "Store-Status", FieldKind::ShortInteger),
    field(0x26, "Store-Status-Text", FieldKind::EncodedString),
    field(0x27, "Stored", FieldKind::ShortInteger),
    field(0x28, "Attributes", FieldKind::ShortInteger),
    field(0x29, "Totals", FieldKind::ShortInteger),
    field(0x2A, "Mbox-Totals", FieldKind::ValueLength),
    field(0x2B, "Quotas", FieldKind::ShortInteger),
    field(0x2C, "Mbox-Quotas", FieldKind::ValueLength),
    field(0x2D, "Message-Count", FieldKind::Integer),
    field(0x2E, "Content", FieldKind::TokenOrShort),
    field(0x2F, "Start", FieldKind::Integer),
    field(0x30, "Additional-Headers", FieldKind::TokenOrShort),
    field(0x31, "Distribution-Indicator", FieldKind::ShortInteger),
    field(0x32, "Element-Descriptor", FieldKind::ValueLength),
    field(0x33, "Limit", FieldKind::Integer),
    field(0x34, "Recommended-Retrieval-Mode", FieldKind::ShortInteger),
    field(0x35, "Recommended-Retrieval-Mode-Text", FieldKind::EncodedString),
    field(0x36, "Status-Text", FieldKind::EncodedString),
    field(0x37, "Applic-ID", FieldKind::TextString),
    field(0x38, "Reply-Applic-ID", FieldKind::TextString),
    field(0x39, "Aux-Applic-Info", FieldKind::TextString),
    field(0x3A, "Content-Class", FieldKind::ShortInteger),
    field(0x3B, "DRM-Content", FieldKind::ShortInteger),
    field(0x3C, "Adaptation-Allowed", FieldKind::ShortInteger),
    field(0x3D, "Replace-ID", FieldKind::TextString),
    field(0x3E, "Cancel-ID", FieldKind::TextString),
    field(0x3F, "Cancel-Status", FieldKind::ShortInteger),
];

pub fn header_field(id: u8) -> Option<&'static HeaderField> {
    match id {
        0x01..=0x3F => FIELDS.get(id as usize - 1),
        _ => None,
    }
}

const FIELD_CONTENT_TYPE: u8 = 0x04;
const FIELD_DATE: u8 = 0x05;
const FIELD_FROM: u8 = 0x09;
const FIELD_MESSAGE_TYPE: u8 = 0x0C;
const FIELD_SUBJECT: u8 = 0x16;
const FIELD_TO: u8 = 0x17;

/// Value of the Message-Type header, high bit cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageType(pub u8);

impl MessageType {
    pub const SEND_REQUEST: MessageType = MessageType(0x00);
    pub const NOTIFICATION: MessageType = MessageType(0x02);
    pub const RETRIEVE_CONFIRMATION: MessageType = MessageType(0x04);
    pub const DELIVERY_REPORT: MessageType = MessageType(0x06);
    pub const READ_REPORT_RECIPIENT: MessageType = MessageType(0x07);
    pub const READ_REPORT_ORIGINATOR: MessageType = MessageType(0x08);

    /// Indications are status messages without user content.
    pub fn is_indication(self) -> bool {
        matches!(
            self,
            MessageType::NOTIFICATION
                | MessageType::DELIVERY_REPORT
                | MessageType::READ_REPORT_RECIPIENT
                | MessageType::READ_REPORT_ORIGINATOR
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            MessageType::SEND_REQUEST => "m-send-req",
            MessageType::NOTIFICATION => "m-notification-ind",
            MessageType::RETRIEVE_CONFIRMATION => "m-retrieve-conf",
            MessageType::DELIVERY_REPORT => "m-delivery-ind",
            MessageType::READ_REPORT_RECIPIENT => "m-read-rec-ind",
            MessageType::READ_REPORT_ORIGINATOR => "m-read-orig-ind",
            _ => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub content_type: String,
    pub file_name: Option<String>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MmsMessage {
    pub message_type: Option<MessageType>,
    pub sender: Option<String>,
    pub recipients: Vec<String>,
    pub subject: Option<String>,
    pub timestamp: Option<NaiveDateTime>,
    pub content_type: Option<String>,
    pub attachments: Vec<Attachment>,
}

impl MmsMessage {
    pub fn is_indication(&self) -> bool {
        self.message_type.is_some_and(MessageType::is_indication)
    }
}

/// Drop the `/TYPE=PLMN` style suffix from an address.
pub fn clean_address(address: &str) -> String {
    match address.find("/TYPE=") {
        Some(end) => address[..end].to_string(),
        None => address.to_string(),
    }
}

fn read_from(cursor: &mut ByteCursor) -> Result<Option<String>> {
    let length = read_value_length(cursor)? as usize;
    let mut value = ByteCursor::new(cursor.take(length, "From")?);
    match value.read_u8("From token")? {
        FROM_ADDRESS_PRESENT => Ok(Some(clean_address(&read_encoded_string(&mut value)?))),
        FROM_INSERT_ADDRESS => Ok(None),
        other => {
            debug!("From token 0x{:02X} read as insert-address", other);
            Ok(None)
        }
    }
}

/// Decode a stored MMS: the header fields up to Content-Type, then the
/// multipart body. Indications stop after their Message-Type.
pub fn decode_message(data: &[u8]) -> Result<MmsMessage> {
    let mut cursor = ByteCursor::new(data);
    let mut message = MmsMessage::default();

    while !cursor.is_empty() {
        let id = cursor.read_u8("header field")? & 0x7F;
        let definition = header_field(id).ok_or(Error::UnknownHeaderField(id))?;
        let value = definition.kind.decode(&mut cursor)?;
        debug!("MMS header {}: {:?}", definition.name, value);

        match (id, value) {
            (FIELD_MESSAGE_TYPE, HeaderValue::Integer(kind)) => {
                let kind = MessageType(kind as u8);
                message.message_type = Some(kind);
                if kind.is_indication() {
                    return Ok(message);
                }
            }
            (FIELD_FROM, HeaderValue::Address(address)) => message.sender = address,
            (FIELD_DATE, HeaderValue::Integer(seconds)) => {
                message.timestamp = i64::try_from(seconds)
                    .ok()
                    .and_then(|s| DateTime::from_timestamp(s, 0))
                    .map(|t| t.naive_utc());
            }
            (FIELD_SUBJECT, HeaderValue::Text(subject)) => message.subject = Some(subject),
            (FIELD_TO, HeaderValue::Text(to)) => message.recipients.push(clean_address(&to)),
            (FIELD_CONTENT_TYPE, HeaderValue::ContentType(content_type)) => {
                message.content_type = Some(content_type);
                message.attachments = extract_attachments(&mut cursor)?;
                break;
            }
            _ => {}
        }
    }
    Ok(message)
}

/// Read the multipart body: an entry count, then per entry the header and
/// data lengths, the headers (content type first) and the data.
pub fn extract_attachments(cursor: &mut ByteCursor) -> Result<Vec<Attachment>> {
    if cursor.is_empty() {
        return Ok(Vec::new());
    }
    let count = cursor.read_u8("attachment count")?;
    let mut attachments = Vec::with_capacity(count as usize);
    for index in 0..count {
        let headers_length = read_uintvar(cursor)? as usize;
        let data_length = read_uintvar(cursor)? as usize;
        let mut headers = ByteCursor::new(cursor.take(headers_length, "attachment headers")?);
        let content_type = read_content_type(&mut headers)?;
        let file_name = find_file_name(headers.rest());
        let data = cursor.take(data_length, "attachment data")?.to_vec();
        debug!(
            "Attachment {}: {} ({} bytes, name {:?})",
            index, content_type, data.len(), file_name
        );
        attachments.push(Attachment {
            content_type,
            file_name,
            data,
        });
    }
    if !cursor.is_empty() {
        warn!("{} bytes left after the last attachment", cursor.remaining());
    }
    Ok(attachments)
}

/// Look for the file name header among the remaining attachment headers.
fn find_file_name(headers: &[u8]) -> Option<String> {
    let start = headers.iter().position(|&b| b == PART_FILE_NAME_FIELD)?;
    let mut cursor = ByteCursor::new(&headers[start + 1..]);
    read_text_string(&mut cursor)
        .ok()
        .filter(|name| !name.is_empty())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::wsp::encode_uintvar;

    fn part(content_type: &[u8], name: Option<&str>, data: &[u8]) -> Vec<u8> {
        let mut headers = content_type.to_vec();
        if let Some(name) = name {
            headers.push(PART_FILE_NAME_FIELD);
            headers.extend_from_slice(name.as_bytes());
            headers.push(0);
        }
        let mut bytes = encode_uintvar(headers.len() as u32);
        bytes.extend(encode_uintvar(data.len() as u32));
        bytes.extend(headers);
        bytes.extend_from_slice(data);
        bytes
    }

    /// A retrieved message from +33612345678 with a text and a JPEG part.
    pub(crate) fn sample_message(jpeg: &[u8]) -> Vec<u8> {
        let mut pdu = vec![0x8C, 0x84, 0x8D, 0x92];
        pdu.extend_from_slice(&[0x85, 0x04, 0x64, 0x3A, 0x99, 0xF0]);
        let from = b"+33612345678/TYPE=PLMN\0";
        pdu.extend_from_slice(&[0x89, (from.len() + 1) as u8, FROM_ADDRESS_PRESENT]);
        pdu.extend_from_slice(from);
        pdu.push(0x96);
        pdu.extend_from_slice(b"Holiday\0");
        pdu.extend_from_slice(&[0x84, 0xA3]);
        pdu.push(2);
        pdu.extend(part(&[0x83], Some("text.txt"), b"See you soon"));
        pdu.extend(part(&[0x9E], Some("photo.jpg"), jpeg));
        pdu
    }

    #[test]
    fn field_table_is_indexed_by_id() {
        for (index, definition) in FIELDS.iter().enumerate() {
            assert_eq!(definition.id as usize, index + 1);
        }
        assert_eq!(header_field(0x09).map(|s| s.name), Some("From"));
        assert!(header_field(0x00).is_none());
        assert!(header_field(0x40).is_none());
    }

    #[test]
    fn decodes_message_with_two_attachments() {
        let jpeg: Vec<u8> = (0..=255u8).cycle().take(700).collect();
        let message = decode_message(&sample_message(&jpeg)).unwrap();

        assert_eq!(message.message_type, Some(MessageType::RETRIEVE_CONFIRMATION));
        assert_eq!(message.sender.as_deref(), Some("+33612345678"));
        assert_eq!(message.subject.as_deref(), Some("Holiday"));
        assert_eq!(
            message.timestamp.unwrap().to_string(),
            "2023-04-15 12:34:56"
        );
        assert_eq!(
            message.content_type.as_deref(),
            Some("application/vnd.wap.multipart.mixed")
        );
        assert_eq!(message.attachments.len(), 2);
        assert_eq!(message.attachments[0].file_name.as_deref(), Some("text.txt"));
        assert_eq!(message.attachments[0].data, b"See you soon");
        assert_eq!(message.attachments[1].content_type, "image/jpeg");
        assert_eq!(message.attachments[1].file_name.as_deref(), Some("photo.jpg"));
        assert_eq!(message.attachments[1].data, jpeg);
    }

    #[test]
    fn indication_stops_after_message_type() {
        let message = decode_message(&[0x8C, 0x86, 0x7F, 0x7F]).unwrap();
        assert!(message.is_indication());
        assert!(message.attachments.is_empty());
    }

    #[test]
    fn insert_address_leaves_sender_empty() {
        let message = decode_message(&[0x8C, 0x80, 0x89, 0x01, FROM_INSERT_ADDRESS]).unwrap();
        assert_eq!(message.sender, None);
        assert!(!message.is_indication());
    }

    #[test]
    fn unexpected_from_token_means_no_sender() {
        let message = decode_message(&[0x8C, 0x84, 0x89, 0x01, 0x82]).unwrap();
        assert_eq!(message.sender, None);
        assert_eq!(message.message_type, Some(MessageType::RETRIEVE_CONFIRMATION));
    }

    #[test]
    fn unknown_field_is_an_error() {
        assert!(matches!(
            decode_message(&[0x8C, 0x84, 0xC5, 0x00]),
            Err(Error::UnknownHeaderField(0x45))
        ));
    }

    #[test]
    fn attachment_without_name() {
        let mut body = vec![1u8];
        body.extend(part(&[0x9E], None, &[1, 2, 3]));
        let attachments = extract_attachments(&mut ByteCursor::new(&body)).unwrap();
        assert_eq!(attachments[0].file_name, None);
        assert_eq!(attachments[0].data, vec![1, 2, 3]);
    }

    #[test]
    fn truncated_attachment_data() {
        let mut body = vec![1u8];
        let mut entry = part(&[0x83], None, b"abcdef");
        entry.truncate(entry.len() - 2);
        body.extend(entry);
        assert!(extract_attachments(&mut ByteCursor::new(&body)).is_err());
    }

    #[test]
    fn strips_address_type() {
        assert_eq!(clean_address("0612345678/TYPE=PLMN"), "0612345678");
        assert_eq!(clean_address("a@b.c"), "a@b.c");
    }
}
