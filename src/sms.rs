use crate::at::{AtChannel, LONG_ANSWER_LENGTH, SHORT_ANSWER_LENGTH};
use crate::error::{Error, ErrorKind, Result};
use crate::hex_codec::hex_to_bytes;
use crate::local_fs::{append_text, create_directory, sanitize_file_name};
use crate::models::{SmsRecord, StorageLocation};
use crate::pdu::decode_pdu;
use crate::phone_book::PhoneBook;
use chrono::NaiveDateTime;
use log::{debug, error, info, warn};
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::OnceLock;

const PDU_MODE_COMMAND: &str = "AT+CMGF=0";
const STORAGE_COMMAND: &str = "AT+CPMS?";

/// Answer to reading an index holding no message.
const EMPTY_RECORD_ANSWER: &str = "+CMS ERROR: 321";

const MAXIMUM_PDU_SIZE: usize = 512;

static RE_STORAGE: OnceLock<Regex> = OnceLock::new();
static RE_RECORD_STATUS: OnceLock<Regex> = OnceLock::new();

/// A complete message, multi-part records joined in part order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmsMessage {
    pub phone_number: String,
    pub storage_location: StorageLocation,
    pub timestamp: Option<NaiveDateTime>,
    pub text: String,
}

/// Map a record status to where the message is stored.
pub fn parse_location(status: u32) -> Result<StorageLocation> {
    match status {
        0 | 1 => Ok(StorageLocation::Inbox),
        2 => Ok(StorageLocation::Draft),
        3 => Ok(StorageLocation::Sent),
        other => Err(Error::format(format!(
            "unrecognized SMS storage location {other}"
        ))),
    }
}

/// Query `(used, total)` slots of the message storage.
pub fn read_capacity(at: &mut AtChannel) -> Result<(u32, u32)> {
    at.send_command(STORAGE_COMMAND)?;
    let records = at.receive_records(STORAGE_COMMAND, SHORT_ANSWER_LENGTH)?;
    let re = RE_STORAGE
        .get_or_init(|| Regex::new(r#"^\+CPMS:\s*"[^"]*",\s*(\d+),\s*(\d+)"#).unwrap());
    records
        .iter()
        .find_map(|line| re.captures(line))
        .and_then(|caps| Some((caps[1].parse().ok()?, caps[2].parse().ok()?)))
        .ok_or_else(|| {
            Error::format(format!(
                "no storage usage in the answer to \"{STORAGE_COMMAND}\": {records:?}"
            ))
        })
}

/// Read and decode the message stored at `index`, `None` when the slot is empty.
pub fn read_record(at: &mut AtChannel, index: u32) -> Result<Option<SmsRecord>> {
    let command = format!("AT+EMGR={index}");
    at.send_command(&command)?;

    let status_line = at.receive_answer_to(&command, SHORT_ANSWER_LENGTH)?;
    if status_line == EMPTY_RECORD_ANSWER {
        return Ok(None);
    }
    let pdu_hex = at.receive_answer_to(&command, LONG_ANSWER_LENGTH)?;
    at.receive_records(&command, SHORT_ANSWER_LENGTH)?;

    let re = RE_RECORD_STATUS.get_or_init(|| Regex::new(r"^\+EMGR:\s*(\d+)").unwrap());
    let status = re
        .captures(&status_line)
        .and_then(|caps| caps[1].parse::<u32>().ok())
        .ok_or_else(|| {
            Error::format(format!(
                "unexpected answer \"{status_line}\" to \"{command}\""
            ))
        })?;
    let location = parse_location(status)?;

    let pdu = hex_to_bytes(pdu_hex.trim(), MAXIMUM_PDU_SIZE)?;
    decode_pdu(&pdu, location).map(Some)
}

/// Join multi-part records into whole messages.
///
/// Parts belong together when they share reference, number and storage
/// location. Messages keep the order in which their first part was seen.
/// Missing parts are reported and left out of the text.
pub fn merge_parts(records: Vec<SmsRecord>) -> Vec<SmsMessage> {
    struct Pending {
        message: SmsMessage,
        total_parts: u8,
        parts: BTreeMap<u8, String>,
        first_part_timestamp: Option<NaiveDateTime>,
        earliest_timestamp: Option<NaiveDateTime>,
    }

    impl Pending {
        fn note_timestamp(&mut self, part_number: u8, timestamp: Option<NaiveDateTime>) {
            if part_number == 1 && timestamp.is_some() {
                self.first_part_timestamp = timestamp;
            }
            self.earliest_timestamp = match (self.earliest_timestamp, timestamp) {
                (Some(seen), Some(new)) => Some(seen.min(new)),
                (seen, new) => seen.or(new),
            };
        }
    }

    let mut pending: Vec<Pending> = Vec::new();
    let mut groups: HashMap<(u16, String, StorageLocation), usize> = HashMap::new();

    for record in records {
        if record.is_multi_part() {
            let key = (
                record.record_id,
                record.phone_number.clone(),
                record.storage_location,
            );
            if let Some(&index) = groups.get(&key) {
                let group = &mut pending[index];
                group.note_timestamp(record.part_number, record.timestamp);
                if group.parts.insert(record.part_number, record.text).is_some() {
                    warn!(
                        "Duplicate part {} of message {} from {}",
                        record.part_number, record.record_id, record.phone_number
                    );
                }
                continue;
            }
            groups.insert(key, pending.len());
        }

        let mut parts = BTreeMap::new();
        parts.insert(record.part_number, record.text);
        let mut group = Pending {
            message: SmsMessage {
                phone_number: record.phone_number,
                storage_location: record.storage_location,
                timestamp: None,
                text: String::new(),
            },
            total_parts: record.total_parts,
            parts,
            first_part_timestamp: None,
            earliest_timestamp: None,
        };
        group.note_timestamp(record.part_number, record.timestamp);
        pending.push(group);
    }

    pending
        .into_iter()
        .map(|mut group| {
            let missing: Vec<u8> = (1..=group.total_parts)
                .filter(|part| !group.parts.contains_key(part))
                .collect();
            if !missing.is_empty() {
                warn!(
                    "Message from {} is missing parts {:?} of {}",
                    group.message.phone_number, missing, group.total_parts
                );
            }
            // Part 1 carries the sending time; otherwise the earliest part stands in.
            group.message.timestamp = group.first_part_timestamp.or(group.earliest_timestamp);
            group.message.text = group.parts.into_values().collect();
            group.message
        })
        .collect()
}

/// One output block: `[<label>] <date>`, the text, then a blank line.
pub fn format_message(message: &SmsMessage) -> String {
    let date = message
        .timestamp
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "unknown date".to_string());
    format!(
        "[{}] {}\n{}\n\n",
        message.storage_location.label(),
        date,
        message.text
    )
}

/// Read every stored SMS and append it to `<output>/SMS/<contact>.txt`.
///
/// With `keep_going` a record that fails to decode is logged and skipped;
/// otherwise the first failure aborts. Returns the number of messages written.
pub fn download_all(
    at: &mut AtChannel,
    phone_book: &PhoneBook,
    output_directory: &Path,
    keep_going: bool,
) -> Result<usize> {
    at.execute(PDU_MODE_COMMAND)?;
    let (used, total) = read_capacity(at)?;
    info!("{} of {} SMS slots in use", used, total);

    let mut records = Vec::new();
    let mut found = 0;
    for index in 1..=total {
        if found >= used {
            break;
        }
        match read_record(at, index) {
            Ok(Some(record)) => {
                debug!(
                    "SMS {} from {} (part {}/{})",
                    index, record.phone_number, record.part_number, record.total_parts
                );
                records.push(record);
                found += 1;
            }
            Ok(None) => {}
            Err(e) if keep_going && e.kind() == ErrorKind::Format => {
                warn!("Skipping SMS {}: {}", index, e);
                at.drain_answer()?;
                found += 1;
            }
            Err(e) => {
                error!("Failed to read SMS {}", index);
                return Err(e);
            }
        }
    }

    let messages = merge_parts(records);
    let sms_directory = output_directory.join("SMS");
    create_directory(&sms_directory)?;
    for message in &messages {
        let contact = phone_book.name_or_number(&message.phone_number);
        let path = sms_directory.join(format!("{}.txt", sanitize_file_name(&contact)));
        append_text(&path, &format_message(message))?;
    }
    info!("Saved {} SMS to {}", messages.len(), sms_directory.display());
    Ok(messages.len())
}
