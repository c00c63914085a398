//! MMS retrieval: storage scan, message database, decoding and export.

use crate::at::{AtChannel, LONG_ANSWER_LENGTH};
use crate::charset::{decode_utf16_be, decode_utf16_le_field};
use crate::error::{Error, ErrorKind, Result};
use crate::file_manager::{join_phone_path, read_file};
use crate::hex_codec::hex_to_bytes;
use crate::local_fs::{create_directory, sanitize_file_name, write_file};
use crate::mms_pdu::{decode_message, MmsMessage};
use chrono::NaiveDateTime;
use log::{debug, error, info, warn};
use regex::Regex;
use std::collections::HashSet;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

pub const DATABASE_RECORD_SIZE: usize = 136;
const FILE_NAME_FIELD: std::ops::Range<usize> = 8..48;
const PHONE_NUMBER_FIELD: std::ops::Range<usize> = 48..128;

static RE_STORAGE: OnceLock<Regex> = OnceLock::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MmsFolder {
    Inbox = 1,
    Outbox = 2,
    Sent = 4,
    Drafts = 8,
    Templates = 64,
}

impl MmsFolder {
    pub const ALL: [MmsFolder; 5] = [
        MmsFolder::Inbox,
        MmsFolder::Outbox,
        MmsFolder::Sent,
        MmsFolder::Drafts,
        MmsFolder::Templates,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageDevice {
    Phone = 2,
    SdCard = 4,
}

impl StorageDevice {
    pub const ALL: [StorageDevice; 2] = [StorageDevice::Phone, StorageDevice::SdCard];
}

/// Where the messages of one folder live on one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MmsStorage {
    pub count: u32,
    pub payload_directory: String,
    pub database_file: String,
}

/// Parse `+EMMSFS: 0, <count>, <n>, "<hex dir>", "<hex database>"`.
pub fn parse_storage_answer(line: &str) -> Result<MmsStorage> {
    let re = RE_STORAGE.get_or_init(|| {
        Regex::new(r#"^\+EMMSFS:\s*(\d+),\s*(\d+),\s*\d+,\s*"([0-9A-Fa-f]*)",\s*"([0-9A-Fa-f]*)""#)
            .unwrap()
    });
    let caps = re
        .captures(line)
        .ok_or_else(|| Error::format(format!("malformed MMS storage answer \"{line}\"")))?;
    if &caps[1] != "0" {
        return Err(Error::format(format!(
            "MMS storage query failed with status {}",
            &caps[1]
        )));
    }
    let count = caps[2]
        .parse()
        .map_err(|e| Error::format(format!("bad MMS count in \"{line}\": {e}")))?;
    let decode = |hex: &str| -> Result<String> {
        decode_utf16_be(&hex_to_bytes(hex, LONG_ANSWER_LENGTH)?)
    };
    Ok(MmsStorage {
        count,
        payload_directory: decode(&caps[3])?,
        database_file: decode(&caps[4])?,
    })
}

/// Locate a folder, `None` when it holds no message or the device is absent.
pub fn query_storage(
    at: &mut AtChannel,
    folder: MmsFolder,
    device: StorageDevice,
) -> Result<Option<MmsStorage>> {
    let command = format!("AT+EMMSFS={},{}", folder as u8, device as u8);
    at.send_command(&command)?;
    let records = match at.receive_records(&command, LONG_ANSWER_LENGTH) {
        Ok(records) => records,
        Err(Error::RemoteError { .. }) => {
            debug!("No MMS storage for {:?} on {:?}", folder, device);
            return Ok(None);
        }
        Err(e) => return Err(e),
    };
    let line = records
        .iter()
        .find(|line| line.starts_with("+EMMSFS:"))
        .ok_or_else(|| Error::format(format!("no storage record in the answer to \"{command}\"")))?;
    let storage = parse_storage_answer(line)?;
    Ok((storage.count > 0).then_some(storage))
}

/// One entry of a folder message database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseRecord {
    pub message_id: u32,
    pub file_size: u32,
    pub file_name: String,
    pub phone_number: String,
}

pub fn parse_database(bytes: &[u8]) -> Result<Vec<DatabaseRecord>> {
    if bytes.len() % DATABASE_RECORD_SIZE != 0 {
        return Err(Error::format(format!(
            "MMS database of {} bytes is not made of {}-byte records",
            bytes.len(),
            DATABASE_RECORD_SIZE
        )));
    }
    bytes
        .chunks_exact(DATABASE_RECORD_SIZE)
        .map(|record| {
            Ok(DatabaseRecord {
                message_id: u32::from_le_bytes([record[0], record[1], record[2], record[3]]),
                file_size: u32::from_le_bytes([record[4], record[5], record[6], record[7]]),
                file_name: decode_utf16_le_field(&record[FILE_NAME_FIELD])?,
                phone_number: decode_utf16_le_field(&record[PHONE_NUMBER_FIELD])?,
            })
        })
        .collect()
}

/// `<number>_<YYYY-MM-DD_HH.MM.SS>`, with `unknown-date` when the message has no date.
pub fn message_directory_name(number: &str, timestamp: Option<NaiveDateTime>) -> String {
    let date = timestamp
        .map(|t| t.format("%Y-%m-%d_%H.%M.%S").to_string())
        .unwrap_or_else(|| "unknown-date".to_string());
    sanitize_file_name(&format!("{number}_{date}"))
}

/// Pick a file name not used yet in a message directory.
fn unique_file_name(used: &mut HashSet<String>, name: &str) -> String {
    let mut candidate = name.to_string();
    let (stem, extension) = match name.rfind('.') {
        Some(dot) if dot > 0 => (&name[..dot], &name[dot..]),
        _ => (name, ""),
    };
    let mut counter = 1;
    while !used.insert(candidate.clone()) {
        candidate = format!("{stem}_{counter}{extension}");
        counter += 1;
    }
    candidate
}

/// First of `name`, `name_2`, `name_3`... not present in `parent`.
fn unique_directory(parent: &Path, name: &str) -> PathBuf {
    let mut candidate = parent.join(name);
    let mut counter = 2;
    while candidate.exists() {
        candidate = parent.join(format!("{name}_{counter}"));
        counter += 1;
    }
    candidate
}

/// Write the attachments (and subject) of a message under `mms_directory`.
/// Returns the message directory, suffixed when another message from the
/// same number and date already took the name.
pub fn save_message(message: &MmsMessage, number: &str, mms_directory: &Path) -> Result<PathBuf> {
    let name = message_directory_name(number, message.timestamp);
    let directory = unique_directory(mms_directory, &name);
    if directory.file_name() != Some(OsStr::new(&name)) {
        warn!(
            "Another MMS from {} is already saved as {}, using {}",
            number,
            name,
            directory.display()
        );
    }
    create_directory(&directory)?;

    let mut used = HashSet::new();
    if let Some(subject) = &message.subject {
        used.insert("subject.txt".to_string());
        write_file(&directory.join("subject.txt"), subject.as_bytes())?;
    }
    for (index, attachment) in message.attachments.iter().enumerate() {
        let name = match &attachment.file_name {
            Some(name) => sanitize_file_name(name),
            None => format!("attachment_{}.bin", index + 1),
        };
        let name = unique_file_name(&mut used, &name);
        write_file(&directory.join(&name), &attachment.data)?;
        debug!("Saved attachment {} ({} bytes)", name, attachment.data.len());
    }
    Ok(directory)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MmsSummary {
    pub saved: usize,
    pub skipped: usize,
}

fn download_message(
    at: &mut AtChannel,
    storage: &MmsStorage,
    record: &DatabaseRecord,
    mms_directory: &Path,
) -> Result<bool> {
    let path = join_phone_path(&storage.payload_directory, &record.file_name);
    let data = read_file(at, &path)?;
    if data.len() != record.file_size as usize {
        warn!(
            "\"{}\" is {} bytes, the database says {}",
            path,
            data.len(),
            record.file_size
        );
    }

    let message = decode_message(&data)?;
    if message.is_indication() {
        debug!("Skipping indication \"{}\"", path);
        return Ok(false);
    }
    let number = message
        .sender
        .clone()
        .filter(|sender| !sender.is_empty())
        .unwrap_or_else(|| record.phone_number.clone());
    let directory = save_message(&message, &number, mms_directory)?;
    info!("Saved MMS {} to {}", record.message_id, directory.display());
    Ok(true)
}

/// Export every MMS of every folder on every device to `<output>/MMS`.
///
/// A message with an unknown header field is logged and skipped. Other
/// failures abort unless `keep_going` is set and the failure only concerns
/// the message data.
pub fn download_all(
    at: &mut AtChannel,
    output_directory: &Path,
    keep_going: bool,
) -> Result<MmsSummary> {
    let mms_directory = output_directory.join("MMS");
    create_directory(&mms_directory)?;
    let mut summary = MmsSummary::default();

    for device in StorageDevice::ALL {
        for folder in MmsFolder::ALL {
            let Some(storage) = query_storage(at, folder, device)? else {
                continue;
            };
            info!(
                "{} MMS in {:?} on {:?} ({})",
                storage.count, folder, device, storage.payload_directory
            );

            let database = read_file(at, &storage.database_file)?;
            for record in parse_database(&database)? {
                match download_message(at, &storage, &record, &mms_directory) {
                    Ok(true) => summary.saved += 1,
                    Ok(false) => summary.skipped += 1,
                    Err(e @ Error::UnknownHeaderField(_)) => {
                        warn!("Skipping MMS \"{}\": {}", record.file_name, e);
                        summary.skipped += 1;
                    }
                    Err(e) if keep_going && e.kind() == ErrorKind::Format => {
                        warn!("Skipping MMS \"{}\": {}", record.file_name, e);
                        summary.skipped += 1;
                    }
                    Err(e) => {
                        error!("Failed to retrieve MMS \"{}\"", record.file_name);
                        return Err(e);
                    }
                }
            }
        }
    }
    Ok(summary)
}
